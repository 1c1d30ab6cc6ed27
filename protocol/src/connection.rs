//! 连接封装
//!
//! 把装箱的字节流拆成块读取端和块写入端，并记录对端地址。

use tokio::io::{ReadHalf, WriteHalf};

use crate::codec::{ChunkReader, ChunkWriter};
use crate::error::Result;
use crate::transport::{BoxedStream, Stream};

/// 连接的读取端
pub type ConnectionReader = ChunkReader<ReadHalf<BoxedStream>>;

/// 连接的写入端
pub type ConnectionWriter = ChunkWriter<WriteHalf<BoxedStream>>;

/// 连接封装
///
/// 独占持有一条双向字节流，关闭后不可再用。
pub struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
    peer: String,
}

impl Connection {
    /// 从装箱的字节流创建连接
    pub fn new(stream: BoxedStream, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: ChunkReader::new(reader),
            writer: ChunkWriter::new(writer),
            peer: peer.into(),
        }
    }

    /// 从任意字节流创建连接（测试中配合 `tokio::io::duplex` 使用）
    pub fn from_stream<S: Stream>(stream: S, peer: impl Into<String>) -> Self {
        Self::new(Box::new(stream), peer)
    }

    /// 对端地址
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// 分离为读取端和写入端
    ///
    /// 用于需要并发读写的场景
    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }

    /// 接收一块
    pub async fn recv(&mut self) -> Result<String> {
        self.reader.read_chunk().await
    }

    /// 发送一块
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.writer.write_chunk(text).await
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}
