//! 块编解码
//!
//! 线上格式没有分帧：一条消息就是一次读取返回的字节，最多
//! [`MAX_CHUNK_SIZE`] 字节，按 UTF-8 解码。
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │      Payload (≤ 256B, UTF-8 text, no framing) │
//! └──────────────────────────────────────────────┘
//! ```
//! 超过一个块的输入会被拆成多条独立消息，不做续接。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};
use crate::MAX_CHUNK_SIZE;

/// 块读取器
pub struct ChunkReader<R> {
    reader: R,
    buffer: [u8; MAX_CHUNK_SIZE],
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// 创建新的块读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: [0u8; MAX_CHUNK_SIZE],
        }
    }

    /// 执行一次读取并解码为文本
    ///
    /// 读到 0 字节视为对端关闭。非法 UTF-8 序列（包括被块边界切断的多字节字符）
    /// 以替换字符解码。
    pub async fn read_chunk(&mut self) -> Result<String> {
        let n = self.reader.read(&mut self.buffer).await?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(String::from_utf8_lossy(&self.buffer[..n]).into_owned())
    }
}

/// 块写入器
pub struct ChunkWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> ChunkWriter<W> {
    /// 创建新的块写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入整段文本并刷新
    pub async fn write_chunk(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
