//! 连接句柄
//!
//! 用户表里保存的是连接写入端的共享句柄：连接处理器用它发送握手和拒绝提示，
//! 消息总线用它广播。读取端始终只属于连接处理器。

use std::sync::Arc;

use protocol::{ConnectionWriter, Result};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct Peer {
    addr: Arc<str>,
    writer: Arc<Mutex<ConnectionWriter>>,
}

impl Peer {
    pub fn new(addr: &str, writer: ConnectionWriter) -> Self {
        Self {
            addr: Arc::from(addr),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// 对端地址
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// 发送一块文本
    pub async fn send(&self, text: &str) -> Result<()> {
        self.writer.lock().await.write_chunk(text).await
    }

    /// 关闭写入端
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("addr", &self.addr).finish()
    }
}
