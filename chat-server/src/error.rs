//! 服务端错误与错误上报
//!
//! 连接处理器、消息总线和监听循环都不直接处理彼此的错误，
//! 而是统一发送到错误队列，由单独的上报任务记录日志。

use protocol::{NetworkError, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// 服务端运行期错误
#[derive(Error, Debug)]
pub enum ServerError {
    /// 接受连接失败
    #[error("error accepting connection: {0}")]
    Accept(#[source] NetworkError),

    /// 连接建立失败（TLS 握手）
    #[error("error establishing connection with {peer}: {source}")]
    Establish {
        peer: String,
        #[source]
        source: NetworkError,
    },

    /// 已建立连接上的读写失败
    #[error("error on connection {peer}: {source}")]
    Connection {
        peer: String,
        #[source]
        source: ProtocolError,
    },

    /// 广播写入失败
    #[error("error broadcasting message to {recipient} ({peer}): {source}")]
    BroadcastWrite {
        recipient: String,
        peer: String,
        #[source]
        source: ProtocolError,
    },
}

/// 错误队列的发送端
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<ServerError>,
}

impl ErrorSink {
    /// 创建错误队列，返回发送端和上报任务
    pub fn channel(capacity: usize) -> (ErrorSink, ErrorReporter) {
        let (tx, rx) = mpsc::channel(capacity);
        (ErrorSink { tx }, ErrorReporter { rx })
    }

    /// 上报错误；上报任务已退出时直接记录
    pub async fn report(&self, err: ServerError) {
        if let Err(mpsc::error::SendError(err)) = self.tx.send(err).await {
            error!("{}", err);
        }
    }
}

/// 错误上报任务
pub struct ErrorReporter {
    rx: mpsc::Receiver<ServerError>,
}

impl ErrorReporter {
    pub async fn run(mut self) {
        while let Some(err) = self.rx.recv().await {
            match &err {
                ServerError::Accept(_) => error!("{}", err),
                ServerError::Establish { .. }
                | ServerError::Connection { .. }
                | ServerError::BroadcastWrite { .. } => warn!("{}", err),
            }
        }
    }

    /// 取出下一条错误（测试使用）
    pub async fn next(&mut self) -> Option<ServerError> {
        self.rx.recv().await
    }
}
