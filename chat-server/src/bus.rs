//! 消息总线
//!
//! 所有连接处理器把消息放进同一个队列，唯一的消费任务逐条取出、
//! 对用户表做快照、按顺序写给每个接收者。因此所有接收者看到的顺序
//! 与入队顺序一致。
//!
//! 写入是串行的：一个卡住的接收者会拖住整个总线。写入失败只上报，
//! 不会把接收者从用户表中移除，移除由该连接自己的读取循环负责。

use std::sync::Arc;

use protocol::Message;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{ErrorSink, ServerError};
use crate::peer::Peer;
use crate::registry::UserRegistry;

/// 消息总线的入队端
#[derive(Clone)]
pub struct MessageBus {
    tx: mpsc::Sender<Message>,
}

impl MessageBus {
    /// 创建总线，返回入队端和消费任务
    pub fn channel(
        capacity: usize,
        registry: Arc<UserRegistry<Peer>>,
        errors: ErrorSink,
    ) -> (MessageBus, BusWorker) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            MessageBus { tx },
            BusWorker {
                rx,
                registry,
                errors,
            },
        )
    }

    /// 入队一条消息，队列满时等待
    ///
    /// 只有消费任务已退出时返回 `false`。
    #[must_use]
    pub async fn publish(&self, msg: Message) -> bool {
        self.tx.send(msg).await.is_ok()
    }
}

/// 总线消费任务
pub struct BusWorker {
    rx: mpsc::Receiver<Message>,
    registry: Arc<UserRegistry<Peer>>,
    errors: ErrorSink,
}

impl BusWorker {
    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.broadcast(&msg).await;
            info!(
                kind = %msg.kind(),
                sender = msg.sender().unwrap_or("system"),
                text = msg.text(),
                "message sent"
            );
        }
        debug!("message bus closed");
    }

    async fn broadcast(&self, msg: &Message) {
        let text = msg.render();
        for (name, peer) in self.registry.snapshot() {
            if let Err(source) = peer.send(&text).await {
                self.errors
                    .report(ServerError::BroadcastWrite {
                        recipient: name,
                        peer: peer.addr().to_string(),
                        source,
                    })
                    .await;
            }
        }
    }
}
