//! 连接处理器
//!
//! 每个接受的连接一个任务，按状态机推进:
//!
//! ```text
//! Connecting ──► AwaitingUsername ──► Joined ──► Closed
//!      │                 │  ▲ (重名)                ▲
//!      │                 └──┘                        │
//!      └─────────────────┴── 读写错误 / EOF ─────────┘
//! ```

use std::sync::Arc;

use protocol::{Connection, ConnectionReader, Message, ProtocolError, USERNAME_TAKEN};
use tracing::{debug, info};

use crate::bus::MessageBus;
use crate::error::{ErrorSink, ServerError};
use crate::peer::Peer;
use crate::registry::{RegistryError, UserRegistry};

/// 连接状态
#[derive(Debug)]
enum State {
    /// 刚建立，尚未发送聊天室名称
    Connecting,
    /// 等待客户端给出可用的用户名
    AwaitingUsername,
    /// 已加入，转发聊天内容
    Joined(String),
    /// 终止；若已注册则带上用户名
    Closed(Option<String>),
}

/// 连接处理器，所有连接共享同一份
#[derive(Clone)]
pub struct ConnectionHandler {
    room_name: Arc<str>,
    registry: Arc<UserRegistry<Peer>>,
    bus: MessageBus,
    errors: ErrorSink,
}

impl ConnectionHandler {
    pub fn new(
        room_name: &str,
        registry: Arc<UserRegistry<Peer>>,
        bus: MessageBus,
        errors: ErrorSink,
    ) -> Self {
        Self {
            room_name: Arc::from(room_name),
            registry,
            bus,
            errors,
        }
    }

    /// 驱动一个连接直到关闭
    pub async fn run(&self, conn: Connection) {
        let addr = conn.peer().to_string();
        let (mut reader, writer) = conn.split();
        let peer = Peer::new(&addr, writer);

        let mut state = State::Connecting;
        loop {
            state = match state {
                State::Connecting => match peer.send(&self.room_name).await {
                    Ok(()) => State::AwaitingUsername,
                    Err(e) => {
                        self.connection_error(&peer, e).await;
                        State::Closed(None)
                    }
                },
                State::AwaitingUsername => match self.negotiate(&mut reader, &peer).await {
                    Ok(name) => State::Joined(name),
                    Err(e) => {
                        self.connection_error(&peer, e).await;
                        State::Closed(None)
                    }
                },
                State::Joined(name) => {
                    self.relay(&mut reader, &peer, &name).await;
                    State::Closed(Some(name))
                }
                State::Closed(name) => {
                    self.close(&peer, name).await;
                    break;
                }
            };
        }
    }

    /// 读取候选用户名直到注册成功；重名时提示并继续读取
    async fn negotiate(
        &self,
        reader: &mut ConnectionReader,
        peer: &Peer,
    ) -> Result<String, ProtocolError> {
        loop {
            let name = reader.read_chunk().await?;
            match self.registry.add(&name, peer.clone()) {
                Ok(()) => return Ok(name),
                Err(RegistryError::DuplicateName(_)) => {
                    debug!(peer = peer.addr(), user = %name, "username already taken");
                    peer.send(USERNAME_TAKEN).await?;
                }
            }
        }
    }

    /// 广播加入通知，然后把每一块输入作为聊天消息入队
    async fn relay(&self, reader: &mut ConnectionReader, peer: &Peer, name: &str) {
        info!(peer = peer.addr(), user = %name, "user joined");
        if !self.bus.publish(Message::joined(name)).await {
            debug!(peer = peer.addr(), user = %name, "message bus closed");
            return;
        }

        loop {
            match reader.read_chunk().await {
                Ok(text) => {
                    if !self.bus.publish(Message::chat(name, text)).await {
                        break;
                    }
                }
                Err(e) => {
                    self.connection_error(peer, e).await;
                    break;
                }
            }
        }
    }

    async fn close(&self, peer: &Peer, name: Option<String>) {
        if let Some(name) = name {
            self.registry.remove(&name);
            // 总线已关闭时没有人能收到离开通知
            let _ = self.bus.publish(Message::left(&name)).await;
            info!(peer = peer.addr(), user = %name, "user left");
        }
        let _ = peer.close().await;
    }

    async fn connection_error(&self, peer: &Peer, err: ProtocolError) {
        if err.is_closed() {
            debug!(peer = peer.addr(), "connection closed by peer");
            return;
        }
        self.errors
            .report(ServerError::Connection {
                peer: peer.addr().to_string(),
                source: err,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReporter;
    use protocol::MAX_CHUNK_SIZE;

    struct Harness {
        handler: ConnectionHandler,
        registry: Arc<UserRegistry<Peer>>,
        _reporter: ErrorReporter,
    }

    fn harness() -> Harness {
        let registry = Arc::new(UserRegistry::new());
        let (errors, reporter) = ErrorSink::channel(16);
        let (bus, worker) = MessageBus::channel(16, Arc::clone(&registry), errors.clone());
        tokio::spawn(worker.run());
        Harness {
            handler: ConnectionHandler::new("Test Room", Arc::clone(&registry), bus, errors),
            registry,
            _reporter: reporter,
        }
    }

    /// 启动一个处理器任务，返回客户端一侧的连接
    fn connect(
        handler: &ConnectionHandler,
        peer: &str,
    ) -> (Connection, tokio::task::JoinHandle<()>) {
        let (server, client) = tokio::io::duplex(4096);
        let handler = handler.clone();
        let conn = Connection::from_stream(server, peer);
        let task = tokio::spawn(async move { handler.run(conn).await });
        (Connection::from_stream(client, "server"), task)
    }

    async fn read_until(conn: &mut Connection, expected: &str) -> String {
        let mut received = String::new();
        while !received.contains(expected) {
            received.push_str(&conn.recv().await.unwrap());
        }
        received
    }

    #[tokio::test]
    async fn test_greeting_then_join() {
        let h = harness();
        let (mut client, _task) = connect(&h.handler, "a");

        assert_eq!(client.recv().await.unwrap(), "Test Room");
        client.send("alice").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), "alice has joined\n");
        assert!(h.registry.get("alice").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_name_reprompts() {
        let h = harness();
        let (mut alice, _a) = connect(&h.handler, "a");
        alice.recv().await.unwrap();
        alice.send("alice").await.unwrap();
        read_until(&mut alice, "alice has joined\n").await;

        let (mut other, _b) = connect(&h.handler, "b");
        other.recv().await.unwrap();
        other.send("alice").await.unwrap();
        assert_eq!(other.recv().await.unwrap(), USERNAME_TAKEN);
        other.send("alice").await.unwrap();
        assert_eq!(other.recv().await.unwrap(), USERNAME_TAKEN);
        other.send("bob").await.unwrap();

        read_until(&mut other, "bob has joined\n").await;
        read_until(&mut alice, "bob has joined\n").await;
        assert_eq!(h.registry.len(), 2);
    }

    #[tokio::test]
    async fn test_chat_is_attributed_to_sender() {
        let h = harness();
        let (mut alice, _a) = connect(&h.handler, "a");
        alice.recv().await.unwrap();
        alice.send("alice").await.unwrap();
        read_until(&mut alice, "alice has joined\n").await;

        alice.send("hello").await.unwrap();
        read_until(&mut alice, "alice: hello\n").await;
    }

    #[tokio::test]
    async fn test_long_chunk_fragments_into_messages() {
        let h = harness();
        let (mut alice, _a) = connect(&h.handler, "a");
        alice.recv().await.unwrap();
        alice.send("alice").await.unwrap();
        read_until(&mut alice, "alice has joined\n").await;

        let long = format!("{}{}", "a".repeat(MAX_CHUNK_SIZE), "tail");
        alice.send(&long).await.unwrap();
        let received = read_until(&mut alice, "alice: tail\n").await;
        assert!(received.contains(&format!("alice: {}\n", "a".repeat(MAX_CHUNK_SIZE))));
    }

    #[tokio::test]
    async fn test_disconnect_deregisters_and_announces() {
        let h = harness();
        let (mut alice, alice_task) = connect(&h.handler, "a");
        alice.recv().await.unwrap();
        alice.send("alice").await.unwrap();
        read_until(&mut alice, "alice has joined\n").await;

        let (mut bob, _b) = connect(&h.handler, "b");
        bob.recv().await.unwrap();
        bob.send("bob").await.unwrap();
        read_until(&mut bob, "bob has joined\n").await;

        drop(alice);
        alice_task.await.unwrap();

        read_until(&mut bob, "alice has left\n").await;
        assert!(h.registry.get("alice").is_none());
        assert!(h.registry.get("bob").is_some());
    }

    #[tokio::test]
    async fn test_disconnect_before_username_announces_nothing() {
        let h = harness();
        let (mut watcher, _w) = connect(&h.handler, "w");
        watcher.recv().await.unwrap();
        watcher.send("watcher").await.unwrap();
        read_until(&mut watcher, "watcher has joined\n").await;

        let (mut quitter, task) = connect(&h.handler, "q");
        quitter.recv().await.unwrap();
        drop(quitter);
        task.await.unwrap();

        // 后续消息紧跟在加入通知之后，中间没有离开通知
        assert!(h.handler.bus.publish(Message::system("marker")).await);
        assert_eq!(read_until(&mut watcher, "marker\n").await, "marker\n");
        assert_eq!(h.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_session_and_frees_name() {
        let registry = Arc::new(UserRegistry::new());
        let (errors, _reporter) = ErrorSink::channel(16);
        let (bus, worker) = MessageBus::channel(16, Arc::clone(&registry), errors.clone());
        drop(worker);
        let handler = ConnectionHandler::new("Test Room", Arc::clone(&registry), bus, errors);

        let (mut client, task) = connect(&handler, "a");
        assert_eq!(client.recv().await.unwrap(), "Test Room");
        client.send("alice").await.unwrap();

        task.await.unwrap();
        assert!(client.recv().await.unwrap_err().is_closed());
        assert!(registry.is_empty());
    }
}
