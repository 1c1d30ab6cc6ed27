//! 聊天会话
//!
//! 拨号、握手（读取聊天室名称并提交用户名），然后把连接交给两条转发路径：
//! 后台任务把服务端发来的每一块转给输出端，前台循环把输入事件逐条发给服务端。

use protocol::{
    dial, ClientTls, ClientTlsOptions, Connection, ConnectionReader, ConnectionWriter, Network,
    NetworkError, ProtocolError, TlsConfigError, DISCONNECTED_NOTICE, USERNAME_TAKEN_MARKER,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    /// 用户名已被占用，客户端不重试
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Tls(#[from] TlsConfigError),
}

/// 客户端配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub network: Network,
    pub address: String,
    pub username: String,
    /// `None` 表示明文连接
    pub tls: Option<ClientTlsOptions>,
}

/// 前台输入事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// 一行待发送的文本
    Line(String),
    /// 用户主动退出
    Quit,
}

/// 已建立但尚未加入聊天室的会话
#[derive(Debug)]
pub struct ChatSession {
    conn: Connection,
}

impl ChatSession {
    /// 按配置拨号（可选 TLS）
    pub async fn connect(config: &ClientConfig) -> Result<Self, SessionError> {
        let tls = config.tls.as_ref().map(ClientTls::new).transpose()?;
        let conn = dial(config.network, &config.address, tls.as_ref()).await?;
        info!(
            network = %config.network,
            address = %config.address,
            tls = tls.is_some(),
            "connected"
        );
        Ok(Self::new(conn))
    }

    /// 包装一条已建立的连接
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// 握手：读取聊天室名称，提交用户名，读取一次回复
    ///
    /// 回复若不是拒绝提示，就是服务端广播的第一块内容，会作为输出的第一条保留下来。
    pub async fn join(mut self, username: &str) -> Result<Joined, SessionError> {
        let room_name = self.conn.recv().await?;
        self.conn.send(username).await?;

        let reply = self.conn.recv().await?;
        if reply.contains(USERNAME_TAKEN_MARKER) {
            return Err(SessionError::UsernameTaken(username.to_string()));
        }

        info!(room = %room_name, user = %username, "joined chatroom");
        let (reader, writer) = self.conn.split();
        Ok(Joined {
            room_name,
            first_reply: Some(reply),
            reader,
            writer,
        })
    }
}

/// 已加入聊天室的会话
pub struct Joined {
    room_name: String,
    first_reply: Option<String>,
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Joined {
    /// 服务端在握手时发来的聊天室名称
    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    /// 运行会话直到用户退出或发送失败
    ///
    /// 发送失败时向输出端写入断线提示，并关闭输入通道；
    /// 前端据此发现发送失败，禁用输入。
    pub async fn run(
        self,
        mut input: mpsc::UnboundedReceiver<InputEvent>,
        output: mpsc::UnboundedSender<String>,
    ) {
        let Joined {
            first_reply,
            mut reader,
            mut writer,
            ..
        } = self;

        if let Some(reply) = first_reply {
            let _ = output.send(reply);
        }

        let relay_output = output.clone();
        let relay = tokio::spawn(async move {
            loop {
                match reader.read_chunk().await {
                    Ok(chunk) => {
                        if relay_output.send(chunk).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.is_closed() => {
                        debug!("server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "receive failed");
                        break;
                    }
                }
            }
        });

        while let Some(event) = input.recv().await {
            match event {
                InputEvent::Line(line) => {
                    if let Err(e) = writer.write_chunk(&line).await {
                        warn!(error = %e, "send failed");
                        let _ = output.send(format!("{DISCONNECTED_NOTICE}\n"));
                        break;
                    }
                }
                InputEvent::Quit => {
                    debug!("quit requested");
                    break;
                }
            }
        }

        // 关闭输入通道，前端后续的发送都会失败
        input.close();
        drop(input);

        let _ = writer.shutdown().await;
        relay.abort();
    }
}

impl std::fmt::Debug for Joined {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joined")
            .field("room_name", &self.room_name)
            .finish()
    }
}
