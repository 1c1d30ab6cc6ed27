//! 聊天服务器核心实现

use std::sync::Arc;

use anyhow::Context;
use protocol::{server_tls, Listener, ERROR_QUEUE_CAPACITY, MESSAGE_QUEUE_CAPACITY};
use tracing::{debug, info};

use crate::bus::MessageBus;
use crate::config::ServerConfig;
use crate::error::{ErrorSink, ServerError};
use crate::handler::ConnectionHandler;
use crate::peer::Peer;
use crate::registry::UserRegistry;

/// 聊天服务器
pub struct ChatServer {
    config: ServerConfig,
    listener: Listener,
    registry: Arc<UserRegistry<Peer>>,
}

impl ChatServer {
    /// 加载 TLS 材料并绑定地址，任何失败都是致命的
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let tls = match &config.tls {
            Some(files) => Some(
                server_tls(&files.cert_file, &files.key_file)
                    .context("error loading key pair")?,
            ),
            None => None,
        };

        let listener = Listener::bind(config.network, &config.address, tls)
            .await
            .context("error listening")?;

        info!(
            network = %config.network,
            address = %listener.local_addr()?,
            tls = listener.is_tls(),
            "{} started",
            config.name
        );

        Ok(Self {
            config,
            listener,
            registry: Arc::new(UserRegistry::new()),
        })
    }

    /// 实际监听地址（绑定端口 0 时用于获取分配的端口）
    pub fn local_addr(&self) -> std::io::Result<String> {
        self.listener.local_addr()
    }

    /// 在线用户表
    pub fn registry(&self) -> Arc<UserRegistry<Peer>> {
        Arc::clone(&self.registry)
    }

    /// 运行服务器，直到进程退出
    ///
    /// 启动消息总线和错误上报任务，然后循环接受连接。
    /// 单个连接的失败只会被上报，不会终止监听。
    pub async fn run(self) -> anyhow::Result<()> {
        let ChatServer {
            config,
            listener,
            registry,
        } = self;

        let (errors, reporter) = ErrorSink::channel(ERROR_QUEUE_CAPACITY);
        let (bus, worker) =
            MessageBus::channel(MESSAGE_QUEUE_CAPACITY, Arc::clone(&registry), errors.clone());
        tokio::spawn(reporter.run());
        tokio::spawn(worker.run());

        let handler = ConnectionHandler::new(&config.name, registry, bus, errors.clone());

        loop {
            let incoming = match listener.accept().await {
                Ok(incoming) => incoming,
                Err(e) => {
                    errors.report(ServerError::Accept(e)).await;
                    continue;
                }
            };

            info!(addr = incoming.peer(), "connection accepted");

            let handler = handler.clone();
            let errors = errors.clone();
            tokio::spawn(async move {
                let peer = incoming.peer().to_string();
                match incoming.establish().await {
                    Ok(conn) => handler.run(conn).await,
                    Err(source) => errors.report(ServerError::Establish { peer, source }).await,
                }
                debug!("connection handler finished");
            });
        }
    }
}
