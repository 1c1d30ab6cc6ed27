//! 聊天室服务端
//!
//! 基于 Tokio 的异步服务器，支持 TCP / Unix 套接字和可选 TLS

use anyhow::Result;
use chat_server::cli::Cli;
use chat_server::ChatServer;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_server=debug".parse()?)
                .add_directive("protocol=debug".parse()?),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let server = ChatServer::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("received interrupt, exiting"),
    }

    Ok(())
}
