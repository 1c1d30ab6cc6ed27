//! 聊天室服务端
//!
//! - 在线用户表 (UserRegistry)
//! - 消息总线 (MessageBus)
//! - 连接处理器 (ConnectionHandler)
//! - 服务器装配 (ChatServer)

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod peer;
pub mod registry;
pub mod server;

pub use config::{ServerConfig, TlsFiles};
pub use registry::{RegistryError, UserRegistry};
pub use server::ChatServer;
