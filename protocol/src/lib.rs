//! 聊天室共享协议库
//!
//! 包含:
//! - 消息类型定义 (Message)
//! - 传输层 (Listener, dial, Network)
//! - TLS 配置 (server_tls, ClientTls)
//! - 块编解码 (Codec)
//! - 连接封装 (Connection)

mod codec;
mod connection;
mod constants;
mod error;
mod message;
mod tls;
mod transport;

pub use codec::{ChunkReader, ChunkWriter};
pub use connection::{Connection, ConnectionReader, ConnectionWriter};
pub use constants::*;
pub use error::{NetworkError, ProtocolError, Result, TlsConfigError};
pub use message::{Message, MessageKind};
pub use tls::{load_certificates, load_private_key, server_tls, ClientTls, ClientTlsOptions};
pub use transport::{dial, BoxedStream, Incoming, Listener, Network, Stream};
