//! 错误类型定义

use std::path::PathBuf;

use thiserror::Error;

/// 已建立连接上的读写错误
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 连接已关闭（对端 EOF）
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// 是否为对端正常关闭
    pub fn is_closed(&self) -> bool {
        matches!(self, ProtocolError::ConnectionClosed)
    }
}

/// 监听、接受和拨号阶段的网络错误
#[derive(Error, Debug)]
pub enum NetworkError {
    /// 不支持的网络类型
    #[error("unsupported network {0:?}: must be \"tcp\", \"tcp4\", \"tcp6\" or \"unix\"")]
    UnsupportedNetwork(String),

    /// 地址解析失败或没有匹配的地址族
    #[error("cannot resolve {address} for {network}")]
    Resolve { network: String, address: String },

    /// 绑定失败
    #[error("failed to listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// 拨号失败
    #[error("failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// 接受连接失败
    #[error("failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    /// TLS 握手或配置错误
    #[error(transparent)]
    Tls(#[from] TlsConfigError),
}

/// TLS 证书加载与握手错误
#[derive(Error, Debug)]
pub enum TlsConfigError {
    /// 读取 PEM 文件失败
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文件中没有证书
    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    /// 文件中没有私钥
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// rustls 拒绝了配置
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    /// 无效的服务器名称
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    /// 握手失败
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] std::io::Error),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
