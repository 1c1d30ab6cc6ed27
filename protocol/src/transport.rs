//! 传输层
//!
//! 按字符串选择的网络类型（tcp / tcp4 / tcp6 / unix）监听和拨号，
//! 可选地在套接字之上套一层 TLS。上层只看到装箱后的双向字节流。

use std::fmt;
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{NetworkError, TlsConfigError};
use crate::tls::ClientTls;

/// 双向字节流
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Stream for T {}

/// 装箱的字节流，明文和 TLS 连接统一为此类型
pub type BoxedStream = Box<dyn Stream>;

/// 网络类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// TCP，任意地址族
    Tcp,
    /// 仅 IPv4
    Tcp4,
    /// 仅 IPv6
    Tcp6,
    /// 本地流式套接字
    Unix,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
            Network::Unix => "unix",
        }
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
            _ => true,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            "unix" => Ok(Network::Unix),
            other => Err(NetworkError::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// 补全省略主机的地址（":8080"），返回按顺序尝试的候选
///
/// 监听时表示所有网卡，拨号时表示本机回环。`tcp` 监听优先双栈的 `[::]`，
/// 主机不支持 IPv6 时退回 `0.0.0.0`。
fn complete_address(network: Network, address: &str, dial: bool) -> Vec<String> {
    let Some(port) = address.strip_prefix(':') else {
        return vec![address.to_string()];
    };
    let hosts: &[&str] = match (network, dial) {
        (Network::Tcp, false) => &["[::]", "0.0.0.0"],
        (Network::Tcp6, false) => &["[::]"],
        (Network::Tcp6, true) => &["[::1]"],
        (_, false) => &["0.0.0.0"],
        (_, true) => &["127.0.0.1"],
    };
    hosts.iter().map(|host| format!("{host}:{port}")).collect()
}

/// 解析地址并按网络类型过滤地址族
async fn resolve(
    network: Network,
    address: &str,
    dial: bool,
) -> Result<Vec<SocketAddr>, NetworkError> {
    let resolve_err = || NetworkError::Resolve {
        network: network.to_string(),
        address: address.to_string(),
    };

    let mut candidates = Vec::new();
    for full in complete_address(network, address, dial) {
        let addrs = tokio::net::lookup_host(full.as_str())
            .await
            .map_err(|_| resolve_err())?;
        candidates.extend(addrs.filter(|addr| network.accepts(addr)));
    }

    if candidates.is_empty() {
        return Err(resolve_err());
    }
    Ok(candidates)
}

/// 从拨号地址中取出 TLS 服务器名称
pub(crate) fn server_name(network: Network, address: &str) -> String {
    if network == Network::Unix {
        return "localhost".to_string();
    }
    let host = match address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => address,
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

/// 传输层监听器（服务端使用）
pub struct Listener {
    inner: ListenerInner,
    tls: Option<TlsAcceptor>,
}

impl Listener {
    /// 绑定地址并开始监听
    ///
    /// `tls` 为 `Some` 时，每个接受的连接都会先完成 TLS 握手。
    pub async fn bind(
        network: Network,
        address: &str,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self, NetworkError> {
        let inner = match network {
            Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
                let candidates = resolve(network, address, false).await?;
                let listener = TcpListener::bind(candidates.as_slice())
                    .await
                    .map_err(|source| NetworkError::Bind {
                        address: address.to_string(),
                        source,
                    })?;
                ListenerInner::Tcp(listener)
            }
            Network::Unix => bind_unix(address)?,
        };

        Ok(Self { inner, tls })
    }

    /// 获取本地绑定地址
    pub fn local_addr(&self) -> std::io::Result<String> {
        match &self.inner {
            ListenerInner::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            ListenerInner::Unix { path, .. } => Ok(path.display().to_string()),
        }
    }

    /// 是否启用了 TLS
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// 接受新连接
    ///
    /// 只完成套接字层面的接受；TLS 握手留给 [`Incoming::establish`]，
    /// 以免慢速握手阻塞监听循环。
    pub async fn accept(&self) -> Result<Incoming, NetworkError> {
        let (stream, peer): (BoxedStream, String) = match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().await.map_err(NetworkError::Accept)?;
                stream.set_nodelay(true).map_err(NetworkError::Accept)?;
                (Box::new(stream), addr.to_string())
            }
            #[cfg(unix)]
            ListenerInner::Unix { listener, path } => {
                let (stream, addr) = listener.accept().await.map_err(NetworkError::Accept)?;
                let peer = match addr.as_pathname() {
                    Some(p) => p.display().to_string(),
                    None => format!("{}#anonymous", path.display()),
                };
                (Box::new(stream), peer)
            }
        };

        Ok(Incoming {
            stream,
            peer,
            tls: self.tls.clone(),
        })
    }
}

#[cfg(unix)]
fn bind_unix(address: &str) -> Result<ListenerInner, NetworkError> {
    use std::os::unix::fs::FileTypeExt;

    let path = PathBuf::from(address);
    let in_use = |source: io::Error| NetworkError::Bind {
        address: address.to_string(),
        source,
    };

    // 只清理没有进程在监听的残留套接字文件
    if let Ok(meta) = std::fs::symlink_metadata(&path) {
        if meta.file_type().is_socket() {
            match std::os::unix::net::UnixStream::connect(&path) {
                Ok(_) => return Err(in_use(io::ErrorKind::AddrInUse.into())),
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!(path = %path.display(), "removing stale unix socket");
                    let _ = std::fs::remove_file(&path);
                }
                // 其他情况交给 bind 报错
                Err(_) => {}
            }
        }
    }

    let listener = tokio::net::UnixListener::bind(&path).map_err(in_use)?;
    Ok(ListenerInner::Unix { listener, path })
}

#[cfg(not(unix))]
fn bind_unix(_address: &str) -> Result<ListenerInner, NetworkError> {
    Err(NetworkError::UnsupportedNetwork("unix".to_string()))
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let ListenerInner::Unix { path, .. } = &self.inner {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// 已接受、尚未完成握手的连接
pub struct Incoming {
    stream: BoxedStream,
    peer: String,
    tls: Option<TlsAcceptor>,
}

impl Incoming {
    /// 对端地址
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// 完成 TLS 握手（如果启用）并得到连接
    pub async fn establish(self) -> Result<Connection, NetworkError> {
        let stream: BoxedStream = match self.tls {
            Some(acceptor) => {
                let tls_stream = acceptor
                    .accept(self.stream)
                    .await
                    .map_err(TlsConfigError::Handshake)?;
                Box::new(tls_stream)
            }
            None => self.stream,
        };
        Ok(Connection::new(stream, self.peer))
    }
}

/// 建立连接（客户端使用）
pub async fn dial(
    network: Network,
    address: &str,
    tls: Option<&ClientTls>,
) -> Result<Connection, NetworkError> {
    let stream: BoxedStream = match network {
        Network::Tcp | Network::Tcp4 | Network::Tcp6 => {
            let candidates = resolve(network, address, true).await?;
            let stream = TcpStream::connect(candidates.as_slice())
                .await
                .map_err(|source| NetworkError::Dial {
                    address: address.to_string(),
                    source,
                })?;
            stream.set_nodelay(true).map_err(|source| NetworkError::Dial {
                address: address.to_string(),
                source,
            })?;
            Box::new(stream)
        }
        Network::Unix => dial_unix(address).await?,
    };

    let stream = match tls {
        Some(tls) => tls.connect(&server_name(network, address), stream).await?,
        None => stream,
    };

    Ok(Connection::new(stream, address))
}

#[cfg(unix)]
async fn dial_unix(address: &str) -> Result<BoxedStream, NetworkError> {
    let stream = tokio::net::UnixStream::connect(address)
        .await
        .map_err(|source| NetworkError::Dial {
            address: address.to_string(),
            source,
        })?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn dial_unix(_address: &str) -> Result<BoxedStream, NetworkError> {
    Err(NetworkError::UnsupportedNetwork("unix".to_string()))
}
