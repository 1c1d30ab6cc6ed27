//! 服务端配置
//!
//! 所有字段都有默认值，可以从 TOML 文件加载，再由命令行参数覆盖。

use std::path::{Path, PathBuf};

use protocol::{Network, DEFAULT_ADDRESS, DEFAULT_ROOM_NAME};
use serde::{Deserialize, Serialize};

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 聊天室名称，握手时发给客户端
    pub name: String,
    /// 网络类型
    pub network: Network,
    /// 监听地址
    pub address: String,
    /// TLS 证书与私钥（不配置则为明文）
    pub tls: Option<TlsFiles>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ROOM_NAME.to_string(),
            network: Network::Tcp,
            address: DEFAULT_ADDRESS.to_string(),
            tls: None,
        }
    }
}

/// PEM 格式的证书链和私钥路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl ServerConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 文件不存在时使用默认配置。
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("invalid config file {}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "cannot read config file {}: {e}",
                path.display()
            )),
        }
    }
}
