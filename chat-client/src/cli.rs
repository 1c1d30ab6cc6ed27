//! 命令行参数

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use protocol::{ClientTlsOptions, Network, DEFAULT_NETWORK};

use crate::session::ClientConfig;

/// 连接聊天室
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 服务器地址，例如 "127.0.0.1:8080" 或套接字路径
    pub address: String,

    /// 用户名
    pub username: String,

    /// 网络类型: "tcp", "tcp4", "tcp6" 或 "unix"
    #[arg(long, default_value = DEFAULT_NETWORK)]
    pub network: Network,

    /// 使用 TLS 连接（给出任意 TLS 参数时自动启用）
    #[arg(long)]
    pub tls: bool,

    /// 额外信任的 CA 证书
    #[arg(long)]
    pub ca_file: Option<PathBuf>,

    /// 客户端证书
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// 客户端私钥
    #[arg(long)]
    pub cert_key_file: Option<PathBuf>,

    /// 跳过服务端证书和主机名校验
    #[arg(long)]
    pub skip_tls_verify: bool,

    /// 使用终端界面而不是图形界面
    #[arg(long)]
    pub terminal: bool,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<ClientConfig> {
        if self.address.is_empty() {
            bail!("address should be provided");
        }
        if self.username.is_empty() {
            bail!("name should be provided");
        }

        let (cert_file, key_file) = match (self.cert_file, self.cert_key_file) {
            (Some(cert), Some(key)) => (Some(cert), Some(key)),
            (None, None) => (None, None),
            _ => bail!("--cert-file and --cert-key-file must be given together"),
        };

        let enabled = self.tls
            || self.skip_tls_verify
            || self.ca_file.is_some()
            || cert_file.is_some();
        let tls = enabled.then(|| ClientTlsOptions {
            ca_file: self.ca_file,
            cert_file,
            key_file,
            insecure_skip_verify: self.skip_tls_verify,
        });

        Ok(ClientConfig {
            network: self.network,
            address: self.address,
            username: self.username,
            tls,
        })
    }
}
