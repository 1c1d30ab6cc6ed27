//! 命令行参数

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use protocol::Network;

use crate::config::{ServerConfig, TlsFiles};

/// 启动聊天室服务端
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML 配置文件，命令行参数优先
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 聊天室名称
    #[arg(long)]
    pub name: Option<String>,

    /// 网络类型: "tcp", "tcp4", "tcp6" 或 "unix"
    #[arg(long)]
    pub network: Option<Network>,

    /// 监听地址，例如 ":8080"、"127.0.0.1:8080" 或套接字路径
    #[arg(long)]
    pub address: Option<String>,

    /// TLS 证书文件
    #[arg(long)]
    pub cert_file: Option<PathBuf>,

    /// TLS 私钥文件
    #[arg(long)]
    pub cert_key_file: Option<PathBuf>,
}

impl Cli {
    /// 合并配置文件与命令行参数
    pub fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(address) = self.address {
            config.address = address;
        }

        match (self.cert_file, self.cert_key_file) {
            (Some(cert_file), Some(key_file)) => {
                config.tls = Some(TlsFiles {
                    cert_file,
                    key_file,
                });
            }
            (None, None) => {}
            _ => bail!("--cert-file and --cert-key-file must be given together"),
        }

        Ok(config)
    }
}
