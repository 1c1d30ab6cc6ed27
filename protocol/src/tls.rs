//! TLS 配置
//!
//! 服务端从 PEM 文件加载证书链和私钥；客户端使用 webpki 根证书，
//! 可追加自签名 CA，也可以完全跳过服务端证书校验。

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::TlsConfigError;
use crate::transport::BoxedStream;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, TlsConfigError> {
    let file = File::open(path).map_err(|source| TlsConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// 读取 PEM 证书链
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// 读取 PEM 私钥（PKCS#1 / PKCS#8 / SEC1）
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsConfigError::NoPrivateKey(path.to_path_buf()))
}

/// 构造服务端 TLS 接受器
pub fn server_tls(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, TlsConfigError> {
    let cert_chain = load_certificates(cert_file)?;
    let private_key = load_private_key(key_file)?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// 客户端 TLS 选项
#[derive(Debug, Clone, Default)]
pub struct ClientTlsOptions {
    /// 额外信任的 CA 证书（PEM）
    pub ca_file: Option<PathBuf>,
    /// 客户端证书（PEM），需与 `key_file` 同时给出
    pub cert_file: Option<PathBuf>,
    /// 客户端私钥（PEM）
    pub key_file: Option<PathBuf>,
    /// 跳过服务端证书与主机名校验
    pub insecure_skip_verify: bool,
}

/// 客户端 TLS 连接器
#[derive(Clone)]
pub struct ClientTls {
    connector: TlsConnector,
}

impl ClientTls {
    pub fn new(options: &ClientTlsOptions) -> Result<Self, TlsConfigError> {
        let provider = provider();
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = if options.insecure_skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification(provider)))
        } else {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            if let Some(ca_file) = &options.ca_file {
                for cert in load_certificates(ca_file)? {
                    roots.add(cert)?;
                }
            }
            builder.with_root_certificates(roots)
        };

        let config = match (&options.cert_file, &options.key_file) {
            (Some(cert_file), Some(key_file)) => builder
                .with_client_auth_cert(load_certificates(cert_file)?, load_private_key(key_file)?)?,
            _ => builder.with_no_client_auth(),
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// 在已建立的字节流上完成 TLS 握手
    pub async fn connect(
        &self,
        server_name: &str,
        stream: BoxedStream,
    ) -> Result<BoxedStream, TlsConfigError> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsConfigError::InvalidServerName(server_name.to_string()))?;
        let tls_stream = self
            .connector
            .connect(name, stream)
            .await
            .map_err(TlsConfigError::Handshake)?;
        Ok(Box::new(tls_stream))
    }
}

impl std::fmt::Debug for ClientTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTls").finish_non_exhaustive()
    }
}

/// 接受任何服务端证书，但仍校验握手签名
#[derive(Debug)]
struct SkipServerVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{dial, Listener, Network};

    struct CertFiles {
        _dir: tempfile::TempDir,
        cert: PathBuf,
        key: PathBuf,
    }

    fn self_signed() -> CertFiles {
        let certified =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, certified.cert.pem()).unwrap();
        std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();
        CertFiles {
            _dir: dir,
            cert,
            key,
        }
    }

    #[test]
    fn test_server_tls_from_pem() {
        let files = self_signed();
        assert!(server_tls(&files.cert, &files.key).is_ok());
    }

    #[test]
    fn test_missing_cert_file() {
        let files = self_signed();
        let missing = files.cert.with_file_name("missing.pem");
        let err = server_tls(&missing, &files.key).err().unwrap();
        assert!(matches!(err, TlsConfigError::Read { .. }));
    }

    #[test]
    fn test_key_file_without_key() {
        let files = self_signed();
        // 证书文件里没有私钥
        let err = server_tls(&files.cert, &files.cert).err().unwrap();
        assert!(matches!(err, TlsConfigError::NoPrivateKey(_)));
    }

    #[test]
    fn test_cert_file_without_cert() {
        let files = self_signed();
        let err = server_tls(&files.key, &files.key).err().unwrap();
        assert!(matches!(err, TlsConfigError::NoCertificate(_)));
    }

    #[test]
    fn test_client_tls_variants() {
        let files = self_signed();
        assert!(ClientTls::new(&ClientTlsOptions::default()).is_ok());
        assert!(ClientTls::new(&ClientTlsOptions {
            insecure_skip_verify: true,
            ..Default::default()
        })
        .is_ok());
        assert!(ClientTls::new(&ClientTlsOptions {
            ca_file: Some(files.cert.clone()),
            cert_file: Some(files.cert.clone()),
            key_file: Some(files.key.clone()),
            ..Default::default()
        })
        .is_ok());
    }

    #[tokio::test]
    async fn test_tls_roundtrip_with_trusted_ca() {
        let files = self_signed();
        let acceptor = server_tls(&files.cert, &files.key).unwrap();
        let listener = Listener::bind(Network::Tcp, "127.0.0.1:0", Some(acceptor))
            .await
            .unwrap();
        assert!(listener.is_tls());
        let port = listener.local_addr().unwrap().rsplit_once(':').unwrap().1.to_string();

        let client_tls = ClientTls::new(&ClientTlsOptions {
            ca_file: Some(files.cert.clone()),
            ..Default::default()
        })
        .unwrap();

        let client_handle = tokio::spawn(async move {
            let mut conn = dial(Network::Tcp, &format!("localhost:{port}"), Some(&client_tls))
                .await
                .unwrap();
            conn.recv().await.unwrap()
        });

        let mut conn = listener.accept().await.unwrap().establish().await.unwrap();
        conn.send("Chatroom").await.unwrap();
        assert_eq!(client_handle.await.unwrap(), "Chatroom");
    }

    #[tokio::test]
    async fn test_untrusted_certificate_is_rejected() {
        let files = self_signed();
        let acceptor = server_tls(&files.cert, &files.key).unwrap();
        let listener = Listener::bind(Network::Tcp, "127.0.0.1:0", Some(acceptor))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let server_handle = tokio::spawn(async move {
            let incoming = listener.accept().await.unwrap();
            incoming.establish().await.is_err()
        });

        let client_tls = ClientTls::new(&ClientTlsOptions::default()).unwrap();
        let result = dial(Network::Tcp, &addr, Some(&client_tls)).await;
        assert!(result.is_err());
        assert!(server_handle.await.unwrap());
    }
}
