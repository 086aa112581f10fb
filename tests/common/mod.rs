#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use rustls::{
    ClientConfig, RootCertStore, SupportedProtocolVersion, crypto::ring,
    pki_types::ServerName,
};
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tlsgate::{
    listener::{DowngradingListener, Listener},
    tls::{Identity, TlsPolicy, issue_certificate},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::{TlsConnector, client::TlsStream};

pub const COMMON_NAME: &str = "node1";

/// A freshly issued identity living in its own temp dir
pub struct TestNode {
    pub dir: TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub identity: Identity,
}

pub fn issue_node(common_name: &str, lifetime_days: u32) -> TestNode {
    let dir = TempDir::new().unwrap();
    let cert_path = dir.path().join("node.crt");
    let key_path = dir.path().join("node.key");
    let identity = issue_certificate(&cert_path, &key_path, common_name, lifetime_days).unwrap();

    TestNode {
        dir,
        cert_path,
        key_path,
        identity,
    }
}

/// Client configuration trusting only `identity`
pub fn client_config(
    identity: &Identity,
    versions: &[&'static SupportedProtocolVersion],
) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(identity.leaf().unwrap().clone()).unwrap();

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_protocol_versions(versions)
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}

pub async fn connect_tls(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    TlsConnector::from(config)
        .connect(ServerName::try_from(COMMON_NAME).unwrap(), tcp)
        .await
}

/// Serve every connection from `listener` with a tiny protocol: the server
/// first writes the detected transport followed by a newline, then echoes.
pub fn spawn_echo<L: Listener>(mut listener: DowngradingListener<L>) {
    tokio::spawn(async move {
        while let Ok((mut connection, _)) = listener.accept().await {
            tokio::spawn(async move {
                let label = format!("{}\n", connection.transport());
                if connection.write_all(label.as_bytes()).await.is_err()
                    || connection.flush().await.is_err()
                {
                    return;
                }

                let mut buf = [0u8; 1024];
                loop {
                    match connection.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if connection.write_all(&buf[..n]).await.is_err()
                                || connection.flush().await.is_err()
                            {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
}

/// Bind an echo server on localhost with the given policy and sniff timeout
pub async fn spawn_echo_tcp(
    node: &TestNode,
    policy: &TlsPolicy,
    sniff_timeout: Duration,
) -> SocketAddr {
    let config = policy.server_config(&node.identity).unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    spawn_echo(DowngradingListener::new(tcp, Arc::new(config)).with_sniff_timeout(sniff_timeout));
    addr
}

/// Read up to and excluding the next newline
pub async fn read_label<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut label = Vec::new();
    loop {
        let byte = stream.read_u8().await.unwrap();
        if byte == b'\n' {
            break;
        }
        label.push(byte);
    }
    String::from_utf8(label).unwrap()
}

/// Send `payload` and read the same number of bytes back
pub async fn round_trip<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
    let mut reply = vec![0u8; payload.len()];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}
