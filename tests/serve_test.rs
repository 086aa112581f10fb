#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::{Router, routing::get};
use common::*;
use rustls::version;
use std::{net::SocketAddr, sync::Arc};
use tlsgate::{listener::DowngradingListener, tls::TlsPolicy};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

async fn spawn_app(node: &TestNode) -> SocketAddr {
    let config = TlsPolicy::compatible_tls12()
        .server_config(&node.identity)
        .unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = DowngradingListener::new(tcp, Arc::new(config));

    let app = Router::new().route("/", get(|| async { "hello from tlsgate" }));
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    addr
}

async fn get_root<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> String {
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: node1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    stream.flush().await.unwrap();

    let mut response = Vec::new();
    // a TLS peer may close without close_notify
    let _ = stream.read_to_end(&mut response).await;
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_http_over_plaintext() {
    let node = issue_node(COMMON_NAME, 30);
    let addr = spawn_app(&node).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let response = get_root(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("hello from tlsgate"));
}

#[tokio::test]
async fn test_https_on_same_port() {
    let node = issue_node(COMMON_NAME, 30);
    let addr = spawn_app(&node).await;

    let config = client_config(&node.identity, &[&version::TLS13]);
    let mut stream = connect_tls(addr, config).await.unwrap();
    let response = get_root(&mut stream).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.ends_with("hello from tlsgate"));
}

#[tokio::test]
async fn test_failed_handshake_does_not_stop_server() {
    let node = issue_node(COMMON_NAME, 30);
    let addr = spawn_app(&node).await;

    let stranger = issue_node(COMMON_NAME, 30);
    let config = client_config(&stranger.identity, &[&version::TLS13]);
    assert!(connect_tls(addr, config).await.is_err());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    assert!(get_root(&mut stream).await.starts_with("HTTP/1.1 200 OK"));
}
