use super::*;
use crate::config::ServerConfig;
use crate::state::test_helpers::spawn_app;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read response");
    response
}

#[tokio::test]
async fn healthz_returns_ok() {
    let addr = spawn_app(AppState::new(ServerConfig::default())).await;
    let response = http_get(addr, "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}

#[tokio::test]
async fn gallery_is_absent_without_directory() {
    let addr = spawn_app(AppState::new(ServerConfig::default())).await;
    let response = http_get(addr, "/gallery/castle.json").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
}

#[tokio::test]
async fn gallery_serves_snapshot_files() {
    let dir = std::env::temp_dir().join(format!("voxel-gallery-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create gallery dir");
    let snapshot = r##"[{"position":{"x":25,"y":25,"z":25},"size":{"x":50,"y":50,"z":50},"color":"#ff0000"}]"##;
    std::fs::write(dir.join("castle.json"), snapshot).expect("write snapshot");

    let config = ServerConfig { gallery_dir: Some(dir.clone()), ..ServerConfig::default() };
    let addr = spawn_app(AppState::new(config)).await;
    let response = http_get(addr, "/gallery/castle.json").await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with(snapshot));
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn plain_get_on_ws_route_is_rejected() {
    let addr = spawn_app(AppState::new(ServerConfig::default())).await;
    let response = http_get(addr, "/ws").await;
    assert!(!response.starts_with("HTTP/1.1 101"), "{response}");
    assert!(!response.starts_with("HTTP/1.1 200"), "{response}");
}
