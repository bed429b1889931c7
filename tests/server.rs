//! Smoke test over a real socket: raw HTTP/1.1 in, full response out.

use std::sync::Arc;

use rota::store::{FieldKind, MemoryStore, Schema, Store};
use rota::{App, Router, Server, resource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn roundtrip(addr: std::net::SocketAddr, raw: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    // The server may close early (e.g. on an oversized body); keep what arrived.
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test]
async fn serves_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener);
    let addr = server.local_addr().unwrap();

    let items = Arc::new(MemoryStore::new("items", Schema::new().required("name", FieldKind::String)));
    let app = App::new(resource::mount(Router::new(), "/items", items));

    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(server.serve_with_shutdown(app, async move {
        let _ = stopped.await;
    }));

    let body = r#"{"name":"x"}"#;
    let created = roundtrip(addr, format!(
        "POST /items HTTP/1.1\r\nhost: test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len(),
    )).await;
    assert!(created.starts_with("HTTP/1.1 302"), "{created}");
    assert!(created.to_ascii_lowercase().contains("location: /items/"), "{created}");

    let missing = roundtrip(addr, "GET /items/does-not-exist HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n".into()).await;
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener).body_limit(16);
    let addr = server.local_addr().unwrap();

    let items = Arc::new(MemoryStore::new("items", Schema::new().required("name", FieldKind::String)));
    let app = App::new(resource::mount(Router::new(), "/items", items.clone()));

    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(server.serve_with_shutdown(app, async move {
        let _ = stopped.await;
    }));

    let body = format!(r#"{{"name":"{}"}}"#, "x".repeat(53));
    assert_eq!(body.len(), 64);
    let refused = roundtrip(addr, format!(
        "POST /items HTTP/1.1\r\nhost: test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len(),
    )).await;
    assert!(refused.starts_with("HTTP/1.1 413"), "{refused}");
    assert_eq!(items.count().await.unwrap(), 0);

    let small = r#"{"name":"x"}"#;
    let created = roundtrip(addr, format!(
        "POST /items HTTP/1.1\r\nhost: test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{small}",
        small.len(),
    )).await;
    assert!(created.starts_with("HTTP/1.1 302"), "{created}");

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
}
