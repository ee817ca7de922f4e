//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by a mock node.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

#[allow(dead_code)]
impl MockRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<MockRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (head_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[head_end..body_end]).to_string();

    Some(MockRequest { method, path, body })
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a programmable mock node on an ephemeral port.
///
/// The handler sees every request and returns `(status, body)`.
#[allow(dead_code)]
pub async fn start_programmable_node<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(request).await;
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock node that always answers with the same status and body.
#[allow(dead_code)]
pub async fn start_mock_node(status: u16, body: &'static str) -> SocketAddr {
    start_programmable_node(move |_| async move { (status, body.to_string()) }).await
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[allow(dead_code)]
pub fn url(addr: SocketAddr) -> String {
    format!("http://{}", addr)
}

#[allow(dead_code)]
pub const CHAIN_ID: &str = "aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906";

/// `get_info` body for [`CHAIN_ID`].
#[allow(dead_code)]
pub fn chain_info_body() -> String {
    serde_json::json!({
        "server_version": "d133c641",
        "chain_id": CHAIN_ID,
        "head_block_num": 300000010u32,
        "last_irreversible_block_num": 300000000u32,
        "last_irreversible_block_id": "11e1a3002d4b7e2f5a6b7c8d9eafb0c1d2e3f405162738495a6b7c8d9eafb0c1",
        "head_block_id": "11e1a30a2d4b7e2f5a6b7c8d9eafb0c1d2e3f405162738495a6b7c8d9eafb0c1",
        "head_block_time": "2024-05-01T12:00:00.500",
        "head_block_producer": "eosproducer1",
        "server_version_string": "v5.0.2"
    })
    .to_string()
}

/// `get_abi` body for `eosio.token` with only `transfer`.
#[allow(dead_code)]
pub fn token_abi_body() -> String {
    serde_json::json!({
        "account_name": "eosio.token",
        "abi": {
            "version": "eosio::abi/1.2",
            "types": [],
            "structs": [{"name": "transfer", "base": "", "fields": [
                {"name": "from", "type": "name"},
                {"name": "to", "type": "name"},
                {"name": "quantity", "type": "asset"},
                {"name": "memo", "type": "string"}
            ]}],
            "actions": [{"name": "transfer", "type": "transfer", "ricardian_contract": ""}],
            "tables": [],
            "ricardian_clauses": [],
            "variants": []
        }
    })
    .to_string()
}
