#![allow(dead_code)]

use std::io::{Read, Write};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// How the test endpoint answers once it has read a request.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16),
    /// Never answer.
    Hang,
}

pub struct TestServer {
    pub url: String,
    /// Raw bytes of every request received, headers and body.
    pub requests: mpsc::UnboundedReceiver<Vec<u8>>,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(headers: &str) -> Option<usize> {
    headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse().ok())
}

fn response(status: u16) -> String {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        500 => "Internal Server Error",
        _ => "Status",
    };
    format!("HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
}

async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let chunked = headers.contains("transfer-encoding: chunked");
    let expected = content_length(&headers).map(|len| header_end + len);
    loop {
        let complete = match expected {
            Some(len) => buf.len() >= len,
            None if chunked => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            return buf;
        }
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Minimal HTTP endpoint on the tokio runtime.
pub async fn spawn_server(reply: Reply) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let _ = tx.send(request);
                match reply {
                    Reply::Status(status) => {
                        let _ = socket.write_all(response(status).as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    Reply::Hang => tokio::time::sleep(Duration::from_secs(60)).await,
                }
            });
        }
    });
    TestServer {
        url: format!("http://{addr}/upload"),
        requests: rx,
    }
}

fn read_request_blocking(socket: &mut std::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let chunked = headers.contains("transfer-encoding: chunked");
    let expected = content_length(&headers).map(|len| header_end + len);
    loop {
        let complete = match expected {
            Some(len) => buf.len() >= len,
            None if chunked => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if complete {
            return buf;
        }
        let n = socket.read(&mut chunk).unwrap_or(0);
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Same endpoint on a plain thread, for tests that run the binary.
pub fn spawn_blocking_server(status: u16) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut socket) = stream else { break };
            std::thread::spawn(move || {
                let _ = read_request_blocking(&mut socket);
                let _ = socket.write_all(response(status).as_bytes());
                let _ = socket.flush();
            });
        }
    });
    format!("http://{addr}/upload")
}
