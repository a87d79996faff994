//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use hyper::body::Bytes;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tunnel_proxy_core::{
    ResolveError, Resolver,
    resolver::{FetchFuture, TunnelSource},
};

/// One canned answer of a [`ScriptedSource`].
#[derive(Clone)]
pub enum Reply {
    Json(String),
    Fail(ResolveError),
    /// Answers with the json body after the delay
    Slow(Duration, String),
    /// Never completes
    Hang,
}

impl Reply {
    pub fn tunnel(url: impl std::fmt::Display) -> Self {
        Self::Json(format!(r#"{{"tunnel_url": "{url}"}}"#))
    }

    pub fn slow_tunnel(delay: Duration, url: impl std::fmt::Display) -> Self {
        Self::Slow(delay, format!(r#"{{"tunnel_url": "{url}"}}"#))
    }
}

/// Tunnel source replaying a script; the last reply repeats forever.
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicU32,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        assert!(!replies.is_empty());
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TunnelSource for ScriptedSource {
    fn fetch(&self) -> FetchFuture<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        };
        Box::pin(async move {
            match reply {
                Reply::Json(body) => Ok(Bytes::from(body)),
                Reply::Fail(e) => Err(e),
                Reply::Slow(delay, body) => {
                    tokio::time::sleep(delay).await;
                    Ok(Bytes::from(body))
                }
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

pub fn resolver(source: Arc<ScriptedSource>, max_attempts: u32) -> Arc<Resolver> {
    Arc::new(Resolver::new(
        source,
        "tunnel_url",
        max_attempts,
        Duration::from_millis(10),
    ))
}

/// Address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Backend echoing the raw request head as its body. The response also
/// carries headers the proxy must strip.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 201 Created\r\n\
                     Content-Length: {}\r\n\
                     Content-Type: text/plain\r\n\
                     User-Agent: upstream-agent\r\n\
                     SEC-CH-UA: leaked\r\n\
                     X-Upstream: yes\r\n\
                     Connection: close\r\n\r\n",
                    head.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&head).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Backend accepting connections without ever answering.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Backend announcing a 100 byte body, sending 3 bytes of it and then
/// keeping the connection open without another byte.
pub async fn start_stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    addr
}

/// Resolution source answering every request with `status` and `body`.
pub async fn start_json_source(status: u16, body: impl Into<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let body: Arc<str> = body.into().into();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
