//! Minimal in-process HTTP/1.1 server for integration tests (no mocks).
//! Each connection reads one request, records it, and writes a scripted reply
//! chunk by chunk before closing.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub body: serde_json::Value,
}

/// Scripted response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: &'static str,
    pub content_type: &'static str,
    pub chunks: Vec<Vec<u8>>,
    pub delay: Duration,
    pub hold_open: bool,
    pub silent: bool,
}

impl Reply {
    pub fn json(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.as_bytes().to_vec()],
            delay: Duration::ZERO,
            hold_open: false,
            silent: false,
        }
    }

    pub fn text(status: &'static str, body: &str) -> Self {
        Self {
            content_type: "text/html",
            ..Self::json(status, body)
        }
    }

    /// One `data: <line>\n\n` frame per entry, each written separately.
    pub fn sse(lines: &[&str]) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/event-stream",
            chunks: lines
                .iter()
                .map(|l| format!("data: {}\n\n", l).into_bytes())
                .collect(),
            delay: Duration::ZERO,
            hold_open: false,
            silent: false,
        }
    }

    /// Re-cut the body into writes of `n` bytes, ignoring frame boundaries.
    pub fn split_every(mut self, n: usize) -> Self {
        let all: Vec<u8> = self.chunks.concat();
        self.chunks = all.chunks(n).map(|c| c.to_vec()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the connection open after the last chunk.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Read the request, then never write a byte (not even the status line).
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::json("200 OK", "")
        }
    }
}

type Handler = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;

pub struct TestServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Request>>>,
    accept_loop: JoinHandle<()>,
}

impl TestServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = requests.clone();
        let accept_loop = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(tcp, handler, recorded).await;
                });
            }
        });

        Self {
            url,
            requests,
            accept_loop,
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

/// Run a server on its own thread and runtime (for tests driving the binary).
pub fn spawn_server_thread<F>(handler: F) -> String
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let server = TestServer::start(handler).await;
            tx.send(server.url.clone()).unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}

/// Pick a free port by binding to :0 and releasing it.
pub fn unused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://{}", listener.local_addr().unwrap())
}

async fn serve(
    mut tcp: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<Request>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let header_end = loop {
        let n = tcp.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = tcp.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    let end = (header_end + content_length).min(buf.len());
    let body = serde_json::from_slice(&buf[header_end..end]).unwrap_or(serde_json::Value::Null);

    let request = Request { path, body };
    let reply = handler(&request);
    recorded.lock().unwrap().push(request);

    if reply.silent {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return Ok(());
    }
    let head = format!(
        "HTTP/1.1 {}\r\ncontent-type: {}\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n",
        reply.status, reply.content_type
    );
    tcp.write_all(head.as_bytes()).await?;
    for chunk in &reply.chunks {
        tcp.write_all(chunk).await?;
        tcp.flush().await?;
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
    }
    if reply.hold_open {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    tcp.shutdown().await
}
