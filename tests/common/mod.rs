//! In-process HTTP stub standing in for the Ollama and market-data servers.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

/// A canned response.
#[derive(Clone)]
pub enum Reply {
    Json { status: u16, body: String },
    /// NDJSON lines, then optionally wait on `gate` before sending `rest`.
    /// A gate that is never notified holds the stream open.
    Stream {
        lines: Vec<String>,
        gate: Option<Arc<Notify>>,
        rest: Vec<String>,
    },
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply::Json {
            status,
            body: body.to_string(),
        }
    }

    pub fn stream(lines: Vec<String>) -> Self {
        Reply::Stream {
            lines,
            gate: None,
            rest: Vec::new(),
        }
    }

    pub fn gated(lines: Vec<String>, gate: Arc<Notify>, rest: Vec<String>) -> Self {
        Reply::Stream {
            lines,
            gate: Some(gate),
            rest,
        }
    }
}

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    pub query: String,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

type Routes = Arc<Mutex<HashMap<String, VecDeque<Reply>>>>;

pub struct MockServer {
    pub base_url: String,
    routes: Routes,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local test server");
        let addr = listener.local_addr().expect("local addr");

        let routes: Routes = Arc::default();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();

        let (r, q) = (Arc::clone(&routes), Arc::clone(&requests));
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&r), Arc::clone(&q)));
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            routes,
            requests,
        }
    }

    /// Queue a reply for `path`. Replies are used once, in order.
    pub fn enqueue(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

async fn serve(mut socket: TcpStream, routes: Routes, requests: Arc<Mutex<Vec<Recorded>>>) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let reply = routes
        .lock()
        .unwrap()
        .get_mut(&request.path)
        .and_then(|queue| queue.pop_front());
    requests.lock().unwrap().push(request);

    match reply {
        None => write_json(&mut socket, 404, r#"{"error":"not found"}"#).await,
        Some(Reply::Json { status, body }) => write_json(&mut socket, status, &body).await,
        Some(Reply::Stream { lines, gate, rest }) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            if !write_lines(&mut socket, &lines).await {
                return;
            }
            if let Some(gate) = gate {
                gate.notified().await;
                if !write_lines(&mut socket, &rest).await {
                    return;
                }
            }
            let _ = socket.shutdown().await;
        }
    }
}

async fn write_lines(socket: &mut TcpStream, lines: &[String]) -> bool {
    for line in lines {
        if socket.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            return false;
        }
        let _ = socket.flush().await;
    }
    true
}

async fn write_json(socket: &mut TcpStream, status: u16, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut head_lines = head.lines();
    let mut request_line = head_lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let content_length = head_lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target, String::new()),
    };
    Some(Recorded {
        method,
        path,
        query,
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    })
}

// ─── NDJSON lines ───────────────────────────────────────────────────────────

pub fn token(text: &str) -> String {
    json!({"message": {"role": "assistant", "content": text}, "done": false}).to_string()
}

pub fn done() -> String {
    json!({"message": {"role": "assistant", "content": ""}, "done": true, "done_reason": "stop"})
        .to_string()
}

pub fn tool_call(name: &str, arguments: Value) -> String {
    json!({
        "message": {
            "role": "assistant",
            "content": "",
            "tool_calls": [{"function": {"name": name, "arguments": arguments}}]
        },
        "done": false
    })
    .to_string()
}

/// `/coins/markets` body with `n` assets.
pub fn market_body(n: usize) -> Value {
    let names = [
        ("Bitcoin", "btc"),
        ("Ethereum", "eth"),
        ("Tether", "usdt"),
        ("BNB", "bnb"),
        ("Solana", "sol"),
        ("USDC", "usdc"),
        ("XRP", "xrp"),
        ("Dogecoin", "doge"),
        ("Toncoin", "ton"),
        ("Cardano", "ada"),
    ];
    let coins: Vec<Value> = names
        .iter()
        .cycle()
        .take(n)
        .enumerate()
        .map(|(i, (name, symbol))| {
            json!({
                "name": name,
                "symbol": symbol,
                "current_price": 1000.0 / (i as f64 + 1.0),
                "market_cap": 1.0e12 / (i as f64 + 1.0),
                "price_change_percentage_24h": 1.5 - i as f64,
                "total_volume": 3.0e10,
            })
        })
        .collect();
    Value::Array(coins)
}
