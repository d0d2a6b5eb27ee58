//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves canned replies by path. A reply can stream its body in separate
//! chunks, omit `Content-Length`, pause between chunks, or drop the
//! connection part way through the body. Every response uses
//! `Connection: close`.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    /// `None` omits the header; the body then ends when the connection closes.
    pub content_length: Option<u64>,
    pub chunks: Vec<Vec<u8>>,
    pub delay: Duration,
    /// Close the connection after this many body bytes.
    pub drop_after: Option<usize>,
}

impl Reply {
    /// 200 with the whole body in one write and a correct `Content-Length`.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            chunks: vec![body],
            delay: Duration::ZERO,
            drop_after: None,
        }
    }

    /// Bare status with an empty body.
    pub fn status(code: u16) -> Self {
        Self {
            status: code,
            content_length: Some(0),
            chunks: Vec::new(),
            delay: Duration::ZERO,
            drop_after: None,
        }
    }

    /// Splits the body into `n` roughly equal writes.
    pub fn in_chunks(mut self, n: usize) -> Self {
        let body: Vec<u8> = self.chunks.concat();
        let size = body.len().div_ceil(n.max(1)).max(1);
        self.chunks = body.chunks(size).map(<[u8]>::to_vec).collect();
        self
    }

    pub fn without_length(mut self) -> Self {
        self.content_length = None;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn drop_after(mut self, bytes: usize) -> Self {
        self.drop_after = Some(bytes);
        self
    }
}

/// Starts a server in a background thread. Returns the base URL without a
/// trailing slash (e.g. "http://127.0.0.1:12345"). Unknown paths get 404.
pub fn start(routes: Vec<(&str, Reply)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Reply>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, reply)| (path.to_string(), reply))
            .collect(),
    );
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes));
        }
    });
    format!("http://127.0.0.1:{}", port)
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Reply>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let reply = routes
        .get(path)
        .cloned()
        .unwrap_or_else(|| Reply::status(404));

    let mut head = format!("HTTP/1.1 {} {}\r\n", reply.status, reason(reply.status));
    if let Some(len) = reply.content_length {
        head.push_str(&format!("Content-Length: {}\r\n", len));
    }
    head.push_str("Content-Type: application/octet-stream\r\nConnection: close\r\n\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let mut sent = 0usize;
    for chunk in &reply.chunks {
        let mut slice = &chunk[..];
        if let Some(limit) = reply.drop_after {
            let room = limit.saturating_sub(sent);
            if slice.len() > room {
                slice = &slice[..room];
            }
        }
        if stream.write_all(slice).and_then(|_| stream.flush()).is_err() {
            return;
        }
        sent += slice.len();
        if reply.drop_after.is_some_and(|limit| sent >= limit) {
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        if !reply.delay.is_zero() {
            thread::sleep(reply.delay);
        }
    }
    let _ = stream.shutdown(Shutdown::Write);
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
