//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of bodies by path. GET with `Range: bytes=a-b` gets 206
//! unless ranges are disabled; every request is logged so tests can check
//! which ranges were asked for. An optional stall pauses full-body responses
//! part way through so a test can act while a transfer is in flight.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Send this many body bytes of a full response, then sleep `stall_for`.
    pub stall_after: Option<usize>,
    pub stall_for: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            stall_after: None,
            stall_for: Duration::from_millis(500),
        }
    }
}

/// One request as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub path: String,
    /// Raw `Range` header value, e.g. `bytes=300-999`.
    pub range: Option<String>,
}

pub struct RangeServer {
    base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl RangeServer {
    pub fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        Self::start_with_options(files, ServerOptions::default())
    }

    /// Runs in a background thread until the process exits.
    pub fn start_with_options(files: Vec<(&str, Vec<u8>)>, opts: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let files: Arc<HashMap<String, Vec<u8>>> = Arc::new(
            files
                .into_iter()
                .map(|(path, body)| (format!("/{}", path.trim_start_matches('/')), body))
                .collect(),
        );
        let log = Arc::new(Mutex::new(Vec::new()));
        let server_log = Arc::clone(&log);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let files = Arc::clone(&files);
                let log = Arc::clone(&server_log);
                thread::spawn(move || handle(stream, &files, &log, opts));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            log,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<Request> {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

fn handle(
    mut stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    log: &Mutex<Vec<Request>>,
    opts: ServerOptions,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(text) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let (method, path, range_raw) = parse_request(text);
    log.lock().unwrap().push(Request {
        path: path.to_string(),
        range: range_raw.map(str::to_string),
    });

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let Some(body) = files.get(path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    };

    let total = body.len() as u64;
    let range = range_raw.and_then(parse_range).filter(|_| opts.support_ranges);
    if let Some((start, end_incl)) = range {
        let end_incl = end_incl.min(total.saturating_sub(1));
        if start > end_incl {
            let response = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                total
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        let slice = &body[start as usize..=end_incl as usize];
        let response = format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nAccept-Ranges: bytes\r\n\r\n",
            slice.len(),
            start,
            end_incl,
            total
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }

    let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total);
    let _ = stream.write_all(response.as_bytes());
    match opts.stall_after {
        Some(split) if split < body.len() => {
            let _ = stream.write_all(&body[..split]);
            let _ = stream.flush();
            thread::sleep(opts.stall_for);
            let _ = stream.write_all(&body[split..]);
        }
        _ => {
            let _ = stream.write_all(body);
        }
    }
}

/// (method, path, raw Range value).
fn parse_request(request: &str) -> (&str, &str, Option<&str>) {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("/");
    let path = path.split('?').next().unwrap_or(path);
    let mut range = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = Some(value.trim());
            }
        }
    }
    (method, path, range)
}

/// `bytes=a-b` or `bytes=a-` as (start, end_inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    let (a, b) = spec.split_once('-')?;
    let start = a.trim().parse().ok()?;
    let end = match b.trim() {
        "" => u64::MAX,
        b => b.parse().ok()?,
    };
    Some((start, end))
}
