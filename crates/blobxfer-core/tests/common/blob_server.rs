//! Minimal HTTP/1.1 block blob server for end-to-end tests.
//!
//! Serves one blob at any path: Put Blob, Put Block, Put Block List, ranged
//! Get Blob and Get Blob Properties. Can answer the next N requests with 503
//! to exercise the retry policy. One request per connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct BlobState {
    committed: Option<Vec<u8>>,
    staged: HashMap<String, Vec<u8>>,
    /// `METHOD query` of every request, in arrival order.
    log: Vec<String>,
}

#[derive(Clone, Default)]
pub struct BlobServer {
    state: Arc<Mutex<BlobState>>,
    fail_next: Arc<AtomicUsize>,
    base: String,
}

impl BlobServer {
    /// Starts the server on an ephemeral port. Runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let server = BlobServer {
            base: format!("http://127.0.0.1:{port}"),
            ..BlobServer::default()
        };
        let handle = server.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let handle = handle.clone();
                thread::spawn(move || handle.serve(stream));
            }
        });
        server
    }

    /// URL of the blob `name` in container `c`.
    pub fn blob_url(&self, name: &str) -> String {
        format!("{}/c/{name}?sv=2018-03-28&sig=test", self.base)
    }

    /// Answer the next `n` requests with 503.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn committed(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    fn serve(&self, mut stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
        let Some(req) = read_request(&mut stream) else {
            return;
        };
        self.state
            .lock()
            .unwrap()
            .log
            .push(format!("{} {}", req.method, req.query));

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            respond(&mut stream, "503 Server Busy", &[("x-ms-error-code", "ServerBusy")], b"");
            return;
        }

        let params: HashMap<String, String> = url::form_urlencoded::parse(req.query.as_bytes())
            .into_owned()
            .collect();
        let comp = params.get("comp").map(String::as_str);
        match (req.method.as_str(), comp) {
            ("PUT", None) => {
                let mut state = self.state.lock().unwrap();
                state.committed = Some(req.body);
                respond(&mut stream, "201 Created", &[("ETag", "\"0x1\"")], b"");
            }
            ("PUT", Some("block")) => {
                let id = params.get("blockid").cloned().unwrap_or_default();
                self.state.lock().unwrap().staged.insert(id, req.body);
                respond(&mut stream, "201 Created", &[], b"");
            }
            ("PUT", Some("blocklist")) => {
                let xml = String::from_utf8_lossy(&req.body).into_owned();
                let mut state = self.state.lock().unwrap();
                let mut content = Vec::new();
                for id in latest_ids(&xml) {
                    match state.staged.get(&id) {
                        Some(block) => content.extend_from_slice(block),
                        None => {
                            respond(
                                &mut stream,
                                "400 Bad Request",
                                &[("x-ms-error-code", "InvalidBlockList")],
                                b"",
                            );
                            return;
                        }
                    }
                }
                state.committed = Some(content);
                state.staged.clear();
                respond(&mut stream, "201 Created", &[("ETag", "\"0x2\"")], b"");
            }
            ("GET", None) | ("HEAD", None) => {
                let Some(blob) = self.committed() else {
                    respond(&mut stream, "404 Not Found", &[("x-ms-error-code", "BlobNotFound")], b"");
                    return;
                };
                let total = blob.len();
                if req.method == "HEAD" {
                    let len = total.to_string();
                    respond_head(&mut stream, &len);
                    return;
                }
                match req.range {
                    Some((start, end_incl)) if start < total => {
                        let end = (end_incl + 1).min(total);
                        let range = format!("bytes {start}-{}/{total}", end - 1);
                        respond(
                            &mut stream,
                            "206 Partial Content",
                            &[("Content-Range", range.as_str())],
                            &blob[start..end],
                        );
                    }
                    Some(_) => respond(&mut stream, "416 Range Not Satisfiable", &[], b""),
                    None => respond(&mut stream, "200 OK", &[], &blob),
                }
            }
            _ => respond(&mut stream, "405 Method Not Allowed", &[], b""),
        }
    }
}

struct Request {
    method: String,
    query: String,
    range: Option<(usize, usize)>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let target = first.next()?.to_string();
    let query = target.split_once('?').map(|(_, q)| q.to_string()).unwrap_or_default();

    let mut content_length = 0usize;
    let mut range = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("x-ms-range") {
            range = parse_range(value);
        }
    }

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Some(Request {
        method,
        query,
        range,
        body,
    })
}

/// `bytes=X-Y` (inclusive) or `bytes=X-`.
fn parse_range(value: &str) -> Option<(usize, usize)> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, end) = bounds.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = if end.trim().is_empty() {
        usize::MAX - 1
    } else {
        end.trim().parse().ok()?
    };
    Some((start, end))
}

fn latest_ids(xml: &str) -> Vec<String> {
    xml.split("<Latest>")
        .skip(1)
        .filter_map(|part| part.split_once("</Latest>").map(|(id, _)| id.to_string()))
        .collect()
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)], body: &[u8]) {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\nx-ms-request-id: test\r\n",
        body.len()
    );
    for (k, v) in headers {
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn respond_head(stream: &mut TcpStream, content_length: &str) {
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {content_length}\r\nConnection: close\r\nETag: \"0x2\"\r\n\r\n"
    );
    let _ = stream.write_all(head.as_bytes());
}
