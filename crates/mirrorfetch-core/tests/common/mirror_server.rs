//! Minimal HTTP/1.1 server for integration tests: file mirrors plus an unrestrict endpoint.
//!
//! Each route serves a static body, optionally honouring `Range: bytes=N-`, failing the
//! first requests with 500, cutting the first successful body short, or stalling after
//! a prefix. `POST /unrestrict` answers `{"download": ...}` for registered links.
//! Every request is recorded so tests can assert on what the client sent.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Path of the unrestrict endpoint.
pub const UNRESTRICT_PATH: &str = "/unrestrict";

#[derive(Debug, Clone)]
pub struct Route {
    pub body: Vec<u8>,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Number of initial GETs answered with 500.
    pub fail_first: usize,
    /// First successful GET sends only this many body bytes, then closes.
    pub drop_after: Option<usize>,
    /// Every GET sends this many body bytes, then holds the connection open.
    pub stall_after: Option<usize>,
}

impl Route {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            support_ranges: true,
            fail_first: 0,
            drop_after: None,
            stall_after: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct State {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
    dropped: HashMap<String, bool>,
    links: HashMap<String, String>,
    requests: Vec<RecordedRequest>,
}

#[derive(Clone)]
pub struct MirrorServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl MirrorServer {
    /// Starts the server on an ephemeral port. It runs until the process exits.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&accept_state);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn unrestrict_url(&self) -> String {
        self.url(UNRESTRICT_PATH)
    }

    pub fn route(&self, path: &str, route: Route) {
        self.state.lock().unwrap().routes.insert(path.to_string(), route);
    }

    /// Makes the unrestrict endpoint answer `direct` for `link`.
    pub fn unrestrict(&self, link: &str, direct: &str) {
        self.state
            .lock()
            .unwrap()
            .links
            .insert(link.to_string(), direct.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// GET requests for `path`, in arrival order.
    pub fn gets(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET" && r.path == path)
            .collect()
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    state.lock().unwrap().requests.push(request.clone());

    if request.method == "POST" && request.path == UNRESTRICT_PATH {
        let link = url::form_urlencoded::parse(request.body.as_bytes())
            .find(|(k, _)| k == "link")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let direct = state.lock().unwrap().links.get(&link).cloned();
        match direct {
            Some(direct) => {
                let body = format!("{{\"id\":\"T1\",\"download\":\"{}\"}}", direct);
                respond(&mut stream, "200 OK", body.as_bytes());
            }
            None => respond(
                &mut stream,
                "503 Service Unavailable",
                br#"{"error":"hoster_unavailable","error_code":19}"#,
            ),
        }
        return;
    }
    if request.method != "GET" {
        respond(&mut stream, "405 Method Not Allowed", b"");
        return;
    }

    let (route, hit, first_success) = {
        let mut st = state.lock().unwrap();
        let Some(route) = st.routes.get(&request.path).cloned() else {
            drop(st);
            respond(&mut stream, "404 Not Found", b"not found");
            return;
        };
        let hit = {
            let h = st.hits.entry(request.path.clone()).or_insert(0);
            *h += 1;
            *h
        };
        let first_success = hit > route.fail_first
            && !st.dropped.get(&request.path).copied().unwrap_or(false);
        if first_success && route.drop_after.is_some() {
            st.dropped.insert(request.path.clone(), true);
        }
        (route, hit, first_success)
    };

    if hit <= route.fail_first {
        respond(&mut stream, "500 Internal Server Error", b"try again");
        return;
    }

    let total = route.body.len() as u64;
    let start = request.range.as_deref().and_then(parse_range_start);
    let (status, content_range, slice) = match start {
        Some(start) if route.support_ranges => {
            if start >= total {
                (
                    "416 Range Not Satisfiable",
                    format!("bytes */{}", total),
                    &route.body[0..0],
                )
            } else {
                (
                    "206 Partial Content",
                    format!("bytes {}-{}/{}", start, total - 1, total),
                    &route.body[start as usize..],
                )
            }
        }
        _ => (
            "200 OK",
            format!("bytes 0-{}/{}", total.saturating_sub(1), total),
            &route.body[..],
        ),
    };

    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\nConnection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(head.as_bytes());

    if let (true, Some(n)) = (first_success, route.drop_after) {
        let _ = stream.write_all(&slice[..n.min(slice.len())]);
        let _ = stream.flush();
        let _ = stream.shutdown(Shutdown::Both);
        return;
    }
    if let Some(n) = route.stall_after {
        let _ = stream.write_all(&slice[..n.min(slice.len())]);
        let _ = stream.flush();
        thread::sleep(Duration::from_secs(10));
        return;
    }
    let _ = stream.write_all(slice);
}

fn respond(stream: &mut TcpStream, status: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
    };

    let head = std::str::from_utf8(&data[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let mut range = None;
    let mut authorization = None;
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim().to_string();
            if name.eq_ignore_ascii_case("range") {
                range = Some(value);
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value);
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
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

    Some(RecordedRequest {
        method,
        path,
        range,
        authorization,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `bytes=N-` → N.
fn parse_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}
