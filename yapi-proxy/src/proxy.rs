//! Shared proxy-worker state: pre-built static error responses, the
//! per-thread upstream connection pool, response/request buffer builders,
//! and target-URL resolution. Grounded on `ando-proxy/src/proxy.rs`'s
//! `ConnPool`/response-building idiom; the plugin pipeline and pipeline
//! cache it also held are dropped (the action pipeline here is stateless
//! and fixed, see `yapi-actions`).

use monoio::net::TcpStream;
use std::collections::{HashMap, VecDeque};
use yapi_core::context::RequestContext;
use yapi_core::error::GatewayError;
use yapi_core::rule::Rule;

// ── Pre-built static error responses (zero heap alloc) ──

pub const RESP_404: &[u8] = b"HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: 28\r\nconnection: keep-alive\r\n\r\n{\"error\":\"no matching rule\"}";

pub const RESP_401: &[u8] = b"HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: 27\r\nconnection: keep-alive\r\n\r\n{\"error\":\"invalid api key\"}";

pub const RESP_403: &[u8] = b"HTTP/1.1 403 Forbidden\r\ncontent-type: application/json\r\ncontent-length: 30\r\nconnection: keep-alive\r\n\r\n{\"error\":\"ownership mismatch\"}";

pub const RESP_502: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\ncontent-type: application/json\r\ncontent-length: 26\r\nconnection: keep-alive\r\n\r\n{\"error\":\"upstream error\"}";

/// What `ProxyWorker::resolve_target` found, or what the client-facing
/// code does instead of proxying.
#[derive(Debug)]
pub enum RequestResult {
    Proxy {
        upstream_addr: String,
        upstream_path: String,
    },
    Static(&'static [u8]),
    Json { status: u16, body: Vec<u8> },
}

/// Target-URL resolution, spec.md §4.9: UpstreamInfo's first endpoint wins;
/// else the rule's `set_target_url`; else the configured default; else a
/// `502`.
pub fn resolve_target(
    ctx: &RequestContext,
    rule: &Rule,
    default_upstream_url: Option<&str>,
) -> Result<ParsedTarget, GatewayError> {
    if let Some(info) = &ctx.upstream_info {
        if let Some(endpoint) = info.first_endpoint() {
            return parse_target(endpoint);
        }
    }
    if let Some(url) = &rule.actions.set_target_url {
        return parse_target(url);
    }
    if let Some(url) = default_upstream_url {
        return parse_target(url);
    }
    Err(GatewayError::UpstreamUnreachable(
        "rule target not configured".to_string(),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    /// `host:port`, ready to pass to `TcpStream::connect`.
    pub addr: String,
    /// Path component carried by the target URL itself, if any (joined
    /// ahead of the request's own path).
    pub base_path: String,
}

/// Parse a target of the form `scheme://host[:port][/path]` or a bare
/// `host:port`. TLS to the upstream is not implemented — both schemes
/// connect over plain TCP (see DESIGN.md); `https` defaults to port 443,
/// `http` and bare addresses default to port 80.
pub fn parse_target(raw: &str) -> Result<ParsedTarget, GatewayError> {
    let (scheme, rest) = match raw.split_once("://") {
        Some(("https", rest)) => (Some("https"), rest),
        Some(("http", rest)) => (Some("http"), rest),
        Some((other, _)) => {
            return Err(GatewayError::InvalidInput(format!(
                "unsupported target scheme {other:?}"
            )));
        }
        None => (None, raw),
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(GatewayError::InvalidInput(format!("invalid target url {raw:?}")));
    }

    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        let default_port = match scheme {
            Some("https") => 443,
            _ => 80,
        };
        format!("{authority}:{default_port}")
    };

    Ok(ParsedTarget {
        addr,
        base_path: path.to_string(),
    })
}

// ── Connection pool ──

/// Thread-local upstream connection pool, one VecDeque per upstream
/// address, bounded by `max_idle`.
pub struct ConnPool {
    pools: HashMap<String, VecDeque<TcpStream>>,
    max_idle: usize,
}

impl ConnPool {
    pub fn new(max_idle_per_host: usize) -> Self {
        Self {
            pools: HashMap::with_capacity(16),
            max_idle: max_idle_per_host,
        }
    }

    #[inline]
    pub fn take(&mut self, addr: &str) -> Option<TcpStream> {
        self.pools.get_mut(addr).and_then(|q| q.pop_front())
    }

    #[inline]
    pub fn put(&mut self, addr: String, stream: TcpStream) {
        let queue = self
            .pools
            .entry(addr)
            .or_insert_with(|| VecDeque::with_capacity(self.max_idle));
        if queue.len() < self.max_idle {
            queue.push_back(stream);
        }
    }
}

// ── Wire-format helpers ──

pub fn build_upstream_request(
    buf: &mut Vec<u8>,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: Option<&[u8]>,
) {
    buf.clear();
    buf.extend_from_slice(method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("connection")
            || name.eq_ignore_ascii_case("keep-alive")
            || name.eq_ignore_ascii_case("transfer-encoding")
            || name.eq_ignore_ascii_case("upgrade")
        {
            continue;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"connection: keep-alive\r\n");
    buf.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        if !body.is_empty() {
            buf.extend_from_slice(body);
        }
    }
}

pub fn build_json_response(buf: &mut Vec<u8>, status: u16, body: &[u8]) {
    buf.clear();
    buf.extend_from_slice(b"HTTP/1.1 ");
    let mut itoa_buf = itoa::Buffer::new();
    buf.extend_from_slice(itoa_buf.format(status).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status_text(status).as_bytes());
    buf.extend_from_slice(b"\r\ncontent-type: application/json\r\ncontent-length: ");
    buf.extend_from_slice(itoa_buf.format(body.len()).as_bytes());
    buf.extend_from_slice(b"\r\nconnection: keep-alive\r\n\r\n");
    buf.extend_from_slice(body);
}

pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        499 => "Client Closed Request",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
