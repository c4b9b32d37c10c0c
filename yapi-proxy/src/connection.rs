//! Per-connection request loop: parse → authenticate → match → authorize
//! → mutate → stream to/from upstream (spec.md §4.5–§4.10).
//!
//! Grounded on `ando-proxy/src/connection.rs`'s buffer-reuse, zero-copy
//! header parsing, and connection-pool idiom; the router/plugin dispatch
//! it used is replaced by the auth middleware → rule matcher → upstream
//! authoriser → action-pipeline chain this gateway actually runs, and the
//! response-forwarding loop gained a no-content-length branch (stream
//! until upstream EOF, flushing every read) for SSE/chunked upstreams.

use crate::matcher::{self, Selection};
use crate::proxy::{build_upstream_request, resolve_target, ConnPool, RESP_401, RESP_403, RESP_404, RESP_502};
use crate::worker::SharedState;
use monoio::io::{AsyncReadRent, AsyncWriteRentExt};
use monoio::net::TcpStream;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use yapi_actions::request::OutboundRequest;
use yapi_auth::middleware::{authenticate, AuthOutcome};

/// Resolve an `addr` string (e.g. `"api.openai.com:443"`) to a list of
/// `SocketAddr`s, IPv4 candidates first.
fn resolve_addrs(addr: &str) -> Vec<SocketAddr> {
    if let Ok(sa) = addr.parse::<SocketAddr>() {
        return vec![sa];
    }
    use std::net::ToSocketAddrs;
    let all: Vec<SocketAddr> = match addr.to_socket_addrs() {
        Ok(iter) => iter.collect(),
        Err(_) => return vec![],
    };
    let mut v4: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv4()).collect();
    let v6: Vec<SocketAddr> = all.iter().copied().filter(|a| a.is_ipv6()).collect();
    v4.extend(v6);
    v4
}

async fn new_upstream_conn(addr: &str) -> Option<TcpStream> {
    let candidates = resolve_addrs(addr);
    if candidates.is_empty() {
        tracing::warn!(addr = %addr, "upstream address resolve failed");
        return None;
    }
    for sa in &candidates {
        match TcpStream::connect(*sa).await {
            Ok(s) => {
                let _ = s.set_nodelay(true);
                return Some(s);
            }
            Err(e) => {
                tracing::debug!(addr = %addr, resolved = %sa, error = %e, "upstream candidate failed, trying next");
            }
        }
    }
    tracing::warn!(addr = %addr, tried = candidates.len(), "upstream connect failed on all candidates");
    None
}

enum StreamError {
    /// The client went away mid-response — spec.md's cancellation case,
    /// surfaced as a 499 in the access log only (nothing left to write to).
    ClientGone,
    UpstreamGone,
    Io(std::io::Error),
}

fn classify_client_write_err(e: std::io::Error) -> StreamError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            StreamError::ClientGone
        }
        _ => StreamError::Io(e),
    }
}

/// Forward the upstream's response to the client. Every read from upstream
/// is immediately followed by a `write_all` to the client — no buffering
/// across chunks — so SSE/chunked streams arrive without added latency.
/// Returns the reusable buffer alongside `(status, upstream_keepalive)`.
async fn stream_response(
    upstream: &mut TcpStream,
    client: &mut TcpStream,
    mut upstream_buf: Vec<u8>,
    upstream_addr: &str,
) -> (Vec<u8>, Result<(u16, bool), StreamError>) {
    let (res, buf) = upstream.read(upstream_buf).await;
    upstream_buf = buf;
    let resp_n = match res {
        Ok(0) => {
            tracing::warn!(addr = %upstream_addr, "upstream closed connection without response");
            return (upstream_buf, Err(StreamError::UpstreamGone));
        }
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(addr = %upstream_addr, error = %e, "upstream read error");
            return (upstream_buf, Err(StreamError::UpstreamGone));
        }
    };

    let mut resp_headers = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut resp_headers);

    let outcome = if let Ok(httparse::Status::Complete(hdr_len)) = resp.parse(&upstream_buf[..resp_n]) {
        let status = resp.code.unwrap_or(502);
        let mut content_length: Option<usize> = None;
        let mut upstream_keepalive = true;
        for h in resp.headers.iter() {
            if h.name.is_empty() {
                break;
            }
            if h.name.eq_ignore_ascii_case("content-length") {
                content_length = std::str::from_utf8(h.value).ok().and_then(|s| s.parse().ok());
            }
            if h.name.eq_ignore_ascii_case("connection") {
                let v = std::str::from_utf8(h.value).unwrap_or("");
                upstream_keepalive = !v.eq_ignore_ascii_case("close");
            }
        }

        let first_chunk = upstream_buf[..resp_n].to_vec();
        match client.write_all(first_chunk).await.0 {
            Ok(_) => {}
            Err(e) => return (upstream_buf, Err(classify_client_write_err(e))),
        }

        let mut result = Ok((status, upstream_keepalive));
        match content_length {
            Some(cl) => {
                let body_in_first = resp_n.saturating_sub(hdr_len);
                let mut remaining = cl.saturating_sub(body_in_first);
                while remaining > 0 {
                    let chunk_size = remaining.min(65536);
                    let (res, chunk_buf) = upstream.read(vec![0u8; chunk_size]).await;
                    let cn = match res {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(_) => {
                            upstream_keepalive = false;
                            break;
                        }
                    };
                    remaining -= cn;
                    let data = chunk_buf[..cn].to_vec();
                    if let Err(e) = client.write_all(data).await.0 {
                        result = Err(classify_client_write_err(e));
                        break;
                    }
                }
            }
            None => {
                // No content-length: stream raw bytes (chunked encoding or
                // an SSE body) until upstream closes the connection.
                loop {
                    let (res, chunk_buf) = upstream.read(vec![0u8; 65536]).await;
                    let cn = match res {
                        Ok(0) => {
                            upstream_keepalive = false;
                            break;
                        }
                        Ok(n) => n,
                        Err(_) => {
                            upstream_keepalive = false;
                            break;
                        }
                    };
                    let data = chunk_buf[..cn].to_vec();
                    if let Err(e) = client.write_all(data).await.0 {
                        result = Err(classify_client_write_err(e));
                        break;
                    }
                }
            }
        }
        result.map(|(status, _)| (status, upstream_keepalive))
    } else {
        let data = upstream_buf[..resp_n].to_vec();
        match client.write_all(data).await.0 {
            Ok(_) => Ok((502, false)),
            Err(e) => Err(classify_client_write_err(e)),
        }
    };

    (upstream_buf, outcome)
}

/// Handle a single client connection (HTTP/1.1, keepalive).
pub async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<SharedState>,
    conn_pool: Rc<RefCell<ConnPool>>,
) -> anyhow::Result<()> {
    let mut read_buf = vec![0u8; 8192];
    let mut upstream_req_buf = Vec::with_capacity(2048);
    let mut upstream_buf = vec![0u8; 65536];
    let mut request_seq: u64 = 0;

    loop {
        let (res, returned_buf) = client.read(read_buf).await;
        read_buf = returned_buf;
        let n = match res {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(e.into()),
        };

        let mut headers_raw = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers_raw);

        match req.parse(&read_buf[..n]) {
            Ok(httparse::Status::Complete(body_offset)) => {
                request_seq += 1;
                let request_id = format!("{peer_addr}-{request_seq}");
                let started = Instant::now();
                let method = req.method.unwrap_or("GET").to_string();
                let path = req.path.unwrap_or("/").to_string();

                let mut headers: Vec<(&str, &str)> = Vec::with_capacity(16);
                let mut keep_alive = true;
                for h in req.headers.iter() {
                    if h.name.is_empty() {
                        break;
                    }
                    let val = std::str::from_utf8(h.value).unwrap_or("");
                    headers.push((h.name, val));
                    if h.name.eq_ignore_ascii_case("connection") {
                        keep_alive = !val.eq_ignore_ascii_case("close");
                    }
                }
                let body_bytes = read_buf[body_offset..n].to_vec();

                let get_header = |name: &str| -> Option<String> {
                    headers
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(name))
                        .map(|(_, v)| v.to_string())
                };

                let ctx = match authenticate(&shared.resolver, get_header, request_id.clone()).await {
                    AuthOutcome::Anonymous(ctx) | AuthOutcome::Populated(ctx) => ctx,
                    AuthOutcome::Rejected(err) => {
                        tracing::debug!(error = %err, %request_id, "request rejected: invalid credentials");
                        let (res, _) = client.write_all(RESP_401.to_vec()).await;
                        res?;
                        if !keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                };

                let default_upstream = shared.config.proxy.default_upstream_url.clone();
                let compiled = {
                    let snapshot = shared.rule_cache.current();
                    let selection = matcher::select(
                        &snapshot,
                        &method,
                        &path,
                        &headers,
                        &ctx,
                        default_upstream.as_deref(),
                    );
                    match selection {
                        Selection::Rule(compiled) => Some(compiled),
                        Selection::Default(url) => {
                            let rule = matcher::synthesize_default_rule(&url);
                            let synthesized = yapi_store::RuleSnapshot::build(vec![rule]);
                            Some(std::sync::Arc::clone(&synthesized.rules()[0]))
                        }
                        Selection::NoMatch => None,
                    }
                };

                let compiled = match compiled {
                    Some(c) => c,
                    None => {
                        let (res, _) = client.write_all(RESP_404.to_vec()).await;
                        res?;
                        if !keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                };

                if let Err(authz_err) = crate::authorizer::authorize(&ctx) {
                    tracing::warn!(reason = authz_err.reason(), %request_id, "authorization failed");
                    let (res, _) = client.write_all(RESP_403.to_vec()).await;
                    res?;
                    if !keep_alive {
                        return Ok(());
                    }
                    continue;
                }

                let target = match resolve_target(&ctx, &compiled.rule, default_upstream.as_deref()) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(error = %e, %request_id, "target resolution failed");
                        let (res, _) = client.write_all(RESP_502.to_vec()).await;
                        res?;
                        if !keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                };

                let mut outbound = OutboundRequest::new(format!("{}{}", target.base_path, path));
                for (name, value) in &headers {
                    outbound.add_header(*name, value.to_string());
                }
                if !body_bytes.is_empty() {
                    outbound.body = Some(body_bytes);
                }

                yapi_actions::pipeline::apply(&compiled, &ctx, &mut outbound);

                build_upstream_request(
                    &mut upstream_req_buf,
                    &method,
                    &outbound.path,
                    &outbound.headers,
                    outbound.body.as_deref(),
                );

                let upstream_addr = target.addr;
                let maybe_conn = conn_pool.borrow_mut().take(&upstream_addr);
                let mut upstream = match maybe_conn {
                    Some(s) => s,
                    None => match new_upstream_conn(&upstream_addr).await {
                        Some(s) => s,
                        None => {
                            let (res, _) = client.write_all(RESP_502.to_vec()).await;
                            res?;
                            if !keep_alive {
                                return Ok(());
                            }
                            continue;
                        }
                    },
                };

                let req_data = upstream_req_buf.clone();
                let (res, _) = upstream.write_all(req_data).await;
                if res.is_err() {
                    match new_upstream_conn(&upstream_addr).await {
                        Some(mut new_upstream) => {
                            let req_data = upstream_req_buf.clone();
                            let (res, _) = new_upstream.write_all(req_data).await;
                            if res.is_err() {
                                tracing::warn!(addr = %upstream_addr, "upstream write failed after reconnect");
                                let (res, _) = client.write_all(RESP_502.to_vec()).await;
                                res?;
                                if !keep_alive {
                                    return Ok(());
                                }
                                continue;
                            }
                            upstream = new_upstream;
                        }
                        None => {
                            let (res, _) = client.write_all(RESP_502.to_vec()).await;
                            res?;
                            if !keep_alive {
                                return Ok(());
                            }
                            continue;
                        }
                    }
                }

                let (returned_ubuf, outcome) =
                    stream_response(&mut upstream, &mut client, upstream_buf, &upstream_addr).await;
                upstream_buf = returned_ubuf;

                let (status, upstream_keepalive) = match outcome {
                    Ok(pair) => pair,
                    Err(StreamError::ClientGone) => {
                        tracing::info!(%request_id, status = 499, "client cancelled mid-stream");
                        return Ok(());
                    }
                    Err(StreamError::UpstreamGone) => {
                        let (res, _) = client.write_all(RESP_502.to_vec()).await;
                        res?;
                        if !keep_alive {
                            return Ok(());
                        }
                        continue;
                    }
                    Err(StreamError::Io(e)) => return Err(e.into()),
                };

                if let Some(metrics) = &shared.metrics {
                    let elapsed = started.elapsed().as_secs_f64();
                    metrics.record_request(&compiled.rule.id, &method, status, elapsed);
                    metrics.record_upstream(&upstream_addr, Some(status), elapsed);
                }
                tracing::debug!(%request_id, %method, %path, status, latency_ms = started.elapsed().as_secs_f64() * 1000.0, "access");

                if upstream_keepalive {
                    conn_pool.borrow_mut().put(upstream_addr, upstream);
                }

                if !keep_alive {
                    return Ok(());
                }
            }
            Ok(httparse::Status::Partial) => {
                let resp = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                let (res, _) = client.write_all(resp.to_vec()).await;
                res?;
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(error = %e, "http parse error");
                let resp = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                let (res, _) = client.write_all(resp.to_vec()).await;
                res?;
                return Ok(());
            }
        }
    }
}
