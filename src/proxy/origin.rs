//! Origin-facing exchange: resolve, connect, forward the request, relay
//! the response, and decide whether to store it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::net::{lookup_host, TcpStream};

use super::client::{ClientConn, Flow};
use super::connection::Connection;
use super::{check_protocol, stock_200, stock_502};
use crate::cache::CachedResponse;
use crate::constants::MAX_CACHEABLE_BODY_SIZE;
use crate::error::ProxyError;
use crate::http::{HttpUrl, ParserState, ResponseCacheInfo};
use crate::server::ServerState;

/// Handle the origin side of one request.
///
/// The client's request has been fully read; its target is rewritten to
/// origin-form here. For CONNECT the established socket is returned for
/// tunneling; for everything else the response is relayed back and, when
/// eligible, stored.
pub(crate) async fn fetch(client: &mut ClientConn) -> Flow {
    let state = client.state.clone();
    let id = client.conn.id;

    let request_url = client.conn.message.start_line[1].clone();
    let url: HttpUrl = match request_url.parse() {
        Ok(url) => url,
        Err(e) => {
            state.log.error(id, format_args!("{}", e));
            return respond_502(client).await;
        }
    };
    // forward in origin-form; the Host header is passed through untouched
    client.conn.message.start_line[1] = url.path.clone();

    let stream = match connect(&url).await {
        Ok(stream) => stream,
        Err(err) => return io_fail(client, &err).await,
    };

    if client.conn.message.start_line[0] == "CONNECT" {
        return match client.write_response(&stock_200()).await {
            Ok(()) => Flow::Tunnel(stream),
            Err(_) => Flow::Shutdown,
        };
    }

    let mut origin = OriginConn {
        conn: Connection::new(stream),
        request_url,
        request_host: url.host,
        state,
    };
    origin.conn.id = id;
    origin.exchange(client).await
}

/// Resolve the authority and connect to the first reachable endpoint.
async fn connect(url: &HttpUrl) -> Result<TcpStream, ProxyError> {
    let mut last_err: Option<std::io::Error> = None;
    for addr in lookup_host(url.authority()).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(ProxyError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "name resolved to no addresses")
    })))
}

struct OriginConn {
    conn: Connection,
    /// The absolute-form target, which is also the cache key.
    request_url: String,
    request_host: String,
    state: Arc<ServerState>,
}

impl OriginConn {
    async fn exchange(&mut self, client: &mut ClientConn) -> Flow {
        let id = self.conn.id;
        let request_time = Utc::now();

        self.state.log.line(
            id,
            format_args!(
                "Requesting \"{}\" from {}",
                client.conn.message.start_line_text(),
                self.request_host
            ),
        );
        if let Err(err) = self.conn.write_message(&client.conn.message).await {
            return io_fail(client, &err).await;
        }

        match self.conn.read_message().await {
            Ok(()) => {}
            Err(ProxyError::Parse(e)) => {
                self.state.log.error(id, format_args!("{}", e));
                return respond_502(client).await;
            }
            Err(err) => {
                if err.is_closed() {
                    self.state.log.note(id, "connection closed");
                    // a body may be truncated, but headers may not
                    if self.conn.parser.status() < ParserState::Body {
                        self.state.log.error(id, format_args!("incomplete response"));
                        return respond_502(client).await;
                    }
                    return Flow::NextRequest;
                }
                return io_fail(client, &err).await;
            }
        }

        if !check_protocol(&self.conn.message.start_line[0]) {
            self.state.log.error(id, format_args!("unsupported protocol"));
            return respond_502(client).await;
        }

        let response_time = Utc::now();
        self.state.log.line(
            id,
            format_args!(
                "Received \"{}\" from {}",
                self.conn.message.start_line_text(),
                self.request_host
            ),
        );

        let request_method = client.conn.message.start_line[0].clone();
        let status = self.conn.message.start_line[1].clone();

        if client.write_response(&self.conn.message).await.is_err() {
            return Flow::Shutdown;
        }

        if let Some(info) = self.cacheable(&request_method, &status, request_time, response_time) {
            let no_cache = info.no_cache;
            let expire = response_time + info.freshness_lifetime;
            if self.store(&status, info) {
                if no_cache {
                    self.state
                        .log
                        .line(id, format_args!("cached, but requires re-validation"));
                } else {
                    self.state.log.line(
                        id,
                        format_args!("cached, expires at {}", expire.format("%c")),
                    );
                }
            }
        }
        Flow::NextRequest
    }

    /// RFC 7234 Sec 3: only successful GET responses of bounded size with
    /// a Date field and without no-store/private may be stored.
    fn cacheable(
        &self,
        request_method: &str,
        status: &str,
        request_time: DateTime<Utc>,
        response_time: DateTime<Utc>,
    ) -> Option<ResponseCacheInfo> {
        let id = self.conn.id;
        if request_method != "GET" {
            self.state.log.line(
                id,
                format_args!("not cachable because request method is {}", request_method),
            );
            return None;
        }
        if status != "200" && status != "304" {
            self.state.log.line(
                id,
                format_args!("not cachable because status code is {}", status),
            );
            return None;
        }
        if self.conn.message.body.len() > MAX_CACHEABLE_BODY_SIZE {
            self.state.log.line(
                id,
                format_args!(
                    "not cachable because body size is larger than {}",
                    MAX_CACHEABLE_BODY_SIZE
                ),
            );
            return None;
        }
        let info =
            match ResponseCacheInfo::from_message(&self.conn.message, request_time, response_time) {
                Some(info) => info,
                None => {
                    self.state.log.line(
                        id,
                        format_args!("not cachable because the response does not have a Date field."),
                    );
                    return None;
                }
            };
        if info.no_store || info.private {
            self.state.log.line(
                id,
                format_args!("not cachable because no-store and/or private is set in Cache-Control"),
            );
            return None;
        }
        Some(info)
    }

    /// Store the response under the request URL.
    ///
    /// A 200 overwrites the slot unconditionally. A 304 only refreshes an
    /// entry that is still present for this exact URL; after a hash
    /// collision there is no body to revalidate, so nothing is stored.
    fn store(&mut self, status: &str, info: ResponseCacheInfo) -> bool {
        let mut accessor = self.state.cache.accessor(&self.request_url);
        if status == "200" {
            let message = std::mem::take(&mut self.conn.message);
            accessor.set(Arc::new(CachedResponse::new(message, info)));
            return true;
        }
        let refreshed = match accessor.get() {
            Some((stored_key, existing)) if stored_key == &self.request_url => {
                Some(existing.revalidated(&self.conn.message, info))
            }
            _ => None,
        };
        match refreshed {
            Some(entry) => {
                accessor.set(Arc::new(entry));
                true
            }
            None => {
                self.state.log.line(
                    self.conn.id,
                    format_args!(
                        "not cachable because the response is 304 and previous cache does not exist"
                    ),
                );
                false
            }
        }
    }
}


/// Upstream failure: report 502 to the client, except for a plain EOF
/// which is only noted.
async fn io_fail(client: &mut ClientConn, err: &ProxyError) -> Flow {
    let id = client.conn.id;
    if err.is_closed() {
        client.state.log.note(id, "connection closed");
        return Flow::NextRequest;
    }
    client.state.log.error(id, format_args!("{}", err));
    respond_502(client).await
}

async fn respond_502(client: &mut ClientConn) -> Flow {
    match client.write_response(&stock_502()).await {
        Ok(()) => Flow::NextRequest,
        Err(_) => Flow::Shutdown,
    }
}
