//! Client-facing connection driver.
//!
//! One `ClientConn` serves one accepted TCP connection, handling its
//! requests strictly in sequence. Each request gets a fresh id, is
//! checked against the cache when it is a GET, and is otherwise relayed
//! through an origin exchange. CONNECT hands the socket over to a
//! tunnel and ends the request loop.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpStream;

use super::connection::Connection;
use super::origin;
use super::tunnel::Tunnel;
use super::{check_protocol, stock_400};
use crate::cache::CachedResponse;
use crate::error::ProxyError;
use crate::http::date::format_http_date;
use crate::http::{HttpMessage, RequestCacheInfo};
use crate::server::ServerState;

/// What the connection should do after a request has been handled.
pub(crate) enum Flow {
    /// Wait for the next request on the same connection
    NextRequest,
    /// Stop serving this connection
    Shutdown,
    /// Hand both sockets to a tunnel (CONNECT accepted)
    Tunnel(TcpStream),
}

pub struct ClientConn {
    pub(crate) conn: Connection,
    pub(crate) state: Arc<ServerState>,
    peer: SocketAddr,
}

impl ClientConn {
    pub fn new(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) -> Self {
        Self {
            conn: Connection::new(stream),
            state,
            peer,
        }
    }

    /// Serve requests until the client goes away or a tunnel takes over.
    pub async fn serve(mut self) {
        loop {
            match self.handle_one().await {
                Flow::NextRequest => {}
                Flow::Shutdown => return,
                Flow::Tunnel(origin_stream) => {
                    let tunnel = Tunnel::new(self.conn.id, self.state.log.clone());
                    tunnel.run(self.conn.stream, origin_stream).await;
                    return;
                }
            }
        }
    }

    async fn handle_one(&mut self) -> Flow {
        // several requests can arrive on one connection; each gets its own id
        self.conn.id = self.state.next_id();

        match self.conn.read_message().await {
            Ok(()) => {}
            Err(ProxyError::Parse(e)) => return self.bad_header(&e.to_string()).await,
            Err(err) => {
                if err.is_closed() {
                    self.state.log.note(self.conn.id, "connection closed");
                } else {
                    self.state.log.error(self.conn.id, format_args!("{}", err));
                }
                return Flow::Shutdown;
            }
        }

        if !check_protocol(&self.conn.message.start_line[2]) {
            self.state
                .log
                .error(self.conn.id, format_args!("unsupported protocol"));
            let _ = self.write_response(&stock_400()).await;
            return Flow::Shutdown;
        }

        self.state.log.line(
            self.conn.id,
            format_args!(
                "\"{}\" from {} @ {}",
                self.conn.message.start_line_text(),
                self.peer.ip(),
                Utc::now().format("%c")
            ),
        );

        let request_info = RequestCacheInfo::from_message(&self.conn.message);
        let url = self.conn.message.start_line[1].clone();

        let looked_up = if self.conn.message.start_line[0] == "GET" {
            self.lookup_cache(&url)
        } else {
            None
        };
        let candidate = match looked_up {
            Some(entry) => self.check_cached(entry, &request_info),
            None => {
                // don't forward the browser's validators: a 304 we did not
                // ask for would leave us with nothing to serve
                self.conn
                    .message
                    .remove_headers(&["If-Modified-Since", "If-None-Match"]);
                None
            }
        };

        if let Some(entry) = candidate {
            return match self.write_response(&entry.message).await {
                Ok(()) => Flow::NextRequest,
                Err(_) => Flow::Shutdown,
            };
        }

        origin::fetch(self).await
    }

    /// Read the slot for this URL; a collision or an empty slot is a miss.
    fn lookup_cache(&self, url: &String) -> Option<Arc<CachedResponse>> {
        let accessor = self.state.cache.accessor(url);
        match accessor.lookup() {
            Some(entry) => Some(entry.clone()),
            None => {
                self.state.log.line(self.conn.id, format_args!("not in cache"));
                None
            }
        }
    }

    /// Decide whether a stored response may be served as-is.
    ///
    /// Returns the entry when it is still usable. Otherwise the outgoing
    /// request is armed with the stored validators so the origin can
    /// answer 304.
    fn check_cached(
        &mut self,
        entry: Arc<CachedResponse>,
        request_info: &RequestCacheInfo,
    ) -> Option<Arc<CachedResponse>> {
        let now = Utc::now();
        if request_info.no_cache || entry.info.no_cache {
            self.state
                .log
                .line(self.conn.id, format_args!("in cache, requires validation"));
        } else if entry.info.expired(now) {
            self.state.log.line(
                self.conn.id,
                format_args!(
                    "in cache, but expired at {}",
                    entry.info.expire_time(now).format("%c")
                ),
            );
        } else {
            self.state
                .log
                .line(self.conn.id, format_args!("in cache, valid"));
            return Some(entry);
        }

        // revalidate with the stored entry's validators, not the client's
        if let Some(last_modified) = entry.info.last_modified {
            self.conn
                .message
                .replace_header("If-Modified-Since", format_http_date(last_modified));
        }
        if !entry.info.etag.is_empty() {
            self.conn
                .message
                .replace_header("If-None-Match", entry.info.etag.clone());
        }
        None
    }

    /// Write a response to the client, logging the start line.
    pub(crate) async fn write_response(&mut self, message: &HttpMessage) -> Result<(), ProxyError> {
        self.state.log.line(
            self.conn.id,
            format_args!("Responding \"{}\"", message.start_line_text()),
        );
        self.conn.write_message(message).await
    }

    /// A malformed request: log it and answer with the stock 400.
    async fn bad_header(&mut self, what: &str) -> Flow {
        self.state
            .log
            .error(self.conn.id, format_args!("{}", what));
        match self.write_response(&stock_400()).await {
            Ok(()) => Flow::NextRequest,
            Err(_) => Flow::Shutdown,
        }
    }
}
