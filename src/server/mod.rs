// Server module - accept loop and resources shared across connections

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::ProxyError;
use crate::logging::{AccessLog, RequestId};
use crate::proxy::ClientConn;

/// Resources shared by every connection: the response cache, the request
/// log, and the id counter.
pub struct ServerState {
    pub cache: ResponseCache,
    pub log: AccessLog,
    id_counter: AtomicU64,
}

impl ServerState {
    pub fn new(cache_slots: usize, log: AccessLog) -> Self {
        Self {
            cache: ResponseCache::new(cache_slots),
            log,
            id_counter: AtomicU64::new(0),
        }
    }

    /// Allocate a request id. Ids are unique but carry no ordering.
    pub fn next_id(&self) -> RequestId {
        RequestId(self.id_counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// The listening proxy. Accepts connections and spawns one task per
/// client; each task pins its connection alive for as long as any of its
/// I/O is outstanding.
pub struct Server {
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the listener and open the request log named by the config.
    pub async fn bind(config: &Config) -> Result<Self, ProxyError> {
        let log = match &config.log.path {
            Some(path) => AccessLog::open(path)?,
            None => AccessLog::stdout(),
        };
        Self::bind_with_log(config, log).await
    }

    /// Bind with an externally supplied log sink (used by tests).
    pub async fn bind_with_log(config: &Config, log: AccessLog) -> Result<Self, ProxyError> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_address()).await?;
        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(config.cache.slots, log)),
            shutdown: CancellationToken::new(),
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A token that stops the accept loop when cancelled. In-flight
    /// connections drain naturally as their I/O completes or errors.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Accept connections until shut down.
    pub async fn run(self) {
        self.state.log.note(RequestId::NONE, "server started");
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = self.shutdown.cancelled() => break,
            };
            match accepted {
                Ok((stream, peer)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        ClientConn::new(stream, peer, state).serve().await;
                    });
                }
                Err(e) => {
                    self.state.log.error(RequestId::NONE, format_args!("{}", e));
                }
            }
        }
        self.state.log.note(RequestId::NONE, "server exited");
    }
}
