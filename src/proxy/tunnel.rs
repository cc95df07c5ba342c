//! Opaque bidirectional relay for CONNECT.

use tokio::io::{copy_bidirectional, BufReader};
use tokio::net::TcpStream;

use crate::logging::{AccessLog, RequestId};

/// Relays bytes between the client and origin sockets without inspecting
/// them. Any error on either direction tears down both sockets; the
/// relay owns them, so dropping it closes them exactly once.
pub struct Tunnel {
    id: RequestId,
    log: AccessLog,
}

impl Tunnel {
    pub fn new(id: RequestId, log: AccessLog) -> Self {
        Self { id, log }
    }

    /// Run the relay until either side closes or fails.
    ///
    /// The client side arrives still wrapped in its read buffer so that
    /// bytes the client sent ahead of our 200 are not lost.
    pub async fn run(self, mut client: BufReader<TcpStream>, mut origin: TcpStream) {
        self.log.note(self.id, "Tunnel established");
        if let Err(e) = copy_bidirectional(&mut client, &mut origin).await {
            tracing::debug!(error = %e, "tunnel relay ended with error");
        }
        self.log.line(self.id, format_args!("Tunnel closed"));
    }
}
