//! Seam between the streaming session and the secure datagram transport.

use std::future::Future;
use std::time::Duration;

use crate::errors::Error;

/// Retransmit window of a single handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeWindow {
    /// Initial retransmit timeout.
    pub min: Duration,
    /// The attempt is abandoned after this long.
    pub max: Duration,
}

/// Why a frame could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The write did not complete in time; the channel may still be usable.
    Timeout,
    /// The peer sent a close-notify.
    PeerClosed,
    Other(String),
}

/// Opens sockets and performs handshakes.
///
/// Implementations are expected to be cheap to share; the session only ever
/// borrows them.
pub trait SecureTransport: Send + Sync + 'static {
    type Socket: Send + Sync + 'static;
    type Channel: SecureChannel + 'static;

    /// Open a datagram socket to `addr` (`host:port`).
    fn open(&self, addr: &str) -> impl Future<Output = Result<Self::Socket, Error>> + Send;

    /// Run one handshake attempt over an open socket.
    fn handshake(
        &self,
        socket: &Self::Socket,
        window: &HandshakeWindow,
    ) -> impl Future<Output = Result<Self::Channel, Error>> + Send;
}

/// An established secure channel.
pub trait SecureChannel: Send + Sync {
    fn send(&self, frame: &[u8]) -> impl Future<Output = Result<(), WriteError>> + Send;

    /// Best-effort graceful close. Errors are swallowed.
    fn close_notify(&self) -> impl Future<Output = ()> + Send;
}
