//! Transport seam: the raw channel contract
//!
//! The hub never performs handshakes or owns sockets directly. A collaborator
//! (HTTP upgrade, TLS acceptor, an in-memory pair in tests) produces an
//! already-connected, framed channel and hands it to
//! [`SocketServer::register_connection`](crate::server::SocketServer::register_connection).
//! Incoming control frames travel the other way: the collaborator's read loop
//! delivers them to [`Connection::handle_control_frame`](crate::connection::Connection::handle_control_frame).

use crate::types::Frame;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a raw channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel has already sent or received a close signal.
    #[error("channel closed")]
    Closed,

    /// A transient condition (congestion, timeout on a control write) that
    /// does not invalidate the channel.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the framing protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the error is safe to swallow on the control-reply path.
    ///
    /// A closed channel means the close handshake already ran its course and
    /// a reply is pointless but harmless to skip; a transient error means the
    /// next keepalive cycle may still succeed. Anything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Closed | Self::Transient(_))
    }
}

/// An already-established, framed, bidirectional byte-message channel.
///
/// Exclusively owned by one [`Connection`](crate::connection::Connection);
/// the hub serializes all access to it, so implementations need not be
/// re-entrant. `&mut self` receivers encode that exclusivity.
#[async_trait]
pub trait RawChannel: Send {
    /// Transmit one complete frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Transmit a control frame, giving up after `deadline`.
    async fn send_control(&mut self, frame: Frame, deadline: Duration)
        -> Result<(), TransportError>;

    /// Close the channel. Called exactly once, during teardown.
    async fn close(&mut self) -> Result<(), TransportError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Closed.is_transient());
        assert!(TransportError::Transient("busy".into()).is_transient());
        assert!(!TransportError::Protocol("bad frame".into()).is_transient());
        let io = TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "gone",
        ));
        assert!(!io.is_transient());
    }
}
