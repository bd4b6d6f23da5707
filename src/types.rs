//! Core types for the connection hub
//!
//! Frames, connection state, configuration and the error taxonomy shared by
//! the server, connection and emitter modules.

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A single outbound or inbound message frame.
///
/// Application traffic uses [`Frame::Text`] and [`Frame::Binary`]; the
/// keepalive machinery uses the control variants. Payloads are opaque to the
/// hub; framing within a payload is the application's concern.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Opaque binary payload
    Binary(Vec<u8>),
    /// Keepalive probe
    Ping(Vec<u8>),
    /// Keepalive acknowledgment
    Pong(Vec<u8>),
    /// Close signal
    Close,
}

/// Frame kind, for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

impl Frame {
    pub fn text<T: Into<String>>(content: T) -> Self {
        Self::Text(content.into())
    }

    pub fn binary<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::Binary(data.into())
    }

    pub fn ping<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::Ping(data.into())
    }

    pub fn pong<T: Into<Vec<u8>>>(data: T) -> Self {
        Self::Pong(data.into())
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Text(_) => FrameType::Text,
            Self::Binary(_) => FrameType::Binary,
            Self::Ping(_) => FrameType::Ping,
            Self::Pong(_) => FrameType::Pong,
            Self::Close => FrameType::Close,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_) | Self::Close)
    }
}

/// Lifecycle state of a managed connection.
///
/// The transition is monotonic: `Active` → `Disconnected`, with no
/// intermediate states and no way back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connection is registered and writable
    Active,
    /// Teardown has run; no further writes reach the channel
    Disconnected,
}

impl ConnectionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// Teardown was requested on a connection that already completed it.
    /// Never fatal; callers are free to ignore it.
    #[error("already disconnected")]
    AlreadyDisconnected,

    /// The underlying channel rejected a frame. The original transport error
    /// is preserved; teardown is triggered asynchronously as a side effect.
    #[error("write failed: {0}")]
    WriteFailed(#[source] TransportError),

    /// A routed message named an identifier with no live connection.
    ///
    /// Routing itself does not return this: missing targets are dropped
    /// silently to preserve fire-and-forget delivery semantics. The variant
    /// exists for callers that look a target up explicitly.
    #[error("connection not found: {0}")]
    TargetNotFound(String),
}

/// Result alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

/// Hub timing configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Interval between keepalive probes.
    pub ping_interval: Duration,
    /// Deadline for control-frame replies and probe acknowledgments.
    /// Must be well below `ping_interval` so an unresponsive peer is
    /// detected before the next probe would fire.
    pub control_deadline: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            // nine probes per ten-minute window, well under common idle timeouts
            ping_interval: Duration::from_millis(66_666),
            control_deadline: Duration::from_secs(1),
        }
    }
}
