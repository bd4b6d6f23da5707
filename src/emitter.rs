//! Emitter: a bound source/target handle for outbound messages
//!
//! An [`Emitter`] is a trivial pass-through: it remembers which connection it
//! was minted from and which target it points at, and forwards payloads
//! through the server's routing path. It adds no concurrency machinery of its
//! own; serialization happens on the target connection's write lock.

use crate::connection::Connection;
use crate::types::{HubError, HubResult};
use std::sync::Weak;

/// A source/target-bound outbound message handle.
#[derive(Clone)]
pub struct Emitter {
    connection: Weak<Connection>,
    to: String,
}

impl Emitter {
    pub(crate) fn new(connection: Weak<Connection>, to: String) -> Self {
        Self { connection, to }
    }

    pub(crate) fn rebind(&self, to: String) -> Self {
        Self {
            connection: self.connection.clone(),
            to,
        }
    }

    /// The bound target identifier.
    pub fn target(&self) -> &str {
        &self.to
    }

    /// Route an opaque payload to the bound target.
    ///
    /// Delivery is best-effort: an unregistered target drops the payload
    /// silently. An emitter whose source connection is gone reports
    /// [`HubError::AlreadyDisconnected`].
    pub async fn emit_message<T: Into<Vec<u8>>>(&self, payload: T) -> HubResult<()> {
        let conn = self
            .connection
            .upgrade()
            .ok_or(HubError::AlreadyDisconnected)?;
        let Some(server) = conn.server_handle() else {
            return Err(HubError::AlreadyDisconnected);
        };
        server
            .route_message(conn.id(), &self.to, payload.into())
            .await
    }
}
