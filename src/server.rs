//! Connection registry and server-side lifecycle coordination
//!
//! [`SocketServer`] owns the identifier → connection registry and the
//! connection-observer list. Registration and activation are deliberately
//! split: `register_connection` only mints an identifier and inserts the
//! entry, so the caller can attach observers before any traffic or keepalive
//! probe flows; `activate` then notifies observers and starts the keepalive
//! task.

use crate::connection::Connection;
use crate::id::{default_id_generator, IdGenerator};
use crate::transport::RawChannel;
use crate::types::{Frame, HubConfig, HubError, HubResult};
use dashmap::DashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{debug, info};

/// Callback fired with each newly activated connection.
pub type ConnectionFn = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;

pub(crate) struct ServerInner {
    /// Sharded concurrent map; unrelated connections never contend on one lock.
    connections: DashMap<String, Arc<Connection>>,
    on_connection: StdMutex<Vec<ConnectionFn>>,
    id_generator: IdGenerator,
    config: HubConfig,
}

impl ServerInner {
    pub(crate) fn config(&self) -> &HubConfig {
        &self.config
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Shared teardown entry point for all three disconnect triggers.
    ///
    /// The connection's state machine guarantees at-most-once execution of
    /// the teardown effects; registry removal is this function's half and
    /// only runs for the winning caller.
    pub(crate) async fn disconnect(&self, id: &str) -> HubResult<()> {
        let Some(conn) = self.get(id) else {
            // unknown or already removed: nothing left to tear down
            return Err(HubError::AlreadyDisconnected);
        };
        conn.teardown().await?;
        self.connections.remove(id);
        info!("Connection removed from registry: {}", id);
        Ok(())
    }

    /// Forward a payload to the target's serialized write path.
    ///
    /// A missing target is a silent no-op: delivery is best-effort
    /// fire-and-forget, matching the routing semantics this hub was modeled
    /// on. Callers that need a positive signal should look the target up via
    /// [`ServerInner::get`] first.
    pub(crate) async fn route_message(
        &self,
        from: &str,
        to: &str,
        payload: Vec<u8>,
    ) -> HubResult<()> {
        let Some(target) = self.get(to) else {
            debug!("Dropping message from {}: target {} not registered", from, to);
            return Ok(());
        };
        target.write(Frame::Binary(payload)).await
    }
}

/// Server handle: cheap to clone, safe to share across tasks.
///
/// Multiple independent servers can coexist in one process; each owns its own
/// registry and observer list.
#[derive(Clone)]
pub struct SocketServer {
    inner: Arc<ServerInner>,
}

impl SocketServer {
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    pub fn with_config(config: HubConfig) -> Self {
        Self::with_id_generator(config, default_id_generator())
    }

    /// Create a server with an injected identifier source.
    ///
    /// Freshly generated identifiers are not checked against live entries; a
    /// colliding generator silently replaces the prior registry entry, so the
    /// injected source must make collisions negligible.
    pub fn with_id_generator(config: HubConfig, id_generator: IdGenerator) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                connections: DashMap::new(),
                on_connection: StdMutex::new(Vec::new()),
                id_generator,
                config,
            }),
        }
    }

    /// Register application interest in newly activated connections.
    /// Observers run in registration order.
    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.inner
            .on_connection
            .lock()
            .expect("connection observer list poisoned")
            .push(Box::new(callback));
    }

    /// Wrap a raw channel into a managed connection and insert it into the
    /// registry. Keepalive does not start and observers are not notified
    /// until [`SocketServer::activate`]; attach disconnect observers in
    /// between.
    pub fn register_connection(&self, channel: Box<dyn RawChannel>) -> Arc<Connection> {
        let id = (self.inner.id_generator)();
        let conn = Connection::new(id.clone(), Arc::downgrade(&self.inner), channel);
        self.inner.connections.insert(id.clone(), Arc::clone(&conn));
        info!("Connection registered: {}", id);
        conn
    }

    /// Notify connection observers in registration order and start the
    /// keepalive task. Observers are infallible callbacks, so no observer can
    /// abort the notification sequence.
    pub fn activate(&self, conn: &Arc<Connection>) {
        {
            let observers = self
                .inner
                .on_connection
                .lock()
                .expect("connection observer list poisoned");
            for observer in observers.iter() {
                observer(conn);
            }
        }
        conn.start_keepalive();
        debug!("Connection activated: {}", conn.id());
    }

    /// Register and activate in one step, for callers with no observers to
    /// attach in between.
    pub fn handle(&self, channel: Box<dyn RawChannel>) -> Arc<Connection> {
        let conn = self.register_connection(channel);
        self.activate(&conn);
        conn
    }

    /// Concurrency-safe registry lookup.
    pub fn get_connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.inner.get(id)
    }

    /// Identifiers of all live connections.
    pub fn connection_ids(&self) -> Vec<String> {
        self.inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Tear down the identified connection. Idempotent: a second call, or a
    /// call against an unknown identifier, reports
    /// [`HubError::AlreadyDisconnected`] and has no further effect.
    pub async fn disconnect(&self, id: &str) -> HubResult<()> {
        self.inner.disconnect(id).await
    }

    /// Route an opaque payload from one connection to another. Missing
    /// targets are dropped silently (see [`ServerInner::route_message`]).
    pub async fn route_message(&self, from: &str, to: &str, payload: Vec<u8>) -> HubResult<()> {
        self.inner.route_message(from, to, payload).await
    }
}

impl Default for SocketServer {
    fn default() -> Self {
        Self::new()
    }
}
