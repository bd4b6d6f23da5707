//! Managed connection: serialized writes, keepalive, exactly-once teardown
//!
//! A [`Connection`] wraps one exclusively-owned raw channel with an identity,
//! a write lock, a disconnect-observer list and a background keepalive task.
//! Three independent triggers (an explicit disconnect, a failed write, a
//! failed keepalive probe) converge on the same teardown sequence, and the
//! sequence runs exactly once no matter which trigger wins the race.

use crate::emitter::Emitter;
use crate::server::ServerInner;
use crate::transport::{RawChannel, TransportError};
use crate::types::{ConnectionState, Frame, HubError, HubResult};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{watch, Mutex};
use tokio::time;
use tracing::{debug, warn};

/// Callback fired when a connection completes teardown.
pub type DisconnectFn = Box<dyn Fn() + Send + Sync>;

/// The write path and the disconnected flag share this one lock, so
/// "check still active" and "transmit" cannot race against teardown.
struct Writer {
    /// Present while the connection is active; taken by teardown so the
    /// channel is closed exactly once.
    channel: Option<Box<dyn RawChannel>>,
    disconnected: bool,
}

/// One managed, bidirectional connection.
pub struct Connection {
    id: String,
    server: Weak<ServerInner>,
    writer: Mutex<Writer>,
    disconnect_observers: StdMutex<Vec<DisconnectFn>>,
    /// Flips to `true` when teardown commits; the keepalive task derives its
    /// cancellation from this instead of polling.
    closed_tx: watch::Sender<bool>,
    /// Bumped for every keepalive acknowledgment received from the peer.
    ack_tx: watch::Sender<u64>,
    self_emitter: Emitter,
}

impl Connection {
    pub(crate) fn new(
        id: String,
        server: Weak<ServerInner>,
        channel: Box<dyn RawChannel>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Connection>| {
            let (closed_tx, _) = watch::channel(false);
            let (ack_tx, _) = watch::channel(0u64);
            Self {
                self_emitter: Emitter::new(weak.clone(), id.clone()),
                id,
                server,
                writer: Mutex::new(Writer {
                    channel: Some(channel),
                    disconnected: false,
                }),
                disconnect_observers: StdMutex::new(Vec::new()),
                closed_tx,
                ack_tx,
            }
        })
    }

    /// The registry identifier. Immutable for the connection's lifetime.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn server_handle(&self) -> Option<Arc<ServerInner>> {
        self.server.upgrade()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        if self.writer.lock().await.disconnected {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Active
        }
    }

    pub async fn is_disconnected(&self) -> bool {
        self.writer.lock().await.disconnected
    }

    /// The emitter pre-bound to this connection's own id.
    pub fn emitter(&self) -> Emitter {
        self.self_emitter.clone()
    }

    /// An emitter bound to another connection as target.
    pub fn emitter_to<T: Into<String>>(&self, target: T) -> Emitter {
        self.self_emitter.rebind(target.into())
    }

    /// Register a disconnect observer. Observers fire exactly once, in
    /// registration order, when teardown runs. Registration is append-only.
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.disconnect_observers
            .lock()
            .expect("disconnect observer list poisoned")
            .push(Box::new(callback));
    }

    /// Write one frame to the peer.
    ///
    /// All writers to this connection are serialized through one lock;
    /// individual frames are transmitted whole and never interleave. A
    /// transport failure triggers teardown asynchronously and the original
    /// error is returned to the caller.
    pub async fn write(&self, frame: Frame) -> HubResult<()> {
        let result = {
            let mut writer = self.writer.lock().await;
            if writer.disconnected {
                return Err(HubError::AlreadyDisconnected);
            }
            match writer.channel.as_mut() {
                Some(channel) => channel.send(frame).await,
                None => return Err(HubError::AlreadyDisconnected),
            }
        };

        if let Err(err) = result {
            debug!("Write failed on connection {}: {}", self.id, err);
            self.spawn_teardown();
            return Err(HubError::WriteFailed(err));
        }
        Ok(())
    }

    /// Request teardown. Idempotent: the losing side of a race observes
    /// [`HubError::AlreadyDisconnected`].
    pub async fn disconnect(&self) -> HubResult<()> {
        match self.server.upgrade() {
            Some(server) => server.disconnect(&self.id).await,
            // server gone means the registry (and this entry) is history
            None => Err(HubError::AlreadyDisconnected),
        }
    }

    /// Handle an incoming control frame from the transport's read loop.
    ///
    /// Peer probes are answered with an acknowledgment under the control
    /// deadline; a transient failure of that reply is swallowed (the next
    /// cycle may succeed), a permanent one propagates to the transport layer
    /// as a probe failure. Peer acknowledgments feed the keepalive task's
    /// deadline check.
    pub async fn handle_control_frame(&self, frame: Frame) -> Result<(), TransportError> {
        match frame {
            Frame::Ping(payload) => {
                let deadline = self
                    .server
                    .upgrade()
                    .map(|s| s.config().control_deadline)
                    .unwrap_or_default();
                let result = {
                    let mut writer = self.writer.lock().await;
                    if writer.disconnected {
                        return Ok(());
                    }
                    match writer.channel.as_mut() {
                        Some(channel) => channel.send_control(Frame::Pong(payload), deadline).await,
                        None => return Ok(()),
                    }
                };
                match result {
                    Err(err) if err.is_transient() => {
                        debug!(
                            "Swallowing transient control error on connection {}: {}",
                            self.id, err
                        );
                        Ok(())
                    }
                    other => other,
                }
            }
            Frame::Pong(_) => {
                self.ack_tx.send_modify(|acks| *acks += 1);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Run the teardown sequence: mark disconnected, fire observers in
    /// registration order, close the channel. Exactly one caller gets `Ok`;
    /// every other racing trigger gets [`HubError::AlreadyDisconnected`] and
    /// causes no further effects. Registry removal is the server's half of
    /// the sequence and happens after this returns.
    pub(crate) async fn teardown(&self) -> HubResult<()> {
        let channel = {
            let mut writer = self.writer.lock().await;
            if writer.disconnected {
                return Err(HubError::AlreadyDisconnected);
            }
            writer.disconnected = true;
            writer.channel.take()
        };
        let _ = self.closed_tx.send(true);

        self.fire_disconnect();

        if let Some(mut channel) = channel {
            if let Err(err) = channel.close().await {
                warn!("Error closing channel for connection {}: {}", self.id, err);
            }
        }
        Ok(())
    }

    fn fire_disconnect(&self) {
        // take the list so callbacks run without holding the lock
        let observers = std::mem::take(
            &mut *self
                .disconnect_observers
                .lock()
                .expect("disconnect observer list poisoned"),
        );
        for observer in &observers {
            observer();
        }
    }

    fn spawn_teardown(&self) {
        let Some(server) = self.server.upgrade() else {
            return;
        };
        let id = self.id.clone();
        tokio::spawn(async move {
            // the caller keeps the original write error; this result is moot
            let _ = server.disconnect(&id).await;
        });
    }

    /// Start the per-connection keepalive task. Called once, at activation.
    ///
    /// Each cycle sleeps for the probe interval, sends a probe through the
    /// same serialized write path as application traffic, then waits for the
    /// peer's acknowledgment under the control deadline. A failed probe or a
    /// missed acknowledgment tears the connection down; teardown from any
    /// other trigger cancels the task immediately via the closed signal.
    pub(crate) fn start_keepalive(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        let mut closed = self.closed_tx.subscribe();
        tokio::spawn(async move {
            let Some(server) = conn.server.upgrade() else {
                return;
            };
            let interval = server.config().ping_interval;
            let deadline = server.config().control_deadline;
            drop(server);

            let mut acks = conn.ack_tx.subscribe();
            loop {
                tokio::select! {
                    _ = time::sleep(interval) => {}
                    _ = closed.changed() => break,
                }
                if conn.is_disconnected().await {
                    break;
                }

                acks.borrow_and_update();
                if conn.write(Frame::ping(Vec::new())).await.is_err() {
                    // the write failure already triggered teardown
                    break;
                }

                tokio::select! {
                    changed = acks.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = closed.changed() => break,
                    _ = time::sleep(deadline) => {
                        warn!(
                            "Keepalive acknowledgment missed deadline on connection {}",
                            conn.id
                        );
                        if let Some(server) = conn.server.upgrade() {
                            let _ = server.disconnect(&conn.id).await;
                        }
                        break;
                    }
                }
            }
            debug!("Keepalive task stopped for connection {}", conn.id);
        });
    }
}
