//! # wshub
//!
//! Connection registry and lifecycle management for message-oriented socket
//! servers: identity, serialized writes, keepalive probing and exactly-once
//! teardown over an abstract, already-established channel.
//!
//! The hub sits between a transport collaborator (handshake, TLS, HTTP
//! upgrade; out of scope here) and application code. The collaborator hands
//! each accepted channel to a [`SocketServer`], which mints an identifier,
//! wraps the channel in a [`Connection`] and registers it. Application code
//! attaches observers, writes frames and routes payloads between connections
//! through [`Emitter`] handles.
//!
//! ## Lifecycle
//!
//! A connection is `Active` from registration until any one of three
//! triggers fires: an explicit disconnect, a failed write, or a failed
//! keepalive probe. All three converge on one teardown sequence (mark
//! disconnected, fire disconnect observers in order, close the channel,
//! remove the registry entry) which runs exactly once regardless of how
//! many triggers race.
//!
//! ```no_run
//! use wshub::{SocketServer, Frame, RawChannel};
//!
//! # async fn accept_loop(server: SocketServer, channel: Box<dyn RawChannel>) {
//! let conn = server.register_connection(channel);
//! conn.on_disconnect(|| tracing::info!("peer went away"));
//! server.activate(&conn);
//!
//! conn.write(Frame::text("welcome")).await.ok();
//! # }
//! ```

pub mod connection;
pub mod emitter;
pub mod id;
pub mod server;
pub mod transport;
pub mod types;

pub use connection::{Connection, DisconnectFn};
pub use emitter::Emitter;
pub use id::{default_id_generator, random_id, IdGenerator};
pub use server::{ConnectionFn, SocketServer};
pub use transport::{RawChannel, TransportError};
pub use types::{ConnectionState, Frame, FrameType, HubConfig, HubError, HubResult};
