//! End-to-end lifecycle tests against an in-memory channel.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wshub::{
    Frame, HubConfig, HubError, IdGenerator, RawChannel, SocketServer, TransportError,
};

/// Loopback channel recording every frame it is asked to transmit.
#[derive(Clone, Default)]
struct Loopback {
    frames: Arc<Mutex<Vec<Frame>>>,
    closed: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
}

impl Loopback {
    fn channel(&self) -> Box<dyn RawChannel> {
        Box::new(self.clone())
    }

    fn sent(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawChannel for Loopback {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            )));
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn send_control(
        &mut self,
        frame: Frame,
        _deadline: Duration,
    ) -> Result<(), TransportError> {
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn server_with_fixed_ids() -> SocketServer {
    let counter = Arc::new(AtomicUsize::new(1));
    let generator: IdGenerator = Arc::new(move || format!("c{}", counter.fetch_add(1, Ordering::SeqCst)));
    SocketServer::with_id_generator(HubConfig::default(), generator)
}

#[tokio::test]
async fn concurrent_writes_deliver_two_complete_frames() {
    let server = server_with_fixed_ids();
    let loopback = Loopback::default();
    let conn = server.register_connection(loopback.channel());
    assert_eq!(conn.id(), "c1");

    let first = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.write(Frame::text("hello")).await })
    };
    let second = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.write(Frame::text("hello")).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(
        loopback.sent(),
        vec![Frame::text("hello"), Frame::text("hello")]
    );
}

#[tokio::test]
async fn double_disconnect_fires_observer_once() {
    let server = server_with_fixed_ids();
    let loopback = Loopback::default();
    let conn = server.register_connection(loopback.channel());

    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = Arc::clone(&counter);
        conn.on_disconnect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    server.disconnect("c1").await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let err = server.disconnect("c1").await.unwrap_err();
    assert!(matches!(err, HubError::AlreadyDisconnected));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(loopback.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn routing_to_unregistered_target_neither_blocks_nor_fails() {
    let server = server_with_fixed_ids();
    let loopback = Loopback::default();
    let conn = server.register_connection(loopback.channel());

    server
        .route_message(conn.id(), "c2", b"anyone home?".to_vec())
        .await
        .unwrap();
    assert!(loopback.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_failure_and_explicit_disconnect_converge_on_one_teardown() {
    let server = server_with_fixed_ids();
    let loopback = Loopback::default();
    let conn = server.register_connection(loopback.channel());

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        conn.on_disconnect(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    loopback.broken.store(true, Ordering::SeqCst);
    let write_err = conn.write(Frame::text("doomed")).await.unwrap_err();
    assert!(matches!(write_err, HubError::WriteFailed(_)));

    // races the asynchronous teardown the failed write already scheduled
    let _ = conn.disconnect().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(conn.is_disconnected().await);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(loopback.closed.load(Ordering::SeqCst), 1);
    assert!(server.get_connection("c1").is_none());
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_detected_by_keepalive() {
    let server = SocketServer::with_config(HubConfig {
        ping_interval: Duration::from_millis(100),
        control_deadline: Duration::from_millis(10),
    });
    let loopback = Loopback::default();
    let conn = server.register_connection(loopback.channel());

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        conn.on_disconnect(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }
    server.activate(&conn);

    // no application write and no acknowledgment: one interval + one deadline
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(conn.is_disconnected().await);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(server.get_connection(conn.id()).is_none());
}

#[tokio::test]
async fn emitters_route_between_registered_connections() {
    let server = server_with_fixed_ids();
    let loopback_a = Loopback::default();
    let loopback_b = Loopback::default();
    let a = server.register_connection(loopback_a.channel());
    let b = server.register_connection(loopback_b.channel());

    a.emitter_to(b.id())
        .emit_message(b"ping-b".to_vec())
        .await
        .unwrap();
    b.emitter().emit_message(b"note-to-self".to_vec()).await.unwrap();

    assert_eq!(loopback_a.sent(), Vec::<Frame>::new());
    assert_eq!(
        loopback_b.sent(),
        vec![
            Frame::Binary(b"ping-b".to_vec()),
            Frame::Binary(b"note-to-self".to_vec()),
        ]
    );
}
