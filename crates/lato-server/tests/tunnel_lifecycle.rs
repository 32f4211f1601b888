//! End-to-end scenarios over loopback TCP.
//!
//! Each test starts a real `TunnelServer` on `127.0.0.1:0` with the firewall
//! bootstrap disabled and drives it with `TunnelClient`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use lato_core::protocol::setup_record_size;
use lato_server::{
    PacketProcessor, Result, ServerConfig, ServerError, Session, ShutdownReport, TunnelClient,
    TunnelServer,
};

// ============================================
// Helpers
// ============================================

fn config(address_range: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.network.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.pool.address_range = address_range.to_string();
    config.firewall.enabled = false;
    config.shutdown.grace_period_secs = 1;
    config
}

async fn start(
    config: ServerConfig,
    processor: Arc<dyn PacketProcessor>,
) -> (TunnelServer, SocketAddr) {
    let server = TunnelServer::new(config).unwrap().with_processor(processor);
    let addr = server.start().await.unwrap();
    (server, addr)
}

/// Polls `condition` for up to five seconds.
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[derive(Default)]
struct Recorder {
    packets: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl PacketProcessor for Recorder {
    async fn process(&self, _session: &Session, packet: Bytes) -> Result<()> {
        self.packets.lock().push(packet);
        Ok(())
    }
}

/// Never finishes processing.
#[derive(Default)]
struct Stall {
    entered: AtomicUsize,
}

#[async_trait]
impl PacketProcessor for Stall {
    async fn process(&self, _session: &Session, _packet: Bytes) -> Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ============================================
// Admission and teardown
// ============================================

#[tokio::test]
async fn pool_of_two_rejects_third_connection() {
    let (server, addr) = start(config("10.8.0.2-10.8.0.3"), Arc::new(Recorder::default())).await;

    let (a, b) = tokio::join!(TunnelClient::connect(addr), TunnelClient::connect(addr));
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut assigned = vec![a.address(), b.address()];
    assigned.sort();
    assert_eq!(assigned, vec![Ipv4Addr::new(10, 8, 0, 2), Ipv4Addr::new(10, 8, 0, 3)]);

    // Session limit and admission checks are out of the way, so only the
    // empty pool can turn the third client away
    let config = server.config();
    assert!(config.limits.max_sessions > 2);
    assert!(config.authorization.admission_resource().is_none());
    assert_eq!(server.registry().pool().available_count(), 0);

    let third = TunnelClient::connect(addr).await.unwrap_err();
    assert!(matches!(third, ServerError::NoSessionSetup));
    assert_eq!(server.registry().count(), 2);
    assert_eq!(server.registry().pool().allocated_count(), 2);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn dropped_connection_address_is_reused() {
    let (server, addr) = start(config("10.8.0.2-10.8.0.2"), Arc::new(Recorder::default())).await;

    let first = TunnelClient::connect(addr).await.unwrap();
    assert_eq!(first.address(), Ipv4Addr::new(10, 8, 0, 2));
    drop(first);

    let registry = Arc::clone(server.registry());
    eventually("session torn down", || registry.is_empty()).await;
    assert!(!registry.pool().is_assigned(Ipv4Addr::new(10, 8, 0, 2)));

    let second = TunnelClient::connect(addr).await.unwrap();
    assert_eq!(second.address(), Ipv4Addr::new(10, 8, 0, 2));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn tampered_tag_terminates_connection() {
    let recorder = Arc::new(Recorder::default());
    let processor: Arc<dyn PacketProcessor> = recorder.clone();
    let (server, addr) = start(config("10.8.0.2-10.8.0.9"), processor).await;

    let mut client = TunnelClient::connect(addr).await.unwrap();
    let address = client.address();

    let mut frame = client.seal(b"must not be delivered").unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    client.send_frame(&frame).await.unwrap();

    client.wait_closed().await.unwrap();

    let registry = Arc::clone(server.registry());
    eventually("session torn down", || registry.is_empty()).await;
    assert!(!registry.pool().is_assigned(address));
    assert!(recorder.packets.lock().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn stuck_sessions_are_forced_closed_at_deadline() {
    let stall = Arc::new(Stall::default());
    let processor: Arc<dyn PacketProcessor> = stall.clone();
    let (server, addr) = start(config("10.8.0.2-10.8.0.9"), processor).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = TunnelClient::connect(addr).await.unwrap();
        client.send(b"hold").await.unwrap();
        clients.push(client);
    }
    eventually("all handlers stuck in the processor", || {
        stall.entered.load(Ordering::SeqCst) == 3
    })
    .await;
    assert_eq!(server.registry().count(), 3);

    let started = std::time::Instant::now();
    let report = server.stop().await.unwrap();

    assert_eq!(report, ShutdownReport { graceful: 0, forced: 3 });
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(server.registry().count(), 0);
    assert_eq!(server.registry().pool().allocated_count(), 0);

    for mut client in clients {
        client.wait_closed().await.unwrap();
    }
}

// ============================================
// Delivery and shutdown
// ============================================

#[tokio::test]
async fn frames_are_delivered_in_order() {
    let recorder = Arc::new(Recorder::default());
    let processor: Arc<dyn PacketProcessor> = recorder.clone();
    let (server, addr) = start(config("10.8.0.2-10.8.0.9"), processor).await;

    let mut client = TunnelClient::connect(addr).await.unwrap();
    for i in 0..20u8 {
        client.send(&[i; 3]).await.unwrap();
    }
    client.close().await.unwrap();

    let registry = Arc::clone(server.registry());
    eventually("session torn down", || registry.is_empty()).await;

    let packets = recorder.packets.lock().clone();
    let expected: Vec<Bytes> = (0..20u8).map(|i| Bytes::from(vec![i; 3])).collect();
    assert_eq!(packets, expected);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn idle_connections_close_gracefully_on_stop() {
    let (server, addr) = start(config("10.8.0.2-10.8.0.9"), Arc::new(Recorder::default())).await;

    let mut a = TunnelClient::connect(addr).await.unwrap();
    let mut b = TunnelClient::connect(addr).await.unwrap();

    let report = server.stop().await.unwrap();
    assert_eq!(report, ShutdownReport { graceful: 2, forced: 0 });
    assert!(server.registry().is_empty());

    a.wait_closed().await.unwrap();
    b.wait_closed().await.unwrap();

    // Listener is gone
    assert!(TunnelClient::connect(addr).await.is_err());
}

#[tokio::test]
async fn server_restarts_after_stop() {
    let (server, _) = start(config("10.8.0.2-10.8.0.9"), Arc::new(Recorder::default())).await;
    server.stop().await.unwrap();

    let addr = server.start().await.unwrap();
    let client = TunnelClient::connect(addr).await.unwrap();
    assert_eq!(client.address(), Ipv4Addr::new(10, 8, 0, 2));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn smallest_valid_frame_size_still_delivers_session_setup() {
    let mut config = config("10.8.0.2-10.8.0.9");
    config.limits.max_frame_size =
        setup_record_size(config.client.dns.len(), config.client.routes.len());
    config.validate().unwrap();

    let (server, addr) = start(config, Arc::new(Recorder::default())).await;
    let client = TunnelClient::connect(addr).await.unwrap();
    assert_eq!(client.address(), Ipv4Addr::new(10, 8, 0, 2));

    server.stop().await.unwrap();
}

#[test]
fn frame_size_below_session_setup_is_rejected_at_startup() {
    let mut config = config("10.8.0.2-10.8.0.9");
    config.limits.max_frame_size = 48;

    assert!(matches!(
        TunnelServer::new(config),
        Err(ServerError::ConfigInvalid { .. })
    ));
}

#[tokio::test]
async fn session_setup_carries_configured_client_settings() {
    let mut config = config("10.8.0.0/29");
    config.client.dns = vec![Ipv4Addr::new(1, 1, 1, 1)];
    let (server, addr) = start(config, Arc::new(Recorder::default())).await;

    let client = TunnelClient::connect(addr).await.unwrap();
    let setup = client.config();

    // Network address and gateway are never handed out
    assert_eq!(setup.address, Ipv4Addr::new(10, 8, 0, 2));
    assert_eq!(setup.dns, vec![Ipv4Addr::new(1, 1, 1, 1)]);
    assert_eq!(setup.routes.len(), 1);
    assert_eq!(setup.routes[0].destination.to_string(), "0.0.0.0/0");
    assert_eq!(setup.routes[0].gateway, Ipv4Addr::new(10, 8, 0, 1));

    server.stop().await.unwrap();
}
