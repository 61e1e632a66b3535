use super::*;
use std::net::IpAddr;
use tether_storage::RegistryConfig;
use tokio::sync::mpsc;

fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

#[tokio::test]
async fn broadcasts_a_stats_frame_to_every_connection_on_each_tick() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ProjectRegistry::new(dir.path(), RegistryConfig::default()));
    let connections = Arc::new(ConnectionTable::new(10, 10));
    let (tx, mut rx) = mpsc::channel(8);
    connections.register(tether_core::SessionId::new(), localhost(), tx).unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(run_with_interval(
        registry,
        connections,
        shutdown.clone(),
        Duration::from_millis(20),
    ));

    let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("a stats frame within the timeout")
        .expect("channel open");
    assert!(matches!(message, ServerMessage::Stats { .. }));

    shutdown.cancel();
    let _ = handle.await;
}
