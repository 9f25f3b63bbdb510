//! Global and per-IP admission limits, observed from the client side.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tank_gate::config::GateConfig;
use tank_gate::protocol::Dispatcher;
use tank_gate::store::MemoryAccountStore;
use tank_gate::Gate;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

async fn start_gate(config: GateConfig) -> (Arc<Gate>, SocketAddr, mpsc::Sender<()>) {
    let gate = Arc::new(
        Gate::new(
            config,
            Arc::new(MemoryAccountStore::new()),
            Arc::new(Dispatcher::new()),
        )
        .expect("gate wiring"),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server = Arc::clone(&gate);
    tokio::spawn(async move {
        server.serve_on(listener, shutdown_rx).await.unwrap();
    });
    (gate, addr, shutdown_tx)
}

/// Refused sockets are closed outright: the next read returns EOF.
async fn expect_eof(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut byte))
        .await
        .expect("refused socket should close promptly");
    assert_eq!(read.unwrap(), 0);
}

/// Admitted sockets idle until the login timeout: a short read times out.
async fn expect_open(stream: &mut TcpStream) {
    let mut byte = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_millis(150), stream.read(&mut byte)).await;
    assert!(read.is_err(), "admitted socket should stay open");
}

#[tokio::test]
async fn per_ip_limit_refuses_excess_connections() {
    let config = GateConfig::default_with_overrides(|c| {
        c.server.host = "127.0.0.1".into();
        c.server.per_ip_limit = 2;
    });
    let (_gate, addr, _shutdown) = start_gate(config).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let mut second = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let mut third = TcpStream::connect(addr).await.unwrap();

    expect_eof(&mut third).await;
    expect_open(&mut first).await;
    expect_open(&mut second).await;
}

#[tokio::test]
async fn global_limit_refuses_and_recovers() {
    let config = GateConfig::default_with_overrides(|c| {
        c.server.host = "127.0.0.1".into();
        c.server.max_connections = 1;
        c.server.per_ip_limit = 4;
    });
    let (_gate, addr, _shutdown) = start_gate(config).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let mut second = TcpStream::connect(addr).await.unwrap();

    expect_eof(&mut second).await;
    expect_open(&mut first).await;

    // Releasing the only slot lets the next connection in.
    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut third = TcpStream::connect(addr).await.unwrap();
    expect_open(&mut third).await;
}
