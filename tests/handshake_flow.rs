//! The three-stage handshake driven end to end over a live gate.

use futures::{FutureExt, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tank_gate::config::GateConfig;
use tank_gate::core::codec::GateCodec;
use tank_gate::core::packet::PacketOut;
use tank_gate::protocol::credentials::seal_direct;
use tank_gate::protocol::Dispatcher;
use tank_gate::store::MemoryAccountStore;
use tank_gate::utils::buffer_pool::BufferPool;
use tank_gate::Gate;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

async fn start_gate(
    config: GateConfig,
    dispatcher: Arc<Dispatcher>,
) -> (Arc<Gate>, SocketAddr, mpsc::Sender<()>) {
    let gate = Arc::new(
        Gate::new(config, Arc::new(MemoryAccountStore::new()), dispatcher).expect("gate wiring"),
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

/// Connect and send the login frame. `rekey` mirrors what a real client does
/// after a login it expects to succeed; leave it off to read the refusal,
/// which the server sends under the pre-login key.
async fn login_client(
    addr: SocketAddr,
    gate: &Gate,
    account: &str,
    credential: &str,
    seed: [u8; 8],
    rekey: bool,
) -> (Framed<TcpStream, GateCodec>, BufferPool) {
    let pool = BufferPool::new(8);
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, GateCodec::new(pool.clone()));

    let public = gate.services().credentials.public_key();
    let blob = seal_direct(&public, seed, account, credential).unwrap();

    let mut login = PacketOut::new(&pool, 1);
    login.write_bool(false); // is_change
    login.write_i32(1); // client version
    login.write_i32(0); // client type
    login.write_bytes(&blob);
    framed.send(login).await.unwrap();

    if rekey {
        framed.codec_mut().set_key(seed);
    }
    (framed, pool)
}

#[tokio::test]
async fn token_login_end_to_end() {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(60, |ctx, _pkt| {
            async move {
                let mut reply = PacketOut::new(ctx.pool(), 60);
                reply.write_i32(ctx.role_id);
                ctx.send(reply).await
            }
            .boxed()
        })
        .unwrap();

    let config = GateConfig::default_with_overrides(|c| c.server.host = "127.0.0.1".into());
    let (gate, addr, _shutdown) = start_gate(config, dispatcher).await;

    // Stage 1 + 2 happen on the HTTP side.
    let auth = gate.auth();
    assert!(auth.create_account("alice", "secret", 7).await.unwrap());
    let web_token = auth
        .web_login("alice", "secret")
        .await
        .unwrap()
        .expect("web token issued");
    assert!(auth.client_login("alice", &web_token, "ck99", 42));

    // Stage 3 happens on the game port, inside the login frame.
    let seed = [11, 22, 33, 44, 55, 66, 77, 88];
    let (mut client, pool) = login_client(addr, &gate, "alice", "ck99", seed, true).await;

    // The rekeyed transport reaches the dispatcher with the bound role id.
    client.send(PacketOut::new(&pool, 60)).await.unwrap();
    let mut reply = client.next().await.expect("open").expect("decoded");
    assert_eq!(reply.pid(), 60);
    assert_eq!(reply.read_i32().unwrap(), 42);
}

#[tokio::test]
async fn consumed_tcp_token_is_refused_with_single_byte() {
    let config = GateConfig::default_with_overrides(|c| c.server.host = "127.0.0.1".into());
    let (gate, addr, _shutdown) = start_gate(config, Arc::new(Dispatcher::new())).await;

    let auth = gate.auth();
    auth.create_account("alice", "secret", 7).await.unwrap();
    let web_token = auth.web_login("alice", "secret").await.unwrap().unwrap();
    assert!(auth.client_login("alice", &web_token, "ck99", 42));

    let (mut first, _) = login_client(addr, &gate, "alice", "ck99", [1; 8], true).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Replaying the same token: the visitor answers with one failure byte,
    // then disconnects.
    let (mut replay, _) = login_client(addr, &gate, "alice", "ck99", [2; 8], false).await;
    let mut refusal = replay.next().await.expect("open").expect("decoded");
    assert_eq!(refusal.pid(), 1);
    assert_eq!(refusal.read_u8().unwrap(), 1);
    assert!(replay.next().await.is_none());

    // The first connection is unaffected: still open.
    let idle = tokio::time::timeout(std::time::Duration::from_millis(100), first.next()).await;
    assert!(idle.is_err(), "first connection should stay open");
}

#[tokio::test]
async fn stage_two_accepts_the_sealed_http_blob() {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(62, |ctx, _pkt| {
            async move {
                let mut reply = PacketOut::new(ctx.pool(), 62);
                reply.write_i32(ctx.role_id);
                ctx.send(reply).await
            }
            .boxed()
        })
        .unwrap();
    let config = GateConfig::default_with_overrides(|c| c.server.host = "127.0.0.1".into());
    let (gate, addr, _shutdown) = start_gate(config, dispatcher).await;

    let auth = gate.auth();
    auth.create_account("alice", "secret", 7).await.unwrap();
    let web_token = auth.web_login("alice", "secret").await.unwrap().unwrap();

    let public = gate.services().credentials.public_key();
    let blob = tank_gate::protocol::credentials::seal_token(
        &public, "alice", &web_token, "ck42", "Alice",
    )
    .unwrap();
    assert!(gate.client_login_blob(42, &blob));
    assert!(!gate.client_login_blob(42, "not a blob"));

    // The tcp token bound through the blob admits a game-port login.
    let (mut client, pool) = login_client(addr, &gate, "alice", "ck42", [9; 8], true).await;
    client.send(PacketOut::new(&pool, 62)).await.unwrap();
    let mut reply = client.next().await.expect("open").expect("decoded");
    assert_eq!(reply.read_i32().unwrap(), 42);
}

#[tokio::test]
async fn web_token_cannot_be_reused() {
    let config = GateConfig::default_with_overrides(|c| c.server.host = "127.0.0.1".into());
    let (gate, _addr, _shutdown) = start_gate(config, Arc::new(Dispatcher::new())).await;

    let auth = gate.auth();
    auth.create_account("alice", "secret", 7).await.unwrap();
    let web_token = auth.web_login("alice", "secret").await.unwrap().unwrap();

    assert!(auth.client_login("alice", &web_token, "k1", 42));
    assert!(!auth.client_login("alice", &web_token, "k2", 42));
}

#[tokio::test]
async fn password_path_works_without_token_stages() {
    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher
        .register(61, |ctx, _pkt| {
            async move {
                let mut reply = PacketOut::new(ctx.pool(), 61);
                reply.write_i32(ctx.role_id);
                ctx.send(reply).await
            }
            .boxed()
        })
        .unwrap();
    let config = GateConfig::default_with_overrides(|c| c.server.host = "127.0.0.1".into());
    let (gate, addr, _shutdown) = start_gate(config, dispatcher).await;

    gate.auth().create_account("bob", "hunter2", 9).await.unwrap();

    let (mut client, pool) = login_client(addr, &gate, "bob", "hunter2", [3; 8], true).await;
    client.send(PacketOut::new(&pool, 61)).await.unwrap();
    let mut reply = client.next().await.unwrap().unwrap();
    // Role id for the password path is the account's external id.
    assert_eq!(reply.read_i32().unwrap(), 9);
}
