//! Frame and cipher behavior over real TCP sockets.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tank_gate::core::codec::GateCodec;
use tank_gate::core::packet::{PacketIn, PacketOut};
use tank_gate::utils::buffer_pool::BufferPool;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (client, server)
}

#[tokio::test]
async fn many_frames_survive_tcp_segmentation() {
    let pool = BufferPool::new(16);
    let (client, server) = socket_pair().await;
    let mut client_framed = Framed::new(client, GateCodec::new(pool.clone()));
    let mut server_framed = Framed::new(server, GateCodec::new(pool.clone()));

    let sizes: Vec<usize> = (0..200).map(|i| (i * 37) % 2048).collect();

    let writer_sizes = sizes.clone();
    let writer_pool = pool.clone();
    let writer = tokio::spawn(async move {
        for (seq, size) in writer_sizes.into_iter().enumerate() {
            let mut pkt = PacketOut::new(&writer_pool, 90);
            pkt.write_i32(seq as i32);
            pkt.write_bytes(&vec![(seq & 0xFF) as u8; size]);
            client_framed.send(pkt).await.unwrap();
        }
        client_framed
    });

    for (seq, size) in sizes.iter().enumerate() {
        let mut pkt: PacketIn = server_framed
            .next()
            .await
            .expect("stream open")
            .expect("decode ok");
        assert_eq!(pkt.pid(), 90);
        assert_eq!(pkt.read_i32().unwrap(), seq as i32);
        let body = pkt.read_rest();
        assert_eq!(body.len(), *size);
        assert!(body.iter().all(|&b| b == (seq & 0xFF) as u8));
    }

    writer.await.unwrap();
}

#[tokio::test]
async fn reader_resynchronizes_past_leading_garbage() {
    let pool = BufferPool::new(8);
    let (mut client, server) = socket_pair().await;
    let mut server_framed = Framed::new(server, GateCodec::new(pool.clone()));

    // Junk written outside the cipher stream, then well-formed traffic.
    client.write_all(&[0x00u8; 16]).await.unwrap();
    let mut client_framed = Framed::new(client, GateCodec::new(pool.clone()));
    for n in 0..3i32 {
        let mut pkt = PacketOut::new(&pool, 91);
        pkt.write_i32(n);
        client_framed.send(pkt).await.unwrap();
    }

    for n in 0..3i32 {
        let mut pkt = server_framed.next().await.unwrap().unwrap();
        assert_eq!(pkt.pid(), 91);
        assert_eq!(pkt.read_i32().unwrap(), n);
    }
}

#[test]
fn declared_length_matches_wire_bytes() {
    let pool = BufferPool::new(8);
    let mut encoder = GateCodec::new(pool.clone());
    let mut decoder = GateCodec::new(pool.clone());

    let mut pkt = PacketOut::new(&pool, 1);
    pkt.write_bytes(&[7u8; 100]);

    let mut wire = BytesMut::new();
    encoder.encode(pkt, &mut wire).unwrap();
    let wire_len = wire.len();

    let decoded = decoder.decode(&mut wire).unwrap().expect("whole frame");
    // Envelope (6) + header fields (14) + body (100).
    assert_eq!(decoded.declared_len() as usize, wire_len);
    assert_eq!(wire_len, 6 + 14 + 100);
    assert_eq!(decoded.wire_checksum(), decoded.computed_checksum());
    assert_eq!(decoded.wire_checksum() & !0x7FBF, 0);
}
