//! Frames across a real Unix domain socket pair
//!
//! One side echoes every payload it receives; the other checks that each
//! reply matches in type and content.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use tokio::net::UnixStream;
use wirepack::protocol::{CodecError, Payload};
use wirepack::transport::{Connection, ConnectionError, ConnectionHandle};

#[tokio::test]
async fn test_echo_over_unix_socket() {
    let (client, server) = UnixStream::pair().unwrap();

    let echo = tokio::spawn(async move {
        let mut conn = Connection::new(server);
        let mut echoed = 0;
        while let Some(payload) = conn.recv().await.unwrap() {
            conn.send(&payload).await.unwrap();
            echoed += 1;
        }
        conn.close().await.unwrap();
        echoed
    });

    let payloads = vec![
        Payload::binary(b"Clear is better than clever.".to_vec()),
        Payload::text("Errors are values."),
        Payload::binary(b"Don't panic.".to_vec()),
        Payload::binary(vec![0xA5; 256 * 1024]),
    ];

    let (read_half, write_half) = client.into_split();
    let (handle, writer) = ConnectionHandle::spawn(write_half);
    let mut replies = Connection::new(read_half);

    for p in &payloads {
        handle.send(p.clone()).await.unwrap();
    }
    drop(handle);

    for expected in &payloads {
        let reply = replies.recv().await.unwrap().unwrap();
        assert_eq!(&reply, expected);
    }
    assert!(replies.recv().await.unwrap().is_none());

    assert_eq!(writer.await.unwrap().unwrap().payloads_sent, 4);
    assert_eq!(echo.await.unwrap(), 4);
}

#[tokio::test]
async fn test_peer_hangup_mid_frame() {
    let (client, mut server) = UnixStream::pair().unwrap();

    // Header promises 100 bytes, only 10 arrive before the peer goes away.
    let mut wire = vec![0x02, 0, 0, 0, 100];
    wire.extend_from_slice(b"0123456789");
    tokio::io::AsyncWriteExt::write_all(&mut server, &wire)
        .await
        .unwrap();
    drop(server);

    let mut conn = Connection::new(client);
    let err = conn.recv().await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Codec(CodecError::TruncatedBody {
            expected: 100,
            read: 10
        })
    ));
}
