//! Integration tests for MLLP framing over a byte stream
//!
//! These tests drive the codec through `Framed` on an in-memory duplex pipe,
//! so frames can be split and coalesced the way TCP delivers them.

use futures::{SinkExt, StreamExt};
use medbridge::domain::FrameError;
use medbridge::transport::{decode_frames, encode_frame, MllpCodec, END_BLOCK, START_BLOCK};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};

const ADMIT: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5\r\
EVN|A01|20240101120000\r\
PID|||12345^^^HOSP^PI||DOE^JOHN||19800101|M\r\
PV1||I|CARDIO^101^A||||||||||||||||V0001\r";

#[tokio::test]
async fn test_frame_split_across_writes_is_reassembled() {
    let (client, server) = tokio::io::duplex(64);
    let mut reader = FramedRead::new(server, MllpCodec::new());

    let bytes = encode_frame(ADMIT).unwrap();
    let writer = tokio::spawn(async move {
        let mut client = client;
        for chunk in bytes.chunks(7) {
            client.write_all(chunk).await.unwrap();
            client.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    });

    let frame = reader.next().await.unwrap().unwrap();
    assert_eq!(frame.unwrap(), ADMIT);
    writer.await.unwrap();
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_back_to_back_frames_keep_order() {
    let (client, server) = tokio::io::duplex(4096);
    let mut writer = FramedWrite::new(client, MllpCodec::new());
    let mut reader = FramedRead::new(server, MllpCodec::new());

    let texts: Vec<String> = (1..=5)
        .map(|n| ADMIT.replace("MSG1", &format!("MSG{n}")))
        .collect();
    for text in &texts {
        writer.send(text.clone()).await.unwrap();
    }
    drop(writer);

    let mut received = Vec::new();
    while let Some(frame) = reader.next().await {
        received.push(frame.unwrap().unwrap());
    }
    assert_eq!(received, texts);
}

#[tokio::test]
async fn test_closing_mid_frame_reports_eof() {
    let (mut client, server) = tokio::io::duplex(1024);
    let mut reader = FramedRead::new(server, MllpCodec::new());

    client.write_all(&[START_BLOCK]).await.unwrap();
    client.write_all(b"MSH|^~\\&|HIS").await.unwrap();
    drop(client);

    let frame = reader.next().await.unwrap().unwrap();
    assert!(matches!(frame, Err(FrameError::UnexpectedEof { .. })));
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_oversized_frame_is_skipped_and_stream_recovers() {
    let (mut client, server) = tokio::io::duplex(8192);
    let mut reader = FramedRead::new(server, MllpCodec::with_max_frame_bytes(1024));

    let mut big = vec![START_BLOCK];
    big.extend(std::iter::repeat(b'X').take(2048));
    big.extend_from_slice(&[END_BLOCK, b'\r']);
    client.write_all(&big).await.unwrap();
    client.write_all(&encode_frame(ADMIT).unwrap()).await.unwrap();
    drop(client);

    let first = reader.next().await.unwrap().unwrap();
    assert_eq!(first, Err(FrameError::Oversized { limit: 1024 }));
    let second = reader.next().await.unwrap().unwrap();
    assert_eq!(second.unwrap(), ADMIT);
}

#[test]
fn test_stray_bytes_between_frames() {
    let mut bytes = encode_frame("MSH|A").unwrap();
    bytes.extend_from_slice(b"garbage");
    bytes.extend(encode_frame("MSH|B").unwrap());

    let frames = decode_frames(&bytes);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].as_deref(), Ok("MSH|A"));
    assert_eq!(frames[1], Err(FrameError::MissingStartByte { discarded: 7 }));
    assert_eq!(frames[2].as_deref(), Ok("MSH|B"));
}
