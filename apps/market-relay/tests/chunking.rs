//! Chunk Boundary Tests
//!
//! Decoded output must not depend on how the byte stream was split.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::{Bytes, BytesMut};
use market_relay::{
    CommandWriter, DecoderConfig, Frame, FrameDecoder, FrameError, Parameters, ProtocolMessage,
    Value,
};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn order_event(id: i64) -> ProtocolMessage {
    let mut params = Parameters::new();
    params.insert(
        0,
        Value::Array(vec![
            Value::String(format!(
                r#"{{"Id":{id},"ItemTypeId":"T4_BAG","UnitPriceSilver":900,"Amount":1,"AuctionType":"offer"}}"#
            )),
            Value::Dictionary(vec![(Value::String("Id".into()), Value::Long(id + 1))]),
        ]),
    );
    params.insert(1, Value::Bytes(vec![0xAB; 40]));
    ProtocolMessage::event(91, params)
}

fn stream() -> Bytes {
    let mut join = Parameters::new();
    join.insert(8, Value::String("3005".into()));
    let mut request = Parameters::new();
    request.insert(1, Value::Int(-7));
    request.insert(2, Value::Bool(true));
    // Long code carried in the override parameter.
    let long_code = ProtocolMessage::request(700, request);

    CommandWriter::new()
        .ping()
        .reliable(&ProtocolMessage::response(2, join))
        .unreliable(&order_event(1))
        .fragmented(&order_event(2), 64)
        // Unknown command type, skipped by its declared length.
        .raw(&[42, 0, 0, 0, 0, 0, 0, 16, 0, 0, 0, 1, 9, 9, 9, 9])
        .reliable(&long_code)
        .connect()
        .fragmented(&order_event(3), 17)
        .disconnect()
        .finish()
}

/// Good event, a command claiming 200 bytes with only four behind it, then
/// another good event and nothing more.
fn stream_with_overlong_tail() -> Bytes {
    let mut overlong = vec![6, 0, 0, 0, 0, 0, 0, 200, 0, 0, 0, 0];
    overlong.extend_from_slice(&[0xEE; 4]);

    CommandWriter::new()
        .reliable(&ProtocolMessage::event(14, Parameters::new()))
        .raw(&overlong)
        .reliable(&ProtocolMessage::event(15, Parameters::new()))
        .finish()
}

fn decode_all(chunks: &[&[u8]]) -> Vec<Result<Frame, FrameError>> {
    let mut decoder = FrameDecoder::new(DecoderConfig::default());
    let mut buf = BytesMut::new();
    let mut items = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(item) = decoder.decode(&mut buf).unwrap() {
            items.push(item);
        }
    }
    while let Some(item) = decoder.decode_eof(&mut buf).unwrap() {
        items.push(item);
    }
    items
}

fn split_at_points(bytes: &[u8], mut points: Vec<usize>) -> Vec<&[u8]> {
    points.retain(|&p| p > 0 && p < bytes.len());
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::with_capacity(points.len() + 1);
    let mut start = 0;
    for point in points {
        chunks.push(&bytes[start..point]);
        start = point;
    }
    chunks.push(&bytes[start..]);
    chunks
}

#[test]
fn whole_stream_decodes_as_expected() {
    let bytes = stream();
    let items = decode_all(&[&bytes]);

    let codes: Vec<_> = items
        .iter()
        .map(|item| match item {
            Ok(Frame::Message(message)) => format!("{}:{}", message.kind.as_str(), message.code),
            Ok(Frame::Disconnect) => "disconnect".to_string(),
            Ok(Frame::Reconnect) => "reconnect".to_string(),
            Err(e) => e.kind().to_string(),
        })
        .collect();
    assert_eq!(
        codes,
        vec![
            "response:2",
            "event:91",
            "event:91",
            "unknown_command",
            "request:700",
            "reconnect",
            "event:91",
            "disconnect",
        ]
    );
}

#[test]
fn byte_at_a_time_matches_whole_stream() {
    let bytes = stream();
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_all(&singles), decode_all(&[&bytes]));
}

#[test]
fn overlong_command_at_end_does_not_swallow_following_event() {
    let bytes = stream_with_overlong_tail();
    let items = decode_all(&[&bytes]);

    assert_eq!(items.len(), 3);
    assert!(matches!(&items[0], Ok(Frame::Message(m)) if m.code == 14));
    assert!(matches!(items[1], Err(FrameError::Truncated { .. })));
    assert!(matches!(&items[2], Ok(Frame::Message(m)) if m.code == 15));

    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(decode_all(&singles), items);
}

proptest! {
    #[test]
    fn arbitrary_split_points_do_not_change_output(
        points in prop::collection::vec(0usize..2048, 0..40)
    ) {
        let bytes = stream();
        let expected = decode_all(&[&bytes]);
        let chunks = split_at_points(&bytes, points);
        prop_assert_eq!(decode_all(&chunks), expected);
    }

    #[test]
    fn uniform_chunk_sizes_do_not_change_output(size in 1usize..256) {
        let bytes = stream();
        let expected = decode_all(&[&bytes]);
        let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
        prop_assert_eq!(decode_all(&chunks), expected);
    }

    #[test]
    fn overlong_tail_output_is_chunk_independent(
        points in prop::collection::vec(0usize..128, 0..12)
    ) {
        let bytes = stream_with_overlong_tail();
        let expected = decode_all(&[&bytes]);
        let chunks = split_at_points(&bytes, points);
        prop_assert_eq!(decode_all(&chunks), expected);
    }
}
