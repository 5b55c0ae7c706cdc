//! Frame codec round-trips, against both generated and captured frames.

use isdt_lib::frame::{FRAME_SIZE, Reassembler, Reassembly, encode_command};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn reassemble(frames: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    let mut reassembler = Reassembler::new();
    for frame in frames {
        if let Reassembly::Complete(payload) = reassembler.push_frame(&frame) {
            return payload.to_vec();
        }
    }
    panic!("ran out of frames before the packet completed");
}

fn roundtrip(payload: &[u8]) -> Vec<u8> {
    let frames = encode_command(payload).unwrap();
    reassemble(frames.iter().map(|f| f.to_vec()))
}

#[test]
fn short_payload_roundtrip() {
    let payload = b"0123456789";
    let frames = encode_command(payload).unwrap();
    assert_eq!(frames.len(), 1);
    // Byte-exact against a capture of the reference tooling.
    let mut expected = [0u8; FRAME_SIZE];
    let head = hex::decode("010eaa120a3031323334353637383929").unwrap();
    expected[..head.len()].copy_from_slice(&head);
    assert_eq!(frames[0], expected);

    assert_eq!(roundtrip(payload), payload);
}

#[test]
fn long_payload_spans_multiple_frames() {
    let payload: Vec<u8> = b"0123456789".repeat(7);
    let frames = encode_command(&payload).unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0][1], 62);
    assert_eq!(frames[1][1], 12);
    assert_eq!(roundtrip(&payload), payload);
}

#[test]
fn payload_with_sync_byte_survives() {
    let mut payload = vec![0x01, 0xAA, 0x02];
    assert_eq!(roundtrip(&payload), payload);

    // Force the escaped sync pair across a frame boundary.
    payload = vec![0x55; 58];
    payload.push(0xAA);
    payload.extend_from_slice(&[0x66; 20]);
    assert_eq!(roundtrip(&payload), payload);
}

#[test]
fn oversized_payload_is_rejected() {
    assert!(encode_command(&[0u8; 256]).is_err());
    assert!(encode_command(&[0u8; 255]).is_ok());
}

#[test]
fn wrong_checksum_is_tolerated() {
    let mut frames = encode_command(b"0123456789").unwrap();
    // Flip the trailing checksum byte; the payload must still come through.
    frames[0][15] ^= 0xFF;
    let payload = reassemble(frames.iter().map(|f| f.to_vec()));
    assert_eq!(payload, b"0123456789");
}

struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[test]
fn checksum_mismatch_warns_instead_of_failing() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));

    tracing::subscriber::with_default(subscriber, || {
        let mut frames = encode_command(b"0123456789").unwrap();
        frames[0][15] ^= 0xFF;
        let payload = reassemble(frames.iter().map(|f| f.to_vec()));
        assert_eq!(payload, b"0123456789");
    });

    assert_eq!(warnings.load(Ordering::Relaxed), 1);
}

/// Multi-frame packet captured from the official firmware updater, with an
/// escaped 0xAA in the payload.
#[test]
fn captured_update_packet_with_embedded_sync() {
    let capture = [
        hex::decode(
            "013eaa1286f4000043000801e500770100003e10000b800005f10000e700009b00007f00004f40\
             001f40000f70000f70000f70002f40004f30007e0000aaaa00",
        )
        .unwrap(),
        hex::decode(
            "013e01f60006e0000d70004b0000004f0000204f01109fcfcf6004efc20004fbe2000b70970001\
             00100000007f000000007f000000007f000000007f00004fff",
        )
        .unwrap(),
        hex::decode("010ffffffb14449f444300007f00000090").unwrap(),
    ];
    let expected = hex::decode(
        "f4000043000801e500770100003e10000b800005f10000e700009b00007f00004f40001f40000f7000\
         0f70000f70002f40004f30007e0000aa0001f60006e0000d70004b0000004f0000204f01109fcfcf60\
         04efc20004fbe2000b7097000100100000007f000000007f000000007f000000007f00004ffffffffb\
         14449f444300007f000000",
    )
    .unwrap();

    let payload = reassemble(capture.clone());
    assert_eq!(payload.len(), 0x86);
    assert_eq!(payload, expected);

    // And the encoder reproduces the updater's frames bit for bit (modulo
    // the zero padding the captures omit).
    let generated = encode_command(&expected).unwrap();
    assert_eq!(generated.len(), capture.len());
    for (generated, captured) in generated.iter().zip(&capture) {
        assert_eq!(&generated[..captured.len()], captured.as_slice());
        assert!(generated[captured.len()..].iter().all(|&b| b == 0));
    }
}
