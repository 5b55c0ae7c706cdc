//! Frame codec: turns a logical command into escaped, checksummed 64-byte HID
//! frames, and reassembles received frames back into a logical packet.
//!
//! Anomalies on the inbound path (missing sync byte, odd direction byte,
//! checksum mismatch, short frames) are warnings, never errors. The chargers
//! disagree among themselves about details of this protocol, so the decoder
//! recovers whatever it can instead of rejecting frames.

use crate::error::IsdtError;
use bytes::Bytes;
use tracing::{debug, warn};

/// Size of one HID frame as exchanged with the transport.
pub const FRAME_SIZE: usize = 64;

/// Frame payload capacity: 64 bytes minus the direction and length bytes.
const FRAME_CHUNK: usize = FRAME_SIZE - 2;

/// Synchronization byte. Sent once, unescaped, at the start of every logical
/// packet; duplicated wherever it occurs as ordinary data.
pub const SYNC: u8 = 0xAA;

/// Frame direction markers (frame byte 0).
const FRAME_REQUEST: u8 = 0x01;
const FRAME_RESPONSE: u8 = 0x02;

/// Logical packet direction markers (first byte after the sync byte).
const DIR_HOST_TO_DEVICE: u8 = 0x12;
const DIR_DEVICE_TO_HOST: u8 = 0x21;

/// Duplicate every literal `0xAA` so a lone `0xAA` stays recognizable as a
/// sync marker.
pub fn escape_sync(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    for &b in payload {
        if b == SYNC {
            out.push(SYNC);
        }
        out.push(b);
    }
    out
}

/// Undo [`escape_sync`]. A run of `0xAA` bytes alternates between sync marker
/// and escaped data: a pair collapses into one literal `0xAA`, while a lone
/// `0xAA` followed by something else is dropped and the next byte kept.
///
/// Dropping the stray sync byte (instead of erroring out) loses no data and
/// keeps partially garbled captures decodable, so that is what we do.
pub fn unescape_sync(payload: &[u8]) -> Vec<u8> {
    let mut sync_seen = false;
    let mut out = Vec::with_capacity(payload.len());
    unescape_into(payload, &mut sync_seen, &mut out);
    out
}

/// Streaming core of [`unescape_sync`]. `sync_seen` persists across calls:
/// an escaped pair may straddle a frame boundary, so the reassembler must
/// unescape the frame bodies as one continuous stream, not in isolation.
fn unescape_into(payload: &[u8], sync_seen: &mut bool, out: &mut Vec<u8>) {
    for &b in payload {
        if b == SYNC {
            if *sync_seen {
                out.push(SYNC);
            }
            *sync_seen = !*sync_seen;
        } else {
            if *sync_seen {
                warn!("sync byte seen mid-packet, discarding it and keeping the next byte");
            }
            *sync_seen = false;
            out.push(b);
        }
    }
}

/// 8-bit additive checksum over `data`.
fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Build the HID frames for one outbound command payload.
///
/// The inner packet is `0x12`, the payload length, the payload and an 8-bit
/// additive checksum; it is escaped, prefixed with a single unescaped sync
/// byte, split into 62-byte chunks and wrapped into zero-padded 64-byte
/// frames.
pub fn encode_command(payload: &[u8]) -> Result<Vec<[u8; FRAME_SIZE]>, IsdtError> {
    if payload.len() > u8::MAX as usize {
        return Err(IsdtError::PayloadTooLong(payload.len()));
    }

    let mut inner = Vec::with_capacity(payload.len() + 3);
    inner.push(DIR_HOST_TO_DEVICE);
    inner.push(payload.len() as u8);
    inner.extend_from_slice(payload);
    inner.push(checksum(&inner));

    let mut stream = escape_sync(&inner);
    stream.insert(0, SYNC);

    let frames = stream
        .chunks(FRAME_CHUNK)
        .map(|chunk| {
            let mut frame = [0u8; FRAME_SIZE];
            frame[0] = FRAME_REQUEST;
            frame[1] = chunk.len() as u8;
            frame[2..2 + chunk.len()].copy_from_slice(chunk);
            frame
        })
        .collect::<Vec<_>>();

    debug!(
        payload_len = payload.len(),
        frames = frames.len(),
        "encoded command"
    );
    Ok(frames)
}

/// Outcome of feeding one frame into the [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembly {
    /// More frames are needed.
    Incomplete,
    /// The reassembled logical packet payload (opcode first).
    Complete(Bytes),
}

#[derive(Debug)]
enum State {
    AwaitingFirstFrame,
    Accumulating {
        expected_len: usize,
        // Unescape state carried from the previous frame body.
        sync_seen: bool,
        buffer: Vec<u8>,
    },
}

/// Inbound reassembly state machine.
///
/// Feed it frames as they arrive; it unescapes and accumulates them until the
/// inner packet's declared length (announced in the first frame) is covered,
/// then validates the checksum and hands back the payload. One instance
/// reassembles one packet at a time and resets itself on completion.
#[derive(Debug)]
pub struct Reassembler {
    state: State,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingFirstFrame,
        }
    }

    /// Feed one received frame into the state machine.
    ///
    /// A frame shorter than 3 bytes aborts reassembly and yields whatever has
    /// accumulated so far; short reads happen on garbled captures and the
    /// partial data is still worth handing to the caller.
    pub fn push_frame(&mut self, frame: &[u8]) -> Reassembly {
        if frame.len() < 3 {
            warn!(
                len = frame.len(),
                "frame too short, returning already captured data"
            );
            return self.abort();
        }

        if frame[0] != FRAME_REQUEST && frame[0] != FRAME_RESPONSE {
            warn!(marker = frame[0], "frame is neither request nor response");
        }

        // The chargers disagree about the meaning of the declared length:
        // some count the bytes after the length field, some the whole frame.
        // Reading `declared + 2` bytes covers both, and clamping to the
        // received length keeps us inside the frame.
        let body_end = usize::min(frame[1] as usize + 2, frame.len());
        let body = &frame[2..body_end];

        match &mut self.state {
            State::AwaitingFirstFrame => {
                if body.len() < 3 {
                    warn!(len = body.len(), "first frame body too short for a packet header");
                    return self.abort();
                }
                if body[0] != SYNC {
                    warn!("initial frame of packet is missing synchronization");
                }
                if body[1] != DIR_HOST_TO_DEVICE && body[1] != DIR_DEVICE_TO_HOST {
                    warn!(direction = body[1], "unrecognized packet direction");
                }
                let expected_len = body[2] as usize;
                // Skip only the sync byte; the direction byte onward takes
                // part in the checksum and must be unescaped.
                let mut sync_seen = false;
                let mut buffer = Vec::with_capacity(body.len());
                unescape_into(&body[1..], &mut sync_seen, &mut buffer);
                self.state = State::Accumulating {
                    expected_len,
                    sync_seen,
                    buffer,
                };
            }
            State::Accumulating {
                sync_seen, buffer, ..
            } => {
                unescape_into(body, sync_seen, buffer);
            }
        }

        self.try_finish()
    }

    /// Give up and surface the partial accumulator.
    fn abort(&mut self) -> Reassembly {
        let data = match std::mem::replace(&mut self.state, State::AwaitingFirstFrame) {
            State::AwaitingFirstFrame => Vec::new(),
            State::Accumulating { buffer, .. } => buffer,
        };
        Reassembly::Complete(Bytes::from(data))
    }

    fn try_finish(&mut self) -> Reassembly {
        let State::Accumulating {
            expected_len,
            buffer,
            ..
        } = &self.state
        else {
            return Reassembly::Incomplete;
        };

        // The declared length covers neither the two header bytes nor the
        // trailing checksum, hence the + 3.
        if buffer.len() < expected_len + 3 {
            return Reassembly::Incomplete;
        }

        let (expected_len, mut buffer) =
            match std::mem::replace(&mut self.state, State::AwaitingFirstFrame) {
                State::Accumulating {
                    expected_len,
                    buffer,
                    ..
                } => (expected_len, buffer),
                State::AwaitingFirstFrame => unreachable!(),
            };

        let received = buffer[expected_len + 2];
        buffer.truncate(expected_len + 2);
        let calculated = checksum(&buffer);
        if calculated != received {
            warn!(
                calculated = format_args!("{calculated:#04x}"),
                received = format_args!("{received:#04x}"),
                "packet checksum mismatch"
            );
        }

        // Drop the direction and inner length bytes.
        Reassembly::Complete(Bytes::from(buffer).slice(2..))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_roundtrip_all_byte_values() {
        let payload: Vec<u8> = (0..=255u8).collect();
        assert_eq!(unescape_sync(&escape_sync(&payload)), payload);
    }

    #[test]
    fn lone_sync_byte_is_dropped() {
        let payload = [0x01, 0x02, 0xAA, 0xAA, 0xAA, 0x01];
        assert_eq!(unescape_sync(&payload), vec![0x01, 0x02, 0xAA, 0x01]);
    }

    #[test]
    fn escaping_duplicates_sync() {
        assert_eq!(escape_sync(&[0xAA, 0x01]), vec![0xAA, 0xAA, 0x01]);
    }

    #[test]
    fn declared_length_clamped_to_received_frame() {
        // Frame claims far more bytes than were actually received; the body
        // must stop at the physical end of the frame.
        let mut reasm = Reassembler::new();
        let frame = [0x02, 0x3E, 0xAA, 0x21, 0x01, 0x07, 0x29];
        match reasm.push_frame(&frame) {
            Reassembly::Complete(payload) => assert_eq!(payload.as_ref(), &[0x07]),
            Reassembly::Incomplete => panic!("expected a complete packet"),
        }
    }

    #[test]
    fn escaped_pair_split_across_frames() {
        // Packet 0x21 0x01 0xAA 0xCC, escaped to AA 21 01 AA AA CC and cut
        // so the doubled sync byte straddles the two frames.
        let mut reasm = Reassembler::new();
        assert_eq!(
            reasm.push_frame(&[0x02, 0x04, 0xAA, 0x21, 0x01, 0xAA]),
            Reassembly::Incomplete
        );
        match reasm.push_frame(&[0x02, 0x02, 0xAA, 0xCC]) {
            Reassembly::Complete(payload) => assert_eq!(payload.as_ref(), &[0xAA]),
            Reassembly::Incomplete => panic!("expected a complete packet"),
        }
    }

    #[test]
    fn short_frame_aborts_with_partial_data() {
        let mut reasm = Reassembler::new();
        // First frame announces a 16-byte packet, then the capture breaks off.
        let first = [0x02, 0x06, 0xAA, 0x21, 0x10, 0x01, 0x02, 0x03];
        assert_eq!(reasm.push_frame(&first), Reassembly::Incomplete);
        match reasm.push_frame(&[0x02]) {
            Reassembly::Complete(partial) => {
                assert_eq!(partial.as_ref(), &[0x21, 0x10, 0x01, 0x02, 0x03]);
            }
            Reassembly::Incomplete => panic!("short frame must terminate reassembly"),
        }
    }
}
