// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Start-byte framed transport codec.
//!
//! # Wire layout (little-endian)
//!
//! ```text
//! +----+------+------+---------+------+
//! | AA | LEN  | TYPE | PAYLOAD | CRC  |
//! | u8 | u16  | u8   | LEN B   | u16  |
//! +----+------+------+---------+------+
//! ```
//!
//! `LEN` counts only the payload. `CRC` is CRC-16/CCITT-FALSE over
//! `LEN || TYPE || PAYLOAD` (the start byte is excluded). Minimum frame size
//! is 6 bytes (empty payload).

use crate::crc::crc16_ccitt;

/// Fixed frame start byte.
pub const START_BYTE: u8 = 0xAA;

/// Minimum possible frame size: start + len(2) + type(1) + crc(2).
pub const MIN_FRAME_SIZE: usize = 6;

/// Maximum payload length representable by the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// A decoded application frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }
}

/// Errors surfaced by frame decoding. Framing/CRC errors are locally
/// recoverable: the decoder resyncs and continues rather than failing the
/// whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// CRC-16 did not match; the corrupt frame has been skipped.
    BadCrc,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadCrc => write!(f, "frame CRC-16 mismatch"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode `(frame_type, payload)` into a standalone byte vector. Total
/// function: never fails (payload longer than `MAX_PAYLOAD_LEN` is truncated
/// at the call site's discretion, not here, since the wire format simply
/// cannot represent it -- callers must size payloads themselves).
#[must_use]
pub fn encode_frame(frame_type: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN, "payload exceeds u16 length field");
    let len = payload.len() as u16;
    let mut buf = Vec::with_capacity(MIN_FRAME_SIZE + payload.len());
    buf.push(START_BYTE);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.push(frame_type);
    buf.extend_from_slice(payload);

    let crc = crc16_ccitt(&buf[1..]);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Outcome of attempting to decode one frame from the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A full, CRC-valid frame was decoded; `consumed` bytes should be
    /// dropped from the front of the input buffer.
    Frame { frame: Frame, consumed: usize },
    /// Garbage bytes were skipped before (re)finding a start byte; no frame
    /// was produced. `consumed` bytes should be dropped.
    GarbageSkipped { consumed: usize },
    /// A frame-shaped region was found but its CRC did not match; it has
    /// been skipped so the stream can resync on the next start byte.
    BadCrc { consumed: usize },
    /// Not enough bytes buffered yet to make a decision; caller should wait
    /// for more input. Nothing is consumed.
    NeedMore,
}

/// Attempt to decode a single frame from the front of `buf`.
///
/// Contract: returns `NeedMore` (consuming nothing) rather than blocking;
/// callers own the re-entrancy loop (see [`FrameDecoder`] for a stateful
/// wrapper). A single call never decodes more than one frame.
pub fn decode_one(buf: &[u8]) -> DecodeOutcome {
    // Find the next start byte; anything before it is garbage.
    let Some(start) = buf.iter().position(|&b| b == START_BYTE) else {
        return if buf.is_empty() {
            DecodeOutcome::NeedMore
        } else {
            DecodeOutcome::GarbageSkipped { consumed: buf.len() }
        };
    };
    if start > 0 {
        return DecodeOutcome::GarbageSkipped { consumed: start };
    }

    // Need at least the 4-byte header (start + len + type) to know the
    // payload length.
    if buf.len() < 4 {
        return DecodeOutcome::NeedMore;
    }

    let len = u16::from_le_bytes([buf[1], buf[2]]) as usize;
    let frame_type = buf[3];
    let total_len = 4 + len + 2;

    if buf.len() < total_len {
        return DecodeOutcome::NeedMore;
    }

    let crc_covered = &buf[1..4 + len];
    let stored_crc = u16::from_le_bytes([buf[4 + len], buf[5 + len]]);
    let computed_crc = crc16_ccitt(crc_covered);

    if computed_crc != stored_crc {
        // Skip just the start byte so the next call can search for another
        // sync point inside what might itself be a valid frame's payload.
        return DecodeOutcome::BadCrc { consumed: 1 };
    }

    DecodeOutcome::Frame {
        frame: Frame::new(frame_type, buf[4..4 + len].to_vec()),
        consumed: total_len,
    }
}

/// Stateful, streaming wrapper over [`decode_one`]: owns a growable buffer
/// so callers can feed arbitrarily-sized chunks (serial reads, TCP reads)
/// and poll for decoded frames without re-assembling partial frames
/// themselves.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append newly received bytes to the internal buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Try to decode the next frame. Returns `None` when more bytes are
    /// needed; garbage and bad-CRC regions are skipped internally and never
    /// surfaced as `None` unless the buffer is genuinely exhausted.
    pub fn poll(&mut self) -> Option<Result<Frame, FrameError>> {
        loop {
            match decode_one(&self.buf) {
                DecodeOutcome::Frame { frame, consumed } => {
                    self.buf.drain(..consumed);
                    return Some(Ok(frame));
                }
                DecodeOutcome::GarbageSkipped { consumed } => {
                    self.buf.drain(..consumed);
                    continue;
                }
                DecodeOutcome::BadCrc { consumed } => {
                    self.buf.drain(..consumed);
                    return Some(Err(FrameError::BadCrc));
                }
                DecodeOutcome::NeedMore => return None,
            }
        }
    }

    /// Number of bytes currently buffered and not yet decoded.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_frame_matches_known_bytes() {
        // AA 00 00 01 CRClo CRChi, CRC over 00 00 01 == 0x1EE0
        let encoded = encode_frame(0x01, &[]);
        assert_eq!(encoded, vec![0xAA, 0x00, 0x00, 0x01, 0xE0, 0x1E]);
        assert_eq!(crc16_ccitt(&[0x00, 0x00, 0x01]), 0x1EE0);
    }

    #[test]
    fn encode_decode_roundtrip_various_sizes() {
        for frame_type in [0x00u8, 0x01, 0x20, 0xFF] {
            for payload_len in [0usize, 1, 5, 64, 300] {
                let payload: Vec<u8> = (0..payload_len).map(|i| (i % 251) as u8).collect();
                let encoded = encode_frame(frame_type, &payload);
                match decode_one(&encoded) {
                    DecodeOutcome::Frame { frame, consumed } => {
                        assert_eq!(consumed, encoded.len());
                        assert_eq!(frame.frame_type, frame_type);
                        assert_eq!(frame.payload, payload);
                    }
                    other => panic!("expected Frame, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn need_more_on_partial_frame() {
        let encoded = encode_frame(0x10, b"hello");
        for cut in 0..encoded.len() {
            assert_eq!(decode_one(&encoded[..cut]), DecodeOutcome::NeedMore);
        }
    }

    #[test]
    fn garbage_before_start_byte_is_skipped() {
        let mut stream = vec![0x00, 0x11, 0x22];
        stream.extend(encode_frame(0x01, b"x"));
        match decode_one(&stream) {
            DecodeOutcome::GarbageSkipped { consumed } => assert_eq!(consumed, 3),
            other => panic!("expected GarbageSkipped, got {other:?}"),
        }
    }

    #[test]
    fn bad_crc_is_detected_and_skippable() {
        let mut encoded = encode_frame(0x01, b"test data");
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        match decode_one(&encoded) {
            DecodeOutcome::BadCrc { consumed } => assert_eq!(consumed, 1),
            other => panic!("expected BadCrc, got {other:?}"),
        }
    }

    #[test]
    fn decoder_resyncs_after_corruption_without_losing_subsequent_frames() {
        let mut stream = Vec::new();
        stream.extend(encode_frame(0x01, b"first"));
        // corrupt a single payload byte inside the first frame to flip its CRC
        let corrupt_idx = 5; // inside "first"'s payload region
        stream[corrupt_idx] ^= 0xFF;
        stream.extend(encode_frame(0x02, b"second"));

        let mut decoder = FrameDecoder::new();
        decoder.feed(&stream);

        let mut frames = Vec::new();
        let mut errors = 0;
        while let Some(result) = decoder.poll() {
            match result {
                Ok(frame) => frames.push(frame),
                Err(FrameError::BadCrc) => errors += 1,
            }
        }

        assert!(errors >= 1, "expected at least one BadCrc to be reported");
        assert!(frames.iter().any(|f| f.payload == b"second"));
    }

    #[test]
    fn streaming_decoder_handles_byte_at_a_time_feed() {
        let mut stream = Vec::new();
        stream.extend(encode_frame(0x01, b"a"));
        stream.extend(encode_frame(0x02, b"bb"));
        stream.extend(encode_frame(0x03, b"ccc"));

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in stream {
            decoder.feed(&[byte]);
            while let Some(Ok(frame)) = decoder.poll() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, b"a");
        assert_eq!(frames[1].payload, b"bb");
        assert_eq!(frames[2].payload, b"ccc");
    }

    #[test]
    fn empty_payload_roundtrip() {
        let encoded = encode_frame(0x01, &[]);
        match decode_one(&encoded) {
            DecodeOutcome::Frame { frame, consumed } => {
                assert_eq!(consumed, MIN_FRAME_SIZE);
                assert!(frame.payload.is_empty());
            }
            other => panic!("expected Frame, got {other:?}"),
        }
    }
}
