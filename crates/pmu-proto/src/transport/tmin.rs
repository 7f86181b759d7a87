// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! T-MIN: a reliable datagram layer above the frame codec (spec §4.5).
//!
//! Single-outstanding window: at most one reliable command is in flight at
//! a time, retransmitted on a timer until ACKed or the retry budget is
//! exhausted. An unreliable side-channel carries fire-and-forget payloads
//! (telemetry, stream start/stop) with no sequencing or retransmission.
//!
//! **Frame-type encoding.** The frame codec's `TYPE` byte carries a T-MIN
//! envelope kind (`DATA`, `ACK`, `UNRELIABLE`, `RESET`, `RESET_ACK`) rather
//! than the device command id directly: the command catalogue's `ERROR`
//! id (`0xE1`) already has its high bit set, so a "high bit marks reliable"
//! scheme over the literal catalogue ids would misdecode it. The command id
//! instead travels as the first byte of the T-MIN payload, ahead of the
//! sequence number on reliable frames.
//!
//! This module is link-agnostic: it encodes/decodes bytes and exposes them
//! through [`Transport::feed`] / [`Transport::poll`] / [`Transport::poll_transmit`],
//! leaving actual I/O to the caller (mirrors the frame decoder's "callers own
//! re-entrancy" contract).

use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_MAX_RETRIES, DEFAULT_RETX_TIMEOUT_MS};
use crate::error::TransportError;
use crate::frame::{encode_frame, FrameDecoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TMinFrameKind {
    Data = 0x00,
    Ack = 0x01,
    Unreliable = 0x02,
    Reset = 0x03,
    ResetAck = 0x04,
}

impl TMinFrameKind {
    fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x00 => Self::Data,
            0x01 => Self::Ack,
            0x02 => Self::Unreliable,
            0x03 => Self::Reset,
            0x04 => Self::ResetAck,
            _ => return None,
        })
    }

    fn tag(self) -> u8 {
        self as u8
    }
}

/// Wraparound-safe `a <= b` over the `u8` sequence space.
fn seq_le(a: u8, b: u8) -> bool {
    b.wrapping_sub(a) < 0x80
}

/// Configuration for retransmit timing.
#[derive(Debug, Clone, Copy)]
pub struct TMinConfig {
    pub retx_timeout: Duration,
    pub max_retries: u32,
}

impl Default for TMinConfig {
    fn default() -> Self {
        Self {
            retx_timeout: Duration::from_millis(DEFAULT_RETX_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone)]
struct Outstanding {
    cmd: u8,
    seq: u8,
    payload: Vec<u8>,
    next_retransmit: Instant,
    attempts: u32,
}

/// Observable counters, in the style of the teacher's reliability stats
/// structs (`ReliableSenderStats`/`ReliableReceiverStats`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportStats {
    pub sent: u64,
    pub retransmitted: u64,
    pub acked: u64,
    pub failed: u64,
    pub duplicates_dropped: u64,
}

/// An event produced by draining inbound bytes through [`Transport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An application payload was delivered: `(cmd_id, payload)`, reliable
    /// (in order) or unreliable.
    Delivered(u8, Vec<u8>),
    /// Our currently outstanding reliable command was ACKed.
    Acked,
    /// Bytes the caller must write to the link (an ACK or RESET reply).
    SendBytes(Vec<u8>),
    /// The peer completed a RESET handshake we initiated.
    ResetAcked,
}

/// Reliable-datagram transport over the frame codec. Owns no link; the
/// caller feeds inbound bytes in and writes outbound bytes out.
pub struct Transport {
    config: TMinConfig,
    decoder: FrameDecoder,
    next_seq_out: u8,
    expected_seq_in: u8,
    outstanding: Option<Outstanding>,
    reset_handshake_done: bool,
    stats: TransportStats,
}

impl Transport {
    #[must_use]
    pub fn new(config: TMinConfig) -> Self {
        Self {
            config,
            decoder: FrameDecoder::new(),
            next_seq_out: 0,
            expected_seq_in: 0,
            outstanding: None,
            reset_handshake_done: true,
            stats: TransportStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Queue a command for reliable delivery. Only one reliable command may
    /// be outstanding at a time; `Transport`'s window is a single slot, and
    /// the device client is expected to issue commands one at a time on top
    /// of it.
    pub fn queue_reliable(&mut self, cmd: u8, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.outstanding.is_some() {
            return Err(TransportError::Protocol {
                code: 0,
                message: "a reliable command is already outstanding".to_string(),
            });
        }
        let seq = self.next_seq_out;
        self.next_seq_out = self.next_seq_out.wrapping_add(1);
        self.outstanding = Some(Outstanding {
            cmd,
            seq,
            payload,
            next_retransmit: Instant::now(),
            attempts: 0,
        });
        Ok(())
    }

    /// Encode a fire-and-forget command; never retransmitted, never ACKed.
    #[must_use]
    pub fn send_unreliable(cmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut inner = Vec::with_capacity(1 + payload.len());
        inner.push(cmd);
        inner.extend_from_slice(payload);
        encode_frame(TMinFrameKind::Unreliable.tag(), &inner)
    }

    /// Produce the next frame to (re)transmit for the outstanding reliable
    /// command, if its retransmit deadline has elapsed. Returns `None` when
    /// nothing is outstanding, the deadline hasn't elapsed, or the retry
    /// budget is exhausted (call [`Transport::take_failure`] to observe
    /// that last case).
    pub fn poll_transmit(&mut self, now: Instant) -> Option<Vec<u8>> {
        let outstanding = self.outstanding.as_mut()?;
        if now < outstanding.next_retransmit {
            return None;
        }
        if outstanding.attempts >= self.config.max_retries {
            return None;
        }

        let is_retransmit = outstanding.attempts > 0;
        outstanding.attempts += 1;
        outstanding.next_retransmit = now + self.config.retx_timeout;
        let seq = outstanding.seq;
        let cmd = outstanding.cmd;
        let payload = outstanding.payload.clone();

        if is_retransmit {
            self.stats.retransmitted += 1;
        } else {
            self.stats.sent += 1;
        }

        let mut inner = Vec::with_capacity(2 + payload.len());
        inner.push(cmd);
        inner.push(seq);
        inner.extend_from_slice(&payload);
        Some(encode_frame(TMinFrameKind::Data.tag(), &inner))
    }

    /// If the outstanding reliable command has exhausted its retry budget,
    /// clear it and report `NoResponse`. Call after a `poll_transmit` tick
    /// returns `None` while [`Transport::has_outstanding`] is still true.
    pub fn take_failure(&mut self) -> Option<TransportError> {
        let exhausted = self
            .outstanding
            .as_ref()
            .is_some_and(|o| o.attempts >= self.config.max_retries);
        if exhausted {
            self.outstanding = None;
            self.stats.failed += 1;
            Some(TransportError::NoResponse)
        } else {
            None
        }
    }

    /// Honor a caller-supplied deadline: clear the outstanding slot so a
    /// late-arriving ACK for it is discarded rather than delivered.
    pub fn cancel_outstanding(&mut self) {
        self.outstanding = None;
    }

    /// Issue a RESET. Until the peer's `RESET_ACK` is observed via
    /// [`Transport::poll`], inbound reliable frames are ignored.
    #[must_use]
    pub fn reset(&mut self) -> Vec<u8> {
        self.outstanding = None;
        self.reset_handshake_done = false;
        self.expected_seq_in = 0;
        encode_frame(TMinFrameKind::Reset.tag(), &[])
    }

    /// Feed newly received bytes from the link.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.decoder.feed(bytes);
    }

    /// Drain all frames decodable from previously fed bytes, producing the
    /// events the caller must act on (deliver to the application, or write
    /// bytes back to the link).
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.decoder.poll() {
            let Ok(frame) = result else {
                // Bad CRC: the frame decoder already resynced; nothing to
                // deliver or ack for this one.
                continue;
            };
            let Some(kind) = TMinFrameKind::from_tag(frame.frame_type) else {
                continue;
            };

            match kind {
                TMinFrameKind::Ack => {
                    if frame.payload.is_empty() {
                        continue;
                    }
                    let acked_seq = frame.payload[0];
                    if let Some(outstanding) = &self.outstanding {
                        if outstanding.seq == acked_seq {
                            self.outstanding = None;
                            self.stats.acked += 1;
                            events.push(TransportEvent::Acked);
                        }
                    }
                }
                TMinFrameKind::Data => {
                    if !self.reset_handshake_done || frame.payload.len() < 2 {
                        continue;
                    }
                    let cmd = frame.payload[0];
                    let seq = frame.payload[1];
                    let inner = &frame.payload[2..];
                    let ack = encode_frame(TMinFrameKind::Ack.tag(), &[seq]);

                    if seq == self.expected_seq_in {
                        self.expected_seq_in = self.expected_seq_in.wrapping_add(1);
                        events.push(TransportEvent::Delivered(cmd, inner.to_vec()));
                        events.push(TransportEvent::SendBytes(ack));
                    } else if seq_le(seq, self.expected_seq_in.wrapping_sub(1)) {
                        // Already delivered; peer's ACK for it must have
                        // been lost. Re-ack, do not re-deliver.
                        self.stats.duplicates_dropped += 1;
                        events.push(TransportEvent::SendBytes(ack));
                    }
                    // Frames further ahead than expected are dropped
                    // silently: the single-outstanding window means the
                    // peer should never get ahead of us.
                }
                TMinFrameKind::Unreliable => {
                    if frame.payload.is_empty() {
                        continue;
                    }
                    events.push(TransportEvent::Delivered(frame.payload[0], frame.payload[1..].to_vec()));
                }
                TMinFrameKind::Reset => {
                    self.expected_seq_in = 0;
                    self.reset_handshake_done = true;
                    events.push(TransportEvent::SendBytes(encode_frame(TMinFrameKind::ResetAck.tag(), &[])));
                }
                TMinFrameKind::ResetAck => {
                    self.reset_handshake_done = true;
                    events.push(TransportEvent::ResetAcked);
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMD_PING: u8 = 0x01;
    const CMD_SET_OUTPUT: u8 = 0x40;
    const CMD_TELEMETRY: u8 = 0x32;

    #[test]
    fn reliable_roundtrip_without_loss() {
        let mut sender = Transport::new(TMinConfig::default());
        let mut receiver = Transport::new(TMinConfig::default());

        sender.queue_reliable(CMD_PING, Vec::new()).unwrap();

        let now = Instant::now();
        let frame = sender.poll_transmit(now).expect("initial send");
        receiver.feed(&frame);

        let events = receiver.poll();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], TransportEvent::Delivered(CMD_PING, Vec::new()));
        let TransportEvent::SendBytes(ack) = &events[1] else {
            panic!("expected ack bytes");
        };

        sender.feed(ack);
        let sender_events = sender.poll();
        assert_eq!(sender_events, vec![TransportEvent::Acked]);
        assert!(!sender.has_outstanding());
        assert_eq!(sender.stats().acked, 1);
    }

    #[test]
    fn dropped_ack_triggers_retransmit_and_dedup_on_receiver() {
        let mut sender = Transport::new(TMinConfig {
            retx_timeout: Duration::from_millis(10),
            max_retries: 5,
        });
        let mut receiver = Transport::new(TMinConfig::default());

        sender.queue_reliable(CMD_SET_OUTPUT, vec![1, 2, 3, 4, 5, 6]).unwrap();

        let now = Instant::now();
        let frame = sender.poll_transmit(now).unwrap();
        receiver.feed(&frame);
        let events = receiver.poll();
        assert!(matches!(events[0], TransportEvent::Delivered(CMD_SET_OUTPUT, _)));
        // Drop the ACK (events[1]) -- never relayed to sender.

        let later = now + Duration::from_millis(20);
        let retransmitted = sender.poll_transmit(later).expect("retransmit");
        receiver.feed(&retransmitted);
        let dedup_events = receiver.poll();

        assert_eq!(dedup_events.len(), 1);
        assert!(matches!(dedup_events[0], TransportEvent::SendBytes(_)));
        assert_eq!(receiver.stats().duplicates_dropped, 1);
        assert_eq!(sender.stats().retransmitted, 1);
    }

    #[test]
    fn exhausting_retries_surfaces_no_response() {
        let mut sender = Transport::new(TMinConfig {
            retx_timeout: Duration::from_millis(1),
            max_retries: 2,
        });
        sender.queue_reliable(CMD_PING, Vec::new()).unwrap();

        let mut now = Instant::now();
        for _ in 0..2 {
            assert!(sender.poll_transmit(now).is_some());
            now += Duration::from_millis(2);
        }
        assert!(sender.poll_transmit(now).is_none());
        let failure = sender.take_failure();
        assert_eq!(failure, Some(TransportError::NoResponse));
        assert!(!sender.has_outstanding());
    }

    #[test]
    fn unreliable_frames_are_never_retransmitted_and_deliver_immediately() {
        let mut receiver = Transport::new(TMinConfig::default());
        let frame = Transport::send_unreliable(CMD_TELEMETRY, b"telemetry-bytes");
        receiver.feed(&frame);
        let events = receiver.poll();
        assert_eq!(
            events,
            vec![TransportEvent::Delivered(CMD_TELEMETRY, b"telemetry-bytes".to_vec())]
        );
    }

    #[test]
    fn reset_handshake_blocks_data_until_complete() {
        let mut initiator = Transport::new(TMinConfig::default());
        let mut peer = Transport::new(TMinConfig::default());

        let reset_frame = initiator.reset();
        peer.feed(&reset_frame);
        let peer_events = peer.poll();
        let TransportEvent::SendBytes(reset_ack) = &peer_events[0] else {
            panic!("expected reset ack bytes");
        };

        initiator.feed(reset_ack);
        let initiator_events = initiator.poll();
        assert_eq!(initiator_events, vec![TransportEvent::ResetAcked]);
    }

    #[test]
    fn cancel_outstanding_discards_late_ack() {
        let mut sender = Transport::new(TMinConfig::default());
        let mut receiver = Transport::new(TMinConfig::default());

        sender.queue_reliable(0x20, Vec::new()).unwrap();
        let frame = sender.poll_transmit(Instant::now()).unwrap();
        receiver.feed(&frame);
        let events = receiver.poll();
        let TransportEvent::SendBytes(ack) = &events[1] else {
            panic!("expected ack");
        };

        sender.cancel_outstanding();
        assert!(!sender.has_outstanding());

        sender.feed(ack);
        let late_events = sender.poll();
        assert!(late_events.is_empty(), "late ack must not be observed as Acked");
    }

    #[test]
    fn seq_le_handles_wraparound() {
        assert!(seq_le(0, 0));
        assert!(seq_le(0, 1));
        assert!(!seq_le(1, 0));
        assert!(seq_le(250, 5));
        assert!(!seq_le(5, 250));
    }

    #[test]
    fn second_queue_while_busy_fails() {
        let mut sender = Transport::new(TMinConfig::default());
        assert!(sender.queue_reliable(CMD_PING, vec![1, 2, 3]).is_ok());
        assert!(sender.queue_reliable(CMD_PING, vec![4, 5, 6]).is_err());
    }

    #[test]
    fn error_command_id_with_native_high_bit_survives_reliable_roundtrip() {
        let mut sender = Transport::new(TMinConfig::default());
        let mut receiver = Transport::new(TMinConfig::default());
        const CMD_ERROR: u8 = 0xE1;

        sender.queue_reliable(CMD_ERROR, vec![0x01, 0x00]).unwrap();
        let frame = sender.poll_transmit(Instant::now()).unwrap();
        receiver.feed(&frame);
        let events = receiver.poll();
        assert_eq!(events[0], TransportEvent::Delivered(CMD_ERROR, vec![0x01, 0x00]));
    }
}
