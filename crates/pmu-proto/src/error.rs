// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Exhaustive, disjoint error taxonomy shared by the config codec, telemetry
//! codec, and transport layer. Hand-rolled enums with manual `Display` +
//! `std::error::Error` impls, matching the core crate's error style: no
//! `thiserror` here, it lives one layer up in the satellite tool crates.

use std::fmt;

/// Errors raised while decoding a [`crate::channel::Config`] or individual
/// channel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer bytes remained than the structure being decoded requires.
    Truncated { offset: usize },
    /// `channel_type` byte did not match any known tag.
    BadTag { offset: usize },
    /// `name_len` exceeded the 31-byte limit.
    NameTooLong { offset: usize },
    /// Name bytes were not valid UTF-8.
    NameNotUtf8 { offset: usize },
    /// The header's `config_size` did not match the variant's pinned width.
    ConfigSizeMismatch { expected: usize, actual: usize },
    /// A `channel_id` appeared more than once in the same config.
    DuplicateId { id: u16 },
    /// A reference field named a channel id absent from the config.
    DanglingRef { id: u16 },
    /// The reference graph contains a cycle; the first channel id found in
    /// the offending chain is reported.
    CyclicRef { id: u16 },
    /// A per-variant range constraint was violated (e.g. too many LOGIC
    /// inputs, name too long at the validator stage).
    RangeExceeded { field: &'static str },
    /// An output channel had `hw_device == NONE`, or a virtual channel had
    /// a non-`NONE` `hw_device`.
    InvalidHardwareBinding { channel_id: u16 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset } => write!(f, "truncated config data at offset {offset}"),
            Self::BadTag { offset } => write!(f, "unrecognized tag at offset {offset}"),
            Self::NameTooLong { offset } => write!(f, "channel name too long at offset {offset}"),
            Self::NameNotUtf8 { offset } => write!(f, "channel name is not valid UTF-8 at offset {offset}"),
            Self::ConfigSizeMismatch { expected, actual } => {
                write!(f, "config_size mismatch: expected {expected}, got {actual}")
            }
            Self::DuplicateId { id } => write!(f, "duplicate channel id {id}"),
            Self::DanglingRef { id } => write!(f, "dangling reference to channel id {id}"),
            Self::CyclicRef { id } => write!(f, "cyclic reference involving channel id {id}"),
            Self::RangeExceeded { field } => write!(f, "range exceeded for field {field}"),
            Self::InvalidHardwareBinding { channel_id } => {
                write!(f, "invalid hardware binding on channel {channel_id}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while decoding a telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// Fewer bytes remained than `section_flags` demands.
    Truncated { needed: usize, available: usize },
    /// The `VIRTUALS` section reported a count above the 32-entry bound.
    TooManyVirtuals { count: usize },
    /// A logged-packet envelope had the wrong magic or version.
    BadEnvelope,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "telemetry packet truncated: needed {needed} bytes, had {available}")
            }
            Self::TooManyVirtuals { count } => {
                write!(f, "telemetry virtual-channel count {count} exceeds the 32-entry bound")
            }
            Self::BadEnvelope => write!(f, "telemetry log envelope magic/version mismatch"),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Errors raised by the T-MIN transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A reliable command exhausted `MAX_RETRIES` without an ACK.
    NoResponse,
    /// The caller's deadline elapsed before an ACK arrived.
    DeadlineExceeded,
    /// The peer is mid-RESET-handshake; ordinary traffic is being ignored.
    ResetInProgress,
    /// The device reported an `ERROR` frame in response to a command.
    Protocol { code: u16, message: String },
    /// The underlying link returned an I/O error.
    Link(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response after exhausting retransmit budget"),
            Self::DeadlineExceeded => write!(f, "caller deadline exceeded waiting for ACK"),
            Self::ResetInProgress => write!(f, "reset handshake in progress"),
            Self::Protocol { code, message } => write!(f, "device reported error {code}: {message}"),
            Self::Link(msg) => write!(f, "link I/O error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Config upload/download chunk assembly error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutOfOrder {
    pub expected: u16,
    pub got: u16,
}

impl fmt::Display for ChunkOutOfOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk out of order: expected {}, got {}", self.expected, self.got)
    }
}

impl std::error::Error for ChunkOutOfOrder {}
