// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pmu-proto - PMU-30 host wire protocol
//!
//! The wire-level building blocks shared by every host-side tool that talks
//! to a PMU-30 power management unit: CRC primitives, the start-byte framed
//! codec, the T-MIN reliable transport, the channel configuration type
//! system and its binary codec, and the telemetry packet codec.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Device client (pmu-client)                |
//! +--------------------------------------------------------------+
//! |  transport::tmin::Transport  -  sequence/ACK, single outstanding |
//! +--------------------------------------------------------------+
//! |  frame::{encode_frame, FrameDecoder}  -  AA | LEN | TYPE | CRC |
//! +--------------------------------------------------------------+
//! |                      Serial / TCP link                        |
//! +--------------------------------------------------------------+
//! ```
//!
//! `channel` and `telemetry` sit beside the transport stack rather than
//! inside it: they codec application payloads (channel configuration,
//! telemetry snapshots) that travel as opaque bytes inside frames.
//!
//! ## Modules Overview
//!
//! - [`crc`] - CRC-16/CCITT-FALSE and CRC-32 table-driven checksums
//! - [`frame`] - start-byte framed codec with resync-tolerant streaming decode
//! - [`transport`] - T-MIN reliable datagram layer above the frame codec
//! - [`channel`] - channel type system and binary configuration codec
//! - [`telemetry`] - telemetry packet codec
//! - [`constants`] - magic numbers, command IDs, and tuning defaults
//! - [`error`] - shared error taxonomy
//! - [`logging`] - compile-time configurable logging, mirrors the host tooling's style

/// CRC-16/CCITT-FALSE and CRC-32 checksums used by the frame and config-envelope codecs.
pub mod crc;
/// Start-byte framed transport codec (spec §4.2).
pub mod frame;
/// T-MIN reliable datagram transport (spec §4.5).
pub mod transport;
/// Channel type system and binary configuration codec (spec §4.3).
pub mod channel;
/// Telemetry packet codec (spec §4.4).
pub mod telemetry;
/// Magic numbers, command IDs, and protocol tuning defaults.
pub mod constants;
/// Shared error taxonomy for the config codec, telemetry codec, and transport layer.
pub mod error;
/// Compile-time configurable logging (zero-cost when the `logging` feature is disabled).
pub mod logging;

pub use channel::{Channel, ChannelVariant, Config, PersistedConfig};
pub use error::{ChunkOutOfOrder, ParseError, TelemetryError, TransportError};
pub use frame::{decode_one, encode_frame, DecodeOutcome, Frame, FrameDecoder, FrameError};
pub use telemetry::{TelemetryPacket, TelemetryPacketBuilder};
pub use transport::{TMinConfig, Transport, TransportEvent, TransportStats};

/// Protocol crate version string, surfaced in client handshake logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
