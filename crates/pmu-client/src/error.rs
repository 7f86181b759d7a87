// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-facing error type: wraps the core protocol errors with the
//! link/IO and CLI-surfaced failure modes specific to this crate.

use thiserror::Error;

/// Errors surfaced by [`crate::DeviceClient`] and the link implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Transport(#[from] pmu_proto::TransportError),

    #[error(transparent)]
    Parse(#[from] pmu_proto::ParseError),

    #[error(transparent)]
    Telemetry(#[from] pmu_proto::TelemetryError),

    #[error("device reported a protocol error (code {code}): {message}")]
    DeviceProtocol { code: u16, message: String },

    #[error("reliable call to {expected:#04x} timed out waiting for a response after {waited_ms} ms")]
    ResponseTimeout { expected: u8, waited_ms: u64 },

    #[error("unexpected response command {got:#04x}, expected {expected:#04x}")]
    UnexpectedResponse { expected: u8, got: u8 },

    #[error(transparent)]
    ChunkOutOfOrder(#[from] pmu_proto::ChunkOutOfOrder),

    #[error("device rejected the operation (ok=0)")]
    DeviceRejected,
}

pub type Result<T> = std::result::Result<T, ClientError>;
