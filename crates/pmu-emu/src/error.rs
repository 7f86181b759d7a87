// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Emulator-facing error type, wrapping the core protocol errors with the
//! I/O failure modes specific to running a TCP stand-in for the device.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] pmu_proto::TransportError),

    #[error(transparent)]
    Parse(#[from] pmu_proto::ParseError),

    #[error("malformed request payload for command {cmd:#04x}")]
    MalformedRequest { cmd: u8 },
}

pub type Result<T> = std::result::Result<T, EmuError>;
