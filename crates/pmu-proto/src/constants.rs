// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol-wide magic numbers, command IDs, and tunables.

/// Magic identifying a persisted config record ("PMU3").
pub const PMU_CONFIG_MAGIC: u32 = 0x504D_5533;
/// Current config envelope version.
pub const PMU_CONFIG_VERSION: u16 = 1;

/// Magic identifying a persisted telemetry record ("TLM3").
pub const PMU_TELEM_MAGIC: u32 = 0x544C_4D33;
/// Current telemetry envelope version.
pub const PMU_TELEM_VERSION: u16 = 1;

/// Recommended config upload/download chunk payload size. Any value up to
/// [`MAX_CHUNK_SIZE`] is acceptable; this is the default.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Hard ceiling on chunk payload size.
pub const MAX_CHUNK_SIZE: usize = 2048;

/// Default retransmit timeout for a reliable T-MIN command.
pub const DEFAULT_RETX_TIMEOUT_MS: u64 = 150;
/// Default maximum retransmit attempts before a reliable command fails.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default serial baud rate for [`crate`] link implementations.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// Default TCP port for the emulator / `SIMULATOR` target.
pub const DEFAULT_TCP_PORT: u16 = 9876;

/// Device command catalogue (stable u8 IDs).
pub mod command {
    pub const PING: u8 = 0x01;
    pub const PONG: u8 = 0x02;
    pub const GET_INFO: u8 = 0x10;
    pub const INFO_RESP: u8 = 0x11;
    pub const GET_CONFIG: u8 = 0x20;
    pub const CONFIG_DATA: u8 = 0x21;
    pub const SET_CONFIG: u8 = 0x22;
    pub const CONFIG_ACK: u8 = 0x23;
    pub const SAVE_CONFIG: u8 = 0x24;
    pub const FLASH_ACK: u8 = 0x25;
    pub const CLEAR_CONFIG: u8 = 0x26;
    pub const CLEAR_CONFIG_ACK: u8 = 0x27;
    pub const START_STREAM: u8 = 0x30;
    pub const STOP_STREAM: u8 = 0x31;
    pub const TELEMETRY: u8 = 0x32;
    pub const SET_OUTPUT: u8 = 0x40;
    pub const OUTPUT_ACK: u8 = 0x41;
    pub const LOAD_BINARY: u8 = 0x68;
    pub const BINARY_ACK: u8 = 0x69;
    pub const ERROR: u8 = 0xE1;
}
