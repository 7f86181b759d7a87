// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pmu-client - PMU-30 device client
//!
//! Composes [`pmu_proto`]'s transport and codecs into the command surface a
//! host tool actually drives: ping/info/config/telemetry/output commands
//! over a serial or TCP link, plus the protocol test-runner used as the
//! device client binary's CLI.
//!
//! ## Modules
//!
//! - [`link`] - `Link` trait, `SerialLink`, `TcpLink`
//! - [`client`] - `DeviceClient`: the command surface and pause arbiter
//! - [`config`] - `DeviceClientConfig` tunables, with env var overrides
//! - [`error`] - `ClientError`
//! - [`runner`] - the named protocol-test scenarios run by the CLI binary

pub mod client;
pub mod config;
pub mod error;
pub mod link;
pub mod runner;

pub use client::{ClientChannel, DeviceClient, DeviceInfo, PauseReason, StreamState};
pub use config::DeviceClientConfig;
pub use error::{ClientError, Result};
pub use link::{open_target, Link, SerialLink, TcpLink};
