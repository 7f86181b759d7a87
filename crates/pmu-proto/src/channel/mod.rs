// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel type system and config codec (spec §4.3): an exhaustive tagged
//! variant over 20 channel kinds, a binary `Config` serialization, and the
//! cross-channel reference-graph validator.

pub mod config;
pub mod types;
pub mod variants;

pub use config::{Channel, Config, PersistedConfig, MAX_NAME_LEN};
pub use types::{channel_flags, ChannelType, DataType, HwDevice, LogicOp, MathOp, CH_REF_NONE};
pub use variants::ChannelVariant;
