// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory device state shared by every connection the emulator serves:
//! the current channel config, the last "flash-saved" config, and the
//! output/analog values the telemetry thread reports back.

use std::collections::HashMap;

use pmu_proto::channel::Config;

/// Snapshot of the simulated device, shared across connection threads
/// behind a single mutex (the emulator has no concurrent-writer contention
/// to optimize for, unlike the real firmware's channel graph evaluator).
pub struct DeviceState {
    pub config: Config,
    pub flash_config: Option<Config>,
    pub outputs: HashMap<u16, f32>,
    pub input_voltage_mv: u16,
    pub mcu_temp_decic: i16,
    pub board_temp_decic: i16,
    pub total_current_ma: u32,
    pub fault_status: u8,
    pub fault_flags: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            config: Config::new(Vec::new()),
            flash_config: None,
            outputs: HashMap::new(),
            input_voltage_mv: 13_500,
            mcu_temp_decic: 250,
            board_temp_decic: 280,
            total_current_ma: 0,
            fault_status: 0,
            fault_flags: 0,
        }
    }
}
