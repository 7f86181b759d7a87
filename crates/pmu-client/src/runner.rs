// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named protocol-test scenarios run by the `pmu-client` CLI binary.
//!
//! Mirrors the critical-path test suite: a fixed list of scenarios
//! (ping, info, config round-trip, telemetry start/stop, output set) run
//! back to back against a live device or the `SIMULATOR` target, each
//! repeated for the requested iteration count. A scenario failure does not
//! abort the run; every scenario gets its shot and the summary reports
//! which ones failed.

use std::time::{Duration, Instant};

use pmu_proto::channel::variants::DigitalInputConfig;
use pmu_proto::channel::{channel_flags, Channel, ChannelVariant, Config, HwDevice, CH_REF_NONE};

use crate::client::DeviceClient;
use crate::error::Result;

/// One named scenario in the suite.
pub struct Scenario {
    pub name: &'static str,
    run: fn(&mut DeviceClient) -> Result<()>,
}

/// Outcome of a single scenario iteration.
pub struct ScenarioResult {
    pub name: &'static str,
    pub iteration: u32,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl ScenarioResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a full suite run across all iterations.
pub struct RunReport {
    pub results: Vec<ScenarioResult>,
}

impl RunReport {
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|r| !r.passed()).collect()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures().is_empty()
    }
}

fn scenario_ping(client: &mut DeviceClient) -> Result<()> {
    client.ping()
}

fn scenario_get_info(client: &mut DeviceClient) -> Result<()> {
    client.get_info()?;
    Ok(())
}

fn scenario_config_roundtrip(client: &mut DeviceClient) -> Result<()> {
    let channel = Channel {
        channel_id: 0,
        flags: channel_flags::ENABLED,
        hw_device: HwDevice::Gpio.tag(),
        hw_index: 0,
        source_id: CH_REF_NONE,
        default_value: 0,
        name: "runner-din".to_string(),
        variant: ChannelVariant::DigitalInput(DigitalInputConfig {
            gpio_pin: 0,
            active_high: true,
            debounce_ms: 0,
        }),
    };
    let config = Config::new(vec![channel]);
    client.set_config(&config)?;
    let readback = client.get_config()?;
    if readback.channels.len() != config.channels.len() {
        return Err(crate::error::ClientError::DeviceRejected);
    }
    Ok(())
}

fn scenario_telemetry_start_stop(client: &mut DeviceClient) -> Result<()> {
    client.start_stream(50, 0xFFFF)?;
    let deadline = Instant::now() + Duration::from_millis(500);
    let mut saw_packet = false;
    while Instant::now() < deadline {
        if !client.poll_telemetry()?.is_empty() {
            saw_packet = true;
            break;
        }
    }
    client.stop_stream()?;
    if !saw_packet {
        return Err(crate::error::ClientError::ResponseTimeout {
            expected: pmu_proto::constants::command::TELEMETRY,
            waited_ms: 500,
        });
    }
    Ok(())
}

fn scenario_set_output(client: &mut DeviceClient) -> Result<()> {
    client.set_output(0, 1.0)?;
    client.set_output(0, 0.0)?;
    Ok(())
}

/// The fixed scenario list, in run order.
#[must_use]
pub fn suite() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "ping",
            run: scenario_ping,
        },
        Scenario {
            name: "get_info",
            run: scenario_get_info,
        },
        Scenario {
            name: "config_roundtrip",
            run: scenario_config_roundtrip,
        },
        Scenario {
            name: "telemetry_start_stop",
            run: scenario_telemetry_start_stop,
        },
        Scenario {
            name: "set_output",
            run: scenario_set_output,
        },
    ]
}

/// Runs every scenario in [`suite`] for `iterations` passes, calling
/// `on_result` after each one (used by the CLI for `--verbose` output).
pub fn run_critical_tests(
    client: &mut DeviceClient,
    iterations: u32,
    mut on_result: impl FnMut(&ScenarioResult),
) -> RunReport {
    let mut results = Vec::new();
    for iteration in 1..=iterations {
        for scenario in suite() {
            let start = Instant::now();
            let error = (scenario.run)(client).err().map(|e| e.to_string());
            let result = ScenarioResult {
                name: scenario.name,
                iteration,
                elapsed: start.elapsed(),
                error,
            };
            on_result(&result);
            results.push(result);
        }
    }
    RunReport { results }
}
