// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device client tuning knobs, with environment-variable overrides for the
//! CLI binary and any embedding host tool.

use std::time::Duration;

use pmu_proto::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETX_TIMEOUT_MS, MAX_CHUNK_SIZE,
};

/// Tunables for [`crate::DeviceClient`]: chunk size for config/binary
/// transfers, and the T-MIN retransmit policy.
#[derive(Debug, Clone, Copy)]
pub struct DeviceClientConfig {
    pub chunk_size: usize,
    pub retx_timeout: Duration,
    pub max_retries: u32,
    pub baud_rate: u32,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retx_timeout: Duration::from_millis(DEFAULT_RETX_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl DeviceClientConfig {
    #[must_use]
    pub fn builder() -> DeviceClientConfigBuilder {
        DeviceClientConfigBuilder::default()
    }

    /// Applies `PMU_CHUNK_SIZE`, `PMU_BAUD`, `PMU_RETX_TIMEOUT_MS` overrides
    /// from the process environment on top of the given base config.
    /// Malformed or out-of-range values are ignored, leaving the base value.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_usize("PMU_CHUNK_SIZE") {
            if v > 0 && v <= MAX_CHUNK_SIZE {
                self.chunk_size = v;
            }
        }
        if let Some(v) = env_u32("PMU_BAUD") {
            self.baud_rate = v;
        }
        if let Some(v) = env_u64("PMU_RETX_TIMEOUT_MS") {
            self.retx_timeout = Duration::from_millis(v);
        }
        self
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

/// Builder for [`DeviceClientConfig`].
#[derive(Debug, Default)]
pub struct DeviceClientConfigBuilder {
    cfg: Option<DeviceClientConfig>,
}

impl DeviceClientConfigBuilder {
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.cfg_mut().chunk_size = size.min(MAX_CHUNK_SIZE);
        self
    }

    #[must_use]
    pub fn retx_timeout(mut self, timeout: Duration) -> Self {
        self.cfg_mut().retx_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.cfg_mut().max_retries = retries;
        self
    }

    #[must_use]
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.cfg_mut().baud_rate = baud;
        self
    }

    fn cfg_mut(&mut self) -> &mut DeviceClientConfig {
        self.cfg.get_or_insert_with(DeviceClientConfig::default)
    }

    #[must_use]
    pub fn build(self) -> DeviceClientConfig {
        self.cfg.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_protocol_constants() {
        let cfg = DeviceClientConfig::default();
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = DeviceClientConfig::builder()
            .chunk_size(256)
            .max_retries(2)
            .baud_rate(9600)
            .build();
        assert_eq!(cfg.chunk_size, 256);
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.baud_rate, 9600);
    }

    #[test]
    fn builder_clamps_chunk_size_to_max() {
        let cfg = DeviceClientConfig::builder().chunk_size(1_000_000).build();
        assert_eq!(cfg.chunk_size, MAX_CHUNK_SIZE);
    }
}
