// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DeviceClient`: composes [`pmu_proto::Transport`] and the channel/telemetry
//! codecs into the PMU-30 command surface (spec.md §4.6).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use pmu_proto::constants::command;
use pmu_proto::{Channel, Config, TMinConfig, TelemetryPacket, Transport, TransportEvent};

use crate::config::DeviceClientConfig;
use crate::error::{ClientError, Result};
use crate::link::Link;

/// Why telemetry is currently suspended; see the pause arbiter rule in
/// spec.md §4.6 ("Session invariants").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    ConfigUpload,
    FlashSave,
}

/// Telemetry stream lifecycle: `Stopped -> Starting -> Streaming ->
/// Paused(reason) -> Streaming -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Starting,
    Streaming,
    Paused(PauseReason),
}

/// Parsed `GET_INFO` / `INFO_RESP` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub fw_version: [u8; 3],
    pub hw_rev: u8,
    pub serial: [u8; 16],
    pub name: String,
}

const INFO_RESP_LEN: usize = 3 + 1 + 16 + 32;

fn parse_info_resp(buf: &[u8]) -> Result<DeviceInfo> {
    if buf.len() < INFO_RESP_LEN {
        return Err(pmu_proto::ParseError::Truncated { offset: buf.len() }.into());
    }
    let mut fw_version = [0u8; 3];
    fw_version.copy_from_slice(&buf[0..3]);
    let hw_rev = buf[3];
    let mut serial = [0u8; 16];
    serial.copy_from_slice(&buf[4..20]);
    let name_bytes = &buf[20..52];
    let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();
    Ok(DeviceInfo {
        fw_version,
        hw_rev,
        serial,
        name,
    })
}

fn chunk_payload(bytes: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return vec![&bytes[0..0]];
    }
    bytes.chunks(chunk_size.max(1)).collect()
}

/// `chunk_idx:u16, total:u16` prefix shared by `SET_CONFIG`/`GET_CONFIG`/
/// `LOAD_BINARY` payloads.
fn parse_chunk_header(buf: &[u8]) -> Result<(u16, u16, &[u8])> {
    if buf.len() < 4 {
        return Err(pmu_proto::ParseError::Truncated { offset: buf.len() }.into());
    }
    let idx = u16::from_le_bytes([buf[0], buf[1]]);
    let total = u16::from_le_bytes([buf[2], buf[3]]);
    Ok((idx, total, &buf[4..]))
}

fn encode_chunk_header(idx: u16, total: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&idx.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Composes a [`Link`] and a [`Transport`] into the PMU-30 device command
/// surface. Owns the link exclusively, matching spec.md §5's "shared
/// resource policy".
pub struct DeviceClient {
    link: Box<dyn Link>,
    transport: Transport,
    cfg: DeviceClientConfig,
    stream_state: StreamState,
    telemetry_queue: VecDeque<Vec<u8>>,
    per_call_timeout: Duration,
}

impl DeviceClient {
    #[must_use]
    pub fn new(link: Box<dyn Link>, cfg: DeviceClientConfig) -> Self {
        let tmin_cfg = TMinConfig {
            retx_timeout: cfg.retx_timeout,
            max_retries: cfg.max_retries,
        };
        let per_call_timeout = cfg.retx_timeout * (cfg.max_retries + 1);
        Self {
            link,
            transport: Transport::new(tmin_cfg),
            cfg,
            stream_state: StreamState::Stopped,
            telemetry_queue: VecDeque::new(),
            per_call_timeout,
        }
    }

    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        self.stream_state
    }

    #[must_use]
    pub fn transport_stats(&self) -> pmu_proto::TransportStats {
        self.transport.stats()
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.per_call_timeout
    }

    /// Pulls whatever bytes are ready from the link, feeds the transport,
    /// writes back ACKs/retransmits it produced, and returns every
    /// non-telemetry application frame delivered this tick. Telemetry
    /// frames are stashed in the internal queue for `poll_telemetry`.
    fn pump_once(&mut self) -> Result<Vec<(u8, Vec<u8>)>> {
        let now = Instant::now();
        if let Some(bytes) = self.transport.poll_transmit(now) {
            self.link.write_all(&bytes)?;
        }
        if let Some(err) = self.transport.take_failure() {
            return Err(err.into());
        }

        let mut buf = [0u8; 2048];
        let n = self.link.read(&mut buf)?;
        if n > 0 {
            self.transport.feed(&buf[..n]);
        }

        let mut responses = Vec::new();
        for event in self.transport.poll() {
            match event {
                TransportEvent::Delivered(cmd, payload) => {
                    if cmd == command::TELEMETRY {
                        self.telemetry_queue.push_back(payload);
                    } else {
                        responses.push((cmd, payload));
                    }
                }
                TransportEvent::SendBytes(bytes) => self.link.write_all(&bytes)?,
                TransportEvent::Acked | TransportEvent::ResetAcked => {}
            }
        }
        Ok(responses)
    }

    fn error_from_payload(payload: &[u8]) -> ClientError {
        if payload.len() >= 3 {
            let code = u16::from_le_bytes([payload[0], payload[1]]);
            let len = payload[2] as usize;
            let message = payload
                .get(3..3 + len)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            ClientError::DeviceProtocol { code, message }
        } else {
            ClientError::DeviceProtocol {
                code: 0,
                message: String::new(),
            }
        }
    }

    /// Waits (without issuing a new request) for the next delivery of
    /// `expect`, used for chunk sequences that continue after the first
    /// reliable call already matched.
    fn wait_for_delivery(&mut self, expect: u8, deadline: Instant) -> Result<Vec<u8>> {
        loop {
            if Instant::now() >= deadline {
                return Err(ClientError::ResponseTimeout {
                    expected: expect,
                    waited_ms: self.per_call_timeout.as_millis() as u64,
                });
            }
            for (cmd, payload) in self.pump_once()? {
                if cmd == expect {
                    return Ok(payload);
                }
                if cmd == command::ERROR {
                    return Err(Self::error_from_payload(&payload));
                }
            }
        }
    }

    /// Issues a reliable request and blocks until the matching application
    /// response is delivered, a device `ERROR` frame arrives, or the
    /// deadline expires. Mirrors spec.md §4.6's "only one in-flight
    /// reliable command at a time".
    ///
    /// The device emits its application reply before acking the request
    /// frame itself, so `wait_for_delivery` can return with the request's
    /// own ACK still unconsumed. The reply proves the device processed the
    /// request, so the outstanding slot is cleared unconditionally here
    /// rather than waiting on an ACK that may never arrive on this link.
    fn call_reliable(&mut self, cmd: u8, payload: Vec<u8>, expect: u8, deadline: Instant) -> Result<Vec<u8>> {
        self.transport.queue_reliable(cmd, payload)?;
        let result = self.wait_for_delivery(expect, deadline);
        self.transport.cancel_outstanding();
        result
    }

    pub fn ping(&mut self) -> Result<()> {
        self.call_reliable(command::PING, Vec::new(), command::PONG, self.deadline())?;
        Ok(())
    }

    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        let payload = self.call_reliable(command::GET_INFO, Vec::new(), command::INFO_RESP, self.deadline())?;
        parse_info_resp(&payload)
    }

    pub fn get_config(&mut self) -> Result<Config> {
        let deadline = self.deadline();
        let first = self.call_reliable(command::GET_CONFIG, Vec::new(), command::CONFIG_DATA, deadline)?;
        let (first_idx, total, first_body) = parse_chunk_header(&first)?;
        let mut bytes = first_body.to_vec();
        let mut expected_idx = first_idx;
        while expected_idx + 1 < total {
            expected_idx += 1;
            let chunk = self.wait_for_delivery(command::CONFIG_DATA, deadline)?;
            let (idx, _, body) = parse_chunk_header(&chunk)?;
            if idx != expected_idx {
                return Err(pmu_proto::ChunkOutOfOrder {
                    expected: expected_idx,
                    got: idx,
                }
                .into());
            }
            bytes.extend_from_slice(body);
        }
        Ok(Config::decode(&bytes)?)
    }

    /// Destructive replacement (spec.md §4.6): pauses telemetry for the
    /// duration of the transfer and resumes it afterward regardless of
    /// outcome.
    pub fn set_config(&mut self, config: &Config) -> Result<()> {
        self.enter_pause(PauseReason::ConfigUpload);
        let result = self.upload_config_chunks(config);
        self.leave_pause();
        result
    }

    fn upload_config_chunks(&mut self, config: &Config) -> Result<()> {
        let bytes = config.encode();
        let chunks = chunk_payload(&bytes, self.cfg.chunk_size);
        let total = chunks.len() as u16;
        for (i, chunk) in chunks.iter().enumerate() {
            let req = encode_chunk_header(i as u16, total, chunk);
            let deadline = self.deadline();
            let ack = self.call_reliable(command::SET_CONFIG, req, command::CONFIG_ACK, deadline)?;
            let ok = ack.first().copied().unwrap_or(0);
            if ok == 0 {
                return Err(ClientError::DeviceRejected);
            }
        }
        Ok(())
    }

    pub fn save_config(&mut self) -> Result<()> {
        self.enter_pause(PauseReason::FlashSave);
        let result = (|| {
            let ack = self.call_reliable(command::SAVE_CONFIG, Vec::new(), command::FLASH_ACK, self.deadline())?;
            if ack.first().copied().unwrap_or(0) == 0 {
                return Err(ClientError::DeviceRejected);
            }
            Ok(())
        })();
        self.leave_pause();
        result
    }

    pub fn clear_config(&mut self) -> Result<()> {
        let ack = self.call_reliable(command::CLEAR_CONFIG, Vec::new(), command::CLEAR_CONFIG_ACK, self.deadline())?;
        if ack.first().copied().unwrap_or(0) == 0 {
            return Err(ClientError::DeviceRejected);
        }
        Ok(())
    }

    /// Uploads a raw binary channel table (`LOAD_BINARY`); returns the
    /// channel count the device reports having instantiated.
    pub fn load_binary(&mut self, bytes: &[u8]) -> Result<u16> {
        let chunks = chunk_payload(bytes, self.cfg.chunk_size);
        let total = chunks.len() as u16;
        let mut channels_loaded = 0u16;
        for (i, chunk) in chunks.iter().enumerate() {
            let req = encode_chunk_header(i as u16, total, chunk);
            let deadline = self.deadline();
            let ack = self.call_reliable(command::LOAD_BINARY, req, command::BINARY_ACK, deadline)?;
            if ack.len() < 4 || ack[0] == 0 {
                return Err(ClientError::DeviceRejected);
            }
            channels_loaded = u16::from_le_bytes([ack[2], ack[3]]);
        }
        Ok(channels_loaded)
    }

    pub fn set_output(&mut self, channel_id: u16, value: f32) -> Result<()> {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&channel_id.to_le_bytes());
        payload.extend_from_slice(&value.to_le_bytes());
        let ack = self.call_reliable(command::SET_OUTPUT, payload, command::OUTPUT_ACK, self.deadline())?;
        if ack.first().copied().unwrap_or(0) == 0 {
            return Err(ClientError::DeviceRejected);
        }
        Ok(())
    }

    /// `START_STREAM` is unreliable/fire-and-forget; the stream state
    /// transitions to `Starting` until the first telemetry frame arrives.
    pub fn start_stream(&mut self, rate_hz: u16, section_flags: u16) -> Result<()> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&rate_hz.to_le_bytes());
        payload.extend_from_slice(&section_flags.to_le_bytes());
        let bytes = Transport::send_unreliable(command::START_STREAM, &payload);
        self.link.write_all(&bytes)?;
        self.stream_state = StreamState::Starting;
        Ok(())
    }

    /// Best-effort stop: sends `STOP_STREAM` then drains in-flight
    /// telemetry for one retransmit timeout's worth of quiescence, per
    /// spec.md §5.
    pub fn stop_stream(&mut self) -> Result<()> {
        let bytes = Transport::send_unreliable(command::STOP_STREAM, &[]);
        self.link.write_all(&bytes)?;
        self.stream_state = StreamState::Stopped;

        let quiescence_deadline = Instant::now() + self.cfg.retx_timeout;
        while Instant::now() < quiescence_deadline {
            self.pump_once()?;
        }
        self.telemetry_queue.clear();
        Ok(())
    }

    /// Pumps the link once and returns every telemetry packet decoded so
    /// far, in arrival order.
    pub fn poll_telemetry(&mut self) -> Result<Vec<TelemetryPacket>> {
        self.pump_once()?;
        let mut packets = Vec::with_capacity(self.telemetry_queue.len());
        while let Some(raw) = self.telemetry_queue.pop_front() {
            packets.push(TelemetryPacket::decode(&raw)?);
        }
        if !packets.is_empty() && self.stream_state == StreamState::Starting {
            self.stream_state = StreamState::Streaming;
        }
        Ok(packets)
    }

    fn enter_pause(&mut self, reason: PauseReason) {
        if matches!(self.stream_state, StreamState::Starting | StreamState::Streaming) {
            self.stream_state = StreamState::Paused(reason);
        }
    }

    fn leave_pause(&mut self) {
        if matches!(self.stream_state, StreamState::Paused(_)) {
            self.stream_state = StreamState::Streaming;
        }
    }
}

/// Convenience re-export so callers building configs for `set_config` don't
/// need to reach into `pmu_proto::channel` directly.
pub type ClientChannel = Channel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_splits_on_boundaries() {
        let bytes = vec![0u8; 2500];
        let chunks = chunk_payload(&bytes, 1024);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1024);
        assert_eq!(chunks[2].len(), 452);
    }

    #[test]
    fn empty_payload_chunks_to_a_single_empty_chunk() {
        let chunks = chunk_payload(&[], 1024);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn chunk_header_roundtrips() {
        let body = b"hello";
        let encoded = encode_chunk_header(2, 5, body);
        let (idx, total, decoded_body) = parse_chunk_header(&encoded).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(total, 5);
        assert_eq!(decoded_body, body);
    }

    #[test]
    fn info_resp_parses_fixed_layout_and_trims_name_at_nul() {
        let mut buf = vec![1, 2, 3, 9];
        buf.extend_from_slice(&[0xAB; 16]);
        let mut name = b"PMU-30-TEST".to_vec();
        name.resize(32, 0);
        buf.extend_from_slice(&name);
        let info = parse_info_resp(&buf).unwrap();
        assert_eq!(info.fw_version, [1, 2, 3]);
        assert_eq!(info.hw_rev, 9);
        assert_eq!(info.serial, [0xAB; 16]);
        assert_eq!(info.name, "PMU-30-TEST");
    }
}
