// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection protocol handling: reads frames off a TCP socket, drives
//! a device-side [`Transport`], and dispatches the full command catalogue
//! of spec.md §4.6 against the shared [`DeviceState`]. A second thread
//! ticks out `TELEMETRY` frames while streaming is enabled.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pmu_proto::channel::Config;
use pmu_proto::constants::command;
use pmu_proto::telemetry::section_flags;
use pmu_proto::{TMinConfig, TelemetryPacket, Transport, TransportEvent};

use crate::error::{EmuError, Result};
use crate::state::DeviceState;

const OUTPUTS_COUNT: usize = 30;

/// Writes through the connection's shared writer lock so the command thread
/// and the telemetry ticker never interleave frame bytes on the same socket.
fn write_maybe_dropped(writer: &Mutex<TcpStream>, bytes: &[u8], drop_rate: f64) -> io::Result<()> {
    if drop_rate > 0.0 && fastrand::f64() < drop_rate {
        log::debug!("drop-rate: dropping {} outbound bytes", bytes.len());
        return Ok(());
    }
    writer.lock().unwrap().write_all(bytes)
}

fn encode_chunk_header(idx: u16, total: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&idx.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn parse_chunk_header(buf: &[u8]) -> Result<(u16, u16, &[u8])> {
    if buf.len() < 4 {
        return Err(EmuError::MalformedRequest { cmd: 0 });
    }
    let idx = u16::from_le_bytes([buf[0], buf[1]]);
    let total = u16::from_le_bytes([buf[2], buf[3]]);
    Ok((idx, total, &buf[4..]))
}

fn chunk_payload(bytes: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if bytes.is_empty() {
        return vec![&bytes[0..0]];
    }
    bytes.chunks(chunk_size.max(1)).collect()
}

/// Builds the next `INFO_RESP` payload: fixed `fw_version:3xu8, hw_rev:u8,
/// serial:16B, name:32B` layout mirrored from `pmu-client`'s parser.
fn info_resp_payload() -> Vec<u8> {
    let mut out = Vec::with_capacity(52);
    out.extend_from_slice(&[0, 1, 0]);
    out.push(1);
    out.extend_from_slice(&[0xAB; 16]);
    let mut name = b"PMU-30-EMULATOR".to_vec();
    name.resize(32, 0);
    out.extend_from_slice(&name);
    out
}

/// Per-connection handler. Owns the device-side [`Transport`] and the
/// in-flight chunk reassembly buffers; the shared [`DeviceState`] is the
/// only state visible to other connections. Reads go through its own
/// socket handle; writes go through the connection's shared `writer` lock,
/// which the telemetry ticker thread also writes through.
struct Session {
    reader: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
    transport: Transport,
    state: Arc<Mutex<DeviceState>>,
    drop_rate: f64,
    config_chunks: Vec<u8>,
    binary_chunks: Vec<u8>,
    chunk_size: usize,
}

impl Session {
    /// Queues `cmd`/`payload` as a reliable send and blocks until the peer
    /// ACKs it, retransmitting on the same timer the host side uses.
    fn send_reliable(&mut self, cmd: u8, payload: Vec<u8>) -> Result<()> {
        self.transport.queue_reliable(cmd, payload)?;
        let deadline = Instant::now() + Duration::from_millis(150 * 6);
        let mut buf = [0u8; 2048];
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(pmu_proto::TransportError::NoResponse.into());
            }
            if let Some(bytes) = self.transport.poll_transmit(now) {
                write_maybe_dropped(&self.writer, &bytes, self.drop_rate)?;
            }
            if let Some(err) = self.transport.take_failure() {
                return Err(err.into());
            }
            self.reader.set_read_timeout(Some(Duration::from_millis(20)))?;
            match self.reader.read(&mut buf) {
                Ok(0) => return Err(pmu_proto::TransportError::NoResponse.into()),
                Ok(n) => {
                    self.transport.feed(&buf[..n]);
                    for event in self.transport.poll() {
                        match event {
                            TransportEvent::Acked => return Ok(()),
                            TransportEvent::SendBytes(bytes) => write_maybe_dropped(&self.writer, &bytes, self.drop_rate)?,
                            _ => {}
                        }
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send_error(&mut self, code: u16, message: &str) -> Result<()> {
        let msg = message.as_bytes();
        let len = msg.len().min(255);
        let mut payload = Vec::with_capacity(3 + len);
        payload.extend_from_slice(&code.to_le_bytes());
        payload.push(len as u8);
        payload.extend_from_slice(&msg[..len]);
        self.send_reliable(command::ERROR, payload)
    }

    fn dispatch(&mut self, cmd: u8, payload: Vec<u8>, streaming: &Arc<AtomicBool>, rate_hz: &Arc<AtomicU16>, section_flags_bits: &Arc<AtomicU16>) -> Result<()> {
        match cmd {
            command::PING => self.send_reliable(command::PONG, Vec::new()),
            command::GET_INFO => self.send_reliable(command::INFO_RESP, info_resp_payload()),
            command::GET_CONFIG => self.handle_get_config(),
            command::SET_CONFIG => self.handle_set_config(&payload),
            command::SAVE_CONFIG => self.handle_save_config(),
            command::CLEAR_CONFIG => self.handle_clear_config(),
            command::LOAD_BINARY => self.handle_load_binary(&payload),
            command::SET_OUTPUT => self.handle_set_output(&payload),
            command::START_STREAM => self.handle_start_stream(&payload, streaming, rate_hz, section_flags_bits),
            command::STOP_STREAM => {
                streaming.store(false, Ordering::Relaxed);
                Ok(())
            }
            other => {
                log::warn!("unrecognized command id {other:#04x}");
                self.send_error(1, "unrecognized command")
            }
        }
    }

    fn handle_get_config(&mut self) -> Result<()> {
        let bytes = self.state.lock().unwrap().config.encode();
        let chunks = chunk_payload(&bytes, self.chunk_size);
        let total = chunks.len() as u16;
        for (i, chunk) in chunks.iter().enumerate() {
            let body = encode_chunk_header(i as u16, total, chunk);
            self.send_reliable(command::CONFIG_DATA, body)?;
        }
        Ok(())
    }

    fn handle_set_config(&mut self, payload: &[u8]) -> Result<()> {
        let (idx, total, body) = parse_chunk_header(payload)?;
        if idx == 0 {
            self.config_chunks.clear();
        }
        self.config_chunks.extend_from_slice(body);

        if idx + 1 < total {
            return self.send_reliable(command::CONFIG_ACK, vec![1, 0, 0]);
        }

        match Config::decode(&self.config_chunks) {
            Ok(config) => {
                self.state.lock().unwrap().config = config;
                self.send_reliable(command::CONFIG_ACK, vec![1, 0, 0])
            }
            Err(_) => self.send_reliable(command::CONFIG_ACK, vec![0, 1, 0]),
        }
    }

    fn handle_save_config(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.flash_config = Some(state.config.clone());
        drop(state);
        self.send_reliable(command::FLASH_ACK, vec![1])
    }

    fn handle_clear_config(&mut self) -> Result<()> {
        self.state.lock().unwrap().config = Config::new(Vec::new());
        self.send_reliable(command::CLEAR_CONFIG_ACK, vec![1])
    }

    fn handle_load_binary(&mut self, payload: &[u8]) -> Result<()> {
        let (idx, total, body) = parse_chunk_header(payload)?;
        if idx == 0 {
            self.binary_chunks.clear();
        }
        self.binary_chunks.extend_from_slice(body);

        if idx + 1 < total {
            return self.send_reliable(command::BINARY_ACK, vec![1, 0, 0, 0]);
        }

        match Config::decode(&self.binary_chunks) {
            Ok(config) => {
                let channels_loaded = config.channels.len() as u16;
                self.state.lock().unwrap().config = config;
                let mut ack = vec![1, 0];
                ack.extend_from_slice(&channels_loaded.to_le_bytes());
                self.send_reliable(command::BINARY_ACK, ack)
            }
            Err(_) => self.send_reliable(command::BINARY_ACK, vec![0, 1, 0, 0]),
        }
    }

    fn handle_set_output(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 6 {
            return self.send_reliable(command::OUTPUT_ACK, vec![0]);
        }
        let channel_id = u16::from_le_bytes([payload[0], payload[1]]);
        let value = f32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]);

        let mut state = self.state.lock().unwrap();
        let known = state.config.channels.iter().any(|c| c.channel_id == channel_id);
        if known {
            state.outputs.insert(channel_id, value);
        }
        drop(state);

        self.send_reliable(command::OUTPUT_ACK, vec![u8::from(known)])
    }

    fn handle_start_stream(&mut self, payload: &[u8], streaming: &Arc<AtomicBool>, rate_hz: &Arc<AtomicU16>, section_flags_bits: &Arc<AtomicU16>) -> Result<()> {
        if payload.len() < 4 {
            return Ok(());
        }
        let rate = u16::from_le_bytes([payload[0], payload[1]]);
        let flags = u16::from_le_bytes([payload[2], payload[3]]);
        rate_hz.store(rate.max(1), Ordering::Relaxed);
        section_flags_bits.store(flags, Ordering::Relaxed);
        streaming.store(true, Ordering::Relaxed);
        Ok(())
    }
}

fn build_telemetry_packet(counter: u32, timestamp_ms: u32, flags: u16, state: &Arc<Mutex<DeviceState>>) -> TelemetryPacket {
    let snapshot = state.lock().unwrap();
    let mut builder = TelemetryPacket::builder()
        .header(counter, timestamp_ms)
        .analog(snapshot.input_voltage_mv, snapshot.mcu_temp_decic, snapshot.board_temp_decic, snapshot.total_current_ma);

    if flags & section_flags::OUTPUTS != 0 {
        let mut outputs = [0u8; OUTPUTS_COUNT];
        for (&channel_id, &value) in &snapshot.outputs {
            if let Some(slot) = outputs.get_mut(channel_id as usize) {
                *slot = u8::from(value > 0.0);
            }
        }
        builder = builder.with_outputs(outputs);
    }
    if flags & section_flags::FAULTS != 0 {
        builder = builder.with_faults(snapshot.fault_status, snapshot.fault_flags);
    }
    builder.build()
}

/// Runs the telemetry ticker for one connection until `shutdown` is set.
/// Emits nothing while `streaming` is false; ticks at `rate_hz` while true.
fn telemetry_loop(
    writer: Arc<Mutex<TcpStream>>,
    state: Arc<Mutex<DeviceState>>,
    streaming: Arc<AtomicBool>,
    rate_hz: Arc<AtomicU16>,
    section_flags_bits: Arc<AtomicU16>,
    shutdown: Arc<AtomicBool>,
    drop_rate: f64,
) {
    let started = Instant::now();
    let mut counter = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        if !streaming.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(20));
            continue;
        }
        counter = counter.wrapping_add(1);
        let flags = section_flags_bits.load(Ordering::Relaxed);
        let packet = build_telemetry_packet(counter, started.elapsed().as_millis() as u32, flags, &state);
        let bytes = Transport::send_unreliable(command::TELEMETRY, &packet.encode());
        if write_maybe_dropped(&writer, &bytes, drop_rate).is_err() {
            break;
        }
        let rate = u64::from(rate_hz.load(Ordering::Relaxed).max(1));
        thread::sleep(Duration::from_millis(1000 / rate));
    }
}

/// Serves one client connection until it disconnects or a fatal I/O error
/// occurs. Spawns the telemetry ticker alongside the command read loop.
pub fn handle_connection(stream: TcpStream, state: Arc<Mutex<DeviceState>>, drop_rate: f64, chunk_size: usize) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
    log::info!("connection from {peer}");

    let Ok(reader) = stream.try_clone() else {
        log::warn!("failed to clone socket for {peer}, dropping connection");
        return;
    };
    if let Err(e) = reader.set_read_timeout(Some(Duration::from_millis(20))) {
        log::warn!("failed to set read timeout for {peer}: {e}");
        return;
    }
    let writer = Arc::new(Mutex::new(stream));

    let streaming = Arc::new(AtomicBool::new(false));
    let rate_hz = Arc::new(AtomicU16::new(1));
    let section_flags_bits = Arc::new(AtomicU16::new(0));
    let shutdown = Arc::new(AtomicBool::new(false));

    let telemetry_handle = {
        let writer = writer.clone();
        let state = state.clone();
        let streaming = streaming.clone();
        let rate_hz = rate_hz.clone();
        let section_flags_bits = section_flags_bits.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || telemetry_loop(writer, state, streaming, rate_hz, section_flags_bits, shutdown, drop_rate))
    };

    let mut session = Session {
        reader,
        writer,
        transport: Transport::new(TMinConfig::default()),
        state,
        drop_rate,
        config_chunks: Vec::new(),
        binary_chunks: Vec::new(),
        chunk_size,
    };

    let mut buf = [0u8; 2048];
    loop {
        match session.reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                session.transport.feed(&buf[..n]);
                let events = session.transport.poll();
                let mut fatal = false;
                for event in events {
                    match event {
                        TransportEvent::Delivered(cmd, payload) => {
                            if let Err(e) = session.dispatch(cmd, payload, &streaming, &rate_hz, &section_flags_bits) {
                                log::warn!("dispatch error for {peer}: {e}");
                                fatal = true;
                                break;
                            }
                        }
                        TransportEvent::SendBytes(bytes) => {
                            if write_maybe_dropped(&session.writer, &bytes, drop_rate).is_err() {
                                fatal = true;
                                break;
                            }
                        }
                        TransportEvent::Acked | TransportEvent::ResetAcked => {}
                    }
                }
                if fatal {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
            Err(e) => {
                log::warn!("read error from {peer}: {e}");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    let _ = telemetry_handle.join();
    log::info!("connection from {peer} closed");
}
