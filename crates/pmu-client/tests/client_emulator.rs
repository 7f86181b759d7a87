// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DeviceClient` driven against a minimal in-process fake device over a
//! real TCP socket: ping, config round-trip, and telemetry start/stop.
//! Exercises the same link (`TcpLink`) and command surface the emulator
//! binary does, without depending on that separate crate.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use pmu_client::{DeviceClient, DeviceClientConfig, TcpLink};
use pmu_proto::channel::variants::DigitalInputConfig;
use pmu_proto::channel::{channel_flags, Channel, ChannelVariant, Config, HwDevice, CH_REF_NONE};
use pmu_proto::constants::command;
use pmu_proto::{TMinConfig, TelemetryPacket, Transport, TransportEvent};

fn spawn_fake_device(listener: TcpListener) {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let mut transport = Transport::new(TMinConfig::default());
        let mut config_chunks = Vec::new();
        let mut streaming = false;
        let mut buf = [0u8; 2048];

        loop {
            if streaming {
                let bytes = Transport::send_unreliable(command::TELEMETRY, &fake_telemetry().encode());
                let _ = stream.write_all(&bytes);
            }
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    transport.feed(&buf[..n]);
                    for event in transport.poll() {
                        match event {
                            TransportEvent::Delivered(cmd, payload) => match cmd {
                                command::PING => reply(&mut transport, &mut stream, command::PONG, Vec::new()),
                                command::GET_INFO => reply(&mut transport, &mut stream, command::INFO_RESP, fake_info_resp()),
                                command::SET_CONFIG => {
                                    let (idx, _total, body) = parse_chunk(&payload);
                                    if idx == 0 {
                                        config_chunks.clear();
                                    }
                                    config_chunks.extend_from_slice(body);
                                    reply(&mut transport, &mut stream, command::CONFIG_ACK, vec![1, 0, 0]);
                                }
                                command::GET_CONFIG => {
                                    let body = encode_chunk(0, 1, &config_chunks);
                                    reply(&mut transport, &mut stream, command::CONFIG_DATA, body);
                                }
                                command::START_STREAM => streaming = true,
                                command::STOP_STREAM => streaming = false,
                                _ => {}
                            },
                            TransportEvent::SendBytes(bytes) => {
                                let _ = stream.write_all(&bytes);
                            }
                            TransportEvent::Acked | TransportEvent::ResetAcked => {}
                        }
                    }
                }
                Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
                Err(_) => break,
            }
        }
    });
}

fn reply(transport: &mut Transport, stream: &mut TcpStream, cmd: u8, payload: Vec<u8>) {
    transport.queue_reliable(cmd, payload).expect("single outstanding slot free");
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    let mut buf = [0u8; 2048];
    while std::time::Instant::now() < deadline {
        if let Some(bytes) = transport.poll_transmit(std::time::Instant::now()) {
            stream.write_all(&bytes).unwrap();
        }
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                transport.feed(&buf[..n]);
                for event in transport.poll() {
                    if event == TransportEvent::Acked {
                        return;
                    }
                    if let TransportEvent::SendBytes(bytes) = event {
                        stream.write_all(&bytes).unwrap();
                    }
                }
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
            Err(_) => return,
        }
    }
}

fn parse_chunk(buf: &[u8]) -> (u16, u16, &[u8]) {
    let idx = u16::from_le_bytes([buf[0], buf[1]]);
    let total = u16::from_le_bytes([buf[2], buf[3]]);
    (idx, total, &buf[4..])
}

fn encode_chunk(idx: u16, total: u16, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&idx.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn fake_info_resp() -> Vec<u8> {
    let mut out = vec![1, 0, 0, 1];
    out.extend_from_slice(&[0u8; 16]);
    let mut name = b"FAKE-DEVICE".to_vec();
    name.resize(32, 0);
    out.extend_from_slice(&name);
    out
}

fn fake_telemetry() -> TelemetryPacket {
    TelemetryPacket::builder().header(1, 1000).analog(13_500, 250, 280, 0).build()
}

fn din_channel() -> Channel {
    Channel {
        channel_id: 0,
        flags: channel_flags::ENABLED,
        hw_device: HwDevice::Gpio.tag(),
        hw_index: 0,
        source_id: CH_REF_NONE,
        default_value: 0,
        name: "test-din".to_string(),
        variant: ChannelVariant::DigitalInput(DigitalInputConfig {
            gpio_pin: 0,
            active_high: true,
            debounce_ms: 0,
        }),
    }
}

fn connect() -> DeviceClient {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().unwrap();
    spawn_fake_device(listener);
    let link = TcpLink::connect(&addr.ip().to_string(), addr.port()).expect("connect");
    DeviceClient::new(Box::new(link), DeviceClientConfig::default())
}

#[test]
fn ping_round_trips_against_a_fake_device() {
    let mut client = connect();
    client.ping().expect("ping");
}

#[test]
fn get_info_returns_the_fake_devices_identity() {
    let mut client = connect();
    let info = client.get_info().expect("get_info");
    assert_eq!(info.name, "FAKE-DEVICE");
    assert_eq!(info.fw_version, [1, 0, 0]);
}

#[test]
fn set_config_then_get_config_round_trips_through_the_fake_device() {
    let mut client = connect();
    let config = Config::new(vec![din_channel()]);
    client.set_config(&config).expect("set_config");
    let readback = client.get_config().expect("get_config");
    assert_eq!(readback.channels.len(), 1);
    assert_eq!(readback.channels[0].name, "test-din");
}

#[test]
fn telemetry_start_stop_delivers_at_least_one_packet() {
    let mut client = connect();
    client.start_stream(50, 0).expect("start_stream");

    let deadline = std::time::Instant::now() + Duration::from_millis(500);
    let mut packets = Vec::new();
    while std::time::Instant::now() < deadline && packets.is_empty() {
        packets.extend(client.poll_telemetry().expect("poll_telemetry"));
    }
    client.stop_stream().expect("stop_stream");

    assert!(!packets.is_empty(), "expected at least one telemetry packet");
}
