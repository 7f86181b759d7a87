// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end scenarios drawn from the protocol's concrete test seeds:
//! config round-trip over the frame codec, chunked transfer resilience to
//! injected ACK loss, and telemetry parse through a real frame.

use std::time::{Duration, Instant};

use pmu_proto::channel::variants::{DigitalInputConfig, PowerOutputConfig};
use pmu_proto::channel::{channel_flags, Channel, ChannelVariant, Config, HwDevice, CH_REF_NONE};
use pmu_proto::constants::command;
use pmu_proto::frame::{encode_frame, FrameDecoder};
use pmu_proto::telemetry::{section_flags, TelemetryPacket};
use pmu_proto::transport::{TMinConfig, Transport, TransportEvent};

fn digital_input(channel_id: u16, name: &str) -> Channel {
    Channel {
        channel_id,
        flags: channel_flags::ENABLED,
        hw_device: HwDevice::Gpio.tag(),
        hw_index: 0,
        source_id: CH_REF_NONE,
        default_value: 0,
        name: name.to_string(),
        variant: ChannelVariant::DigitalInput(DigitalInputConfig {
            gpio_pin: 0,
            active_high: true,
            debounce_ms: 0,
        }),
    }
}

fn power_output(channel_id: u16, source_id: u16, name: &str) -> Channel {
    Channel {
        channel_id,
        flags: channel_flags::ENABLED,
        hw_device: HwDevice::Profet.tag(),
        hw_index: 1,
        source_id,
        default_value: 0,
        name: name.to_string(),
        variant: ChannelVariant::PowerOutput(PowerOutputConfig {
            current_limit_ma: 5000,
            inrush_limit_ma: 100,
            inrush_time_ms: 10000,
            soft_start_steps: 1,
            soft_start_ms: 0,
            pwm_freq_hz: 0,
            pwm_duty: 100,
        }),
    }
}

#[test]
fn full_frame_then_config_roundtrip() {
    // The two-channel seed config: a digital input feeding a power output.
    let din = digital_input(50, "TestDIN");
    let output = power_output(100, 50, "OutLED");

    let config = Config::new(vec![din, output]);
    config.validate().expect("seed config must validate");

    let encoded = config.encode();
    let frame_bytes = encode_frame(command::SET_CONFIG, &encoded);

    let mut decoder = FrameDecoder::new();
    decoder.feed(&frame_bytes);
    let frame = decoder.poll().expect("frame available").expect("crc valid");
    assert_eq!(frame.frame_type, command::SET_CONFIG);

    let decoded = Config::decode(&frame.payload).expect("config decodes");
    assert_eq!(decoded, config);
}

#[test]
fn transport_chunked_transfer_survives_injected_ack_loss() {
    let mut host = Transport::new(TMinConfig {
        retx_timeout: Duration::from_millis(5),
        max_retries: 5,
    });
    let mut device = Transport::new(TMinConfig::default());

    // A 2-chunk LOAD_BINARY-style transfer: chunk 0's ACK is dropped once.
    let chunks: [&[u8]; 2] = [b"chunk-zero-bytes", b"chunk-one-bytes"];
    let mut drop_next_ack = true;

    for chunk in chunks {
        host.queue_reliable(command::LOAD_BINARY, chunk.to_vec()).unwrap();

        let mut now = Instant::now();
        let mut delivered = false;
        for _ in 0..5 {
            if let Some(bytes) = host.poll_transmit(now) {
                device.feed(&bytes);
                let events = device.poll();
                for event in events {
                    match event {
                        TransportEvent::Delivered(cmd, payload) => {
                            assert_eq!(cmd, command::LOAD_BINARY);
                            assert_eq!(payload, chunk);
                        }
                        TransportEvent::SendBytes(ack) => {
                            if drop_next_ack {
                                drop_next_ack = false;
                                continue; // simulate loss
                            }
                            host.feed(&ack);
                        }
                        _ => {}
                    }
                }
            }
            let host_events = host.poll();
            if host_events.contains(&TransportEvent::Acked) {
                delivered = true;
                break;
            }
            now += Duration::from_millis(10);
        }
        assert!(delivered, "chunk must complete within the retry budget");
        assert!(!host.has_outstanding());
    }

    assert!(host.stats().retransmitted >= 1, "the dropped ack must have forced a retransmit");
}

#[test]
fn telemetry_outputs_and_din_scenario_over_a_real_frame() {
    let mut outputs = [0u8; 30];
    outputs[0] = 1;

    let packet = TelemetryPacket::builder()
        .header(1, 1000)
        .analog(12000, 0, 0, 0)
        .with_outputs(outputs)
        .with_din(0x0000_0001)
        .build();

    assert_eq!(packet.section_flags, section_flags::OUTPUTS | section_flags::DIN);

    let encoded = packet.encode();
    let frame_bytes = encode_frame(command::TELEMETRY, &encoded);

    let mut decoder = FrameDecoder::new();
    decoder.feed(&frame_bytes);
    let frame = decoder.poll().unwrap().unwrap();
    let decoded = TelemetryPacket::decode(&frame.payload).unwrap();

    assert_eq!(decoded.outputs().unwrap()[0], 1);
    assert!(decoded.outputs().unwrap()[1..].iter().all(|&b| b == 0));
    assert_eq!(decoded.get_din(0), Some(true));
    assert_eq!(decoded.get_din(1), Some(false));
    assert!(decoded.adc().is_none());
    assert!(decoded.faults().is_none());
    assert!(decoded.currents().is_none());
    assert!(decoded.get_virtual_value(1).is_none());
}
