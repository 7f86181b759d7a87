// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-layout per-kind variant payloads.
//!
//! Each variant has a pinned byte width ([`ChannelType::expected_payload_len`])
//! and a little-endian field order. `HBRIDGE`, `PID`, `TABLE_2D`/`TABLE_3D`
//! layouts are not fully consistent across the original source files; the
//! layouts fixed here are the single canonical shape mirrored by tests, per
//! the spec's Open Questions.

use crate::channel::types::{ChannelType, LogicOp, MathOp};
use crate::error::ParseError;

/// Table axis/value bound for `TABLE_2D`.
pub const TABLE_2D_MAX_POINTS: usize = 8;
/// Table axis bound for `TABLE_3D` (per axis).
pub const TABLE_3D_MAX_AXIS: usize = 4;
/// Logic input bound.
pub const LOGIC_MAX_INPUTS: usize = 8;
/// Switch input bound.
pub const SWITCH_MAX_INPUTS: usize = 4;

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// `DIGITAL_INPUT` payload (4 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalInputConfig {
    pub gpio_pin: u8,
    pub active_high: bool,
    pub debounce_ms: u16,
}

impl DigitalInputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.gpio_pin);
        out.push(self.active_high as u8);
        out.extend_from_slice(&self.debounce_ms.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            gpio_pin: buf[0],
            active_high: buf[1] != 0,
            debounce_ms: read_u16(buf, 2),
        }
    }
}

/// `ANALOG_INPUT` payload (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogInputConfig {
    pub adc_channel: u8,
    pub scale_milli: i32,
    pub offset_milli: i32,
    pub filter_tau_ms: u16,
}

impl AnalogInputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.adc_channel);
        out.push(0); // reserved
        out.extend_from_slice(&self.scale_milli.to_le_bytes());
        out.extend_from_slice(&self.offset_milli.to_le_bytes());
        out.extend_from_slice(&self.filter_tau_ms.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            adc_channel: buf[0],
            scale_milli: read_i32(buf, 2),
            offset_milli: read_i32(buf, 6),
            filter_tau_ms: read_u16(buf, 10),
        }
    }
}

/// `FREQUENCY_INPUT` payload (10 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyInputConfig {
    pub gpio_pin: u8,
    pub pulses_per_unit: u16,
    pub timeout_ms: u16,
    pub scale_milli: i32,
}

impl FrequencyInputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.gpio_pin);
        out.push(0); // reserved
        out.extend_from_slice(&self.pulses_per_unit.to_le_bytes());
        out.extend_from_slice(&self.timeout_ms.to_le_bytes());
        out.extend_from_slice(&self.scale_milli.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            gpio_pin: buf[0],
            pulses_per_unit: read_u16(buf, 2),
            timeout_ms: read_u16(buf, 4),
            scale_milli: read_i32(buf, 6),
        }
    }
}

/// `CAN_INPUT` payload (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanInputConfig {
    pub can_id: u32,
    pub start_bit: u8,
    pub bit_length: u8,
    pub big_endian: bool,
    pub data_type: u8,
    pub scale_milli: i32,
    pub offset_milli: i32,
}

impl CanInputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.can_id.to_le_bytes());
        out.push(self.start_bit);
        out.push(self.bit_length);
        out.push(self.big_endian as u8);
        out.push(self.data_type);
        out.extend_from_slice(&self.scale_milli.to_le_bytes());
        out.extend_from_slice(&self.offset_milli.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            can_id: read_u32(buf, 0),
            start_bit: buf[4],
            bit_length: buf[5],
            big_endian: buf[6] != 0,
            data_type: buf[7],
            scale_milli: read_i32(buf, 8),
            offset_milli: read_i32(buf, 12),
        }
    }
}

/// `POWER_OUTPUT` payload (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerOutputConfig {
    pub current_limit_ma: u16,
    pub inrush_limit_ma: u16,
    pub inrush_time_ms: u16,
    pub soft_start_steps: u8,
    pub soft_start_ms: u8,
    pub pwm_freq_hz: u16,
    pub pwm_duty: u8,
}

impl PowerOutputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.current_limit_ma.to_le_bytes());
        out.extend_from_slice(&self.inrush_limit_ma.to_le_bytes());
        out.extend_from_slice(&self.inrush_time_ms.to_le_bytes());
        out.push(self.soft_start_steps);
        out.push(self.soft_start_ms);
        out.extend_from_slice(&self.pwm_freq_hz.to_le_bytes());
        out.push(self.pwm_duty);
        out.push(0); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            current_limit_ma: read_u16(buf, 0),
            inrush_limit_ma: read_u16(buf, 2),
            inrush_time_ms: read_u16(buf, 4),
            soft_start_steps: buf[6],
            soft_start_ms: buf[7],
            pwm_freq_hz: read_u16(buf, 8),
            pwm_duty: buf[10],
        }
    }
}

/// `PWM_OUTPUT` payload (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmOutputConfig {
    pub gpio_pin: u8,
    pub freq_hz: u16,
    pub duty_permille: u16,
    pub current_limit_ma: u16,
}

impl PwmOutputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.gpio_pin);
        out.extend_from_slice(&self.freq_hz.to_le_bytes());
        out.extend_from_slice(&self.duty_permille.to_le_bytes());
        out.extend_from_slice(&self.current_limit_ma.to_le_bytes());
        out.push(0); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            gpio_pin: buf[0],
            freq_hz: read_u16(buf, 1),
            duty_permille: read_u16(buf, 3),
            current_limit_ma: read_u16(buf, 5),
        }
    }
}

/// `HBRIDGE` payload (10 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HBridgeConfig {
    pub fwd_gpio: u8,
    pub rev_gpio: u8,
    pub pwm_channel: u8,
    pub brake_mode: u8,
    pub current_limit_ma: u16,
    pub overcurrent_ms: u16,
}

impl HBridgeConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.fwd_gpio);
        out.push(self.rev_gpio);
        out.push(self.pwm_channel);
        out.push(self.brake_mode);
        out.extend_from_slice(&self.current_limit_ma.to_le_bytes());
        out.extend_from_slice(&self.overcurrent_ms.to_le_bytes());
        out.extend_from_slice(&[0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            fwd_gpio: buf[0],
            rev_gpio: buf[1],
            pwm_channel: buf[2],
            brake_mode: buf[3],
            current_limit_ma: read_u16(buf, 4),
            overcurrent_ms: read_u16(buf, 6),
        }
    }
}

/// `CAN_OUTPUT` payload (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanOutputConfig {
    pub can_id: u32,
    pub start_bit: u8,
    pub bit_length: u8,
    pub big_endian: bool,
    pub data_type: u8,
    pub period_ms: u16,
}

impl CanOutputConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.can_id.to_le_bytes());
        out.push(self.start_bit);
        out.push(self.bit_length);
        out.push(self.big_endian as u8);
        out.push(self.data_type);
        out.extend_from_slice(&self.period_ms.to_le_bytes());
        out.extend_from_slice(&[0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            can_id: read_u32(buf, 0),
            start_bit: buf[4],
            bit_length: buf[5],
            big_endian: buf[6] != 0,
            data_type: buf[7],
            period_ms: read_u16(buf, 8),
        }
    }
}

/// `TIMER` payload (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub mode: u8,
    pub start_channel: u16,
    pub start_edge: u8,
    pub limit_ms: u32,
}

impl TimerConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.mode);
        out.extend_from_slice(&self.start_channel.to_le_bytes());
        out.push(self.start_edge);
        out.extend_from_slice(&self.limit_ms.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            mode: buf[0],
            start_channel: read_u16(buf, 1),
            start_edge: buf[3],
            limit_ms: read_u32(buf, 4),
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.start_channel]
    }
}

/// `LOGIC` payload (26 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicConfig {
    pub operation: u8,
    pub inputs: Vec<u16>,
    pub threshold: i32,
    pub invert: bool,
}

impl LogicConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.operation);
        out.push(self.inputs.len() as u8);
        for i in 0..LOGIC_MAX_INPUTS {
            let v = self.inputs.get(i).copied().unwrap_or(crate::channel::types::CH_REF_NONE);
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.threshold.to_le_bytes());
        out.push(self.invert as u8);
        out.extend_from_slice(&[0, 0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        let operation = buf[0];
        let input_count = (buf[1] as usize).min(LOGIC_MAX_INPUTS);
        let mut inputs = Vec::with_capacity(input_count);
        for i in 0..input_count {
            inputs.push(read_u16(buf, 2 + i * 2));
        }
        let threshold = read_i32(buf, 2 + LOGIC_MAX_INPUTS * 2);
        let invert = buf[2 + LOGIC_MAX_INPUTS * 2 + 4] != 0;
        Self {
            operation,
            inputs,
            threshold,
            invert,
        }
    }

    fn references(&self) -> Vec<u16> {
        self.inputs.clone()
    }

    fn validate(&self) -> Result<(), ParseError> {
        if self.inputs.len() > LOGIC_MAX_INPUTS {
            return Err(ParseError::RangeExceeded {
                field: "logic.input_count",
            });
        }
        if LogicOp::from_tag(self.operation).is_none() {
            return Err(ParseError::BadTag { offset: 0 });
        }
        Ok(())
    }
}

/// `MATH` payload (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MathConfig {
    pub operation: u8,
    pub input_a: u16,
    pub input_b: u16,
    pub constant: i32,
}

impl MathConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.operation);
        out.push(0); // reserved byte to keep u16 fields aligned in the on-wire layout
        out.extend_from_slice(&self.input_a.to_le_bytes());
        out.extend_from_slice(&self.input_b.to_le_bytes());
        out.extend_from_slice(&self.constant.to_le_bytes());
        out.push(0);
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            operation: buf[0],
            input_a: read_u16(buf, 2),
            input_b: read_u16(buf, 4),
            constant: read_i32(buf, 6),
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_a, self.input_b]
    }

    fn validate(&self) -> Result<(), ParseError> {
        if MathOp::from_tag(self.operation).is_none() {
            return Err(ParseError::BadTag { offset: 0 });
        }
        Ok(())
    }
}

/// `TABLE_2D` payload (68 bytes): up to 8 (x, y) points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table2DConfig {
    pub input_channel: u16,
    pub points: Vec<(i32, i32)>,
}

impl Table2DConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.input_channel.to_le_bytes());
        out.push(self.points.len() as u8);
        out.push(0); // reserved
        let mut xs = [0i32; TABLE_2D_MAX_POINTS];
        let mut ys = [0i32; TABLE_2D_MAX_POINTS];
        for (i, (x, y)) in self.points.iter().enumerate().take(TABLE_2D_MAX_POINTS) {
            xs[i] = *x;
            ys[i] = *y;
        }
        for x in xs {
            out.extend_from_slice(&x.to_le_bytes());
        }
        for y in ys {
            out.extend_from_slice(&y.to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let input_channel = read_u16(buf, 0);
        let count = (buf[2] as usize).min(TABLE_2D_MAX_POINTS);
        let xs_off = 4;
        let ys_off = xs_off + TABLE_2D_MAX_POINTS * 4;
        let mut points = Vec::with_capacity(count);
        for i in 0..count {
            let x = read_i32(buf, xs_off + i * 4);
            let y = read_i32(buf, ys_off + i * 4);
            points.push((x, y));
        }
        Self { input_channel, points }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_channel]
    }

    fn validate(&self) -> Result<(), ParseError> {
        if self.points.len() > TABLE_2D_MAX_POINTS {
            return Err(ParseError::RangeExceeded {
                field: "table_2d.point_count",
            });
        }
        Ok(())
    }
}

/// `TABLE_3D` payload (104 bytes): up to 4x4 axis grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table3DConfig {
    pub input_x_channel: u16,
    pub input_y_channel: u16,
    pub x_axis: Vec<i32>,
    pub y_axis: Vec<i32>,
    pub values: Vec<i32>,
}

impl Table3DConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.input_x_channel.to_le_bytes());
        out.extend_from_slice(&self.input_y_channel.to_le_bytes());
        out.push(self.x_axis.len() as u8);
        out.push(self.y_axis.len() as u8);
        out.extend_from_slice(&[0, 0]); // reserved
        for i in 0..TABLE_3D_MAX_AXIS {
            out.extend_from_slice(&self.x_axis.get(i).copied().unwrap_or(0).to_le_bytes());
        }
        for i in 0..TABLE_3D_MAX_AXIS {
            out.extend_from_slice(&self.y_axis.get(i).copied().unwrap_or(0).to_le_bytes());
        }
        for i in 0..(TABLE_3D_MAX_AXIS * TABLE_3D_MAX_AXIS) {
            out.extend_from_slice(&self.values.get(i).copied().unwrap_or(0).to_le_bytes());
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let input_x_channel = read_u16(buf, 0);
        let input_y_channel = read_u16(buf, 2);
        let x_count = (buf[4] as usize).min(TABLE_3D_MAX_AXIS);
        let y_count = (buf[5] as usize).min(TABLE_3D_MAX_AXIS);
        let x_off = 8;
        let y_off = x_off + TABLE_3D_MAX_AXIS * 4;
        let v_off = y_off + TABLE_3D_MAX_AXIS * 4;
        let x_axis = (0..x_count).map(|i| read_i32(buf, x_off + i * 4)).collect();
        let y_axis = (0..y_count).map(|i| read_i32(buf, y_off + i * 4)).collect();
        let values = (0..(TABLE_3D_MAX_AXIS * TABLE_3D_MAX_AXIS))
            .map(|i| read_i32(buf, v_off + i * 4))
            .collect();
        Self {
            input_x_channel,
            input_y_channel,
            x_axis,
            y_axis,
            values,
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_x_channel, self.input_y_channel]
    }

    fn validate(&self) -> Result<(), ParseError> {
        if self.x_axis.len() > TABLE_3D_MAX_AXIS || self.y_axis.len() > TABLE_3D_MAX_AXIS {
            return Err(ParseError::RangeExceeded {
                field: "table_3d.axis_count",
            });
        }
        Ok(())
    }
}

/// `FILTER` payload (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub input_channel: u16,
    pub filter_type: u8,
    pub tau_ms: u16,
}

impl FilterConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.input_channel.to_le_bytes());
        out.push(self.filter_type);
        out.extend_from_slice(&self.tau_ms.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            input_channel: read_u16(buf, 0),
            filter_type: buf[2],
            tau_ms: read_u16(buf, 3),
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_channel]
    }
}

/// `PID` payload (28 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidConfig {
    pub input_channel: u16,
    pub setpoint_channel: u16,
    pub kp_milli: i32,
    pub ki_milli: i32,
    pub kd_milli: i32,
    pub out_min: i32,
    pub out_max: i32,
}

impl PidConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.input_channel.to_le_bytes());
        out.extend_from_slice(&self.setpoint_channel.to_le_bytes());
        out.extend_from_slice(&self.kp_milli.to_le_bytes());
        out.extend_from_slice(&self.ki_milli.to_le_bytes());
        out.extend_from_slice(&self.kd_milli.to_le_bytes());
        out.extend_from_slice(&self.out_min.to_le_bytes());
        out.extend_from_slice(&self.out_max.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            input_channel: read_u16(buf, 0),
            setpoint_channel: read_u16(buf, 2),
            kp_milli: read_i32(buf, 4),
            ki_milli: read_i32(buf, 8),
            kd_milli: read_i32(buf, 12),
            out_min: read_i32(buf, 16),
            out_max: read_i32(buf, 20),
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_channel, self.setpoint_channel]
    }
}

/// `NUMBER` payload (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberConfig {
    pub constant: i32,
    pub min: i32,
    pub max: i32,
    pub step: i32,
}

impl NumberConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.constant.to_le_bytes());
        out.extend_from_slice(&self.min.to_le_bytes());
        out.extend_from_slice(&self.max.to_le_bytes());
        out.extend_from_slice(&self.step.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            constant: read_i32(buf, 0),
            min: read_i32(buf, 4),
            max: read_i32(buf, 8),
            step: read_i32(buf, 12),
        }
    }
}

/// `SWITCH` payload (4 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub input_channel: u16,
    pub momentary: bool,
}

impl SwitchConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.input_channel.to_le_bytes());
        out.push(self.momentary as u8);
        out.push(0); // reserved
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            input_channel: read_u16(buf, 0),
            momentary: buf[2] != 0,
        }
    }

    fn references(&self) -> Vec<u16> {
        vec![self.input_channel]
    }
}

/// `ENUM` payload (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumConfig {
    pub data_type: u8,
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

impl EnumConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.data_type);
        out.extend_from_slice(&[0, 0, 0]); // reserved
        out.extend_from_slice(&self.min.to_le_bytes());
        out.extend_from_slice(&self.max.to_le_bytes());
        out.extend_from_slice(&self.default.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            data_type: buf[0],
            min: read_i32(buf, 4),
            max: read_i32(buf, 8),
            default: read_i32(buf, 12),
        }
    }
}

/// Per-kind payload, tagged by the enclosing `Channel::channel_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelVariant {
    None,
    DigitalInput(DigitalInputConfig),
    AnalogInput(AnalogInputConfig),
    FrequencyInput(FrequencyInputConfig),
    CanInput(CanInputConfig),
    PowerOutput(PowerOutputConfig),
    PwmOutput(PwmOutputConfig),
    HBridge(HBridgeConfig),
    CanOutput(CanOutputConfig),
    Timer(TimerConfig),
    Logic(LogicConfig),
    Math(MathConfig),
    Table2D(Table2DConfig),
    Table3D(Table3DConfig),
    Filter(FilterConfig),
    Pid(PidConfig),
    Number(NumberConfig),
    Switch(SwitchConfig),
    Enum(EnumConfig),
    System,
}

impl ChannelVariant {
    #[must_use]
    pub fn channel_type(&self) -> ChannelType {
        match self {
            Self::None => ChannelType::None,
            Self::DigitalInput(_) => ChannelType::DigitalInput,
            Self::AnalogInput(_) => ChannelType::AnalogInput,
            Self::FrequencyInput(_) => ChannelType::FrequencyInput,
            Self::CanInput(_) => ChannelType::CanInput,
            Self::PowerOutput(_) => ChannelType::PowerOutput,
            Self::PwmOutput(_) => ChannelType::PwmOutput,
            Self::HBridge(_) => ChannelType::HBridge,
            Self::CanOutput(_) => ChannelType::CanOutput,
            Self::Timer(_) => ChannelType::Timer,
            Self::Logic(_) => ChannelType::Logic,
            Self::Math(_) => ChannelType::Math,
            Self::Table2D(_) => ChannelType::Table2D,
            Self::Table3D(_) => ChannelType::Table3D,
            Self::Filter(_) => ChannelType::Filter,
            Self::Pid(_) => ChannelType::Pid,
            Self::Number(_) => ChannelType::Number,
            Self::Switch(_) => ChannelType::Switch,
            Self::Enum(_) => ChannelType::Enum,
            Self::System => ChannelType::System,
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.channel_type().expected_payload_len());
        match self {
            Self::None | Self::System => {}
            Self::DigitalInput(c) => c.encode(&mut out),
            Self::AnalogInput(c) => c.encode(&mut out),
            Self::FrequencyInput(c) => c.encode(&mut out),
            Self::CanInput(c) => c.encode(&mut out),
            Self::PowerOutput(c) => c.encode(&mut out),
            Self::PwmOutput(c) => c.encode(&mut out),
            Self::HBridge(c) => c.encode(&mut out),
            Self::CanOutput(c) => c.encode(&mut out),
            Self::Timer(c) => c.encode(&mut out),
            Self::Logic(c) => c.encode(&mut out),
            Self::Math(c) => c.encode(&mut out),
            Self::Table2D(c) => c.encode(&mut out),
            Self::Table3D(c) => c.encode(&mut out),
            Self::Filter(c) => c.encode(&mut out),
            Self::Pid(c) => c.encode(&mut out),
            Self::Number(c) => c.encode(&mut out),
            Self::Switch(c) => c.encode(&mut out),
            Self::Enum(c) => c.encode(&mut out),
        }
        out
    }

    pub(crate) fn decode(kind: ChannelType, buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() != kind.expected_payload_len() {
            return Err(ParseError::ConfigSizeMismatch {
                expected: kind.expected_payload_len(),
                actual: buf.len(),
            });
        }
        Ok(match kind {
            ChannelType::None => Self::None,
            ChannelType::System => Self::System,
            ChannelType::DigitalInput => Self::DigitalInput(DigitalInputConfig::decode(buf)),
            ChannelType::AnalogInput => Self::AnalogInput(AnalogInputConfig::decode(buf)),
            ChannelType::FrequencyInput => Self::FrequencyInput(FrequencyInputConfig::decode(buf)),
            ChannelType::CanInput => Self::CanInput(CanInputConfig::decode(buf)),
            ChannelType::PowerOutput => Self::PowerOutput(PowerOutputConfig::decode(buf)),
            ChannelType::PwmOutput => Self::PwmOutput(PwmOutputConfig::decode(buf)),
            ChannelType::HBridge => Self::HBridge(HBridgeConfig::decode(buf)),
            ChannelType::CanOutput => Self::CanOutput(CanOutputConfig::decode(buf)),
            ChannelType::Timer => Self::Timer(TimerConfig::decode(buf)),
            ChannelType::Logic => {
                let cfg = LogicConfig::decode(buf);
                cfg.validate()?;
                Self::Logic(cfg)
            }
            ChannelType::Math => {
                let cfg = MathConfig::decode(buf);
                cfg.validate()?;
                Self::Math(cfg)
            }
            ChannelType::Table2D => {
                let cfg = Table2DConfig::decode(buf);
                cfg.validate()?;
                Self::Table2D(cfg)
            }
            ChannelType::Table3D => {
                let cfg = Table3DConfig::decode(buf);
                cfg.validate()?;
                Self::Table3D(cfg)
            }
            ChannelType::Filter => Self::Filter(FilterConfig::decode(buf)),
            ChannelType::Pid => Self::Pid(PidConfig::decode(buf)),
            ChannelType::Number => Self::Number(NumberConfig::decode(buf)),
            ChannelType::Switch => Self::Switch(SwitchConfig::decode(buf)),
            ChannelType::Enum => Self::Enum(EnumConfig::decode(buf)),
        })
    }

    /// Every non-sentinel reference field this variant's payload carries,
    /// for use by the config validator's reference-graph walk.
    #[must_use]
    pub fn references(&self) -> Vec<u16> {
        match self {
            Self::Timer(c) => c.references(),
            Self::Logic(c) => c.references(),
            Self::Math(c) => c.references(),
            Self::Table2D(c) => c.references(),
            Self::Table3D(c) => c.references(),
            Self::Filter(c) => c.references(),
            Self::Pid(c) => c.references(),
            Self::Switch(c) => c.references(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(variant: ChannelVariant) {
        let kind = variant.channel_type();
        let encoded = variant.encode();
        assert_eq!(encoded.len(), kind.expected_payload_len());
        let decoded = ChannelVariant::decode(kind, &encoded).expect("decode");
        assert_eq!(decoded, variant);
    }

    #[test]
    fn digital_input_roundtrip() {
        roundtrip(ChannelVariant::DigitalInput(DigitalInputConfig {
            gpio_pin: 3,
            active_high: true,
            debounce_ms: 25,
        }));
    }

    #[test]
    fn power_output_roundtrip() {
        roundtrip(ChannelVariant::PowerOutput(PowerOutputConfig {
            current_limit_ma: 5000,
            inrush_limit_ma: 100,
            inrush_time_ms: 10000,
            soft_start_steps: 100,
            soft_start_ms: 1,
            pwm_freq_hz: 0,
            pwm_duty: 0,
        }));
    }

    #[test]
    fn logic_roundtrip_with_partial_inputs() {
        roundtrip(ChannelVariant::Logic(LogicConfig {
            operation: LogicOp::And.tag(),
            inputs: vec![10, 20, 30],
            threshold: 0,
            invert: false,
        }));
    }

    #[test]
    fn logic_rejects_too_many_inputs() {
        let cfg = LogicConfig {
            operation: LogicOp::Or.tag(),
            inputs: (0..9u16).collect(),
            threshold: 0,
            invert: false,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn table_2d_roundtrip() {
        roundtrip(ChannelVariant::Table2D(Table2DConfig {
            input_channel: 42,
            points: vec![(0, 0), (100, 50), (200, 100)],
        }));
    }

    #[test]
    fn table_3d_roundtrip() {
        roundtrip(ChannelVariant::Table3D(Table3DConfig {
            input_x_channel: 1,
            input_y_channel: 2,
            x_axis: vec![0, 10, 20, 30],
            y_axis: vec![0, 1],
            values: (0..16).collect(),
        }));
    }

    #[test]
    fn pid_roundtrip() {
        roundtrip(ChannelVariant::Pid(PidConfig {
            input_channel: 5,
            setpoint_channel: 6,
            kp_milli: 1500,
            ki_milli: 200,
            kd_milli: 0,
            out_min: -1000,
            out_max: 1000,
        }));
    }

    #[test]
    fn all_expected_payload_lens_are_consistent_with_encoder_output() {
        for kind in [
            ChannelType::None,
            ChannelType::DigitalInput,
            ChannelType::AnalogInput,
            ChannelType::FrequencyInput,
            ChannelType::CanInput,
            ChannelType::PowerOutput,
            ChannelType::PwmOutput,
            ChannelType::HBridge,
            ChannelType::CanOutput,
            ChannelType::Timer,
            ChannelType::Logic,
            ChannelType::Math,
            ChannelType::Table2D,
            ChannelType::Table3D,
            ChannelType::Filter,
            ChannelType::Pid,
            ChannelType::Number,
            ChannelType::Switch,
            ChannelType::Enum,
            ChannelType::System,
        ] {
            assert!(kind.expected_payload_len() <= 255, "{kind:?} exceeds u8 config_size");
        }
    }

    #[test]
    fn config_size_mismatch_is_detected() {
        let short = vec![0u8; 3];
        let err = ChannelVariant::decode(ChannelType::DigitalInput, &short).unwrap_err();
        assert!(matches!(err, ParseError::ConfigSizeMismatch { .. }));
    }
}
