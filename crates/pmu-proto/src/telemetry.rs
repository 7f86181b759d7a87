// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Section-flagged telemetry packet codec (spec §4.4).
//!
//! A fixed 20-byte header is always present; optional sections follow in
//! bit-ascending order of `section_flags`, each occupying zero bytes when
//! its flag is clear.

use crate::constants::{PMU_TELEM_MAGIC, PMU_TELEM_VERSION};
use crate::error::TelemetryError;

/// Section flag bits, in the on-wire bit-ascending order they appear.
pub mod section_flags {
    pub const ADC: u16 = 0x0001;
    pub const OUTPUTS: u16 = 0x0002;
    pub const HBRIDGE: u16 = 0x0004;
    pub const DIN: u16 = 0x0008;
    pub const VIRTUALS: u16 = 0x0010;
    pub const FAULTS: u16 = 0x0020;
    pub const CURRENTS: u16 = 0x0040;
    pub const EXTENDED: u16 = 0x0080;
}

const HEADER_LEN: usize = 20;
const ADC_COUNT: usize = 20;
const OUTPUTS_COUNT: usize = 30;
const HBRIDGE_COUNT: usize = 4;
const CURRENTS_COUNT: usize = 30;
/// Upper bound on `VIRTUALS` section entries.
pub const MAX_VIRTUAL_ENTRIES: usize = 32;

/// H-bridge channel snapshot: position (signed, direction+magnitude) and
/// measured current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HBridgeReading {
    pub position: i16,
    pub current_ma: u16,
}

/// Fault section payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Faults {
    pub status: u8,
    pub flags: u8,
}

/// A decoded telemetry packet. Section accessors return `None` when the
/// corresponding bit in `section_flags` was clear.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    pub stream_counter: u32,
    pub timestamp_ms: u32,
    pub input_voltage_mv: u16,
    pub mcu_temp_decic: i16,
    pub board_temp_decic: i16,
    pub total_current_ma: u32,
    pub section_flags: u16,

    adc: Option<[u16; ADC_COUNT]>,
    outputs: Option<[u8; OUTPUTS_COUNT]>,
    hbridge: Option<[HBridgeReading; HBRIDGE_COUNT]>,
    din: Option<u32>,
    virtuals: Option<Vec<(u16, i32)>>,
    faults: Option<Faults>,
    currents: Option<[u16; CURRENTS_COUNT]>,
}

impl TelemetryPacket {
    #[must_use]
    pub fn input_voltage_v(&self) -> f32 {
        f32::from(self.input_voltage_mv) / 1000.0
    }

    #[must_use]
    pub fn mcu_temp_c(&self) -> f32 {
        f32::from(self.mcu_temp_decic) / 10.0
    }

    #[must_use]
    pub fn board_temp_c(&self) -> f32 {
        f32::from(self.board_temp_decic) / 10.0
    }

    #[must_use]
    pub fn total_current_a(&self) -> f32 {
        self.total_current_ma as f32 / 1000.0
    }

    #[must_use]
    pub fn adc(&self) -> Option<&[u16; ADC_COUNT]> {
        self.adc.as_ref()
    }

    #[must_use]
    pub fn outputs(&self) -> Option<&[u8; OUTPUTS_COUNT]> {
        self.outputs.as_ref()
    }

    #[must_use]
    pub fn hbridge(&self) -> Option<&[HBridgeReading; HBRIDGE_COUNT]> {
        self.hbridge.as_ref()
    }

    #[must_use]
    pub fn din_bitmask(&self) -> Option<u32> {
        self.din
    }

    /// Single digital-input pin lookup; `None` if the `DIN` section is
    /// absent from this packet.
    #[must_use]
    pub fn get_din(&self, pin: u8) -> Option<bool> {
        self.din.map(|bits| bits & (1 << pin) != 0)
    }

    #[must_use]
    pub fn faults(&self) -> Option<Faults> {
        self.faults
    }

    #[must_use]
    pub fn currents(&self) -> Option<&[u16; CURRENTS_COUNT]> {
        self.currents.as_ref()
    }

    /// Look up a virtual channel's current value by channel id; `None` if
    /// the `VIRTUALS` section is absent or the id isn't present in it.
    #[must_use]
    pub fn get_virtual_value(&self, channel_id: u16) -> Option<i32> {
        self.virtuals
            .as_ref()?
            .iter()
            .find(|(id, _)| *id == channel_id)
            .map(|(_, v)| *v)
    }

    /// Builder used by the emulator and tests to construct a packet for
    /// encoding; section fields present here set the corresponding
    /// `section_flags` bit.
    #[must_use]
    pub fn builder() -> TelemetryPacketBuilder {
        TelemetryPacketBuilder::default()
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + 64);
        out.extend_from_slice(&self.stream_counter.to_le_bytes());
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.extend_from_slice(&self.input_voltage_mv.to_le_bytes());
        out.extend_from_slice(&self.mcu_temp_decic.to_le_bytes());
        out.extend_from_slice(&self.board_temp_decic.to_le_bytes());
        out.extend_from_slice(&self.total_current_ma.to_le_bytes());
        out.extend_from_slice(&self.section_flags.to_le_bytes());

        if let Some(adc) = &self.adc {
            for v in adc {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        if let Some(outputs) = &self.outputs {
            out.extend_from_slice(outputs);
        }
        if let Some(hbridge) = &self.hbridge {
            for r in hbridge {
                out.extend_from_slice(&r.position.to_le_bytes());
            }
            for r in hbridge {
                out.extend_from_slice(&r.current_ma.to_le_bytes());
            }
        }
        if let Some(din) = &self.din {
            out.extend_from_slice(&din.to_le_bytes());
        }
        if let Some(virtuals) = &self.virtuals {
            out.extend_from_slice(&(virtuals.len() as u16).to_le_bytes());
            for (id, value) in virtuals {
                out.extend_from_slice(&id.to_le_bytes());
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        if let Some(faults) = &self.faults {
            out.push(faults.status);
            out.push(faults.flags);
            out.extend_from_slice(&[0, 0]); // reserved
        }
        if let Some(currents) = &self.currents {
            for v in currents {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }

        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, TelemetryError> {
        if buf.len() < HEADER_LEN {
            return Err(TelemetryError::Truncated {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }

        let stream_counter = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let timestamp_ms = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let input_voltage_mv = u16::from_le_bytes([buf[8], buf[9]]);
        let mcu_temp_decic = i16::from_le_bytes([buf[10], buf[11]]);
        let board_temp_decic = i16::from_le_bytes([buf[12], buf[13]]);
        let total_current_ma = u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]);
        let section_flags = u16::from_le_bytes([buf[18], buf[19]]);

        let mut offset = HEADER_LEN;
        let mut adc = None;
        let mut outputs = None;
        let mut hbridge = None;
        let mut din = None;
        let mut virtuals = None;
        let mut faults = None;
        let mut currents = None;

        let need = |offset: usize, len: usize| -> Result<(), TelemetryError> {
            if buf.len() < offset + len {
                Err(TelemetryError::Truncated {
                    needed: offset + len,
                    available: buf.len(),
                })
            } else {
                Ok(())
            }
        };

        if section_flags & section_flags::ADC != 0 {
            let len = ADC_COUNT * 2;
            need(offset, len)?;
            let mut values = [0u16; ADC_COUNT];
            for (i, v) in values.iter_mut().enumerate() {
                let o = offset + i * 2;
                *v = u16::from_le_bytes([buf[o], buf[o + 1]]);
            }
            adc = Some(values);
            offset += len;
        }

        if section_flags & section_flags::OUTPUTS != 0 {
            need(offset, OUTPUTS_COUNT)?;
            let mut values = [0u8; OUTPUTS_COUNT];
            values.copy_from_slice(&buf[offset..offset + OUTPUTS_COUNT]);
            outputs = Some(values);
            offset += OUTPUTS_COUNT;
        }

        if section_flags & section_flags::HBRIDGE != 0 {
            let len = HBRIDGE_COUNT * 2 + HBRIDGE_COUNT * 2;
            need(offset, len)?;
            let mut positions = [0i16; HBRIDGE_COUNT];
            for (i, p) in positions.iter_mut().enumerate() {
                let o = offset + i * 2;
                *p = i16::from_le_bytes([buf[o], buf[o + 1]]);
            }
            let currents_off = offset + HBRIDGE_COUNT * 2;
            let mut readings = [HBridgeReading {
                position: 0,
                current_ma: 0,
            }; HBRIDGE_COUNT];
            for (i, reading) in readings.iter_mut().enumerate() {
                let o = currents_off + i * 2;
                reading.position = positions[i];
                reading.current_ma = u16::from_le_bytes([buf[o], buf[o + 1]]);
            }
            hbridge = Some(readings);
            offset += len;
        }

        if section_flags & section_flags::DIN != 0 {
            need(offset, 4)?;
            din = Some(u32::from_le_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]));
            offset += 4;
        }

        if section_flags & section_flags::VIRTUALS != 0 {
            need(offset, 2)?;
            let count = u16::from_le_bytes([buf[offset], buf[offset + 1]]) as usize;
            if count > MAX_VIRTUAL_ENTRIES {
                return Err(TelemetryError::TooManyVirtuals { count });
            }
            offset += 2;
            need(offset, count * 6)?;
            let mut entries = Vec::with_capacity(count);
            for i in 0..count {
                let o = offset + i * 6;
                let id = u16::from_le_bytes([buf[o], buf[o + 1]]);
                let value = i32::from_le_bytes([buf[o + 2], buf[o + 3], buf[o + 4], buf[o + 5]]);
                entries.push((id, value));
            }
            virtuals = Some(entries);
            offset += count * 6;
        }

        if section_flags & section_flags::FAULTS != 0 {
            need(offset, 4)?;
            faults = Some(Faults {
                status: buf[offset],
                flags: buf[offset + 1],
            });
            offset += 4;
        }

        if section_flags & section_flags::CURRENTS != 0 {
            need(offset, CURRENTS_COUNT * 2)?;
            let mut values = [0u16; CURRENTS_COUNT];
            for (i, v) in values.iter_mut().enumerate() {
                let o = offset + i * 2;
                *v = u16::from_le_bytes([buf[o], buf[o + 1]]);
            }
            currents = Some(values);
        }
        // EXTENDED (0x0080) is reserved; its bytes, if any, are ignored.

        Ok(Self {
            stream_counter,
            timestamp_ms,
            input_voltage_mv,
            mcu_temp_decic,
            board_temp_decic,
            total_current_ma,
            section_flags,
            adc,
            outputs,
            hbridge,
            din,
            virtuals,
            faults,
            currents,
        })
    }
}

/// Builder for constructing a [`TelemetryPacket`] to encode; each `with_*`
/// call both stores the section data and sets its `section_flags` bit.
#[derive(Debug, Default)]
pub struct TelemetryPacketBuilder {
    stream_counter: u32,
    timestamp_ms: u32,
    input_voltage_mv: u16,
    mcu_temp_decic: i16,
    board_temp_decic: i16,
    total_current_ma: u32,
    adc: Option<[u16; ADC_COUNT]>,
    outputs: Option<[u8; OUTPUTS_COUNT]>,
    hbridge: Option<[HBridgeReading; HBRIDGE_COUNT]>,
    din: Option<u32>,
    virtuals: Option<Vec<(u16, i32)>>,
    faults: Option<Faults>,
    currents: Option<[u16; CURRENTS_COUNT]>,
}

impl TelemetryPacketBuilder {
    #[must_use]
    pub fn header(mut self, stream_counter: u32, timestamp_ms: u32) -> Self {
        self.stream_counter = stream_counter;
        self.timestamp_ms = timestamp_ms;
        self
    }

    #[must_use]
    pub fn analog(mut self, input_voltage_mv: u16, mcu_temp_decic: i16, board_temp_decic: i16, total_current_ma: u32) -> Self {
        self.input_voltage_mv = input_voltage_mv;
        self.mcu_temp_decic = mcu_temp_decic;
        self.board_temp_decic = board_temp_decic;
        self.total_current_ma = total_current_ma;
        self
    }

    #[must_use]
    pub fn with_adc(mut self, values: [u16; ADC_COUNT]) -> Self {
        self.adc = Some(values);
        self
    }

    #[must_use]
    pub fn with_outputs(mut self, values: [u8; OUTPUTS_COUNT]) -> Self {
        self.outputs = Some(values);
        self
    }

    #[must_use]
    pub fn with_hbridge(mut self, values: [HBridgeReading; HBRIDGE_COUNT]) -> Self {
        self.hbridge = Some(values);
        self
    }

    #[must_use]
    pub fn with_din(mut self, bitmask: u32) -> Self {
        self.din = Some(bitmask);
        self
    }

    /// `entries.len()` must not exceed [`MAX_VIRTUAL_ENTRIES`]; entries
    /// beyond the bound are silently truncated rather than produced as an
    /// unparseable packet.
    #[must_use]
    pub fn with_virtuals(mut self, mut entries: Vec<(u16, i32)>) -> Self {
        entries.truncate(MAX_VIRTUAL_ENTRIES);
        self.virtuals = Some(entries);
        self
    }

    #[must_use]
    pub fn with_faults(mut self, status: u8, flags: u8) -> Self {
        self.faults = Some(Faults { status, flags });
        self
    }

    #[must_use]
    pub fn with_currents(mut self, values: [u16; CURRENTS_COUNT]) -> Self {
        self.currents = Some(values);
        self
    }

    #[must_use]
    pub fn build(self) -> TelemetryPacket {
        let mut flags = 0u16;
        if self.adc.is_some() {
            flags |= section_flags::ADC;
        }
        if self.outputs.is_some() {
            flags |= section_flags::OUTPUTS;
        }
        if self.hbridge.is_some() {
            flags |= section_flags::HBRIDGE;
        }
        if self.din.is_some() {
            flags |= section_flags::DIN;
        }
        if self.virtuals.is_some() {
            flags |= section_flags::VIRTUALS;
        }
        if self.faults.is_some() {
            flags |= section_flags::FAULTS;
        }
        if self.currents.is_some() {
            flags |= section_flags::CURRENTS;
        }

        TelemetryPacket {
            stream_counter: self.stream_counter,
            timestamp_ms: self.timestamp_ms,
            input_voltage_mv: self.input_voltage_mv,
            mcu_temp_decic: self.mcu_temp_decic,
            board_temp_decic: self.board_temp_decic,
            total_current_ma: self.total_current_ma,
            section_flags: flags,
            adc: self.adc,
            outputs: self.outputs,
            hbridge: self.hbridge,
            din: self.din,
            virtuals: self.virtuals,
            faults: self.faults,
            currents: self.currents,
        }
    }
}

/// Envelope wrapping telemetry packet bytes for offline logs, identified by
/// `PMU_TELEM_MAGIC`/`PMU_TELEM_VERSION`.
pub fn encode_logged_packet(packet: &TelemetryPacket) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&PMU_TELEM_MAGIC.to_le_bytes());
    out.extend_from_slice(&PMU_TELEM_VERSION.to_le_bytes());
    out.extend_from_slice(&packet.encode());
    out
}

pub fn decode_logged_packet(buf: &[u8]) -> Result<TelemetryPacket, TelemetryError> {
    if buf.len() < 6 {
        return Err(TelemetryError::Truncated {
            needed: 6,
            available: buf.len(),
        });
    }
    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if magic != PMU_TELEM_MAGIC || version != PMU_TELEM_VERSION {
        return Err(TelemetryError::BadEnvelope);
    }
    TelemetryPacket::decode(&buf[6..])
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_and_din_scenario_from_spec() {
        let packet = TelemetryPacket::builder()
            .header(1, 1000)
            .analog(12000, 0, 0, 0)
            .with_outputs({
                let mut outputs = [0u8; OUTPUTS_COUNT];
                outputs[0] = 1;
                outputs
            })
            .with_din(0x0000_0001)
            .build();

        assert_eq!(packet.section_flags, section_flags::OUTPUTS | section_flags::DIN);

        let encoded = packet.encode();
        let decoded = TelemetryPacket::decode(&encoded).expect("decodes");

        assert_eq!(decoded.outputs().unwrap()[0], 1);
        assert!(decoded.outputs().unwrap()[1..].iter().all(|&b| b == 0));
        assert_eq!(decoded.get_din(0), Some(true));
        assert_eq!(decoded.get_din(1), Some(false));
        assert!(decoded.adc().is_none());
        assert!(decoded.faults().is_none());
        assert!(decoded.currents().is_none());
        assert_eq!(decoded.get_virtual_value(5), None);
    }

    #[test]
    fn absent_sections_return_none() {
        let packet = TelemetryPacket::builder().header(0, 0).build();
        assert_eq!(packet.section_flags, 0);
        let encoded = packet.encode();
        assert_eq!(encoded.len(), HEADER_LEN);
        let decoded = TelemetryPacket::decode(&encoded).unwrap();
        assert!(decoded.adc().is_none());
        assert!(decoded.outputs().is_none());
        assert!(decoded.hbridge().is_none());
        assert!(decoded.din_bitmask().is_none());
        assert!(decoded.faults().is_none());
        assert!(decoded.currents().is_none());
    }

    #[test]
    fn virtuals_round_trip_and_bound() {
        let entries: Vec<(u16, i32)> = (0..32).map(|i| (i, i as i32 * 10)).collect();
        let packet = TelemetryPacket::builder()
            .header(0, 0)
            .with_virtuals(entries.clone())
            .build();
        let encoded = packet.encode();
        let decoded = TelemetryPacket::decode(&encoded).unwrap();
        for (id, value) in &entries {
            assert_eq!(decoded.get_virtual_value(*id), Some(*value));
        }
        assert_eq!(decoded.get_virtual_value(100), None);
    }

    #[test]
    fn virtuals_over_bound_rejected_on_decode() {
        let mut buf = TelemetryPacket::builder().header(0, 0).build().encode();
        // Hand-craft a VIRTUALS section with count 33 to bypass the builder's
        // truncation and exercise the decoder's own bound check.
        buf[18..20].copy_from_slice(&section_flags::VIRTUALS.to_le_bytes());
        buf.extend_from_slice(&33u16.to_le_bytes());
        for i in 0..33u16 {
            buf.extend_from_slice(&i.to_le_bytes());
            buf.extend_from_slice(&0i32.to_le_bytes());
        }
        let err = TelemetryPacket::decode(&buf).unwrap_err();
        assert_eq!(err, TelemetryError::TooManyVirtuals { count: 33 });
    }

    #[test]
    fn truncated_packet_is_rejected() {
        let packet = TelemetryPacket::builder()
            .header(0, 0)
            .with_adc([0; ADC_COUNT])
            .build();
        let encoded = packet.encode();
        let err = TelemetryPacket::decode(&encoded[..encoded.len() - 5]).unwrap_err();
        assert!(matches!(err, TelemetryError::Truncated { .. }));
    }

    #[test]
    fn convenience_accessors_scale_correctly() {
        let packet = TelemetryPacket::builder()
            .header(0, 0)
            .analog(12_500, 235, 410, 3_200)
            .build();
        assert!((packet.input_voltage_v() - 12.5).abs() < 1e-6);
        assert!((packet.mcu_temp_c() - 23.5).abs() < 1e-6);
        assert!((packet.board_temp_c() - 41.0).abs() < 1e-6);
        assert!((packet.total_current_a() - 3.2).abs() < 1e-6);
    }

    #[test]
    fn all_sections_together_stay_within_256_bytes() {
        let entries: Vec<(u16, i32)> = (0..32).map(|i| (i, 0)).collect();
        let packet = TelemetryPacket::builder()
            .header(0, 0)
            .analog(0, 0, 0, 0)
            .with_adc([0; ADC_COUNT])
            .with_outputs([0; OUTPUTS_COUNT])
            .with_hbridge([HBridgeReading { position: 0, current_ma: 0 }; HBRIDGE_COUNT])
            .with_din(0)
            .with_virtuals(entries)
            .with_faults(0, 0)
            .with_currents([0; CURRENTS_COUNT])
            .build();
        assert!(packet.encode().len() <= 256);
    }

    #[test]
    fn legacy_decoder_is_test_only_and_reads_debug_tail() {
        let mut buf = vec![0u8; 90];
        buf[0..4].copy_from_slice(&7u32.to_le_bytes());
        buf[79..90].fill(0xEE);
        let packet = legacy::LegacyTelemetryDecoder::decode(&buf).expect("legacy decode");
        assert_eq!(packet.stream_counter, 7);
        assert!(packet.debug_bytes.iter().all(|&b| b == 0xEE));
    }
}
