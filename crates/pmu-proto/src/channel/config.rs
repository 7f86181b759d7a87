// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary `Config`: an ordered sequence of [`Channel`]s with uniqueness and
//! reference-graph validation.

use std::collections::{HashMap, HashSet};

use crate::channel::types::{channel_flags, ChannelType, HwDevice, CH_REF_NONE};
use crate::channel::variants::ChannelVariant;
use crate::constants::{PMU_CONFIG_MAGIC, PMU_CONFIG_VERSION};
use crate::error::ParseError;

/// Maximum byte length of a channel's `name` field.
pub const MAX_NAME_LEN: usize = 31;
/// Fixed header size in bytes, before the variable name and variant payload.
const HEADER_LEN: usize = 14;

/// A single channel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub channel_id: u16,
    pub flags: u8,
    pub hw_device: u8,
    pub hw_index: u8,
    pub source_id: u16,
    pub default_value: i32,
    pub name: String,
    pub variant: ChannelVariant,
}

impl Channel {
    #[must_use]
    pub fn channel_type(&self) -> ChannelType {
        self.variant.channel_type()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.flags & channel_flags::ENABLED != 0
    }

    /// Every reference field this channel carries: `source_id` plus
    /// whatever the variant payload adds (logic inputs, table axes, ...).
    fn references(&self) -> Vec<u16> {
        let mut refs = self.variant.references();
        refs.push(self.source_id);
        refs
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let payload = self.variant.encode();
        let name_bytes = self.name.as_bytes();

        out.extend_from_slice(&self.channel_id.to_le_bytes());
        out.push(self.channel_type().tag());
        out.push(self.flags);
        out.push(self.hw_device);
        out.push(self.hw_index);
        out.extend_from_slice(&self.source_id.to_le_bytes());
        out.extend_from_slice(&self.default_value.to_le_bytes());
        out.push(name_bytes.len() as u8);
        out.push(payload.len() as u8);
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&payload);
    }

    /// Decode one channel starting at `buf[0]`; returns the channel and the
    /// number of bytes consumed.
    fn decode(buf: &[u8], base_offset: usize) -> Result<(Self, usize), ParseError> {
        if buf.len() < HEADER_LEN {
            return Err(ParseError::Truncated { offset: base_offset });
        }

        let channel_id = u16::from_le_bytes([buf[0], buf[1]]);
        let type_tag = buf[2];
        let flags = buf[3];
        let hw_device = buf[4];
        let hw_index = buf[5];
        let source_id = u16::from_le_bytes([buf[6], buf[7]]);
        let default_value = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let name_len = buf[12] as usize;
        let config_size = buf[13] as usize;

        if name_len > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong {
                offset: base_offset + 12,
            });
        }

        let kind = ChannelType::from_tag(type_tag).ok_or(ParseError::BadTag {
            offset: base_offset + 2,
        })?;

        let name_start = HEADER_LEN;
        let name_end = name_start + name_len;
        let payload_end = name_end + config_size;
        if buf.len() < payload_end {
            return Err(ParseError::Truncated { offset: base_offset });
        }

        let name = std::str::from_utf8(&buf[name_start..name_end])
            .map_err(|_| ParseError::NameNotUtf8 {
                offset: base_offset + name_start,
            })?
            .to_string();

        let variant = ChannelVariant::decode(kind, &buf[name_end..payload_end])?;

        Ok((
            Channel {
                channel_id,
                flags,
                hw_device,
                hw_index,
                source_id,
                default_value,
                name,
                variant,
            },
            payload_end,
        ))
    }
}

/// An ordered sequence of channels, the unit the config codec encodes and
/// decodes end to end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub channels: Vec<Channel>,
}

impl Config {
    #[must_use]
    pub fn new(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    #[must_use]
    pub fn get(&self, channel_id: u16) -> Option<&Channel> {
        self.channels.iter().find(|c| c.channel_id == channel_id)
    }

    /// Total-function encoder: `encode(config) -> bytes` never fails.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.channels.len() as u16).to_le_bytes());
        for channel in &self.channels {
            channel.encode(&mut out);
        }
        out
    }

    /// Decode a byte buffer into a `Config`, then run full validation.
    /// `decode(encode(c)) == c` for every valid `c`.
    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < 2 {
            return Err(ParseError::Truncated { offset: 0 });
        }
        let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut offset = 2;
        let mut channels = Vec::with_capacity(count);

        for _ in 0..count {
            let (channel, consumed) = Channel::decode(&buf[offset..], offset)?;
            offset += consumed;
            channels.push(channel);
        }

        let config = Config { channels };
        config.validate()?;
        Ok(config)
    }

    /// Run the five validation passes from the spec: unique ids, referential
    /// integrity, acyclicity, per-variant range checks, hardware-binding
    /// sanity. All channels are already structurally well-formed by the time
    /// this runs (it's called from `decode` after per-channel parsing, and
    /// is also exposed publicly for hosts constructing a `Config` in memory).
    pub fn validate(&self) -> Result<(), ParseError> {
        self.validate_unique_ids()?;
        self.validate_referential_integrity()?;
        self.validate_acyclic()?;
        self.validate_ranges()?;
        self.validate_hardware_bindings()?;
        Ok(())
    }

    fn validate_unique_ids(&self) -> Result<(), ParseError> {
        let mut seen = HashSet::with_capacity(self.channels.len());
        for channel in &self.channels {
            if !seen.insert(channel.channel_id) {
                return Err(ParseError::DuplicateId {
                    id: channel.channel_id,
                });
            }
        }
        Ok(())
    }

    fn validate_referential_integrity(&self) -> Result<(), ParseError> {
        let ids: HashSet<u16> = self.channels.iter().map(|c| c.channel_id).collect();
        for channel in &self.channels {
            for reference in channel.references() {
                if reference != CH_REF_NONE && !ids.contains(&reference) {
                    return Err(ParseError::DanglingRef { id: reference });
                }
            }
        }
        Ok(())
    }

    fn validate_acyclic(&self) -> Result<(), ParseError> {
        let by_id: HashMap<u16, &Channel> = self.channels.iter().map(|c| (c.channel_id, c)).collect();

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<u16, Mark> = HashMap::new();

        for channel in &self.channels {
            if channel.references().iter().any(|r| *r == channel.channel_id) {
                return Err(ParseError::CyclicRef {
                    id: channel.channel_id,
                });
            }
            if marks.contains_key(&channel.channel_id) {
                continue;
            }
            visit(channel.channel_id, &by_id, &mut marks)?;
        }

        fn visit(
            id: u16,
            by_id: &HashMap<u16, &Channel>,
            marks: &mut HashMap<u16, Mark>,
        ) -> Result<(), ParseError> {
            match marks.get(&id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ParseError::CyclicRef { id }),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(channel) = by_id.get(&id) {
                for reference in channel.references() {
                    if reference == CH_REF_NONE {
                        continue;
                    }
                    visit(reference, by_id, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        Ok(())
    }

    fn validate_ranges(&self) -> Result<(), ParseError> {
        for channel in &self.channels {
            if channel.name.len() > MAX_NAME_LEN {
                return Err(ParseError::NameTooLong { offset: 0 });
            }
            if let ChannelVariant::Logic(logic) = &channel.variant {
                if logic.inputs.len() > crate::channel::variants::LOGIC_MAX_INPUTS {
                    return Err(ParseError::RangeExceeded {
                        field: "logic.input_count",
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_hardware_bindings(&self) -> Result<(), ParseError> {
        for channel in &self.channels {
            let kind = channel.channel_type();
            let hw_is_none = channel.hw_device == HwDevice::None.tag();

            if kind.is_hardware_bound() && hw_is_none {
                return Err(ParseError::InvalidHardwareBinding {
                    channel_id: channel.channel_id,
                });
            }
            if kind.is_virtual() && !hw_is_none {
                return Err(ParseError::InvalidHardwareBinding {
                    channel_id: channel.channel_id,
                });
            }
        }
        Ok(())
    }
}

/// Envelope wrapping a [`Config`]'s wire bytes for non-volatile storage,
/// identified by `PMU_CONFIG_MAGIC`/`PMU_CONFIG_VERSION`. Only the envelope
/// framing is in scope here; the storage medium is an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedConfig {
    pub config: Config,
}

impl PersistedConfig {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PMU_CONFIG_MAGIC.to_le_bytes());
        out.extend_from_slice(&PMU_CONFIG_VERSION.to_le_bytes());
        out.extend_from_slice(&self.config.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() < 6 {
            return Err(ParseError::Truncated { offset: 0 });
        }
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if magic != PMU_CONFIG_MAGIC {
            return Err(ParseError::BadTag { offset: 0 });
        }
        if version != PMU_CONFIG_VERSION {
            return Err(ParseError::BadTag { offset: 4 });
        }
        let config = Config::decode(&buf[6..])?;
        Ok(Self { config })
    }
}
