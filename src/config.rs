use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::probe::EchoLayout;

// IP protocol numbers
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

/// Reserved source port base; probe traffic never collides with real sockets
pub const DEFAULT_SOURCE_PORT_BASE: u16 = 1021;
/// Width of the flow tag in bits
pub const DEFAULT_FLOW_WIDTH: u8 = 16;

/// Where a protocol carries the flow tag inside its first transport bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSlot {
    /// Source port on requests (destination port on replies), stored as `base + flow`
    SourcePort { base: u16 },
    /// ICMP echo identifier, stored verbatim and echoed unchanged
    EchoIdentifier,
}

impl FlowSlot {
    /// Byte offset of the 16-bit slot inside the transport header
    pub fn offset(self, layout: EchoLayout) -> usize {
        match (self, layout) {
            (Self::SourcePort { .. }, EchoLayout::Request) => 0,
            (Self::SourcePort { .. }, EchoLayout::Reply) => 2,
            (Self::EchoIdentifier, _) => 4,
        }
    }

    fn encode(self, flow: u16) -> u16 {
        match self {
            Self::SourcePort { base } => base.wrapping_add(flow),
            Self::EchoIdentifier => flow,
        }
    }

    fn decode(self, raw: u16) -> u16 {
        match self {
            Self::SourcePort { base } => raw.wrapping_sub(base),
            Self::EchoIdentifier => raw,
        }
    }
}

/// Flow slot assignment for one transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowField {
    pub protocol: u8,
    #[serde(default = "default_flow_width")]
    pub width_bits: u8,
    pub slot: FlowSlot,
}

fn default_flow_width() -> u8 {
    DEFAULT_FLOW_WIDTH
}

impl FlowField {
    pub fn new(protocol: u8, slot: FlowSlot) -> Self {
        Self {
            protocol,
            slot,
            width_bits: DEFAULT_FLOW_WIDTH,
        }
    }

    pub fn mask(&self) -> u16 {
        match self.width_bits {
            0 => 0,
            w if w >= 16 => u16::MAX,
            w => (1u16 << w) - 1,
        }
    }

    /// Raw slot value carrying `flow`
    pub fn encode(&self, flow: u16) -> u16 {
        self.slot.encode(flow & self.mask())
    }

    /// Flow tag recovered from a raw slot value
    pub fn decode(&self, raw: u16) -> u16 {
        self.slot.decode(raw) & self.mask()
    }
}

/// Per-protocol flow field table supplied by the probing process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub flow_fields: Vec<FlowField>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        let source_port = FlowSlot::SourcePort {
            base: DEFAULT_SOURCE_PORT_BASE,
        };
        Self {
            flow_fields: vec![
                FlowField::new(IPPROTO_UDP, source_port),
                FlowField::new(IPPROTO_TCP, source_port),
                FlowField::new(IPPROTO_ICMP, FlowSlot::EchoIdentifier),
            ],
        }
    }
}

impl CodecConfig {
    /// Flow field for `protocol`, if the protocol can carry a probe
    pub fn flow_field(&self, protocol: u8) -> Option<&FlowField> {
        self.flow_fields.iter().find(|f| f.protocol == protocol)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, field) in self.flow_fields.iter().enumerate() {
            if field.width_bits == 0 || field.width_bits > 16 {
                return Err(ConfigError::InvalidWidth {
                    protocol: field.protocol,
                    width_bits: field.width_bits,
                });
            }
            if self.flow_fields[..i]
                .iter()
                .any(|f| f.protocol == field.protocol)
            {
                return Err(ConfigError::DuplicateProtocol(field.protocol));
            }
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
