use thiserror::Error;

/// A required header could not be located inside the buffer.
///
/// This is the only failure the header parser produces. It never means
/// "not our probe"; it means the bytes needed to decide are not there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("truncated header: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("bad IPv4 header length {ihl} at offset {offset}")]
    BadHeaderLength { offset: usize, ihl: u8 },
}

impl ParseError {
    /// Status code handed to the packet hook
    pub const CODE: i32 = -1;

    pub fn code(&self) -> i32 {
        Self::CODE
    }
}

/// Failure to write a probe identity into an outbound skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no flow field configured for protocol {0}")]
    UnsupportedProtocol(u8),
}

impl ProbeError {
    /// Status code handed to the packet hook: -1 structural, -2 unsupported
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(e) => e.code(),
            Self::UnsupportedProtocol(_) => -2,
        }
    }
}

/// Invalid or unreadable codec configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("flow width for protocol {protocol} must be 1..=16 bits, got {width_bits}")]
    InvalidWidth { protocol: u8, width_bits: u8 },
    #[error("protocol {0} has more than one flow field")]
    DuplicateProtocol(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let truncated = ParseError::Truncated {
            offset: 14,
            needed: 20,
            available: 6,
        };
        assert_eq!(truncated.code(), -1);
        assert_eq!(ProbeError::from(truncated).code(), -1);
        assert_eq!(ProbeError::UnsupportedProtocol(47).code(), -2);
    }

    #[test]
    fn test_display() {
        let err = ParseError::BadHeaderLength { offset: 14, ihl: 3 };
        assert_eq!(err.to_string(), "bad IPv4 header length 3 at offset 14");
    }
}
