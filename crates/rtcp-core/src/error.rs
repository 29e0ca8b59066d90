use thiserror::Error;

/// Error type for RTCP encoding, decoding and statistics operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer ended before a field could be read or written
    #[error("Truncated input: need {required} bytes but have {available}")]
    TruncatedInput {
        required: usize,
        available: usize,
    },

    /// Declared length or counts are inconsistent with the actual content
    #[error("Malformed RTCP packet: {0}")]
    MalformedPacket(String),

    /// Packet type byte is not one this crate understands
    #[error("Unknown RTCP packet type {packet_type} ({length} words follow the header)")]
    UnknownPacketType {
        packet_type: u8,
        length: u16,
    },

    /// A field value cannot be represented on the wire
    #[error("Invalid field value: {0}")]
    InvalidFieldValue(String),
}

impl Error {
    /// Whether the caller can recover by waiting for more data or dropping the datagram
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TruncatedInput { .. } | Error::MalformedPacket(_))
    }

    /// Whether a compound reader may skip the offending sub-packet and keep going
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::UnknownPacketType { .. })
    }

    pub(crate) fn truncated(required: usize, available: usize) -> Self {
        Error::TruncatedInput { required, available }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPacket(msg.into())
    }

    pub(crate) fn invalid_field(msg: impl Into<String>) -> Self {
        Error::InvalidFieldValue(msg.into())
    }
}
