//! Protocol errors

use pdm_signal::SignalError;
use thiserror::Error;

/// Errors raised while building or decoding PDM frames
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Bit-level codec failure
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// Payload longer than a classic CAN frame
    #[error("payload too long: {0} bytes (max 8)")]
    PayloadTooLong(usize),

    /// Prefix byte not known to this protocol
    #[error("unknown message prefix: {0}")]
    UnknownPrefix(u8),

    /// Enumerated field holds a value with no meaning
    #[error("invalid value {value} for field '{field}'")]
    InvalidValue { field: &'static str, value: u64 },

    /// Base ID cannot host a 32-frame window plus the command ID below it
    #[error("invalid base ID: 0x{0:X}")]
    InvalidBaseId(u32),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
