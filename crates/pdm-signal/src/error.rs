//! Error types for signal packing

use thiserror::Error;

/// Errors that can occur while extracting or inserting a signal
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    /// Signal length outside 1..=64 bits
    #[error("invalid signal length: {length} (must be 1..=64)")]
    InvalidSignalLength { length: u8 },

    /// Signal does not fit inside the 8-byte buffer
    #[error("signal out of bounds: start bit {start_bit}, length {length}")]
    SignalOutOfBounds { start_bit: u8, length: u8 },

    /// Raw value does not fit into the signal width
    #[error("value out of range: {value} not in [{min}, {max}]")]
    ValueOutOfRange { value: f64, min: f64, max: f64 },
}

/// Result type for signal operations
pub type SignalResult<T> = Result<T, SignalError>;
