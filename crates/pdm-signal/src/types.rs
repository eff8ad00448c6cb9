//! Signal descriptor types
//!
//! A [`Signal`] names a bit-field inside an 8-byte CAN payload. Descriptors are
//! plain data and can be declared as `const` next to the code that uses them.

use serde::{Deserialize, Serialize};

/// Bit ordering of a multi-bit signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Intel layout: start bit is the LSB, bits walk forward through the bytes
    #[default]
    Little,
    /// Motorola layout: start bit is the MSB, bits walk down then into the next byte
    Big,
}

/// Position, width and physical scaling of a signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// First bit (LSB for little endian, MSB for big endian), 0..=63
    pub start_bit: u8,
    /// Width in bits, 1..=64
    pub length: u8,
    /// Bit ordering
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Two's-complement signal
    #[serde(default)]
    pub signed: bool,
    /// physical = raw * factor + offset
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// physical = raw * factor + offset
    #[serde(default)]
    pub offset: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Signal {
    /// Unsigned little-endian signal with unit scaling
    pub const fn new(start_bit: u8, length: u8) -> Self {
        Self {
            start_bit,
            length,
            byte_order: ByteOrder::Little,
            signed: false,
            factor: 1.0,
            offset: 0.0,
        }
    }

    /// Single-bit flag
    pub const fn flag(bit: u8) -> Self {
        Self::new(bit, 1)
    }

    /// Switch to big-endian (Motorola) ordering
    pub const fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::Big;
        self
    }

    /// Mark as two's-complement
    pub const fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    /// Apply a physical scale and offset
    pub const fn scaled(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Smallest and largest raw integer the signal can hold
    pub fn raw_range(&self) -> (f64, f64) {
        let length = i32::from(self.length.clamp(1, 64));
        if self.signed {
            let half = 2f64.powi(length - 1);
            (-half, half - 1.0)
        } else {
            (0.0, 2f64.powi(length) - 1.0)
        }
    }

    /// Exclusive upper bound of the raw range
    ///
    /// Exact for every length, unlike the inclusive maximum of a 64-bit
    /// signal which rounds up to this value in f64.
    pub fn raw_limit(&self) -> f64 {
        let length = i32::from(self.length.clamp(1, 64));
        if self.signed {
            2f64.powi(length - 1)
        } else {
            2f64.powi(length)
        }
    }
}
