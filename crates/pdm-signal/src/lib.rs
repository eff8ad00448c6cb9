//! pdm-signal - Bit-level CAN signal codec
//!
//! Extracts and inserts scaled integer and boolean fields inside an 8-byte
//! CAN payload, in either Intel (little-endian) or Motorola (big-endian) bit
//! order, with two's-complement sign handling and physical scale/offset.
//!
//! # Quick Start
//!
//! ```rust
//! use pdm_signal::{extract, insert, Signal};
//!
//! // Battery voltage: 16 bits from bit 32, 0.01 V per count
//! const BATTERY: Signal = Signal::new(32, 16).scaled(0.01, 0.0);
//!
//! let mut data = [0u8; 8];
//! insert(&mut data, 13.8, &BATTERY).unwrap();
//! assert_eq!(&data[4..6], &[0x64, 0x05]); // 1380
//! assert!((extract(&data, &BATTERY).unwrap() - 13.8).abs() < 1e-9);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{
    extract, extract_bool, extract_int, extract_raw, extract_uint, insert, insert_bool,
    insert_int, insert_raw, insert_uint, FRAME_BYTES,
};
pub use error::{SignalError, SignalResult};
pub use types::{ByteOrder, Signal};
