//! Serial-line CAN (slcan) adapter
//!
//! ASCII protocol over a serial port:
//!   Standard: t<ID:3hex><DLC:1hex><DATA:2hex*DLC>\r
//!
//! Only standard 11-bit data frames are carried.

mod adapter;
pub mod codec;

pub use adapter::SlcanAdapter;
pub use codec::SlcanDecoder;
