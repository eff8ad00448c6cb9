//! pdm-protocol - PDM configuration protocol over CAN
//!
//! This crate models a power distribution module as seen from the bus:
//!
//! - [`functions`]: one codec per configurable function kind
//! - [`device`]: the device window, frame routing, telemetry and message builders
//! - [`pending`]: outstanding settings requests with timeouts and retries
//! - [`registry`]: the set of devices frames are routed to
//!
//! # Example
//!
//! ```rust
//! use pdm_protocol::{Frame, PdmDevice, PdmKind, PendingRequests};
//!
//! let mut device = PdmDevice::new("front", PdmKind::Standard, 2000).unwrap();
//! let pending = PendingRequests::default();
//!
//! // Telemetry offset 0: battery at 13.8 V
//! let frame = Frame::new(2000, &[0, 0x02, 0, 0, 0x64, 0x05, 0, 0]).unwrap();
//! assert!(device.read(&frame, &pending));
//! assert!(device.is_connected());
//! assert!((device.telemetry.battery_voltage - 13.8).abs() < 1e-9);
//! ```

#[macro_use]
mod macros;

pub mod device;
pub mod error;
pub mod frame;
pub mod functions;
pub mod pending;
pub mod prefix;
pub mod registry;
pub mod types;

pub use device::{
    CanSettings, DeviceLog, DeviceMessage, DeviceTelemetry, FirmwareVersion, PdmDevice, PdmKind,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Frame, MAX_EXTENDED_ID, MAX_STANDARD_ID};
pub use pending::{Expiry, PendingKey, PendingRequests, RequestOutcome, RequestPolicy};
pub use prefix::MessagePrefix;
pub use registry::{DeviceManager, DeviceRegistry, SharedDevice};
pub use types::*;
