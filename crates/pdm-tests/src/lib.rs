//! End-to-end tests for the PDM configuration stack
//!
//! These tests run the full host side against a simulated controller:
//! - `CommsPipeline` with its RX/TX loops
//! - `MockAdapter` standing in for the bus
//! - `SimulatedPdm` answering settings requests the way firmware does
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pdm-tests
//! ```
//!
//! # Test Structure
//!
//! - `pipeline_e2e.rs` - upload, download, burn and failure paths
//! - `liveness_e2e.rs` - connect/disconnect tracking and adapter swaps

use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};
use pdm_comms::MockAdapter;
use pdm_protocol::functions::encode_frame;
use pdm_protocol::{
    FirmwareVersion, Frame, MessagePrefix, PdmDevice, PendingRequests, ProtocolResult,
};
use tracing::debug;

/// Offset of the settings response frame within the device window
const SETTINGS_RESPONSE_OFFSET: u32 = 30;

/// A PDM on the far side of the bus
///
/// Settings live in a `PdmDevice` used as the controller's own store.
/// Requests are answered from the store, writes update it and are echoed.
pub struct SimulatedPdm {
    store: Mutex<PdmDevice>,
    firmware: FirmwareVersion,
    scratch: PendingRequests,
}

impl SimulatedPdm {
    pub fn new(store: PdmDevice, firmware: FirmwareVersion) -> Self {
        Self {
            store: Mutex::new(store),
            firmware,
            scratch: PendingRequests::default(),
        }
    }

    /// Answer writes on `adapter` from now on
    pub fn attach(self: &std::sync::Arc<Self>, adapter: &MockAdapter) {
        let sim = self.clone();
        adapter.set_responder(move |frame| sim.respond(frame));
    }

    /// The controller's stored settings
    pub fn store(&self) -> MutexGuard<'_, PdmDevice> {
        self.store.lock()
    }

    /// Status telemetry frame (offset 0): running, 13.8 V
    pub fn status_frame(&self) -> Frame {
        let base_id = self.store.lock().base_id();
        Frame::from_raw(base_id, 8, [0, 0x02, 0, 0, 0x64, 0x05, 0, 0]).unwrap_or_default()
    }

    /// Frames the controller sends back for one host frame
    pub fn respond(&self, frame: &Frame) -> Vec<Frame> {
        let mut store = self.store.lock();
        if frame.id() != store.tx_id() {
            return Vec::new();
        }
        let Some(prefix) = frame.first_byte().and_then(MessagePrefix::from_raw) else {
            return Vec::new();
        };

        let response_id = store.base_id() + SETTINGS_RESPONSE_OFFSET;
        let payload = match prefix {
            MessagePrefix::Version => match self.version_payload(store.tx_id()) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(error = %e, "Simulated version encode failed");
                    return Vec::new();
                }
            },
            MessagePrefix::Sleep | MessagePrefix::BurnSettings => {
                vec![prefix.response_byte(), 1]
            }
            MessagePrefix::Null | MessagePrefix::Bootloader => return Vec::new(),
            _ if frame.len() <= 2 => {
                let index = frame.payload().get(1).copied().unwrap_or(0);
                match Self::stored_payload(&store, prefix, index) {
                    Some(payload) => payload,
                    None => return Vec::new(),
                }
            }
            _ => {
                let mut echo = frame.payload().to_vec();
                echo[0] = prefix.response_byte();
                if let Ok(response) = Frame::new(response_id, &echo) {
                    store.read_at(&response, &self.scratch, Instant::now());
                }
                echo
            }
        };

        Frame::new(response_id, &payload).into_iter().collect()
    }

    fn version_payload(&self, tx_id: u32) -> ProtocolResult<Vec<u8>> {
        let frame = encode_frame(&self.firmware, tx_id, 0)?;
        let mut payload = frame.payload().to_vec();
        payload[0] = MessagePrefix::Version.response_byte();
        Ok(payload)
    }

    /// Response payload carrying the stored settings for one request
    fn stored_payload(store: &PdmDevice, prefix: MessagePrefix, index: u8) -> Option<Vec<u8>> {
        let messages = store.get_download_msgs().ok()?;
        let message = messages
            .iter()
            .find(|m| m.prefix == prefix && m.index == index)?;
        let mut payload = message.frame.payload().to_vec();
        payload[0] = prefix.response_byte();
        Some(payload)
    }
}
