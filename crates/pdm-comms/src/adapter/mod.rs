//! CAN adapters
//!
//! This module provides the adapters the pipeline talks to the bus through:
//! - slcan adapter for serial-line ASCII CAN interfaces
//! - Mock adapter for testing
//!
//! # Example
//!
//! ```ignore
//! use pdm_comms::adapter::{create_adapter, CommsAdapter};
//! use pdm_comms::config::AdapterConfig;
//!
//! let config = AdapterConfig::Mock(Default::default());
//! let adapter = create_adapter(&config)?;
//! adapter.init(config.port(), config.bitrate()).await?;
//! adapter.start().await?;
//! ```

pub mod mock;
pub mod slcan;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pdm_protocol::{CanBitRate, Frame};
use tracing::debug;

use crate::config::AdapterConfig;
use crate::error::TransportError;

pub use mock::MockAdapter;
pub use slcan::SlcanAdapter;

/// Frame-received notification
///
/// Called from the adapter's reader context; it must not block.
pub type FrameHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Bus-agnostic interface to one CAN interface
#[async_trait]
pub trait CommsAdapter: Send + Sync {
    /// Short adapter name for logs and events
    fn name(&self) -> &str;

    /// Open the interface and configure the bus bitrate
    async fn init(&self, port: &str, bitrate: CanBitRate) -> Result<(), TransportError>;

    /// Go on bus and begin delivering frames to the handler
    async fn start(&self) -> Result<(), TransportError>;

    /// Go off bus and release the interface
    async fn stop(&self) -> Result<(), TransportError>;

    async fn write(&self, frame: &Frame) -> Result<(), TransportError>;

    /// Install or remove the frame-received notification
    fn set_frame_handler(&self, handler: Option<FrameHandler>);

    /// Time since the last received frame
    fn rx_time_delta(&self) -> Option<Duration>;

    fn is_connected(&self) -> bool;
}

/// Scoped frame handler registration
///
/// The handler stays installed for as long as the guard lives.
pub struct Subscription {
    adapter: Arc<dyn CommsAdapter>,
}

impl Subscription {
    pub fn register(adapter: Arc<dyn CommsAdapter>, handler: FrameHandler) -> Self {
        adapter.set_frame_handler(Some(handler));
        debug!(adapter = adapter.name(), "Frame handler registered");
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn CommsAdapter> {
        &self.adapter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.adapter.set_frame_handler(None);
        debug!(adapter = self.adapter.name(), "Frame handler unregistered");
    }
}

/// Create an adapter based on configuration
///
/// The adapter is not opened; pass it to `CommsPipeline::connect`.
pub fn create_adapter(config: &AdapterConfig) -> Result<Arc<dyn CommsAdapter>, TransportError> {
    match config {
        AdapterConfig::Slcan(cfg) => {
            let adapter = SlcanAdapter::new(cfg)?;
            Ok(Arc::new(adapter))
        }
        AdapterConfig::Mock(cfg) => Ok(Arc::new(MockAdapter::new(cfg))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MockConfig, SlcanConfig};

    #[test]
    fn test_subscription_unregisters_on_drop() {
        let mock = Arc::new(MockAdapter::default());
        let adapter: Arc<dyn CommsAdapter> = mock.clone();

        let guard = Subscription::register(adapter, Arc::new(|_| {}));
        assert!(mock.has_handler());
        assert_eq!(guard.adapter().name(), "mock");

        drop(guard);
        assert!(!mock.has_handler());
    }

    #[test]
    fn test_create_mock_adapter() {
        let adapter = create_adapter(&AdapterConfig::Mock(MockConfig::default())).unwrap();
        assert_eq!(adapter.name(), "mock");
        assert!(!adapter.is_connected());
    }

    #[test]
    fn test_create_slcan_adapter_rejects_empty_port() {
        let config = AdapterConfig::Slcan(SlcanConfig {
            port: String::new(),
            baud_rate: 115_200,
            bitrate: CanBitRate::Kbps500,
        });
        assert!(matches!(
            create_adapter(&config),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
