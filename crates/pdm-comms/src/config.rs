//! Comms configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [pipeline]
//! rx_capacity = 1024
//! tx_capacity = 256
//!
//! [requests]
//! timeout_ms = 500
//! max_retries = 3
//!
//! [adapter]
//! type = "slcan"
//! port = "/dev/ttyACM0"
//! bitrate = "500k"
//! ```

use std::path::Path;
use std::time::Duration;

use pdm_protocol::{CanBitRate, RequestPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{CommsError, CommsResult};

/// Top-level comms configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommsConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub requests: RequestConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
}

impl CommsConfig {
    pub fn from_toml_str(s: &str) -> CommsResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CommsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> CommsResult<()> {
        if self.pipeline.rx_capacity == 0 || self.pipeline.tx_capacity == 0 {
            return Err(CommsError::Config(
                "queue capacities must be at least 1".to_string(),
            ));
        }
        if self.pipeline.tx_poll_interval_ms == 0 || self.pipeline.housekeeping_interval_ms == 0 {
            return Err(CommsError::Config(
                "pipeline intervals must be non-zero".to_string(),
            ));
        }
        if self.requests.timeout_ms == 0 {
            return Err(CommsError::Config(
                "request timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Queue bounds and loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// RX queue bound; the oldest frame is dropped on overflow
    #[serde(default = "default_rx_capacity")]
    pub rx_capacity: usize,
    /// TX queue bound; the oldest frame is dropped on overflow
    #[serde(default = "default_tx_capacity")]
    pub tx_capacity: usize,
    /// TX loop sleep when the queue is empty
    #[serde(default = "default_tx_poll_interval_ms")]
    pub tx_poll_interval_ms: u64,
    /// Period of the expiry scan and liveness refresh
    #[serde(default = "default_housekeeping_interval_ms")]
    pub housekeeping_interval_ms: u64,
}

fn default_rx_capacity() -> usize {
    1024
}

fn default_tx_capacity() -> usize {
    256
}

fn default_tx_poll_interval_ms() -> u64 {
    5
}

fn default_housekeeping_interval_ms() -> u64 {
    50
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rx_capacity: default_rx_capacity(),
            tx_capacity: default_tx_capacity(),
            tx_poll_interval_ms: default_tx_poll_interval_ms(),
            housekeeping_interval_ms: default_housekeeping_interval_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn tx_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tx_poll_interval_ms)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Settings request timeout and retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl RequestConfig {
    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
        }
    }
}

// =============================================================================
// Adapter
// =============================================================================

/// Adapter selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// Serial-line CAN (slcan) ASCII adapter
    Slcan(SlcanConfig),
    /// In-memory adapter for tests
    Mock(MockConfig),
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

impl AdapterConfig {
    /// Port handed to `CommsAdapter::init`
    pub fn port(&self) -> &str {
        match self {
            AdapterConfig::Slcan(cfg) => &cfg.port,
            AdapterConfig::Mock(cfg) => &cfg.port,
        }
    }

    /// Bus bitrate handed to `CommsAdapter::init`
    pub fn bitrate(&self) -> CanBitRate {
        match self {
            AdapterConfig::Slcan(cfg) => cfg.bitrate,
            AdapterConfig::Mock(cfg) => cfg.bitrate,
        }
    }
}

/// slcan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlcanConfig {
    /// Serial device path (e.g., "/dev/ttyACM0" or "COM3")
    pub port: String,
    /// Serial line speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// CAN bus bitrate
    #[serde(default)]
    pub bitrate: CanBitRate,
}

fn default_baud_rate() -> u32 {
    115_200
}

/// Mock adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_port")]
    pub port: String,
    #[serde(default)]
    pub bitrate: CanBitRate,
    /// Simulated write latency
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_mock_port() -> String {
    "mock".to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            port: default_mock_port(),
            bitrate: CanBitRate::default(),
            latency_ms: 0,
        }
    }
}
