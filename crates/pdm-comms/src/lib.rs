//! pdm-comms - CAN adapters and the RX/TX pipeline for PDM configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      CommsPipeline                          │
//! │                                                             │
//! │  ┌─────────────┐   route   ┌─────────────────────────────┐  │
//! │  │ RX queue    │ ────────► │ DeviceRegistry / PdmDevice  │  │
//! │  │ (drop-old)  │           │  + PendingRequests          │  │
//! │  └──────▲──────┘           └──────────────┬──────────────┘  │
//! │         │ FrameHandler                    │ submit/retry    │
//! │         │                          ┌──────▼──────┐          │
//! │         │                          │ TX queue    │          │
//! │         │                          │ (drop-old)  │          │
//! │         │                          └──────┬──────┘          │
//! │  ┌──────┴──────────────────────────────────▼──────┐         │
//! │  │ CommsAdapter (slcan / mock)                     │         │
//! │  └─────────────────────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;

pub use adapter::{
    create_adapter, CommsAdapter, FrameHandler, MockAdapter, SlcanAdapter, Subscription,
};
pub use config::{
    AdapterConfig, CommsConfig, MockConfig, PipelineConfig, RequestConfig, SlcanConfig,
};
pub use error::{CommsError, CommsResult, TransportError};
pub use pipeline::{CommsPipeline, PipelineEvent};
pub use queue::FrameQueue;

// Re-export for convenience
pub use pdm_protocol::{CanBitRate, DeviceManager, Frame, PdmDevice, PdmKind, SharedDevice};
