//! Typed client for the IoT gateway API.
//!
//! [`ApiClient`] wraps the gateway's REST endpoints (channels, API keys,
//! readings, chart series, workflows and CSV export) over an injected
//! [`Transport`]. Failures are passed through as [`Error`] without retries of
//! the client's own; the transport applies one uniform [`RetryPolicy`].

pub mod client;
pub mod config;
pub mod errors;
pub mod guide;
pub mod metrics;
pub mod model;
pub mod store;
pub mod transport;

pub use client::ApiClient;
pub use config::{ClientConfig, RetryPolicy};
pub use errors::{Error, Result};
pub use model::{
    Ack, Action, ApiKeyResponse, Channel, ComparisonOp, ExportQuery, Fields, KeyScope,
    NewWorkflow, Reading, ReadingsQuery, Rule, SeriesDataPoint, SeriesQuery, Workflow,
};
pub use store::{FileStore, KeyValueStore, MemoryStore, SavedChannel, SavedChannels};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
