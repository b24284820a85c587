//! # Client Components
//!
//! The client is split into four components, leaves first:
//!
//! ## Telemetry ([`telemetry`])
//! Builds a discovery request from carrier, cell, application and location data.
//! Telemetry gaps degrade to defaults.
//!
//! ## Transport ([`transport`])
//! One connection, one request, one reply per call, bounded by a deadline.
//!
//! ## Executor ([`executor`])
//! Fixed-size worker pool returning cancellable task handles.
//!
//! ## Discovery Client ([`client`])
//! The public facade with blocking and non-blocking `find_cloudlet` and
//! `verify_location`.

pub mod client;
pub mod executor;
pub mod metrics;
pub mod telemetry;
pub mod transport;

// Re-export for convenience
pub use client::DiscoveryClient;
pub use executor::{TaskExecutor, TaskHandle, TaskState};
pub use metrics::{AggregatedStats, CallMetrics, Operation, OperationStats};
pub use telemetry::{build_request, HostEnvironment, StaticEnvironment};
pub use transport::RpcTransport;
