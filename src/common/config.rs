//! # Configuration
//!
//! Client configuration structures and the TOML loader. Every section and
//! field has a default, so an empty file yields a working configuration.
//!
//! # Example TOML
//!
//! ```toml
//! [discovery]
//! host = "127.0.0.1"
//! port = 50051
//!
//! [executor]
//! pool_size = 1
//!
//! [request]
//! app_id = "87654321"
//! protocol = "http"
//! server_port = 1234
//! timeout_ms = 10000
//!
//! [telemetry]
//! operator_name = "TDG"
//! mcc = "262"
//! mnc = "01"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::messages::PROTOCOL_VERSION;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = std::fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the discovery service lives
    pub discovery: DiscoverySettings,
    /// Worker pool sizing
    pub executor: ExecutorSettings,
    /// Fixed request fields and the default call timeout
    pub request: RequestSettings,
    /// Fixed telemetry, used by [`StaticEnvironment`](crate::client::StaticEnvironment)
    pub telemetry: TelemetrySettings,
}

impl ClientConfig {
    /// Loads client configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        load_config(path)
    }
}

/// Address of the discovery service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub host: String,
    pub port: u16,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Number of workers. 1 serializes all discovery calls in submission order.
    pub pool_size: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { pool_size: 1 }
    }
}

/// Request fields that do not come from device telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Protocol version stamped on requests
    pub version: u32,
    /// Application identifier used when the host environment supplies none
    pub app_id: String,
    /// Protocol the client will use to reach the cloudlet
    pub protocol: String,
    /// Port the client will use to reach the cloudlet
    pub server_port: u16,
    /// Default per-call timeout (milliseconds)
    pub timeout_ms: u64,
}

impl RequestSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            app_id: "87654321".to_string(),
            protocol: "http".to_string(),
            server_port: 1234,
            timeout_ms: 10_000,
        }
    }
}

/// Fixed device telemetry for hosts without a live telephony provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub operator_name: String,
    pub subscriber_id: String,
    pub mnc: String,
    pub mcc: String,
    pub cell_id: u32,
    pub location_area_code: u32,
    pub app_label: String,
    pub app_id: String,
}
