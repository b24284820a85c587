//! # Client Binary Entry Point
//!
//! Thin wrapper that asks a discovery service for the nearest cloudlet and
//! verifies the given location.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --config config/client.toml \
//!   --lat 37.7749 --long -122.4194 --accuracy 5.0
//! ```
//!
//! With metrics:
//! ```bash
//! cargo run --bin client -- --config config/client.toml \
//!   --host dme.example.net --port 50051 \
//!   --metrics-output ./metrics/client.json
//! ```
//!
//! The client will:
//! 1. Load configuration from the specified TOML file
//! 2. Build a fixed host environment from the `[telemetry]` section
//! 3. Run `findCloudlet` and then `verifyLocation`, one attempt each
//! 4. Export call metrics to JSON (if metrics-output specified)

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudlet_discovery::client::{CallMetrics, DiscoveryClient, StaticEnvironment};
use cloudlet_discovery::common::config::{load_config, ClientConfig};
use cloudlet_discovery::common::messages::LocationSample;

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Discovery service host, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Discovery service port, overrides the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Latitude of the device in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude of the device in degrees
    #[arg(long = "long", allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// Horizontal accuracy of the fix in meters
    #[arg(long, default_value_t = 0.0)]
    accuracy: f64,

    /// Per-call timeout in milliseconds, overrides the configuration
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Only look up the cloudlet
    #[arg(long)]
    skip_verify: bool,

    /// Path to write metrics JSON output (optional)
    #[arg(long)]
    metrics_output: Option<String>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let config: ClientConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    // No fix means an all-zero location, which the service still accepts
    let location = match (args.lat, args.longitude) {
        (Some(lat), Some(long)) => Some(LocationSample::new(lat, long, args.accuracy)),
        _ => None,
    };

    let environment = Arc::new(StaticEnvironment::from_settings(&config.telemetry));
    let metrics = Arc::new(Mutex::new(CallMetrics::new("client".to_string())));

    let mut client = DiscoveryClient::new(&environment, &config)?.with_metrics(metrics.clone());
    if let Some(host) = args.host {
        client.set_host(host);
    }
    if let Some(port) = args.port {
        client.set_port(port);
    }

    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| client.default_timeout());

    let request = client.create_request(location.as_ref())?;
    match client.find_cloudlet(request, timeout) {
        Ok(cloudlet) => info!(
            "✅ Nearest cloudlet: {} (service {})",
            cloudlet.server, cloudlet.service
        ),
        Err(e) => error!("❌ FindCloudlet failed: {}", e),
    }

    if !args.skip_verify {
        let request = client.create_request(location.as_ref())?;
        match client.verify_location(request, timeout) {
            Ok(true) => info!("✅ Location verified by the carrier network"),
            Ok(false) => info!("⚠️  Location does NOT match the carrier network"),
            Err(e) => error!("❌ VerifyLocation failed: {}", e),
        }
    }

    if let Some(output_path) = args.metrics_output {
        let metrics = metrics
            .lock()
            .map_err(|_| anyhow::anyhow!("metrics lock poisoned"))?;
        metrics.export_to_json(&output_path)?;
        info!("📊 Metrics exported to: {}", output_path);
    }

    Ok(())
}
