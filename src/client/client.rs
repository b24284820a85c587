//! # Discovery Client
//!
//! The public surface of the crate: find the nearest cloudlet for an
//! application and verify a device's reported location.
//!
//! ## Responsibility
//!
//! The [`DiscoveryClient`] ties the pieces together:
//! - Builds requests from the host's telemetry ([`telemetry`](super::telemetry))
//! - Hands each call to the shared worker pool ([`executor`](super::executor))
//! - Runs exactly one [`RpcTransport`] call per invocation, bounded by the
//!   caller's timeout
//!
//! Each operation exists in a non-blocking form returning a [`TaskHandle`] and
//! a blocking form that simply waits on that handle. Neither retries; retry
//! policy belongs to the caller.
//!
//! ## Host environment
//!
//! The client keeps only a `Weak` reference to its [`HostEnvironment`], so
//! background work never extends the host's lifetime. Once the host is gone
//! every call fails with `InvalidContext` before any network I/O.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cloudlet_discovery::client::{DiscoveryClient, StaticEnvironment};
//! use cloudlet_discovery::common::config::ClientConfig;
//! use cloudlet_discovery::common::messages::LocationSample;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = ClientConfig::from_file("config/client.toml")?;
//! let environment = Arc::new(StaticEnvironment::from_settings(&config.telemetry));
//! let client = DiscoveryClient::new(&environment, &config)?;
//!
//! let location = LocationSample::new(37.7749, -122.4194, 5.0);
//! let request = client.create_request(Some(&location))?;
//! let cloudlet = client.find_cloudlet(request, Duration::from_secs(10))?;
//!
//! let request = client.create_request(Some(&location))?;
//! let pending = client.verify_location_future(request, Duration::from_secs(10))?;
//! let verified = pending.wait()?;
//! ```

use log::{debug, info};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use super::executor::{TaskExecutor, TaskHandle};
use super::metrics::{CallMetrics, Operation};
use super::telemetry::{build_request, HostEnvironment};
use super::transport::RpcTransport;
use crate::common::config::{ClientConfig, RequestSettings};
use crate::common::error::{DiscoveryError, Result};
use crate::common::messages::{CloudletResponse, DiscoveryRequest, LocationSample};

/// Client for the cloudlet discovery service.
///
/// # Fields
///
/// * `host` / `port` - Discovery service address, overridable until the next call
/// * `environment` - Non-owning reference to the host's telemetry source
/// * `executor` - Shared worker pool running the calls
/// * `settings` - Fixed request fields and the default timeout
/// * `metrics` - Optional per-call metrics sink
pub struct DiscoveryClient {
    host: String,
    port: u16,
    environment: Weak<dyn HostEnvironment>,
    executor: Arc<TaskExecutor>,
    settings: RequestSettings,
    metrics: Option<Arc<Mutex<CallMetrics>>>,
}

impl DiscoveryClient {
    /// Creates a client with its own worker pool sized from `config.executor`.
    ///
    /// # Errors
    ///
    /// `Executor` if the worker pool cannot be started.
    pub fn new<E>(environment: &Arc<E>, config: &ClientConfig) -> Result<Self>
    where
        E: HostEnvironment + 'static,
    {
        let executor = Arc::new(TaskExecutor::new(config.executor.pool_size)?);
        Ok(Self::with_executor(environment, config, executor))
    }

    /// Creates a client that submits to an existing, possibly shared, pool.
    pub fn with_executor<E>(
        environment: &Arc<E>,
        config: &ClientConfig,
        executor: Arc<TaskExecutor>,
    ) -> Self
    where
        E: HostEnvironment + 'static,
    {
        let environment: Weak<E> = Arc::downgrade(environment);
        let environment: Weak<dyn HostEnvironment> = environment;
        Self {
            host: config.discovery.host.clone(),
            port: config.discovery.port,
            environment,
            executor,
            settings: config.request.clone(),
            metrics: None,
        }
    }

    /// Records every completed call into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Mutex<CallMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    /// Timeout configured in `[request] timeout_ms`.
    pub fn default_timeout(&self) -> Duration {
        self.settings.timeout()
    }

    /// Builds a fresh request from the host's current telemetry.
    ///
    /// # Errors
    ///
    /// `InvalidContext` if the host environment has been torn down.
    pub fn create_request(&self, location: Option<&LocationSample>) -> Result<DiscoveryRequest> {
        let environment = self.environment()?;
        build_request(Some(environment.as_ref()), location, &self.settings)
    }

    /// Finds the nearest cloudlet, blocking the calling thread for at most `timeout`.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`find_cloudlet_future`](Self::find_cloudlet_future) there.
    pub fn find_cloudlet(
        &self,
        request: DiscoveryRequest,
        timeout: Duration,
    ) -> Result<CloudletResponse> {
        self.find_cloudlet_future(request, timeout)?.wait()
    }

    /// Submits a cloudlet lookup and returns its handle immediately.
    ///
    /// # Errors
    ///
    /// `InvalidContext` if the host environment has been torn down. Nothing is
    /// submitted in that case.
    pub fn find_cloudlet_future(
        &self,
        request: DiscoveryRequest,
        timeout: Duration,
    ) -> Result<TaskHandle<CloudletResponse>> {
        self.dispatch(Operation::FindCloudlet, move |transport| async move {
            transport.find_cloudlet(&request, timeout).await
        })
    }

    /// Verifies the request's location, blocking the calling thread for at most `timeout`.
    ///
    /// `Ok(false)` means the service said the location does not match. Any
    /// failure to obtain a clear answer is an `Err`.
    pub fn verify_location(&self, request: DiscoveryRequest, timeout: Duration) -> Result<bool> {
        self.verify_location_future(request, timeout)?.wait()
    }

    /// Submits a location verification and returns its handle immediately.
    pub fn verify_location_future(
        &self,
        request: DiscoveryRequest,
        timeout: Duration,
    ) -> Result<TaskHandle<bool>> {
        self.dispatch(Operation::VerifyLocation, move |transport| async move {
            transport.verify_location(&request, timeout).await
        })
    }

    fn environment(&self) -> Result<Arc<dyn HostEnvironment>> {
        self.environment.upgrade().ok_or_else(|| {
            DiscoveryError::InvalidContext("host environment has been torn down".to_string())
        })
    }

    fn dispatch<T, F, Fut>(&self, operation: Operation, call: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(RpcTransport) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        // Only checks liveness; the strong reference is released immediately.
        self.environment()?;

        let transport = RpcTransport::new(self.host.clone(), self.port);
        let metrics = self.metrics.clone();
        info!("🔎 {:?} queued for {}", operation, transport.address());

        let handle = self.executor.submit(move || async move {
            let started = Instant::now();
            let result = call(transport).await;
            if let Some(metrics) = metrics {
                if let Ok(mut metrics) = metrics.lock() {
                    metrics.record_call(operation, started.elapsed(), result.as_ref().err());
                }
            }
            result
        });

        debug!("{:?} submitted as task {}", operation, handle.id());
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::telemetry::StaticEnvironment;

    #[test]
    fn setters_override_configured_address() {
        let environment = Arc::new(StaticEnvironment::default());
        let mut client = DiscoveryClient::new(&environment, &ClientConfig::default()).unwrap();
        assert_eq!(client.host(), "127.0.0.1");
        assert_eq!(client.port(), 50051);

        client.set_host("dme.example.net");
        client.set_port(38001);

        assert_eq!(client.host(), "dme.example.net");
        assert_eq!(client.port(), 38001);
    }

    #[test]
    fn torn_down_environment_fails_every_operation() {
        let environment = Arc::new(StaticEnvironment::default());
        let client = DiscoveryClient::new(&environment, &ClientConfig::default()).unwrap();
        let request = client.create_request(None).unwrap();
        drop(environment);

        assert!(matches!(
            client.create_request(None),
            Err(DiscoveryError::InvalidContext(_))
        ));
        assert!(matches!(
            client.find_cloudlet(request.clone(), Duration::from_secs(1)),
            Err(DiscoveryError::InvalidContext(_))
        ));
        assert!(matches!(
            client.verify_location_future(request, Duration::from_secs(1)),
            Err(DiscoveryError::InvalidContext(_))
        ));
    }

    #[test]
    fn client_does_not_keep_the_environment_alive() {
        let environment = Arc::new(StaticEnvironment::default());
        let client = DiscoveryClient::new(&environment, &ClientConfig::default()).unwrap();
        client.create_request(None).unwrap();

        assert_eq!(Arc::strong_count(&environment), 1);
    }

    #[test]
    fn clients_can_share_one_pool() {
        let environment = Arc::new(StaticEnvironment::default());
        let executor = Arc::new(TaskExecutor::new(2).unwrap());
        let config = ClientConfig::default();

        let first = DiscoveryClient::with_executor(&environment, &config, executor.clone());
        let second = DiscoveryClient::with_executor(&environment, &config, executor.clone());

        assert!(Arc::ptr_eq(first.executor(), second.executor()));
        assert_eq!(first.executor().pool_size(), 2);
        assert_eq!(first.default_timeout(), Duration::from_secs(10));
    }
}
