//! Backend reachability probes
//!
//! A probe is a single `GET` against the backend, bounded by a timeout. Every
//! failure mode collapses to [`HealthStatus::Offline`]; the reason only shows
//! up in the logs.

use crate::config::BackendTarget;
use async_trait::async_trait;
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Online,
    Offline,
}

impl HealthStatus {
    pub fn is_online(self) -> bool {
        self == HealthStatus::Online
    }
}

/// Something that can tell whether the backend is reachable right now
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the backend once. Must return within the probe's own timeout.
    async fn probe(&self) -> HealthStatus;
}

/// Probes the backend over HTTP, expecting a 2xx response
pub struct HttpHealthChecker {
    client: Client<HttpConnector, Empty<Bytes>>,
    target: Arc<BackendTarget>,
    timeout: Duration,
}

impl HttpHealthChecker {
    pub fn new(target: Arc<BackendTarget>, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);
        connector.set_connect_timeout(Some(timeout));

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(1)
            .build(connector);

        Self {
            client,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthChecker {
    async fn probe(&self) -> HealthStatus {
        let uri = self.target.probe_uri();
        let req = match Request::get(uri.clone()).body(Empty::<Bytes>::new()) {
            Ok(req) => req,
            Err(e) => {
                debug!(%uri, error = %e, "Failed to build health probe request");
                return HealthStatus::Offline;
            }
        };

        // Dropping the request future on expiry cancels the in-flight call
        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(Ok(response)) if response.status().is_success() => HealthStatus::Online,
            Ok(Ok(response)) => {
                debug!(%uri, status = %response.status(), "Health probe got non-success status");
                HealthStatus::Offline
            }
            Ok(Err(e)) => {
                debug!(%uri, error = %e, "Health probe failed");
                HealthStatus::Offline
            }
            Err(_) => {
                debug!(%uri, timeout_ms = self.timeout.as_millis() as u64, "Health probe timed out");
                HealthStatus::Offline
            }
        }
    }
}
