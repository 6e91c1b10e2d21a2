//! Connection pool for forwarding requests to the backend
//!
//! Connections to the backend are kept alive and reused between requests.
//! Idle connections are dropped after the configured timeout, which matters
//! here since the backend may be powered off under them.

use crate::config::BackendTarget;
use http_body_util::{combinators::BoxBody, BodyExt};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Error type for connection pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Error from the HTTP client
    #[error("Client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),
    /// Error building the backend request
    #[error("Request build error: {0}")]
    RequestBuild(String),
}

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections to the backend
    pub max_idle_per_host: usize,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// A pooled HTTP client bound to the single backend
pub struct ConnectionPool {
    client: Client<HttpConnector, Incoming>,
    config: PoolConfig,
}

impl ConnectionPool {
    /// Create a new connection pool with the given configuration
    pub fn new(config: PoolConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build(connector);

        debug!(
            max_idle = config.max_idle_per_host,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Connection pool initialized"
        );

        Self { client, config }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Forward a request to the backend and stream its response back
    pub async fn send_request(
        &self,
        req: Request<Incoming>,
        target: &BackendTarget,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, PoolError> {
        let backend_req = build_backend_request(req, target)?;
        let response = self.client.request(backend_req).await?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

/// Point a client request at the backend: swap the URI and rewrite Host
fn build_backend_request<B>(req: Request<B>, target: &BackendTarget) -> Result<Request<B>, PoolError> {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = target
        .forward_uri(path_and_query)
        .map_err(|e| PoolError::RequestBuild(e.to_string()))?;
    let host = HeaderValue::from_str(target.authority())
        .map_err(|e| PoolError::RequestBuild(e.to_string()))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    parts.headers.insert(HOST, host);
    // h2 clients may arrive here, but the backend is always spoken to over HTTP/1.1
    parts.version = hyper::Version::HTTP_11;

    Ok(Request::from_parts(parts, body))
}
