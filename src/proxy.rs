use crate::config::BackendTarget;
use crate::error::{backend_offline_response, error_response, ProxyErrorCode};
use crate::gate::{GateController, GateDecision};
use crate::pool::ConnectionPool;
use crate::status::{StatusReport, StatusReporter};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderValue;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Header name for request ID
const X_REQUEST_ID: &str = "x-request-id";
/// Header name for forwarded-for
const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header name for forwarded host
const X_FORWARDED_HOST: &str = "x-forwarded-host";
/// Header name for forwarded proto
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Everything a request handler needs, shared across connections
pub struct ProxyContext {
    pub gate: GateController,
    pub status: StatusReporter,
    pub pool: ConnectionPool,
    pub target: Arc<BackendTarget>,
    /// Path answered locally with a status report
    pub status_path: String,
    /// Max time to wait for the backend's response once admitted
    pub request_timeout: Duration,
}

/// The main reverse proxy server
pub struct ProxyServer {
    bind_addr: SocketAddr,
    context: Arc<ProxyContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyServer {
    pub fn new(
        bind_addr: SocketAddr,
        context: Arc<ProxyContext>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            context,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Proxy server listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let context = Arc::clone(&self.context);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, context).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    context: Arc<ProxyContext>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    // A closed client connection drops the in-flight service future, which
    // also ends any gating episode it is waiting on
    let service = service_fn(move |req: Request<Incoming>| {
        let context = Arc::clone(&context);
        async move { handle_request(req, context, addr).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    mut req: Request<Incoming>,
    context: Arc<ProxyContext>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    // The status endpoint never goes through the gate
    if req.method() == Method::GET && req.uri().path() == context.status_path {
        let report = context.status.status().await;
        debug!(backend_ok = report.backend_ok(), "Status requested");
        return Ok(status_response(&report));
    }

    // Generate or propagate request ID
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // We overwrite X-Forwarded-* rather than append: this proxy is the first trusted hop
    let headers = req.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    if let Ok(value) = HeaderValue::from_str(&client_addr.ip().to_string()) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if let Some(host) = headers.get(hyper::header::HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, host);
    }

    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    debug!(method = %req.method(), uri = %req.uri(), request_id, "Incoming request");

    match context.gate.admit().await {
        GateDecision::Admit => {}
        GateDecision::AdmitAfterWake { waited, .. } => {
            debug!(request_id, waited_ms = waited.as_millis() as u64, "Request admitted after wake");
        }
        GateDecision::Reject { waited, .. } => {
            warn!(request_id, waited_ms = waited.as_millis() as u64, "Rejecting request, backend offline");
            return Ok(backend_offline_response());
        }
    }

    let request_timeout = context.request_timeout;
    let result = tokio::time::timeout(
        request_timeout,
        context.pool.send_request(req, &context.target),
    )
    .await;

    match result {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => {
            // Log detailed error internally, return generic message externally
            error!(backend = context.target.authority(), error = %e, "Failed to forward request");
            Ok(error_response(
                ProxyErrorCode::ConnectionFailed,
                "Failed to connect to backend",
            ))
        }
        Err(_) => {
            warn!(
                backend = context.target.authority(),
                timeout_secs = request_timeout.as_secs(),
                "Request timed out"
            );
            Ok(error_response(
                ProxyErrorCode::RequestTimeout,
                format!(
                    "Request timed out after {} seconds",
                    request_timeout.as_secs()
                ),
            ))
        }
    }
}

fn status_response(report: &StatusReport) -> Response<BoxBody<Bytes, hyper::Error>> {
    let body = match serde_json::to_vec(report) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to serialize status report");
            return error_response(ProxyErrorCode::InternalError, "Internal error");
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Full::new(Bytes::from(body)).map_err(|never| match never {}).boxed())
        .expect("valid response builder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_response_body() {
        let report = StatusReport {
            ok: true,
            server: "ok",
            proxied_service: "ok",
        };
        let response = status_response(&report);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, r#"{"ok":true,"server":"ok","proxiedService":"ok"}"#);
    }
}
