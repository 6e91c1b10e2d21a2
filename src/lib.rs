//! Wakegate - A reverse proxy that wakes its backend on demand
//!
//! This library provides a gating reverse proxy that:
//! - Probes a single backend before forwarding each request
//! - Sends a Wake-on-LAN magic packet when the backend is offline
//! - Holds the request until the backend answers or a maximum wait elapses
//! - Answers a status endpoint without ever waking the backend
//! - Uses connection pooling for efficient backend communication

pub mod config;
pub mod error;
pub mod gate;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod status;
pub mod wake;

/// Version information for the proxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
