//! Status endpoint payload
//!
//! Reports whether the proxy itself is up and whether the backend answers a
//! probe right now. Never wakes the backend.

use crate::health::HealthProbe;
use serde::Serialize;
use std::sync::Arc;

/// Body of the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub ok: bool,
    pub server: &'static str,
    pub proxied_service: &'static str,
}

impl StatusReport {
    pub fn backend_ok(&self) -> bool {
        self.proxied_service == "ok"
    }
}

pub struct StatusReporter {
    probe: Arc<dyn HealthProbe>,
}

impl StatusReporter {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    /// Probe the backend once and report
    pub async fn status(&self) -> StatusReport {
        let online = self.probe.probe().await.is_online();
        StatusReport {
            ok: true,
            server: "ok",
            proxied_service: if online { "ok" } else { "ko" },
        }
    }
}
