//! Wake-and-gate state machine
//!
//! Every inbound request runs its own gating episode:
//!
//! 1. **Probing**: one health probe. Online admits the request immediately.
//! 2. **Waking**: the backend is offline, so a single wake signal is sent.
//!    A failed send does not end the episode since the backend may already be
//!    on its way up.
//! 3. **Polling**: probe, and if still offline and the maximum wait has not
//!    elapsed, sleep for the poll interval and probe again.
//! 4. **Admitting** or **Rejecting**: the caller forwards the request or
//!    answers with a gateway timeout.
//!
//! Episodes share nothing with each other. The episode is a plain future, so
//! when the client goes away and hyper drops the request future, polling
//! stops at the next suspension point.

use crate::config::BackendTarget;
use crate::health::{HealthProbe, HealthStatus};
use crate::wake::{MacAddress, WakeOutcome, WakeSignaler};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Probe and wait timings
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Upper bound of a single health probe
    pub probe_timeout: Duration,
    /// Sleep between probes while waiting for the backend
    pub poll_interval: Duration,
    /// Give up once this much time has passed since the wake signal
    pub max_wait: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(5000),
            max_wait: Duration::from_millis(60000),
        }
    }
}

/// Final decision of one gating episode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The backend answered the first probe
    Admit,
    /// The backend came online after being woken
    AdmitAfterWake { waited: Duration, wake: WakeOutcome },
    /// The backend stayed offline for the whole wait
    Reject { waited: Duration, wake: WakeOutcome },
}

/// Bookkeeping for a wait loop in progress; logs when the loop is dropped
/// before reaching a decision.
struct Episode {
    mac: MacAddress,
    started: Instant,
    polls: u32,
    finished: bool,
}

impl Episode {
    fn begin(mac: MacAddress) -> Self {
        Self {
            mac,
            started: Instant::now(),
            polls: 0,
            finished: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn finish(&mut self) -> Duration {
        self.finished = true;
        self.elapsed()
    }
}

impl Drop for Episode {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                mac = %self.mac,
                polls = self.polls,
                elapsed_ms = self.elapsed().as_millis() as u64,
                "Request abandoned while waiting for backend"
            );
        }
    }
}

/// Decides for each request whether the backend can take it
pub struct GateController {
    probe: Arc<dyn HealthProbe>,
    signaler: Arc<dyn WakeSignaler>,
    target: Arc<BackendTarget>,
    config: GateConfig,
}

impl GateController {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        signaler: Arc<dyn WakeSignaler>,
        target: Arc<BackendTarget>,
        config: GateConfig,
    ) -> Self {
        Self {
            probe,
            signaler,
            target,
            config,
        }
    }

    /// One probe, counted as Offline if it outlives `probe_timeout`
    async fn probe(&self) -> HealthStatus {
        match tokio::time::timeout(self.config.probe_timeout, self.probe.probe()).await {
            Ok(status) => status,
            Err(_) => {
                debug!(
                    timeout_ms = self.config.probe_timeout.as_millis() as u64,
                    "Health probe did not finish in time"
                );
                HealthStatus::Offline
            }
        }
    }

    /// Run one gating episode
    pub async fn admit(&self) -> GateDecision {
        if self.probe().await.is_online() {
            return GateDecision::Admit;
        }

        let mac = self.target.mac();
        info!(%mac, "Backend is offline, sending wake packet");
        let wake = self.signaler.send(mac).await;
        if wake == WakeOutcome::SendFailed {
            warn!(%mac, "Wake packet could not be sent, waiting for backend anyway");
        }

        let mut episode = Episode::begin(mac);
        loop {
            episode.polls += 1;
            if self.probe().await.is_online() {
                let waited = episode.finish();
                info!(
                    waited_ms = waited.as_millis() as u64,
                    polls = episode.polls,
                    "Backend is online, continuing"
                );
                return GateDecision::AdmitAfterWake { waited, wake };
            }

            if episode.elapsed() >= self.config.max_wait {
                let waited = episode.finish();
                warn!(
                    waited_ms = waited.as_millis() as u64,
                    max_wait_ms = self.config.max_wait.as_millis() as u64,
                    polls = episode.polls,
                    "Backend did not come online in time"
                );
                return GateDecision::Reject { waited, wake };
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
