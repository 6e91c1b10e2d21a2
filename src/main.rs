use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use wakegate::config::{BackendTarget, Config};
use wakegate::gate::{GateConfig, GateController};
use wakegate::health::{HealthProbe, HttpHealthChecker};
use wakegate::pool::ConnectionPool;
use wakegate::proxy::{ProxyContext, ProxyServer};
use wakegate::status::StatusReporter;
use wakegate::wake::{MagicPacketSender, WakeConfig, WakeSignaler};
use wakegate::{PKG_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wakegate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration: optional file, then environment overrides
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "Missing or invalid configuration, exiting");
        e
    })?;

    let target = Arc::new(config.backend.target()?);
    let gate_config = config.gate.gate_config();
    let wake_config = config.wol.wake_config()?;
    let listen_addr = config.server.listen_addr()?;

    print_startup_banner(&config, &target, &gate_config, &wake_config);

    let probe: Arc<dyn HealthProbe> = Arc::new(HttpHealthChecker::new(
        Arc::clone(&target),
        gate_config.probe_timeout,
    ));
    let signaler: Arc<dyn WakeSignaler> = Arc::new(MagicPacketSender::new(wake_config));

    let context = Arc::new(ProxyContext {
        gate: GateController::new(
            Arc::clone(&probe),
            signaler,
            Arc::clone(&target),
            gate_config,
        ),
        status: StatusReporter::new(probe),
        pool: ConnectionPool::new(config.server.pool_config()),
        target,
        status_path: config.server.status_path.clone(),
        request_timeout: config.server.request_timeout(),
    });

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy = ProxyServer::new(listen_addr, context, shutdown_rx);
    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy.run().await {
            error!(error = %e, "Proxy server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for the server to stop (with timeout)
    let _ = tokio::time::timeout(Duration::from_secs(5), proxy_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(
    config: &Config,
    target: &BackendTarget,
    gate: &GateConfig,
    wake: &WakeConfig,
) {
    info!(name = PKG_NAME, version = VERSION, "Starting wake-on-LAN proxy");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        status_path = %config.server.status_path,
        request_timeout_secs = config.server.request_timeout_secs,
        "Server configuration"
    );
    info!(
        backend = target.authority(),
        probe = %target.probe_uri(),
        mac = %target.mac(),
        "Backend"
    );
    info!(
        check_timeout_ms = gate.probe_timeout.as_millis() as u64,
        check_interval_ms = gate.poll_interval.as_millis() as u64,
        max_wait_ms = gate.max_wait.as_millis() as u64,
        "Gate timings"
    );
    info!(
        broadcast = %wake.target,
        packets = wake.packets,
        packet_interval_ms = wake.packet_interval.as_millis() as u64,
        "Wake-on-LAN settings"
    );
    info!(
        pool_max_idle = config.server.pool_max_idle_per_host,
        pool_idle_timeout_secs = config.server.pool_idle_timeout_secs,
        "Connection pool settings"
    );
}
