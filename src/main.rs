use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use stackwatch::*;
use tokio::sync::{RwLock, watch};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let api = Arc::new(portainer_repo::PortainerRepo::new(&app_config.portainer)?);

    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(models::Snapshot::empty()));
    let (refresh_handle, refresh_rx) = topology_worker::refresh_channel();
    let stats: stats_worker::SharedStats = Arc::new(RwLock::new(HashMap::new()));

    let (topology_shutdown_tx, topology_shutdown_rx) = tokio::sync::oneshot::channel();
    let (stats_shutdown_tx, stats_shutdown_rx) = tokio::sync::oneshot::channel();

    let topology_handle = topology_worker::spawn(
        topology_worker::TopologyDeps {
            api: api.clone(),
            snapshot_tx,
            refresh_rx,
            shutdown_rx: topology_shutdown_rx,
        },
        topology_worker::TopologyConfig {
            scan_interval: Duration::from_secs(app_config.monitoring.scan_interval_secs),
            stats_log_interval: Duration::from_secs(app_config.monitoring.stats_log_interval_secs),
        },
    );
    let stats_handle = stats_worker::spawn(
        stats_worker::StatsDeps {
            api: api.clone(),
            snapshot_rx: snapshot_rx.clone(),
            stats: stats.clone(),
            shutdown_rx: stats_shutdown_rx,
        },
        stats_worker::StatsOptions {
            scan_interval: Duration::from_secs(app_config.stats.scan_interval_secs),
            smoothing_alpha: app_config.stats.smoothing_alpha,
            mem_exclude_cache: app_config.stats.mem_exclude_cache,
        },
    );

    let control = Arc::new(control::ControlDispatcher::new(
        api.clone(),
        snapshot_rx.clone(),
        refresh_handle,
    ));

    let app = routes::app(api, snapshot_rx, stats, control, app_config.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // Under Docker the ctrl-c watcher fires straight away; skip signal
        // handling and let the runtime stop the process.
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    tokio::signal::ctrl_c().await
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = stats_shutdown_tx.send(());
                let _ = topology_shutdown_tx.send(());
                let _ = stats_handle.await;
                let _ = topology_handle.await;
            }
        }
    }

    Ok(())
}
