//! Runs one controller per enabled battery next to the metrics server.

use std::{sync::Arc, time::Duration};

use chrono::Local;
use itertools::Itertools;
use tokio::{net::TcpListener, signal::ctrl_c, task::JoinSet};

use crate::{
    config::Config,
    core::{controller::Controller, device::Device, observer::StatusObserver},
    metrics::{Metrics, server},
    prelude::*,
    tables::build_status_table,
};

/// Discharge the enabled batteries until SIGINT or SIGTERM.
#[instrument(skip_all)]
pub async fn run(config: &Config) -> Result {
    let batteries = config.enabled_batteries().collect_vec();
    info!(n_batteries = batteries.len(), "loaded the batteries");
    if batteries.is_empty() {
        warn!("no batteries enabled");
        return Ok(());
    }

    let metrics = Arc::new(Metrics::try_new()?);
    let mut tasks = JoinSet::new();

    if config.metrics.is_enabled {
        let address = config.metrics.address();
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind the metrics server to `{address}`"))?;
        tasks.spawn(server::serve(listener, Arc::clone(&metrics)));
    }

    let period = *config.polling_interval;
    for battery in batteries {
        let controller = Controller::builder()
            .policy(battery.policy())
            .device(battery.connect()?)
            .observer(Arc::clone(&metrics) as Arc<dyn StatusObserver>)
            .build();
        tasks.spawn(async move {
            controller.run(period).await;
            Ok(())
        });
    }

    tokio::select! {
        result = shutdown_signal() => {
            result?;
            info!("shutting down…");
        }
        Some(result) = tasks.join_next() => {
            result.context("a task has panicked")??;
            bail!("a task has stopped unexpectedly");
        }
    }
    tasks.shutdown().await;
    Ok(())
}

/// Poll every enabled battery once and print the table.
#[instrument(skip_all)]
pub async fn probe(config: &Config) -> Result {
    let mut rows = Vec::new();
    for battery in config.enabled_batteries() {
        let client = battery.connect()?.with_retry_policy(1, Duration::ZERO);
        match client.status().await {
            Ok(status) => rows.push((battery.policy(), status)),
            Err(error) => error!(battery = %battery.name, "failed to poll the status: {error:#}"),
        }
    }
    println!("{}", build_status_table(&rows, &Local::now()));
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install the SIGTERM handler")?;
    tokio::select! {
        result = ctrl_c() => result.context("failed to listen for Ctrl+C")?,
        _ = terminate.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result {
    ctrl_c().await.context("failed to listen for Ctrl+C")
}
