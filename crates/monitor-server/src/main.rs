// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use monitor_agent::{
    aggregator::{Aggregator, Collectors},
    config::Config,
    probe::{ProbeTrigger, TriggerSettings},
    server::MonitorServer,
    speedtest::SpeedtestCli,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("MONITOR_LOG_LEVEL")
        .map(|val| val.trim().to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);
    let env_filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("h2=off,hyper=off,info"),
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error loading monitor configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let probe = ProbeTrigger::new(
        Arc::new(SpeedtestCli::new(config.speedtest.cli_path.clone())),
        TriggerSettings {
            enabled: config.speedtest.enabled,
            interval: config.speedtest.interval,
            timeout: config.speedtest.timeout,
        },
    );

    let cancel = CancellationToken::new();

    if config.speedtest.enabled {
        probe.spawn_scheduler(cancel.clone());
    } else {
        info!("Bandwidth probe disabled");
    }

    let aggregator = Arc::new(Aggregator::new(
        Collectors::system(&config.cache),
        probe,
        &config.cache,
    ));
    let server = MonitorServer::new(Arc::clone(&config), aggregator);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => {
                error!("Unable to listen for shutdown signal: {e}");
                return;
            }
        }
        shutdown.cancel();
    });

    info!(
        "Monitor server starting on {}:{}",
        config.server.host, config.server.port
    );

    match server.start(cancel).await {
        Ok(()) => {
            info!("Monitor server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Monitor server failed: {e}");
            ExitCode::FAILURE
        }
    }
}
