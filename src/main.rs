//! feeder-efficacy entry point: CLI wiring, model loading, and the consumer loop.

use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info, warn};

use feeder_efficacy::app::{AppOptions, EfficacyApp};
use feeder_efficacy::bus::topics::{simulation_log_topic, simulation_output_topic};
use feeder_efficacy::bus::{ConnectOptions, MessageBus, StompBus};
use feeder_efficacy::cim::{BlazegraphClient, load_distributed_model};
use feeder_efficacy::cli::Cli;
use feeder_efficacy::config::AppConfig;
use feeder_efficacy::logging;
use feeder_efficacy::runner::{self, StopReason};
use feeder_efficacy::sim::lifecycle::{start_simulation, stop_simulation};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config().context("failed to load configuration")?;
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("invalid configuration ({} errors)", errors.len());
    }

    let options = ConnectOptions::from(&config.gridappsd);
    let bus = Arc::new(
        StompBus::connect(&options)
            .await
            .with_context(|| format!("failed to connect to {}:{}", options.host, options.port))?,
    );
    let timeout = config.gridappsd.request_timeout();

    let blazegraph = BlazegraphClient::new(config.blazegraph.url.clone());
    let model = load_distributed_model(&*bus, &blazegraph, &config.model, timeout)
        .await
        .context("failed to load feeder model")?;
    if let Some(path) = &cli.save_model {
        model
            .save_snapshot(path)
            .with_context(|| format!("failed to write model snapshot {}", path.display()))?;
        info!(path = %path.display(), "model snapshot written");
    }

    let (simulation_id, started_here) = match &config.simulation.simulation_id {
        Some(id) => {
            info!(simulation_id = %id, "attaching to running simulation");
            (id.clone(), false)
        }
        None => {
            let run_config = read_run_config(&config)?;
            let id = start_simulation(&*bus, &run_config, timeout)
                .await
                .context("failed to start simulation")?;
            (id, true)
        }
    };

    let mut app = EfficacyApp::new(bus.clone(), model, simulation_id.clone(), AppOptions::from(&config))
        .context("failed to set up efficacy app")?;
    let mut output = bus
        .subscribe(&simulation_output_topic(&simulation_id))
        .await
        .context("failed to subscribe to simulation output")?;
    let mut log = bus
        .subscribe(&simulation_log_topic(&simulation_id))
        .await
        .context("failed to subscribe to simulation log")?;

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;

        let state = Arc::new(feeder_efficacy::api::ApiState {
            simulation_id: simulation_id.clone(),
            sections: app.sections().to_vec(),
            history: app.history(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.api_port));
        tokio::spawn(async move {
            if let Err(e) = feeder_efficacy::api::serve(state, addr).await {
                error!(error = %e, "api server stopped");
            }
        });
    }

    let reason = runner::run(&mut app, &mut output, Some(&mut log), shutdown_signal()).await;

    if reason == StopReason::Shutdown && started_here {
        if let Err(e) = stop_simulation(&*bus, &simulation_id).await {
            warn!(error = %e, "failed to stop simulation");
        }
    }
    for subscription in [&output, &log] {
        if let Err(e) = bus.unsubscribe(subscription).await {
            warn!(destination = subscription.destination(), error = %e, "unsubscribe failed");
        }
    }
    bus.disconnect().await.context("failed to disconnect from broker")?;
    info!(%simulation_id, rows = app.history().len(), "done");
    Ok(())
}

fn read_run_config(config: &AppConfig) -> Result<Value> {
    let path = config
        .simulation
        .run_config
        .as_deref()
        .unwrap_or_else(|| Path::new("maple_demo_sim_config.json"));
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read run config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid run config {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
