//! Lot gateway - parking allocation engine driven by simulated traffic
//!
//! Builds one facility from TOML config and runs a task per entry and exit
//! panel against it. Closed tickets go to the JSONL egress file; metrics are
//! logged periodically and served over Prometheus.
//!
//! Module structure:
//! - `domain/` - Core business types (Spot, Demand, Ticket, errors)
//! - `io/` - External interfaces (Egress, Prometheus)
//! - `services/` - Business logic (Strategy, Ledger, Gateways, Facility, Traffic)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use lot_gateway::domain::PanelId;
use lot_gateway::infra::Config;
use lot_gateway::io::create_egress_worker;
use lot_gateway::services::{run_entry_panel, run_exit_panel, Facility, ScaledClock, TrafficProfile};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Lot gateway - parking allocation engine simulator
#[derive(Parser, Debug)]
#[command(name = "lot-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Seed for the traffic generator (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

fn panel_rng(seed: Option<u64>, panel: PanelId) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ u64::from(panel.0)),
        None => StdRng::from_entropy(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for rejections and egress detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::new(Rfc3339))
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "lot-gateway starting");

    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        strategy = %config.strategy().as_str(),
        spots = %config.spots().len(),
        entry_panels = ?config.entry_panels(),
        exit_panels = ?config.exit_panels(),
        time_scale = %config.sim_time_scale(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let clock = Arc::new(ScaledClock::new(config.sim_time_scale()));
    let facility = Arc::new(Facility::from_config(&config, clock).context("failed to build facility")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_facility = facility.clone();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                lot_gateway::io::prometheus::start_metrics_server(prometheus_port, prom_facility, prom_shutdown).await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter
    let report_facility = facility.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut report_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            tokio::select! {
                _ = interval.tick() => report_facility.report().log(),
                changed = report_shutdown.changed() => {
                    if changed.is_err() || *report_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Closed tickets flow to the egress worker
    let (egress_tx, egress_worker) = create_egress_worker(config.egress_file(), config.site_id(), 1000);
    let egress_handle = tokio::spawn(egress_worker.run());

    let profile = TrafficProfile {
        arrivals_per_sec: config.sim_arrivals_per_sec(),
        mean_stay_secs: config.sim_mean_stay_secs(),
        time_scale: config.sim_time_scale(),
    };

    let mut departure_senders = Vec::new();
    let mut exit_handles: Vec<JoinHandle<u64>> = Vec::new();
    for exit in facility.exit_gateways() {
        let (tx, rx) = mpsc::channel(1000);
        departure_senders.push(tx);
        exit_handles.push(tokio::spawn(run_exit_panel(exit, rx, egress_tx.clone(), shutdown_rx.clone())));
    }
    // Exit panels hold the remaining egress senders
    drop(egress_tx);

    if departure_senders.is_empty() {
        tracing::warn!("no_exit_panels_configured");
    }

    let mut entry_handles: Vec<JoinHandle<u64>> = Vec::new();
    for entry in facility.entry_gateways() {
        let rng = panel_rng(args.seed, entry.id());
        entry_handles.push(tokio::spawn(run_entry_panel(
            entry,
            departure_senders.clone(),
            profile,
            rng,
            shutdown_rx.clone(),
        )));
    }
    drop(departure_senders);

    // Handle shutdown on Ctrl+C or after the configured duration
    let duration_secs = config.sim_duration_secs();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutdown_signal_received"),
        _ = async {
            if duration_secs > 0 {
                tokio::time::sleep(Duration::from_secs(duration_secs)).await
            } else {
                std::future::pending::<()>().await
            }
        } => info!(duration_secs = %duration_secs, "simulation_duration_elapsed"),
    }
    let _ = shutdown_tx.send(true);

    let mut issued = 0u64;
    for handle in entry_handles {
        issued += handle.await.context("entry panel task panicked")?;
    }
    let mut closed = 0u64;
    for handle in exit_handles {
        closed += handle.await.context("exit panel task panicked")?;
    }
    let egressed = egress_handle.await.context("egress worker panicked")?;

    let summary = facility.report();
    summary.log();
    info!(
        issued = %issued,
        closed = %closed,
        egressed = %egressed,
        still_parked = %summary.open_tickets,
        revenue = %facility.ledger().closed_revenue(),
        "lot-gateway shutdown complete"
    );
    Ok(())
}
