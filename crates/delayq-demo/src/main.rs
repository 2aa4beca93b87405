use std::sync::Arc;

use anyhow::ensure;
use chrono::Utc;
use clap::Parser;
use delayq_core::DelayqConfig;
use delayq_scheduler::{FiredJob, Scheduler};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod scenario;

#[derive(Debug, Parser)]
#[command(name = "delayq-demo", about = "Replay a delayed-job scheduling scenario")]
struct Args {
    /// Config file (default: $DELAYQ_CONFIG, then ~/.delayq/delayq.toml)
    #[arg(long)]
    config: Option<String>,

    /// Multiply every delay and pause by this factor (0.1 runs 10x faster)
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,

    /// Print each fired job as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr so `--json` output stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delayq_demo=info,delayq_scheduler=info".into()),
        )
        .init();

    let args = Args::parse();
    ensure!(
        args.time_scale.is_finite() && args.time_scale > 0.0,
        "--time-scale must be a positive number, got {}",
        args.time_scale
    );

    // load config: --config > DELAYQ_CONFIG env > ~/.delayq/delayq.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("DELAYQ_CONFIG").ok());
    let config = DelayqConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        DelayqConfig::default()
    });

    // Fired-job channel: scheduler worker → reporter task
    let (fired_tx, fired_rx) = mpsc::channel::<FiredJob>(256);
    let scheduler = Arc::new(Scheduler::new(config.scheduler).with_fired_channel(fired_tx));
    scheduler.start()?;

    let reporter = tokio::spawn(report_fired(fired_rx, args.json));

    info!(time_scale = args.time_scale, "replaying scenario");
    let stats =
        scenario::replay(Arc::clone(&scheduler), scenario::REFERENCE, args.time_scale).await?;
    info!(
        executed = stats.executed,
        panicked = stats.panicked,
        dropped = stats.dropped_on_stop,
        peak_pending = stats.peak_pending,
        "demo finished"
    );

    // last sender goes away with the scheduler; the reporter then drains and exits
    drop(scheduler);
    reporter.await?;
    Ok(())
}

async fn report_fired(mut fired_rx: mpsc::Receiver<FiredJob>, json: bool) {
    let t0 = Utc::now();
    while let Some(job) = fired_rx.recv().await {
        if json {
            match serde_json::to_string(&job) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(job_id = %job.id, "fired record not serializable: {e}"),
            }
            continue;
        }
        info!(
            job_id = %job.id,
            label = job.label.as_deref().unwrap_or("-"),
            elapsed_ms = (job.started_at - t0).num_milliseconds(),
            lateness_ms = job.lateness_ms,
            outcome = %job.outcome,
            "job fired"
        );
    }
}
