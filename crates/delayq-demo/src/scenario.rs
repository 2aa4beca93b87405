//! The scripted scheduling scenario replayed by the demo.
//!
//! Labels name the elapsed time (at scale 1.0) at which each job is expected
//! to fire, so the log reads in order when the scheduler behaves.

use std::sync::Arc;
use std::time::Duration;

use delayq_scheduler::{Scheduler, SchedulerStats};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Schedule { label: &'static str, delay_ms: u64 },
    Pause { ms: u64 },
}

pub const REFERENCE: &[Step] = &[
    Step::Schedule { label: "job 3s", delay_ms: 3000 },
    Step::Schedule { label: "job 4s", delay_ms: 4000 },
    Step::Schedule { label: "job 5s", delay_ms: 5000 },
    // let the worker settle into waiting on "job 3s"
    Step::Pause { ms: 1000 },
    // sooner than the current head: must preempt the wait
    Step::Schedule { label: "job 2s", delay_ms: 1000 },
    Step::Schedule { label: "job 6s", delay_ms: 5000 },
    // everything above has fired by now; the worker is idle again
    Step::Pause { ms: 7000 },
    Step::Schedule { label: "job 11s", delay_ms: 3000 },
    Step::Schedule { label: "job 9s", delay_ms: 1000 },
    Step::Schedule { label: "job 10s", delay_ms: 2000 },
    // outlast the last deadline; stop() discards anything not yet due
    Step::Pause { ms: 3500 },
];

/// Milliseconds stretched (or shrunk) by `factor`.
pub fn scale(ms: u64, factor: f64) -> Duration {
    Duration::try_from_secs_f64(ms as f64 / 1000.0 * factor).unwrap_or(Duration::MAX)
}

/// Play `steps` against `scheduler`, sleeping through the pauses.
pub async fn run(
    scheduler: &Scheduler,
    steps: &[Step],
    time_scale: f64,
) -> delayq_scheduler::Result<()> {
    for step in steps {
        match *step {
            Step::Schedule { label, delay_ms } => {
                scheduler.schedule_named(label, scale(delay_ms, time_scale), move || {
                    info!("{label}");
                })?;
            }
            Step::Pause { ms } => tokio::time::sleep(scale(ms, time_scale)).await,
        }
    }
    Ok(())
}

/// Play `steps`, then stop the scheduler once the last pause is over.
///
/// `stop()` blocks until the worker has drained, so it runs off the runtime.
pub async fn replay(
    scheduler: Arc<Scheduler>,
    steps: &[Step],
    time_scale: f64,
) -> anyhow::Result<SchedulerStats> {
    run(&scheduler, steps, time_scale).await?;
    let stopping = Arc::clone(&scheduler);
    tokio::task::spawn_blocking(move || stopping.stop()).await??;
    Ok(scheduler.stats())
}
