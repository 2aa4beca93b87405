use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use chrono::Utc;
use delayq_core::SchedulerConfig;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    clock,
    error::{Result, SchedulerError},
    queue::DeadlineQueue,
    types::{FiredJob, Job, JobId, JobOutcome, ScheduledItem, SchedulerStats},
};

enum Lifecycle {
    Idle,
    Running(JoinHandle<()>),
    Stopped,
}

/// Delayed-job scheduler: runs each job on a single worker thread once its
/// delay has elapsed, earliest deadline first.
///
/// All methods take `&self`; share the scheduler across caller threads with an
/// `Arc`. Dropping a running scheduler stops it (see [`stop`](Self::stop)).
pub struct Scheduler {
    config: SchedulerConfig,
    queue: Arc<DeadlineQueue>,
    lifecycle: Mutex<Lifecycle>,
    /// True while the worker thread is alive and accepting work. Read without
    /// the lifecycle lock, which `stop` holds for the whole drain.
    running: Arc<AtomicBool>,
    worker_id: OnceLock<ThreadId>,
    /// If set, every finished job is reported here.
    fired_tx: Option<mpsc::Sender<FiredJob>>,
}

impl Scheduler {
    /// Create an idle scheduler. Nothing runs until [`start`](Self::start).
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(?config, "Scheduler::new");
        let queue = Arc::new(DeadlineQueue::new(config.max_pending));
        Self {
            config,
            queue,
            lifecycle: Mutex::new(Lifecycle::Idle),
            running: Arc::new(AtomicBool::new(false)),
            worker_id: OnceLock::new(),
            fired_tx: None,
        }
    }

    /// Report every finished job as a [`FiredJob`] on `tx`.
    ///
    /// The worker uses `try_send`, so a full or closed channel never stalls
    /// job execution; the record is dropped with a warning instead.
    pub fn with_fired_channel(mut self, tx: mpsc::Sender<FiredJob>) -> Self {
        self.fired_tx = Some(tx);
        self
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the worker thread. Returns immediately.
    ///
    /// Jobs scheduled before `start` are kept and run once their time comes.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => return Err(SchedulerError::AlreadyStarted),
            Lifecycle::Stopped => return Err(SchedulerError::Stopped),
        }

        let worker = Worker {
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            catch_panics: self.config.catch_panics,
            fired_tx: self.fired_tx.clone(),
        };
        // Set before spawning so a worker that dies at once can clear it.
        self.running.store(true, Ordering::Release);
        let handle = match thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                return Err(SchedulerError::Spawn(e));
            }
        };
        let _ = self.worker_id.set(handle.thread().id());
        *lifecycle = Lifecycle::Running(handle);

        info!(thread = %self.config.thread_name, "scheduler started");
        Ok(())
    }

    /// Run `job` once `delay` has elapsed. A zero delay makes it due at once.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> Result<JobId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_job(delay, Job::new(job))
    }

    /// Like [`schedule`](Self::schedule), with a label for logs and records.
    pub fn schedule_named<F>(
        &self,
        label: impl Into<String>,
        delay: Duration,
        job: F,
    ) -> Result<JobId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_job(delay, Job::named(label, job))
    }

    /// Schedule with a signed millisecond delay. Negative delays run as soon
    /// as possible.
    pub fn schedule_millis<F>(&self, delay_ms: i64, job: F) -> Result<JobId>
    where
        F: FnOnce() + Send + 'static,
    {
        if delay_ms < 0 {
            warn!(delay_ms, "negative delay clamped to zero");
        }
        self.schedule_job(clock::millis(delay_ms), Job::new(job))
    }

    /// Insert a prepared [`Job`]. Fails with `Stopped` after [`stop`](Self::stop).
    pub fn schedule_job(&self, delay: Duration, job: Job) -> Result<JobId> {
        let item = ScheduledItem::new(clock::deadline_after(delay), delay, job);
        let label = item.label().map(str::to_owned);
        let scheduled_at = item.scheduled_at();

        let id = self.queue.insert(item)?;
        info!(
            job_id = %id,
            label = label.as_deref().unwrap_or("-"),
            delay_ms = clock::as_millis(delay),
            at = %clock::format_wall_clock(scheduled_at),
            "job scheduled"
        );
        Ok(id)
    }

    /// Request shutdown and block until the worker has exited.
    ///
    /// Every job whose wake time is at or before the moment of this call runs
    /// first; jobs due later are discarded without running. Calling `stop`
    /// again after it succeeded is a no-op. Fails with `NotStarted` if the
    /// scheduler was never started, and with `StopFromWorker` when called
    /// from inside a job (the worker cannot wait for itself).
    pub fn stop(&self) -> Result<()> {
        if self.worker_id.get() == Some(&thread::current().id()) {
            return Err(SchedulerError::StopFromWorker);
        }
        // Held across the join so a concurrent `stop` also waits for the drain.
        let mut lifecycle = self.lifecycle();
        let handle = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(handle) => handle,
            Lifecycle::Stopped => return Ok(()),
            Lifecycle::Idle => {
                *lifecycle = Lifecycle::Idle;
                return Err(SchedulerError::NotStarted);
            }
        };

        self.running.store(false, Ordering::Release);
        self.queue.request_shutdown(clock::now());
        handle.join().map_err(|_| SchedulerError::WorkerPanicked)?;

        let stats = self.queue.stats();
        info!(
            executed = stats.executed,
            panicked = stats.panicked,
            dropped = stats.dropped_on_stop,
            "scheduler stopped"
        );
        Ok(())
    }

    /// False before `start`, after `stop`, and once the worker has died.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Jobs still waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.queue.stats()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let running = matches!(
            *self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner),
            Lifecycle::Running(_)
        );
        if running {
            if let Err(e) = self.stop() {
                error!("scheduler stop on drop failed: {e}");
            }
        }
    }
}

/// State moved onto the worker thread.
struct Worker {
    queue: Arc<DeadlineQueue>,
    running: Arc<AtomicBool>,
    catch_panics: bool,
    fired_tx: Option<mpsc::Sender<FiredJob>>,
}

impl Worker {
    fn run(self) {
        let _exit = WorkerExit {
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
        };
        debug!("scheduler worker running");
        while let Some(item) = self.queue.next_due() {
            let fired = self.execute(item);
            self.queue.record(fired.outcome);
            self.forward(fired);
        }
        debug!("scheduler worker exiting");
    }

    fn execute(&self, item: ScheduledItem) -> FiredJob {
        let started = clock::now();
        let started_at = Utc::now();
        let lateness = started.saturating_duration_since(item.wake_at);
        let (label, body) = item.job.into_parts();

        debug!(
            job_id = %item.id,
            label = label.as_deref().unwrap_or("-"),
            lateness_ms = clock::as_millis(lateness),
            at = %clock::format_wall_clock(started_at),
            "job starting"
        );

        let outcome = if self.catch_panics {
            match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(()) => JobOutcome::Completed,
                Err(payload) => {
                    error!(
                        job_id = %item.id,
                        label = label.as_deref().unwrap_or("-"),
                        panic = %panic_message(payload.as_ref()),
                        "job panicked"
                    );
                    JobOutcome::Panicked
                }
            }
        } else {
            body();
            JobOutcome::Completed
        };

        FiredJob {
            id: item.id,
            label,
            delay_ms: clock::as_millis(item.delay),
            scheduled_at: item.scheduled_at,
            started_at,
            lateness_ms: clock::as_millis(lateness),
            duration_ms: clock::as_millis(started.elapsed()),
            outcome,
        }
    }

    fn forward(&self, fired: FiredJob) {
        if let Some(ref tx) = self.fired_tx {
            let id = fired.id;
            // try_send never blocks the worker; drop the record if nobody keeps up.
            if tx.try_send(fired).is_err() {
                warn!(job_id = %id, "fired-job channel full or closed; record dropped");
            }
        }
    }
}

/// Runs when the worker thread ends, including by unwinding out of a job.
struct WorkerExit {
    queue: Arc<DeadlineQueue>,
    running: Arc<AtomicBool>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if thread::panicking() {
            self.queue.mark_worker_lost();
            error!("scheduler worker died; new jobs will be rejected");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
