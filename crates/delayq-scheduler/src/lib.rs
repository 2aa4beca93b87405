//! `delayq-scheduler` — in-process delayed-job scheduler.
//!
//! # Overview
//!
//! Callers hand the [`Scheduler`] a closure and a delay. The closure runs on a
//! single dedicated worker thread no earlier than `now + delay`, and jobs run
//! in earliest-deadline-first order (FIFO among equal deadlines). Jobs never
//! run concurrently with each other.
//!
//! The worker sleeps on a [`DeadlineQueue`] until the earliest job is due. A
//! newly scheduled job with a sooner deadline wakes it early, so it never
//! oversleeps past a job inserted while it was waiting.
//!
//! [`Scheduler::stop`] runs every job that was already due when it was called,
//! discards the rest, and joins the worker.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use delayq_scheduler::Scheduler;
//!
//! let scheduler = Scheduler::default();
//! scheduler.start()?;
//! scheduler.schedule(Duration::from_millis(500), || println!("half a second later"))?;
//! std::thread::sleep(Duration::from_secs(1));
//! scheduler.stop()?;
//! # Ok::<(), delayq_scheduler::SchedulerError>(())
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod queue;
pub mod types;

pub use delayq_core::SchedulerConfig;
pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use queue::DeadlineQueue;
pub use types::{FiredJob, Job, JobId, JobOutcome, ScheduledItem, SchedulerStats};
