use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Receipt for a scheduled job, used in logs and [`FiredJob`] records.
///
/// This is not a cancellation handle: once scheduled, a job either runs or is
/// discarded at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A unit of work: runs once, on the scheduler's worker thread.
pub struct Job {
    label: Option<String>,
    body: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    pub fn new<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: None,
            body: Box::new(body),
        }
    }

    /// A job with a human-readable label for log lines and fired records.
    pub fn named<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: Some(label.into()),
            body: Box::new(body),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Box<dyn FnOnce() + Send + 'static>) {
        (self.label, self.body)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A job paired with its absolute monotonic wake time.
///
/// Ordered so that `BinaryHeap<ScheduledItem>` pops the earliest wake time
/// first, and among equal wake times the earliest insertion first.
#[derive(Debug)]
pub struct ScheduledItem {
    pub(crate) id: JobId,
    /// Insertion sequence, stamped by the queue on insert.
    pub(crate) seq: u64,
    pub(crate) wake_at: Instant,
    pub(crate) delay: Duration,
    pub(crate) scheduled_at: DateTime<Utc>,
    pub(crate) job: Job,
}

impl ScheduledItem {
    pub fn new(wake_at: Instant, delay: Duration, job: Job) -> Self {
        Self {
            id: JobId::new(),
            seq: 0,
            wake_at,
            delay,
            scheduled_at: Utc::now(),
            job,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn wake_at(&self) -> Instant {
        self.wake_at
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    pub fn label(&self) -> Option<&str> {
        self.job.label()
    }
}

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledItem {}

impl Ord for ScheduledItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earlier wake time first, then earlier insertion
        other
            .wake_at
            .cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How a job's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    /// The job body panicked; the panic was caught and the worker carried on.
    Panicked,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Panicked => "panicked",
        };
        write!(f, "{s}")
    }
}

/// Record of one finished job, forwarded to the fired-job channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredJob {
    pub id: JobId,
    pub label: Option<String>,
    /// Delay requested at schedule time.
    pub delay_ms: u64,
    /// Wall-clock time of the `schedule` call.
    pub scheduled_at: DateTime<Utc>,
    /// Wall-clock time the job body started.
    pub started_at: DateTime<Utc>,
    /// How long after its wake time the job actually started.
    pub lateness_ms: u64,
    pub duration_ms: u64,
    pub outcome: JobOutcome,
}

/// Counters for the scheduler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub scheduled: u64,
    pub executed: u64,
    pub panicked: u64,
    /// Jobs still in the future when `stop()` was called; never run.
    pub dropped_on_stop: u64,
    /// Jobs currently waiting in the queue.
    pub pending: usize,
    pub peak_pending: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn item(wake_at: Instant, seq: u64, label: &str) -> ScheduledItem {
        let mut item = ScheduledItem::new(wake_at, Duration::ZERO, Job::named(label, || {}));
        item.seq = seq;
        item
    }

    #[test]
    fn earlier_wake_time_is_greater() {
        let now = Instant::now();
        let sooner = item(now, 1, "sooner");
        let later = item(now + Duration::from_millis(5), 0, "later");
        // BinaryHeap is a max-heap, so "greater" pops first
        assert!(sooner > later);
    }

    #[test]
    fn equal_wake_time_breaks_ties_by_insertion() {
        let now = Instant::now();
        let first = item(now, 0, "first");
        let second = item(now, 1, "second");
        assert!(first > second);
    }

    #[test]
    fn heap_pops_in_deadline_order() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(item(now + Duration::from_millis(30), 0, "c"));
        heap.push(item(now + Duration::from_millis(10), 1, "a"));
        heap.push(item(now + Duration::from_millis(20), 2, "b"));
        heap.push(item(now + Duration::from_millis(10), 3, "a2"));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|i| i.label().unwrap_or_default().to_string())
            .collect();
        assert_eq!(order, ["a", "a2", "b", "c"]);
    }

    #[test]
    fn job_debug_shows_label_only() {
        let job = Job::named("nightly", || {});
        let s = format!("{job:?}");
        assert!(s.contains("nightly"));
    }

    #[test]
    fn fired_job_serializes_outcome_in_snake_case() {
        let fired = FiredJob {
            id: JobId::new(),
            label: Some("job 3s".to_string()),
            delay_ms: 3000,
            scheduled_at: Utc::now(),
            started_at: Utc::now(),
            lateness_ms: 1,
            duration_ms: 0,
            outcome: JobOutcome::Panicked,
        };
        let json = serde_json::to_string(&fired).unwrap();
        assert!(json.contains(r#""outcome":"panicked""#));
        assert!(json.contains(r#""label":"job 3s""#));
    }
}
