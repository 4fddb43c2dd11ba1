//! Bounded worker pool for independent filesystem tasks
//!
//! Both parallel stages map a batch of typed task structs over a fixed number
//! of workers and collect one outcome struct per unit. Units never talk to
//! each other and touch disjoint paths, so there is no cross-worker locking.
//! A unit failure (or panic) becomes a failed outcome; it never tears down
//! the batch.

use futures::stream::{self, StreamExt};
use tracing::warn;

/// An outcome type the pool can synthesize a failure value for
pub trait TaskOutcome: Send + 'static {
    /// Build a failed outcome from a detail message
    fn failed(detail: String) -> Self;

    /// Whether this unit succeeded
    fn is_success(&self) -> bool;

    /// Human-readable detail (error text or filename)
    fn detail(&self) -> &str;
}

/// Plain success/detail outcome used by extraction and move passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReport {
    pub success: bool,
    pub detail: String,
}

impl WorkReport {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }
}

impl TaskOutcome for WorkReport {
    fn failed(detail: String) -> Self {
        Self {
            success: false,
            detail,
        }
    }

    fn is_success(&self) -> bool {
        self.success
    }

    fn detail(&self) -> &str {
        &self.detail
    }
}

/// Map `tasks` over at most `workers` blocking workers, collecting one
/// outcome per task. Blocks the coordinator until the whole batch is done;
/// completion order is arbitrary.
pub async fn map_tasks<T, R, F>(tasks: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: TaskOutcome,
    F: Fn(T) -> R + Send + Sync + Clone + 'static,
{
    let workers = workers.max(1);
    stream::iter(tasks.into_iter().map(move |task| {
        let f = f.clone();
        tokio::task::spawn_blocking(move || f(task))
    }))
    .buffer_unordered(workers)
    .map(|joined| joined.unwrap_or_else(|err| R::failed(format!("worker panicked: {err}"))))
    .collect()
    .await
}

/// Log per-unit failures and return the failure count
pub fn log_failures<R: TaskOutcome>(outcomes: &[R]) -> usize {
    let mut errors = 0;
    for outcome in outcomes {
        if !outcome.is_success() {
            errors += 1;
            warn!("Worker error: {}", outcome.detail());
        }
    }
    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_map_tasks_collects_every_outcome() {
        let outcomes = map_tasks(vec![1u32, 2, 3, 4], 2, |n| {
            if n % 2 == 0 {
                WorkReport::ok(n.to_string())
            } else {
                WorkReport::failed(format!("odd: {n}"))
            }
        })
        .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 2);
        assert_eq!(log_failures(&outcomes), 2);
    }

    #[tokio::test]
    async fn test_map_tasks_bounds_concurrency() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let c = current.clone();
        let p = peak.clone();
        let outcomes = map_tasks(vec![(); 16], 3, move |_| {
            let now = c.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            c.fetch_sub(1, Ordering::SeqCst);
            WorkReport::ok("done")
        })
        .await;

        assert_eq!(outcomes.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_failed_outcome() {
        let outcomes: Vec<WorkReport> = map_tasks(vec![0u32, 1], 2, |n| {
            if n == 0 {
                panic!("boom");
            }
            WorkReport::ok("fine")
        })
        .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| !o.success).count(), 1);
    }
}
