//! Substrate activity counters.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Per task-name statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskMetrics {
    /// Completed runs, successful or not.
    pub runs: u64,
    /// Runs that ended in an error.
    pub failures: u64,
    /// Total time spent in the task body.
    pub exec_time: Duration,
}

impl TaskMetrics {
    /// Mean time per run.
    #[must_use]
    pub fn mean_time(&self) -> Duration {
        if self.runs == 0 {
            Duration::ZERO
        } else {
            self.exec_time / u32::try_from(self.runs).unwrap_or(u32::MAX)
        }
    }
}

impl std::fmt::Display for TaskMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "runs={}, failures={}, time={:?}",
            self.runs, self.failures, self.exec_time
        )
    }
}

/// Point-in-time copy of the global counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_failed: u64,
    pub objects_put: u64,
    pub copy_retries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tasks_submitted: AtomicU64,
    tasks_failed: AtomicU64,
    objects_put: AtomicU64,
    copy_retries: AtomicU64,
}

/// Shared sink for substrate metrics.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetrics {
    counters: Arc<Counters>,
    tasks: Arc<RwLock<HashMap<String, TaskMetrics>>>,
}

impl ClusterMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submit(&self) {
        self.counters.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put(&self) {
        self.counters.objects_put.fetch_add(1, Ordering::Relaxed);
    }

    /// An in-place operation hit a read-only block and was re-run on a copy.
    pub fn record_copy_retry(&self) {
        self.counters.copy_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished task body.
    pub fn record_completion(&self, task: &str, elapsed: Duration, ok: bool) {
        if !ok {
            self.counters.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        let mut guard = self.tasks.write().expect("metrics lock poisoned");
        let entry = guard.entry(task.to_string()).or_default();
        entry.runs += 1;
        entry.exec_time += elapsed;
        if !ok {
            entry.failures += 1;
        }
    }

    #[must_use]
    pub fn tasks_submitted(&self) -> u64 {
        self.counters.tasks_submitted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn tasks_failed(&self) -> u64 {
        self.counters.tasks_failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn objects_put(&self) -> u64 {
        self.counters.objects_put.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn copy_retries(&self) -> u64 {
        self.counters.copy_retries.load(Ordering::Relaxed)
    }

    /// Statistics for one task name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<TaskMetrics> {
        self.tasks
            .read()
            .expect("metrics lock poisoned")
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted(),
            tasks_failed: self.tasks_failed(),
            objects_put: self.objects_put(),
            copy_retries: self.copy_retries(),
        }
    }

    /// Human-readable summary, one task name per line.
    #[must_use]
    pub fn format_summary(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = format!(
            "submitted={}, failed={}, put={}, copy_retries={}\n",
            snapshot.tasks_submitted,
            snapshot.tasks_failed,
            snapshot.objects_put,
            snapshot.copy_retries
        );
        let guard = self.tasks.read().expect("metrics lock poisoned");
        let mut names: Vec<_> = guard.keys().collect();
        names.sort();
        for name in names {
            let _ = writeln!(output, "  {name}: {}", guard[name]);
        }
        output
    }
}
