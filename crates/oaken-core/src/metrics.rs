//! Worker counters.

use crate::engine::{MessageReport, Stage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one worker loop.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Total messages consumed
    messages_total: AtomicU64,

    /// Messages rejected before any write (malformed input)
    messages_rejected: AtomicU64,

    /// Messages where at least one stage failed
    messages_failed: AtomicU64,

    /// Failed stages across all messages
    stage_failures: AtomicU64,

    /// Rows written to the database
    rows_written: AtomicU64,

    /// Notifications published
    notifications_published: AtomicU64,

    /// Notifications that failed to publish
    publish_failures: AtomicU64,

    /// Offset commits that failed
    commit_failures: AtomicU64,
}

/// Point-in-time copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_total: u64,
    pub messages_rejected: u64,
    pub messages_failed: u64,
    pub stage_failures: u64,
    pub rows_written: u64,
    pub notifications_published: u64,
    pub publish_failures: u64,
    pub commit_failures: u64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one message.
    pub fn record_report(&self, report: &MessageReport) {
        self.messages_total.fetch_add(1, Ordering::Relaxed);

        if report.is_rejected() {
            self.messages_rejected.fetch_add(1, Ordering::Relaxed);
        }
        if !report.is_clean() {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
        }

        for outcome in report.outcomes() {
            match (&outcome.stage, outcome.result.is_ok()) {
                (Stage::Publish, true) => {
                    self.notifications_published.fetch_add(1, Ordering::Relaxed);
                }
                (Stage::Publish, false) => {
                    self.publish_failures.fetch_add(1, Ordering::Relaxed);
                    self.stage_failures.fetch_add(1, Ordering::Relaxed);
                }
                (stage, true) => {
                    self.rows_written
                        .fetch_add(stage.rows_written(), Ordering::Relaxed);
                }
                (_, false) => {
                    self.stage_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Record a failed offset commit.
    pub fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_total: self.messages_total.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            notifications_published: self.notifications_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }
}
