//! Task processing status.

use std::fmt;

/// Outcome of processing a single queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Success,
    /// Entry is malformed and will never succeed
    InvalidEntry,
    Failed,
    /// Entry goes back to the front of the queue
    NeedRetry,
    /// Nothing to do for this entry (router not handled, stale event)
    Ignore,
}

impl TaskStatus {
    /// Returns true if the entry needs no further work.
    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry)
    }

    /// Returns true if the entry was dropped without being applied.
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::InvalidEntry | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Success => "success",
            TaskStatus::InvalidEntry => "invalid_entry",
            TaskStatus::Failed => "failed",
            TaskStatus::NeedRetry => "need_retry",
            TaskStatus::Ignore => "ignore",
        };
        f.write_str(s)
    }
}
