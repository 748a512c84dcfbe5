//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for all orchestration agents.
///
/// Each Orch module implements this trait to participate in the sync
/// daemon's event loop. The daemon calls `do_task()` whenever the Orch
/// reports pending work.
///
/// # Lifecycle
///
/// 1. Construction: Orch is created with its collaborators
/// 2. Registration: Orch is handed to the daemon
/// 3. Event Loop: `do_task()` is called when events are queued
/// 4. Shutdown: Orch is dropped
///
/// # Thread Safety
///
/// Orch implementations must be `Send + Sync` so the daemon can be driven
/// from a multi-threaded runtime.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending tasks from all consumers.
    ///
    /// Implementations should:
    /// 1. Drain pending entries from consumers
    /// 2. Process each entry (translate to backend calls)
    /// 3. Requeue entries that failed with a retryable status
    async fn do_task(&mut self);

    /// Returns the priority of this Orch (lower = higher priority).
    fn priority(&self) -> i32 {
        0
    }

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
