//! SyncDaemon implementation.
//!
//! The SyncDaemon drives the registered orchs:
//! - Orch registration and priority ordering
//! - Heartbeat loop dispatching pending work
//! - Single-pass runs for one-shot syncs
//! - Graceful stop from another task

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fwaas_orch_common::Orch;
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;

/// Configuration for the SyncDaemon.
#[derive(Debug, Clone)]
pub struct SyncDaemonConfig {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
}

impl Default for SyncDaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
        }
    }
}

/// Cloneable handle that stops a running daemon.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Asks the daemon loop to exit after the current pass.
    pub fn stop(&self) {
        info!("Stopping SyncDaemon");
        audit_log!(
            AuditRecord::new(AuditCategory::AdminAction, "SyncDaemon", "stop_requested")
                .with_outcome(AuditOutcome::Success)
        );
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The sync daemon.
pub struct SyncDaemon {
    config: SyncDaemonConfig,
    /// Registered orchs keyed by priority
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    running: Arc<AtomicBool>,
}

impl SyncDaemon {
    pub fn new(config: SyncDaemonConfig) -> Self {
        Self {
            config,
            orchs: BTreeMap::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers an orch. Lower priority values run first.
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        let orch_name = orch.name().to_string();
        info!("Registering {} with priority {}", orch_name, priority);

        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "SyncDaemon",
            format!("register_orch: {}", orch_name),
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(&orch_name)
        .with_object_type("orch_module")
        .with_details(serde_json::json!({ "priority": priority })));

        self.orchs.entry(priority).or_default().push(orch);
    }

    pub fn orch_count(&self) -> usize {
        self.orchs.values().map(Vec::len).sum()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns a handle that can stop the loop from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Stops the loop.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Gives every orch with pending work one `do_task` call, in priority
    /// order. Returns the number of orchs that ran.
    pub async fn run_once(&mut self) -> usize {
        let mut ran = 0;
        for orchs in self.orchs.values_mut() {
            for orch in orchs.iter_mut() {
                if orch.has_pending_tasks() {
                    debug!("Processing tasks for {}", orch.name());
                    orch.do_task().await;
                    ran += 1;
                }
            }
        }
        ran
    }

    /// Runs passes until no orch has pending work or `max_passes` is hit.
    ///
    /// Returns true if the daemon went idle.
    pub async fn run_until_idle(&mut self, max_passes: usize) -> bool {
        for _ in 0..max_passes {
            if self.run_once().await == 0 {
                return true;
            }
        }
        let idle = !self.has_pending_tasks();
        if !idle {
            warn!("Work still pending after {} passes", max_passes);
        }
        idle
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.orchs
            .values()
            .flat_map(|orchs| orchs.iter())
            .any(|orch| orch.has_pending_tasks())
    }

    /// Runs the heartbeat loop until stopped.
    pub async fn run(&mut self) {
        info!("Starting SyncDaemon event loop");
        self.running.store(true, Ordering::SeqCst);

        audit_log!(AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "SyncDaemon",
            "event_loop_started",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "heartbeat_interval_ms": self.config.heartbeat_interval_ms,
            "orch_count": self.orch_count(),
        })));

        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        while self.is_running() {
            self.run_once().await;
            tokio::time::sleep(interval).await;
        }

        info!("SyncDaemon event loop stopped");
        audit_log!(
            AuditRecord::new(AuditCategory::SystemLifecycle, "SyncDaemon", "event_loop_stopped")
                .with_outcome(AuditOutcome::Success)
        );
    }

    /// Dumps state for debugging.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("SyncDaemon running: {}", self.is_running())];
        for (priority, orchs) in &self.orchs {
            for orch in orchs {
                lines.push(format!(
                    "  [{:3}] {} - {} pending",
                    priority,
                    orch.name(),
                    orch.dump_pending_tasks().len()
                ));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct TestOrch {
        name: String,
        priority: i32,
        task_count: Arc<AtomicU32>,
        pending: u32,
    }

    impl TestOrch {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                task_count: Arc::new(AtomicU32::new(0)),
                pending: 0,
            }
        }

        fn with_pending(mut self, pending: u32) -> Self {
            self.pending = pending;
            self
        }
    }

    #[async_trait]
    impl Orch for TestOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            self.task_count.fetch_add(1, Ordering::SeqCst);
            self.pending = self.pending.saturating_sub(1);
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn has_pending_tasks(&self) -> bool {
            self.pending > 0
        }
    }

    #[test]
    fn test_default_config() {
        assert_eq!(SyncDaemonConfig::default().heartbeat_interval_ms, 1000);
    }

    #[test]
    fn test_priority_ordering() {
        let mut daemon = SyncDaemon::new(SyncDaemonConfig::default());
        daemon.register_orch(Box::new(TestOrch::new("Low", 100)));
        daemon.register_orch(Box::new(TestOrch::new("High", -10)));
        daemon.register_orch(Box::new(TestOrch::new("Also-High", -10)));

        let priorities: Vec<i32> = daemon.orchs.keys().copied().collect();
        assert_eq!(priorities, vec![-10, 100]);
        assert_eq!(daemon.orch_count(), 3);
    }

    #[tokio::test]
    async fn test_run_once_only_runs_pending() {
        let mut daemon = SyncDaemon::new(SyncDaemonConfig::default());
        let busy = TestOrch::new("Busy", 0).with_pending(1);
        let busy_count = Arc::clone(&busy.task_count);
        let idle = TestOrch::new("Idle", 0);
        let idle_count = Arc::clone(&idle.task_count);
        daemon.register_orch(Box::new(busy));
        daemon.register_orch(Box::new(idle));

        assert_eq!(daemon.run_once().await, 1);
        assert_eq!(busy_count.load(Ordering::SeqCst), 1);
        assert_eq!(idle_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_until_idle() {
        let mut daemon = SyncDaemon::new(SyncDaemonConfig::default());
        daemon.register_orch(Box::new(TestOrch::new("Busy", 0).with_pending(3)));

        assert!(!daemon.run_until_idle(2).await);
        assert!(daemon.run_until_idle(5).await);
        assert!(!daemon.has_pending_tasks());
    }

    #[tokio::test]
    async fn test_stop_handle_ends_loop() {
        let mut daemon = SyncDaemon::new(SyncDaemonConfig {
            heartbeat_interval_ms: 5,
        });
        let handle = daemon.stop_handle();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });

        tokio::time::timeout(Duration::from_secs(5), daemon.run())
            .await
            .expect("daemon loop did not stop");
        stopper.await.unwrap();
        assert!(!daemon.is_running());
    }

    #[test]
    fn test_dump() {
        let mut daemon = SyncDaemon::new(SyncDaemonConfig::default());
        daemon.register_orch(Box::new(TestOrch::new("FwaasOrch", 30)));

        let lines = daemon.dump();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("SyncDaemon running: false"));
        assert!(lines[1].contains("FwaasOrch"));
    }
}
