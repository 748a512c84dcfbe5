//! FwaasOrch - router firewall events to section syncs.

use std::sync::Arc;

use async_trait::async_trait;
use fwaas_backend::BackendClient;
use fwaas_orch_common::{
    Consumer, ConsumerConfig, KeyOpFieldsValues, Operation, Orch, TaskStatus,
};
use tracing::{debug, error, info, warn};

use super::coordinator::FirewallSyncCoordinator;
use super::directory::CorePlugin;
use super::types::{ReadScope, RequestContext, RouterEvent, RouterId};

/// Configuration for FwaasOrch.
#[derive(Debug, Clone)]
pub struct FwaasOrchConfig {
    /// Routers handled per `do_task` call
    pub batch_size: usize,
    /// Daemon priority (lower runs first)
    pub priority: i32,
}

impl Default for FwaasOrchConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            priority: 30,
        }
    }
}

/// FwaasOrch statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FwaasOrchStats {
    pub events_processed: u64,
    pub syncs_succeeded: u64,
    pub not_applicable: u64,
    pub retries: u64,
    pub failures: u64,
    pub routers_deleted: u64,
}

/// Orch that keeps every router's backend firewall section current.
///
/// Events are keyed by router id, so any number of events for one router
/// between two `do_task` calls result in a single sync.
pub struct FwaasOrch {
    config: FwaasOrchConfig,
    consumer: Consumer,
    coordinator: Arc<FirewallSyncCoordinator>,
    plugin: Arc<dyn CorePlugin>,
    backend: BackendClient,
    stats: FwaasOrchStats,
    request_seq: u64,
}

impl FwaasOrch {
    pub const TABLE_NAME: &'static str = "FWAAS_ROUTER";

    pub fn new(
        config: FwaasOrchConfig,
        coordinator: Arc<FirewallSyncCoordinator>,
        plugin: Arc<dyn CorePlugin>,
        backend: BackendClient,
    ) -> Self {
        let consumer = Consumer::new(
            ConsumerConfig::new(Self::TABLE_NAME)
                .with_priority(config.priority)
                .with_batch_size(config.batch_size),
        );
        Self {
            config,
            consumer,
            coordinator,
            plugin,
            backend,
            stats: FwaasOrchStats::default(),
            request_seq: 0,
        }
    }

    pub fn config(&self) -> &FwaasOrchConfig {
        &self.config
    }

    pub fn stats(&self) -> &FwaasOrchStats {
        &self.stats
    }

    pub fn coordinator(&self) -> &Arc<FirewallSyncCoordinator> {
        &self.coordinator
    }

    /// Queues router events.
    pub fn enqueue(&mut self, events: Vec<RouterEvent>) {
        let entries = events.iter().map(RouterEvent::to_entry).collect();
        self.consumer.add_to_sync(entries);
    }

    /// Queues a resync of every given router.
    pub fn enqueue_resync(&mut self, routers: impl IntoIterator<Item = RouterId>) {
        let events = routers
            .into_iter()
            .map(|router_id| RouterEvent::Resync { router_id })
            .collect();
        self.enqueue(events);
    }

    fn next_context(&mut self) -> RequestContext {
        self.request_seq += 1;
        RequestContext::service(format!("fwaas-sync-{}", self.request_seq))
    }

    async fn sync_router(&mut self, router_id: &RouterId) -> TaskStatus {
        let ctx = self.next_context();

        if !self
            .coordinator
            .should_apply_firewall_to_router(&ctx, router_id)
            .await
        {
            debug!(router_id = %router_id, "FWaaS not applicable to router {}", router_id);
            return TaskStatus::Ignore;
        }

        let interfaces = match self
            .plugin
            .router_interfaces(&ctx, ReadScope::Elevated, router_id)
            .await
        {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(router_id = %router_id, "Failed to list interfaces of router {}: {}", router_id, e);
                return if e.is_retryable() {
                    TaskStatus::NeedRetry
                } else {
                    TaskStatus::Failed
                };
            }
        };

        match self
            .coordinator
            .update_router_firewall(&ctx, &self.backend, router_id, &interfaces)
            .await
        {
            Ok(_) => TaskStatus::Success,
            Err(e) => e.to_task_status(),
        }
    }

    async fn process_entry(&mut self, entry: &KeyOpFieldsValues) -> TaskStatus {
        let router_id = RouterId::new(entry.key.as_str());
        match entry.op {
            Operation::Set => {
                debug!(
                    router_id = %router_id,
                    "syncing router {} ({})",
                    router_id,
                    entry.get_field("reason").unwrap_or("unspecified")
                );
                self.sync_router(&router_id).await
            }
            Operation::Del => {
                self.coordinator.forget_router(&router_id);
                self.stats.routers_deleted += 1;
                info!(router_id = %router_id, "Router {} deleted", router_id);
                TaskStatus::Success
            }
        }
    }
}

#[async_trait]
impl Orch for FwaasOrch {
    fn name(&self) -> &str {
        "FwaasOrch"
    }

    async fn do_task(&mut self) {
        let entries = self.consumer.drain();

        for entry in entries {
            self.stats.events_processed += 1;
            let status = self.process_entry(&entry).await;
            debug!("router {}: {}", entry.key, status);

            match status {
                TaskStatus::Success => self.stats.syncs_succeeded += 1,
                TaskStatus::Ignore => self.stats.not_applicable += 1,
                TaskStatus::NeedRetry => {
                    self.stats.retries += 1;
                    debug!("requeueing router {}", entry.key);
                    self.consumer.retry(entry);
                }
                TaskStatus::InvalidEntry | TaskStatus::Failed => {
                    self.stats.failures += 1;
                    error!(router_id = %entry.key, "Firewall sync of router {} failed permanently", entry.key);
                }
            }
        }
    }

    fn priority(&self) -> i32 {
        self.consumer.priority()
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fwaas::coordinator::FwaasEligibility;
    use crate::fwaas::directory::InMemoryDirectory;
    use crate::fwaas::driver::EdgeFwaasDriver;
    use crate::fwaas::types::{
        FirewallGroup, FirewallGroupId, FirewallRule, FirewallRuleAction, PortId,
        RouterAttributes, RouterInterface,
    };
    use fwaas_backend::{
        BackendError, FirewallSectionId, InMemoryBackend, LogicalPortId, LogicalRouterId,
        LogicalSwitchId,
    };
    use pretty_assertions::assert_eq;

    fn setup() -> (FwaasOrch, Arc<InMemoryDirectory>, Arc<InMemoryBackend>) {
        let dir = Arc::new(InMemoryDirectory::new());
        let backend = Arc::new(InMemoryBackend::new());

        dir.add_router(RouterAttributes::new("r1", "t1").with_gateway("ext-net"));
        let lr = LogicalRouterId::from_raw("lr-1").unwrap();
        dir.map_router(RouterId::new("r1"), lr.clone());
        backend.add_router_section(lr, FirewallSectionId::from_raw("fs-1").unwrap());
        dir.add_interface(
            RouterInterface::new("p1", "r1"),
            LogicalSwitchId::from_raw("ls-1").unwrap(),
            LogicalPortId::from_raw("lp-1").unwrap(),
        );
        dir.upsert_firewall_group(
            FirewallGroup::new("fwg-1", "t1")
                .with_ingress(FirewallRule::new("i1", FirewallRuleAction::Allow)),
        );
        dir.attach_firewall_group(PortId::new("p1"), FirewallGroupId::new("fwg-1"));

        let coordinator = Arc::new(FirewallSyncCoordinator::new(
            Arc::new(FwaasEligibility::new(true, false, dir.clone(), dir.clone())),
            dir.clone(),
            dir.clone(),
            dir.clone(),
            Arc::new(EdgeFwaasDriver::new(dir.clone())),
        ));
        let orch = FwaasOrch::new(
            FwaasOrchConfig::default(),
            coordinator,
            dir.clone(),
            BackendClient::from_shared(backend.clone()),
        );
        (orch, dir, backend)
    }

    fn r1() -> RouterId {
        RouterId::new("r1")
    }

    #[tokio::test]
    async fn test_burst_collapses_to_one_sync() {
        let (mut orch, _dir, backend) = setup();
        orch.enqueue(vec![
            RouterEvent::GatewayChanged { router_id: r1() },
            RouterEvent::InterfaceAdded {
                router_id: r1(),
                port_id: PortId::new("p1"),
            },
            RouterEvent::FirewallGroupUpdated {
                router_id: r1(),
                group_id: FirewallGroupId::new("fwg-1"),
            },
        ]);
        assert!(orch.has_pending_tasks());

        orch.do_task().await;

        assert!(!orch.has_pending_tasks());
        assert_eq!(backend.update_count(), 1);
        // ingress rule, two block rules, default rule
        assert_eq!(backend.updates()[0].1.len(), 4);
        assert_eq!(orch.stats().syncs_succeeded, 1);
    }

    #[tokio::test]
    async fn test_retryable_failure_requeued() {
        let (mut orch, _dir, backend) = setup();
        backend.fail_next_update(BackendError::unavailable("controller restarting"));
        orch.enqueue_resync([r1()]);

        orch.do_task().await;
        assert!(orch.has_pending_tasks());
        assert_eq!(orch.stats().retries, 1);
        assert_eq!(backend.update_count(), 0);

        orch.do_task().await;
        assert!(!orch.has_pending_tasks());
        assert_eq!(backend.update_count(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_dropped() {
        let (mut orch, dir, backend) = setup();
        dir.add_unmapped_interface(RouterInterface::new("p9", "r1"));
        orch.enqueue_resync([r1()]);

        orch.do_task().await;

        assert!(!orch.has_pending_tasks());
        assert_eq!(orch.stats().failures, 1);
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_not_applicable_router_ignored() {
        let (mut orch, dir, backend) = setup();
        dir.add_router(RouterAttributes::new("r2", "t1"));
        orch.enqueue_resync([RouterId::new("r2")]);

        orch.do_task().await;

        assert_eq!(orch.stats().not_applicable, 1);
        assert_eq!(backend.update_count(), 0);
    }

    #[tokio::test]
    async fn test_router_deleted_drops_lock() {
        let (mut orch, _dir, _backend) = setup();
        orch.enqueue_resync([r1()]);
        orch.do_task().await;
        assert_eq!(orch.coordinator().tracked_routers(), 1);

        orch.enqueue(vec![RouterEvent::RouterDeleted { router_id: r1() }]);
        orch.do_task().await;

        assert_eq!(orch.coordinator().tracked_routers(), 0);
        assert_eq!(orch.stats().routers_deleted, 1);
    }

    #[tokio::test]
    async fn test_dump_pending() {
        let (mut orch, _dir, _backend) = setup();
        orch.enqueue_resync([r1()]);
        let dump = orch.dump_pending_tasks();
        assert_eq!(dump.len(), 1);
        assert!(dump[0].starts_with("r1: SET"));
        assert_eq!(orch.priority(), 30);
    }
}
