//! Router firewall sync coordinator.
//!
//! [`FirewallSyncCoordinator`] re-renders a router's firewall: it walks the
//! router's interfaces in order, translates each attached firewall group
//! through the driver, closes the list with the driver's default rule and
//! replaces the router's backend section with the result.
//!
//! A sync either pushes the complete list or nothing. Any lookup failure
//! aborts before the backend is touched. Syncs of the same router are
//! serialized; syncs of different routers run independently.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fwaas_backend::{BackendClient, BackendRule, LogicalPortId, SectionUpdate};
use fwaas_orch_common::SyncMap;
use tracing::{debug, error, info, warn};

use super::directory::{BackendMappingStore, CorePlugin, FirewallGroupStore};
use super::driver::FwaasDriver;
use super::error::{FwaasSyncError, FwaasSyncResult};
use super::types::{
    FirewallGroup, PluginRule, PortId, ReadScope, RequestContext, RouterId, RouterInterface,
};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;

/// Base-level check deciding whether FWaaS handles a router at all.
#[async_trait]
pub trait EligibilityCheck: Send + Sync {
    async fn should_apply(&self, ctx: &RequestContext, router_id: &RouterId) -> bool;
}

/// Default eligibility: FWaaS must be enabled, and optionally the router must
/// have a firewall group on at least one interface.
pub struct FwaasEligibility {
    enabled: bool,
    require_attached_group: bool,
    plugin: Arc<dyn CorePlugin>,
    groups: Arc<dyn FirewallGroupStore>,
}

impl FwaasEligibility {
    pub fn new(
        enabled: bool,
        require_attached_group: bool,
        plugin: Arc<dyn CorePlugin>,
        groups: Arc<dyn FirewallGroupStore>,
    ) -> Self {
        Self {
            enabled,
            require_attached_group,
            plugin,
            groups,
        }
    }
}

#[async_trait]
impl EligibilityCheck for FwaasEligibility {
    async fn should_apply(&self, ctx: &RequestContext, router_id: &RouterId) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.require_attached_group {
            return true;
        }

        let interfaces = match self
            .plugin
            .router_interfaces(ctx, ReadScope::Elevated, router_id)
            .await
        {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(router_id = %router_id, "Failed to list interfaces of router {}: {}", router_id, e);
                return false;
            }
        };

        for interface in &interfaces {
            match self
                .groups
                .get_port_firewall_group(ctx, ReadScope::Elevated, &interface.port_id)
                .await
            {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        port_id = %interface.port_id,
                        "Failed to read firewall group of port {}: {}", interface.port_id, e
                    );
                    return false;
                }
            }
        }
        false
    }
}

/// Coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Sections replaced successfully
    pub syncs: u64,
    /// Rules pushed across all successful syncs
    pub rules_pushed: u64,
    /// Syncs aborted by an error
    pub failures: u64,
    /// Applicability checks that could not read the router
    pub unreadable_routers: u64,
    /// Attached groups left out because of their status
    pub skipped_groups: u64,
}

type RouterLock = Arc<tokio::sync::Mutex<()>>;

/// Re-renders router firewalls into backend sections.
pub struct FirewallSyncCoordinator {
    eligibility: Arc<dyn EligibilityCheck>,
    plugin: Arc<dyn CorePlugin>,
    mappings: Arc<dyn BackendMappingStore>,
    groups: Arc<dyn FirewallGroupStore>,
    driver: Arc<dyn FwaasDriver>,
    router_locks: Mutex<SyncMap<RouterId, RouterLock>>,
    stats: Mutex<CoordinatorStats>,
}

impl FirewallSyncCoordinator {
    pub fn new(
        eligibility: Arc<dyn EligibilityCheck>,
        plugin: Arc<dyn CorePlugin>,
        mappings: Arc<dyn BackendMappingStore>,
        groups: Arc<dyn FirewallGroupStore>,
        driver: Arc<dyn FwaasDriver>,
    ) -> Self {
        Self {
            eligibility,
            plugin,
            mappings,
            groups,
            driver,
            router_locks: Mutex::new(SyncMap::new()),
            stats: Mutex::new(CoordinatorStats::default()),
        }
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> CoordinatorStats {
        self.stats_mut().clone()
    }

    fn stats_mut(&self) -> MutexGuard<'_, CoordinatorStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn router_lock(&self, router_id: &RouterId) -> RouterLock {
        let mut locks = self
            .router_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.get_or_insert_with(router_id.clone(), RouterLock::default))
    }

    /// Drops the serialization lock of a deleted router.
    ///
    /// The lock stays while a sync holds or waits on it, so a later sync of the
    /// same id still queues behind it. Returns true if the lock was dropped.
    pub fn forget_router(&self, router_id: &RouterId) -> bool {
        let mut locks = self
            .router_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(router_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(router_id);
        } else {
            debug!(router_id = %router_id, "keeping lock of router {} in use", router_id);
        }
        idle
    }

    /// Returns the number of routers with a live serialization lock.
    pub fn tracked_routers(&self) -> usize {
        self.router_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Decides whether FWaaS rules should be rendered for a router.
    ///
    /// Never fails: an unreadable router is logged once at error level and
    /// reported as not applicable.
    pub async fn should_apply_firewall_to_router(
        &self,
        ctx: &RequestContext,
        router_id: &RouterId,
    ) -> bool {
        if !self.eligibility.should_apply(ctx, router_id).await {
            debug!(router_id = %router_id, "FWaaS not eligible for router {}", router_id);
            return false;
        }

        let router = match self
            .plugin
            .get_router(ctx, ReadScope::Elevated, router_id)
            .await
        {
            Ok(Some(router)) => router,
            Ok(None) => {
                error!(router_id = %router_id, "Couldn't read router {} data", router_id);
                self.stats_mut().unreadable_routers += 1;
                return false;
            }
            Err(e) => {
                error!(router_id = %router_id, "Couldn't read router {} data: {}", router_id, e);
                self.stats_mut().unreadable_routers += 1;
                return false;
            }
        };

        self.driver.should_apply_firewall_to_router(&router)
    }

    /// Translates one port's firewall group and plugin rules.
    pub fn get_port_rules(
        &self,
        port: &LogicalPortId,
        fwg: &FirewallGroup,
        plugin_rules: Vec<PluginRule>,
    ) -> Vec<BackendRule> {
        self.driver.get_port_translated_rules(port, fwg, plugin_rules)
    }

    /// Returns the firewall group to render for a port.
    ///
    /// The attachment is read elevated: a group owned by another tenant is
    /// still enforced on the port. `Ok(None)` both when no group is attached
    /// and when the attached group is in a status that must not be pushed.
    pub async fn get_port_fwg(
        &self,
        ctx: &RequestContext,
        port_id: &PortId,
    ) -> FwaasSyncResult<Option<FirewallGroup>> {
        let group = self
            .groups
            .get_port_firewall_group(ctx, ReadScope::Elevated, port_id)
            .await
            .map_err(|source| FwaasSyncError::FirewallGroupLookup {
                port_id: port_id.clone(),
                source,
            })?;

        match group {
            Some(group) if !group.status.is_renderable() => {
                warn!(
                    port_id = %port_id,
                    "Skipping firewall group {} of port {} in status {}",
                    group.id, port_id, group.status
                );
                self.stats_mut().skipped_groups += 1;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Rebuilds the router's rule list and replaces its backend section.
    ///
    /// Interfaces are rendered in the given order; ports without a group add
    /// no rules. The list always ends with one allow-all default rule.
    pub async fn update_router_firewall(
        &self,
        ctx: &RequestContext,
        backend: &BackendClient,
        router_id: &RouterId,
        interfaces: &[RouterInterface],
    ) -> FwaasSyncResult<SectionUpdate> {
        let lock = self.router_lock(router_id);
        let _guard = lock.lock().await;

        let result = self.sync_locked(ctx, backend, router_id, interfaces).await;

        match &result {
            Ok(ack) => {
                {
                    let mut stats = self.stats_mut();
                    stats.syncs += 1;
                    stats.rules_pushed += ack.rule_count as u64;
                }
                info!(
                    router_id = %router_id,
                    section_id = %ack.section_id,
                    "Replaced section {} of router {} with {} rules",
                    ack.section_id, router_id, ack.rule_count
                );
                audit_log!(AuditRecord::new(
                    AuditCategory::SecurityPolicy,
                    "FirewallSyncCoordinator",
                    "update_router_firewall",
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(ack.section_id.as_str())
                .with_object_type("firewall_section")
                .with_correlation_id(&ctx.request_id)
                .with_details(serde_json::json!({
                    "router_id": router_id.as_str(),
                    "rule_count": ack.rule_count,
                    "revision": ack.revision,
                })));
            }
            Err(e) => {
                self.stats_mut().failures += 1;
                warn!(router_id = %router_id, "Firewall sync of router {} failed: {}", router_id, e);
                audit_log!(AuditRecord::new(
                    AuditCategory::SecurityPolicy,
                    "FirewallSyncCoordinator",
                    "update_router_firewall",
                )
                .with_object_id(router_id.as_str())
                .with_object_type("router")
                .with_correlation_id(&ctx.request_id)
                .with_error(e.to_string()));
            }
        }

        result
    }

    async fn sync_locked(
        &self,
        ctx: &RequestContext,
        backend: &BackendClient,
        router_id: &RouterId,
        interfaces: &[RouterInterface],
    ) -> FwaasSyncResult<SectionUpdate> {
        let (_backend_router, section_id) = self
            .driver
            .get_backend_router_and_fw_section(ctx, backend, router_id)
            .await?;

        let mut fw_rules = Vec::new();
        for interface in interfaces {
            let port_id = &interface.port_id;
            let (_switch, backend_port) = self
                .mappings
                .resolve_backend_port(ctx, ReadScope::Tenant, port_id)
                .await
                .map_err(|source| FwaasSyncError::PortMapping {
                    port_id: port_id.clone(),
                    source,
                })?;

            let Some(fwg) = self.get_port_fwg(ctx, port_id).await? else {
                continue;
            };

            let plugin_rules = self
                .plugin
                .get_extra_fw_rules(ctx, router_id, port_id)
                .await
                .map_err(|source| FwaasSyncError::PluginRules {
                    router_id: router_id.clone(),
                    port_id: port_id.clone(),
                    source,
                })?;

            fw_rules.extend(self.get_port_rules(&backend_port, &fwg, plugin_rules));
        }

        fw_rules.push(self.driver.get_default_backend_rule(&section_id, true));

        debug!(
            router_id = %router_id,
            section_id = %section_id,
            driver = self.driver.name(),
            "pushing {} rules to section {}", fw_rules.len(), section_id
        );
        backend
            .firewall_section
            .update(&section_id, fw_rules)
            .await
            .map_err(|source| FwaasSyncError::Backend {
                operation: "section update",
                source,
            })
    }
}
