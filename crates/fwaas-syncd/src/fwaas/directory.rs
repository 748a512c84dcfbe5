//! Router, port, and firewall group lookups.
//!
//! The coordinator reads everything it needs through three traits:
//!
//! - [`CorePlugin`]: router attributes, router interfaces, plugin rules
//! - [`BackendMappingStore`]: neutron id to backend id mapping
//! - [`FirewallGroupStore`]: firewall group attached to a port
//!
//! Every read that can cross tenants takes an explicit [`ReadScope`].
//! [`InMemoryDirectory`] implements all three for simulation and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fwaas_backend::{LogicalPortId, LogicalRouterId, LogicalSwitchId};
use thiserror::Error;

use super::types::{
    FirewallGroup, FirewallGroupId, PluginRule, PortId, ReadScope, RequestContext,
    RouterAttributes, RouterId, RouterInterface,
};

/// Errors returned by directory lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("No backend mapping for port {port_id}")]
    PortMappingNotFound { port_id: PortId },

    #[error("No backend mapping for router {router_id}")]
    RouterMappingNotFound { router_id: RouterId },

    #[error("Directory unavailable: {message}")]
    Unavailable { message: String },
}

impl DirectoryError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
        }
    }

    /// Returns true if the same lookup may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Unavailable { .. })
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Router data owned by the core plugin.
#[async_trait]
pub trait CorePlugin: Send + Sync {
    /// Reads a router. `Ok(None)` if it does not exist or is not visible in `scope`.
    async fn get_router(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<Option<RouterAttributes>>;

    /// Returns the router's interface ports in attachment order.
    async fn router_interfaces(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<Vec<RouterInterface>>;

    /// Returns plugin-supplied rules for (router, port), in order.
    async fn get_extra_fw_rules(
        &self,
        ctx: &RequestContext,
        router_id: &RouterId,
        port_id: &PortId,
    ) -> DirectoryResult<Vec<PluginRule>>;
}

/// Mapping between neutron ids and backend ids.
#[async_trait]
pub trait BackendMappingStore: Send + Sync {
    async fn resolve_backend_port(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        port_id: &PortId,
    ) -> DirectoryResult<(LogicalSwitchId, LogicalPortId)>;

    async fn resolve_backend_router(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<LogicalRouterId>;
}

/// Firewall group bindings.
#[async_trait]
pub trait FirewallGroupStore: Send + Sync {
    /// Returns the group attached to `port_id`, if any.
    async fn get_port_firewall_group(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        port_id: &PortId,
    ) -> DirectoryResult<Option<FirewallGroup>>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    routers: HashMap<RouterId, RouterAttributes>,
    interfaces: Vec<RouterInterface>,
    port_mappings: HashMap<PortId, (LogicalSwitchId, LogicalPortId)>,
    router_mappings: HashMap<RouterId, LogicalRouterId>,
    groups: HashMap<FirewallGroupId, FirewallGroup>,
    port_groups: HashMap<PortId, FirewallGroupId>,
    extra_rules: HashMap<(RouterId, PortId), Vec<PluginRule>>,
    unavailable: Option<String>,
}

impl DirectoryState {
    fn check_available(&self) -> DirectoryResult<()> {
        match &self.unavailable {
            Some(message) => Err(DirectoryError::unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory directory serving all three lookup traits.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_router(&self, router: RouterAttributes) {
        self.lock().routers.insert(router.id.clone(), router);
    }

    pub fn remove_router(&self, router_id: &RouterId) {
        let mut state = self.lock();
        state.routers.remove(router_id);
        state.router_mappings.remove(router_id);
        state.interfaces.retain(|i| &i.router_id != router_id);
    }

    pub fn map_router(&self, router_id: RouterId, backend: LogicalRouterId) {
        self.lock().router_mappings.insert(router_id, backend);
    }

    /// Attaches an interface to its router and records its backend mapping.
    pub fn add_interface(
        &self,
        interface: RouterInterface,
        switch: LogicalSwitchId,
        port: LogicalPortId,
    ) {
        let mut state = self.lock();
        state
            .port_mappings
            .insert(interface.port_id.clone(), (switch, port));
        state.interfaces.retain(|i| i.port_id != interface.port_id);
        state.interfaces.push(interface);
    }

    /// Attaches an interface without a backend mapping.
    pub fn add_unmapped_interface(&self, interface: RouterInterface) {
        let mut state = self.lock();
        state.interfaces.retain(|i| i.port_id != interface.port_id);
        state.interfaces.push(interface);
    }

    pub fn remove_interface(&self, port_id: &PortId) {
        let mut state = self.lock();
        state.interfaces.retain(|i| &i.port_id != port_id);
        state.port_mappings.remove(port_id);
        state.port_groups.remove(port_id);
    }

    /// Adds or replaces a firewall group.
    pub fn upsert_firewall_group(&self, group: FirewallGroup) {
        self.lock().groups.insert(group.id.clone(), group);
    }

    pub fn attach_firewall_group(&self, port_id: PortId, group_id: FirewallGroupId) {
        self.lock().port_groups.insert(port_id, group_id);
    }

    pub fn detach_firewall_group(&self, port_id: &PortId) {
        self.lock().port_groups.remove(port_id);
    }

    pub fn set_extra_rules(&self, router_id: RouterId, port_id: PortId, rules: Vec<PluginRule>) {
        self.lock().extra_rules.insert((router_id, port_id), rules);
    }

    /// Makes every lookup fail with `Unavailable` until cleared with `None`.
    pub fn set_unavailable(&self, message: Option<String>) {
        self.lock().unavailable = message;
    }

    /// Returns every known router id, sorted.
    pub fn router_ids(&self) -> Vec<RouterId> {
        let mut ids: Vec<_> = self.lock().routers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the routers that have `group_id` attached to any interface.
    pub fn routers_using_group(&self, group_id: &FirewallGroupId) -> Vec<RouterId> {
        let state = self.lock();
        let mut ids: Vec<_> = state
            .interfaces
            .iter()
            .filter(|i| state.port_groups.get(&i.port_id) == Some(group_id))
            .map(|i| i.router_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[async_trait]
impl CorePlugin for InMemoryDirectory {
    async fn get_router(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<Option<RouterAttributes>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .routers
            .get(router_id)
            .filter(|r| scope.allows(ctx, &r.tenant_id))
            .cloned())
    }

    async fn router_interfaces(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<Vec<RouterInterface>> {
        let state = self.lock();
        state.check_available()?;
        let visible = state
            .routers
            .get(router_id)
            .is_some_and(|r| scope.allows(ctx, &r.tenant_id));
        if !visible {
            return Ok(Vec::new());
        }
        Ok(state
            .interfaces
            .iter()
            .filter(|i| &i.router_id == router_id)
            .cloned()
            .collect())
    }

    async fn get_extra_fw_rules(
        &self,
        _ctx: &RequestContext,
        router_id: &RouterId,
        port_id: &PortId,
    ) -> DirectoryResult<Vec<PluginRule>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .extra_rules
            .get(&(router_id.clone(), port_id.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl BackendMappingStore for InMemoryDirectory {
    async fn resolve_backend_port(
        &self,
        _ctx: &RequestContext,
        _scope: ReadScope,
        port_id: &PortId,
    ) -> DirectoryResult<(LogicalSwitchId, LogicalPortId)> {
        let state = self.lock();
        state.check_available()?;
        state
            .port_mappings
            .get(port_id)
            .cloned()
            .ok_or_else(|| DirectoryError::PortMappingNotFound {
                port_id: port_id.clone(),
            })
    }

    async fn resolve_backend_router(
        &self,
        _ctx: &RequestContext,
        _scope: ReadScope,
        router_id: &RouterId,
    ) -> DirectoryResult<LogicalRouterId> {
        let state = self.lock();
        state.check_available()?;
        state
            .router_mappings
            .get(router_id)
            .cloned()
            .ok_or_else(|| DirectoryError::RouterMappingNotFound {
                router_id: router_id.clone(),
            })
    }
}

#[async_trait]
impl FirewallGroupStore for InMemoryDirectory {
    async fn get_port_firewall_group(
        &self,
        ctx: &RequestContext,
        scope: ReadScope,
        port_id: &PortId,
    ) -> DirectoryResult<Option<FirewallGroup>> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .port_groups
            .get(port_id)
            .and_then(|group_id| state.groups.get(group_id))
            .filter(|g| scope.allows(ctx, &g.tenant_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwaas_backend::BackendRule;
    use pretty_assertions::assert_eq;

    fn directory() -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.add_router(RouterAttributes::new("r1", "t1").with_gateway("ext-net"));
        dir.map_router(
            RouterId::new("r1"),
            LogicalRouterId::from_raw("lr-1").unwrap(),
        );
        for (port, lp) in [("p2", "lp-2"), ("p1", "lp-1")] {
            dir.add_interface(
                RouterInterface::new(port, "r1"),
                LogicalSwitchId::from_raw("ls-1").unwrap(),
                LogicalPortId::from_raw(lp).unwrap(),
            );
        }
        dir
    }

    #[tokio::test]
    async fn test_router_visibility_by_scope() {
        let dir = directory();
        let other = RequestContext::for_tenant("t2", "req");
        let r1 = RouterId::new("r1");

        assert!(dir
            .get_router(&other, ReadScope::Tenant, &r1)
            .await
            .unwrap()
            .is_none());
        assert!(dir
            .get_router(&other, ReadScope::Elevated, &r1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_interfaces_keep_attachment_order() {
        let dir = directory();
        let ctx = RequestContext::for_tenant("t1", "req");
        let ports: Vec<String> = dir
            .router_interfaces(&ctx, ReadScope::Tenant, &RouterId::new("r1"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.port_id.to_string())
            .collect();
        assert_eq!(ports, vec!["p2".to_string(), "p1".to_string()]);
    }

    #[tokio::test]
    async fn test_port_mapping_missing() {
        let dir = directory();
        let ctx = RequestContext::for_tenant("t1", "req");
        let err = dir
            .resolve_backend_port(&ctx, ReadScope::Tenant, &PortId::new("nope"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DirectoryError::PortMappingNotFound {
                port_id: PortId::new("nope")
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_firewall_group_binding() {
        let dir = directory();
        let ctx = RequestContext::for_tenant("t1", "req");
        let p1 = PortId::new("p1");

        assert!(dir
            .get_port_firewall_group(&ctx, ReadScope::Tenant, &p1)
            .await
            .unwrap()
            .is_none());

        dir.upsert_firewall_group(FirewallGroup::new("fwg-1", "t1"));
        dir.attach_firewall_group(p1.clone(), FirewallGroupId::new("fwg-1"));
        let group = dir
            .get_port_firewall_group(&ctx, ReadScope::Tenant, &p1)
            .await
            .unwrap();
        assert_eq!(group.map(|g| g.id), Some(FirewallGroupId::new("fwg-1")));
        assert_eq!(
            dir.routers_using_group(&FirewallGroupId::new("fwg-1")),
            vec![RouterId::new("r1")]
        );
    }

    #[tokio::test]
    async fn test_extra_rules_default_empty() {
        let dir = directory();
        let ctx = RequestContext::for_tenant("t1", "req");
        let (r1, p1) = (RouterId::new("r1"), PortId::new("p1"));

        assert!(dir.get_extra_fw_rules(&ctx, &r1, &p1).await.unwrap().is_empty());
        dir.set_extra_rules(r1.clone(), p1.clone(), vec![BackendRule::allow("dhcp")]);
        assert_eq!(
            dir.get_extra_fw_rules(&ctx, &r1, &p1).await.unwrap(),
            vec![BackendRule::allow("dhcp")]
        );
    }

    #[tokio::test]
    async fn test_unavailable() {
        let dir = directory();
        let ctx = RequestContext::for_tenant("t1", "req");
        dir.set_unavailable(Some("db down".to_string()));

        let err = dir
            .get_router(&ctx, ReadScope::Elevated, &RouterId::new("r1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        dir.set_unavailable(None);
        assert!(dir
            .get_router(&ctx, ReadScope::Elevated, &RouterId::new("r1"))
            .await
            .is_ok());
    }
}
