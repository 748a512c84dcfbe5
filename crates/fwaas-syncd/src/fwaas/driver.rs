//! Firewall rule drivers.
//!
//! A driver knows which routers the backend can firewall and how a firewall
//! group is expressed as backend rules. [`EdgeFwaasDriver`] renders groups
//! onto the router's edge firewall section.

use std::sync::Arc;

use async_trait::async_trait;
use fwaas_backend::{
    BackendClient, BackendRule, FirewallSectionId, IcmpProtocol, L4Protocol, LogicalPortId,
    LogicalRouterId, RuleAction, RuleDirection, RuleService, RuleTarget,
};
use tracing::{debug, info};

use super::directory::BackendMappingStore;
use super::error::{FwaasSyncError, FwaasSyncResult};
use super::types::{
    FirewallGroup, FirewallRule, FirewallRuleAction, FirewallRuleProtocol, PluginRule, ReadScope,
    RequestContext, RouterAttributes, RouterId,
};

/// Display name of the catch-all rule closing every router section.
pub const DEFAULT_RULE_NAME: &str = "Default LR Layer3 Rule";

/// Display name of the rule dropping unmatched traffic into a port.
pub const BLOCK_INGRESS_RULE_NAME: &str = "Block port ingress";

/// Display name of the rule dropping unmatched traffic out of a port.
pub const BLOCK_EGRESS_RULE_NAME: &str = "Block port egress";

/// Backend-specific firewall rendering.
#[async_trait]
pub trait FwaasDriver: Send + Sync {
    /// Returns the driver name used in sync logs.
    fn name(&self) -> &str;

    /// Returns true if the backend can firewall a router with these attributes.
    fn should_apply_firewall_to_router(&self, router: &RouterAttributes) -> bool;

    /// Resolves the backend router and the firewall section holding its rules
    /// on the controller behind `backend`.
    async fn get_backend_router_and_fw_section(
        &self,
        ctx: &RequestContext,
        backend: &BackendClient,
        router_id: &RouterId,
    ) -> FwaasSyncResult<(LogicalRouterId, FirewallSectionId)>;

    /// Translates a port's firewall group and plugin rules into backend rules.
    fn get_port_translated_rules(
        &self,
        port: &LogicalPortId,
        fwg: &FirewallGroup,
        plugin_rules: Vec<PluginRule>,
    ) -> Vec<BackendRule>;

    /// Returns the rule closing a section.
    fn get_default_backend_rule(&self, section: &FirewallSectionId, allow_all: bool) -> BackendRule;
}

/// Driver for routers whose firewall is enforced on the backend edge.
pub struct EdgeFwaasDriver {
    mappings: Arc<dyn BackendMappingStore>,
}

impl EdgeFwaasDriver {
    pub fn new(mappings: Arc<dyn BackendMappingStore>) -> Self {
        Self { mappings }
    }

    fn translate_rules(
        &self,
        rules: &[FirewallRule],
        port: &LogicalPortId,
        direction: RuleDirection,
    ) -> Vec<BackendRule> {
        rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| translate_rule(rule, port, direction))
            .collect()
    }
}

#[async_trait]
impl FwaasDriver for EdgeFwaasDriver {
    fn name(&self) -> &str {
        "EdgeFwaasDriver"
    }

    fn should_apply_firewall_to_router(&self, router: &RouterAttributes) -> bool {
        if !router.has_gateway() {
            info!(
                router_id = %router.id,
                "Cannot apply firewall to router {} with no gateway", router.id
            );
            return false;
        }
        true
    }

    async fn get_backend_router_and_fw_section(
        &self,
        ctx: &RequestContext,
        backend: &BackendClient,
        router_id: &RouterId,
    ) -> FwaasSyncResult<(LogicalRouterId, FirewallSectionId)> {
        let backend_router = self
            .mappings
            .resolve_backend_router(ctx, ReadScope::Elevated, router_id)
            .await
            .map_err(|source| FwaasSyncError::RouterMapping {
                router_id: router_id.clone(),
                source,
            })?;

        let section = backend
            .logical_router
            .get_firewall_section_id(&backend_router)
            .await
            .map_err(|source| FwaasSyncError::Backend {
                operation: "logical router read",
                source,
            })?
            .ok_or_else(|| FwaasSyncError::SectionNotFound {
                router_id: router_id.clone(),
            })?;

        debug!(
            router_id = %router_id,
            "router {} maps to backend router {} section {}",
            router_id, backend_router, section
        );
        Ok((backend_router, section))
    }

    fn get_port_translated_rules(
        &self,
        port: &LogicalPortId,
        fwg: &FirewallGroup,
        plugin_rules: Vec<PluginRule>,
    ) -> Vec<BackendRule> {
        let mut port_rules = Vec::new();

        if fwg.admin_state_up {
            port_rules.extend(self.translate_rules(&fwg.ingress_rules, port, RuleDirection::In));
            port_rules.extend(self.translate_rules(&fwg.egress_rules, port, RuleDirection::Out));
        }

        port_rules.extend(
            plugin_rules
                .into_iter()
                .map(|rule| rule.with_applied_to(RuleTarget::LogicalPort(port.clone()))),
        );

        port_rules.push(
            BackendRule::drop(BLOCK_INGRESS_RULE_NAME)
                .with_direction(RuleDirection::In)
                .with_destination(RuleTarget::LogicalPort(port.clone())),
        );
        port_rules.push(
            BackendRule::drop(BLOCK_EGRESS_RULE_NAME)
                .with_direction(RuleDirection::Out)
                .with_source(RuleTarget::LogicalPort(port.clone())),
        );

        port_rules
    }

    fn get_default_backend_rule(&self, section: &FirewallSectionId, allow_all: bool) -> BackendRule {
        let action = if allow_all {
            RuleAction::Allow
        } else {
            RuleAction::Drop
        };
        BackendRule::new(DEFAULT_RULE_NAME, action).as_default_of(section)
    }
}

/// Translates one firewall rule. Ingress rules match traffic destined to the
/// port; egress rules match traffic sourced from it.
fn translate_rule(rule: &FirewallRule, port: &LogicalPortId, direction: RuleDirection) -> BackendRule {
    let name = if rule.name.is_empty() {
        format!("Fwaas-{}", rule.id)
    } else {
        rule.name.clone()
    };
    let action = match rule.action {
        FirewallRuleAction::Allow => RuleAction::Allow,
        FirewallRuleAction::Deny => RuleAction::Drop,
        FirewallRuleAction::Reject => RuleAction::Reject,
    };

    let mut backend = BackendRule::new(name, action).with_direction(direction);
    let port_target = RuleTarget::LogicalPort(port.clone());

    if direction == RuleDirection::In {
        backend = backend.with_destination(port_target);
        if let Some(cidr) = &rule.source_ip_address {
            backend = backend.with_source(RuleTarget::IpAddress(cidr.clone()));
        }
    } else {
        backend = backend.with_source(port_target);
        if let Some(cidr) = &rule.destination_ip_address {
            backend = backend.with_destination(RuleTarget::IpAddress(cidr.clone()));
        }
    }

    if let Some(service) = translate_service(rule) {
        backend = backend.with_service(service);
    }
    backend
}

fn translate_service(rule: &FirewallRule) -> Option<RuleService> {
    let l4 = |l4_protocol| RuleService::L4 {
        l4_protocol,
        source_ports: rule.source_port.iter().map(|p| port_range(p)).collect(),
        destination_ports: rule.destination_port.iter().map(|p| port_range(p)).collect(),
    };

    match rule.protocol? {
        FirewallRuleProtocol::Tcp => Some(l4(L4Protocol::Tcp)),
        FirewallRuleProtocol::Udp => Some(l4(L4Protocol::Udp)),
        FirewallRuleProtocol::Icmp => Some(RuleService::Icmp {
            protocol: if rule.ip_version == 6 {
                IcmpProtocol::V6
            } else {
                IcmpProtocol::V4
            },
            icmp_type: None,
            icmp_code: None,
        }),
    }
}

/// Converts a `min:max` port range to the backend's `min-max` form.
fn port_range(spec: &str) -> String {
    spec.replace(':', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fwaas::directory::InMemoryDirectory;
    use crate::fwaas::types::FirewallGroupStatus;
    use fwaas_backend::InMemoryBackend;
    use pretty_assertions::assert_eq;

    fn driver() -> (EdgeFwaasDriver, Arc<InMemoryDirectory>, Arc<InMemoryBackend>) {
        let dir = Arc::new(InMemoryDirectory::new());
        let backend = Arc::new(InMemoryBackend::new());
        let driver = EdgeFwaasDriver::new(dir.clone());
        (driver, dir, backend)
    }

    fn lp(id: &str) -> LogicalPortId {
        LogicalPortId::from_raw(id).unwrap()
    }

    fn names(rules: &[BackendRule]) -> Vec<&str> {
        rules.iter().map(|r| r.display_name.as_str()).collect()
    }

    #[test]
    fn test_requires_gateway() {
        let (driver, _, _) = driver();
        assert!(!driver.should_apply_firewall_to_router(&RouterAttributes::new("r1", "t1")));
        assert!(driver
            .should_apply_firewall_to_router(&RouterAttributes::new("r1", "t1").with_gateway("ext")));
    }

    #[test]
    fn test_translation_order() {
        let (driver, _, _) = driver();
        let fwg = FirewallGroup::new("fwg-1", "t1")
            .with_egress(FirewallRule::new("e1", FirewallRuleAction::Allow).with_name("out-any"))
            .with_ingress(
                FirewallRule::new("i1", FirewallRuleAction::Allow)
                    .with_name("ssh")
                    .with_protocol(FirewallRuleProtocol::Tcp)
                    .with_destination_port("22"),
            )
            .with_ingress(FirewallRule::new("i2", FirewallRuleAction::Deny).disabled())
            .with_ingress(FirewallRule::new("i3", FirewallRuleAction::Reject));

        let rules = driver.get_port_translated_rules(
            &lp("lp-1"),
            &fwg,
            vec![BackendRule::allow("dhcp")],
        );

        assert_eq!(
            names(&rules),
            vec![
                "ssh",
                "Fwaas-i3",
                "out-any",
                "dhcp",
                BLOCK_INGRESS_RULE_NAME,
                BLOCK_EGRESS_RULE_NAME
            ]
        );
        assert_eq!(rules[0].direction, RuleDirection::In);
        assert!(rules[0].destinations[0].is_port(&lp("lp-1")));
        assert_eq!(rules[1].action, RuleAction::Reject);
        assert_eq!(rules[2].direction, RuleDirection::Out);
        assert!(rules[2].sources[0].is_port(&lp("lp-1")));
        assert!(rules[3].applied_tos[0].is_port(&lp("lp-1")));
        assert_eq!(rules[4].action, RuleAction::Drop);
        assert_eq!(rules[5].direction, RuleDirection::Out);
    }

    #[test]
    fn test_admin_down_group_only_blocks() {
        let (driver, _, _) = driver();
        let fwg = FirewallGroup::new("fwg-1", "t1")
            .with_admin_state(false)
            .with_ingress(FirewallRule::new("i1", FirewallRuleAction::Allow));

        let rules = driver.get_port_translated_rules(&lp("lp-1"), &fwg, vec![]);
        assert_eq!(
            names(&rules),
            vec![BLOCK_INGRESS_RULE_NAME, BLOCK_EGRESS_RULE_NAME]
        );
    }

    #[test]
    fn test_service_translation() {
        let rule = FirewallRule::new("r", FirewallRuleAction::Allow)
            .with_protocol(FirewallRuleProtocol::Udp)
            .with_destination_port("1000:2000");
        assert_eq!(
            translate_service(&rule),
            Some(RuleService::L4 {
                l4_protocol: L4Protocol::Udp,
                source_ports: vec![],
                destination_ports: vec!["1000-2000".to_string()],
            })
        );

        let mut icmp6 = FirewallRule::new("r", FirewallRuleAction::Allow)
            .with_protocol(FirewallRuleProtocol::Icmp);
        icmp6.ip_version = 6;
        assert!(matches!(
            translate_service(&icmp6),
            Some(RuleService::Icmp {
                protocol: IcmpProtocol::V6,
                ..
            })
        ));

        assert_eq!(
            translate_service(&FirewallRule::new("r", FirewallRuleAction::Allow)),
            None
        );
    }

    #[test]
    fn test_ip_targets() {
        let rule = FirewallRule::new("r", FirewallRuleAction::Allow)
            .with_source_ip("10.0.0.0/24")
            .with_destination_ip("192.0.2.1");

        let ingress = translate_rule(&rule, &lp("lp-1"), RuleDirection::In);
        assert_eq!(
            ingress.sources,
            vec![RuleTarget::IpAddress("10.0.0.0/24".to_string())]
        );
        assert_eq!(ingress.destinations.len(), 1);

        let egress = translate_rule(&rule, &lp("lp-1"), RuleDirection::Out);
        assert_eq!(
            egress.destinations,
            vec![RuleTarget::IpAddress("192.0.2.1".to_string())]
        );
    }

    #[test]
    fn test_default_rule() {
        let (driver, _, _) = driver();
        let section = FirewallSectionId::from_raw("fs-1").unwrap();

        let allow = driver.get_default_backend_rule(&section, true);
        assert_eq!(allow.display_name, DEFAULT_RULE_NAME);
        assert_eq!(allow.action, RuleAction::Allow);
        assert!(allow.is_default);
        assert_eq!(allow.section_id, Some(section.clone()));

        assert_eq!(
            driver.get_default_backend_rule(&section, false).action,
            RuleAction::Drop
        );
    }

    #[tokio::test]
    async fn test_backend_router_and_section() {
        let (driver, dir, backend) = driver();
        let client = BackendClient::from_shared(backend.clone());
        let ctx = RequestContext::service("req");
        let r1 = RouterId::new("r1");

        let err = driver
            .get_backend_router_and_fw_section(&ctx, &client, &r1)
            .await
            .unwrap_err();
        assert!(matches!(err, FwaasSyncError::RouterMapping { .. }));

        let lr = LogicalRouterId::from_raw("lr-1").unwrap();
        dir.map_router(r1.clone(), lr.clone());
        backend.add_router_without_section(lr.clone());
        let err = driver
            .get_backend_router_and_fw_section(&ctx, &client, &r1)
            .await
            .unwrap_err();
        assert!(matches!(err, FwaasSyncError::SectionNotFound { .. }));

        let fs = FirewallSectionId::from_raw("fs-1").unwrap();
        backend.add_router_section(lr.clone(), fs.clone());
        assert_eq!(
            driver.get_backend_router_and_fw_section(&ctx, &client, &r1).await.unwrap(),
            (lr, fs)
        );
    }

    #[test]
    fn test_status_not_consulted_by_driver() {
        let (driver, _, _) = driver();
        let fwg = FirewallGroup::new("fwg-1", "t1")
            .with_status(FirewallGroupStatus::Inactive)
            .with_ingress(FirewallRule::new("i1", FirewallRuleAction::Allow));
        assert_eq!(driver.get_port_translated_rules(&lp("lp-1"), &fwg, vec![]).len(), 3);
    }
}
