//! Backend-native firewall rule model.
//!
//! A [`BackendRule`] is what the controller stores inside a firewall
//! section. Sections evaluate rules first-match, so the order of a rule list
//! is part of its meaning.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{FirewallSectionId, LogicalPortId, LogicalSwitchId};

/// What happens to traffic matched by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    Allow,
    Drop,
    Reject,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Drop => write!(f, "DROP"),
            Self::Reject => write!(f, "REJECT"),
        }
    }
}

/// Traffic direction relative to the rule's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleDirection {
    In,
    Out,
    #[default]
    InOut,
}

/// Object a rule matches as source, destination, or applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "target_type", content = "target_id")]
pub enum RuleTarget {
    LogicalPort(LogicalPortId),
    LogicalSwitch(LogicalSwitchId),
    /// Single address or CIDR.
    #[serde(rename = "IPAddress")]
    IpAddress(String),
}

impl RuleTarget {
    /// Returns true if this target is the given logical port.
    pub fn is_port(&self, port: &LogicalPortId) -> bool {
        matches!(self, RuleTarget::LogicalPort(p) if p == port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum L4Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcmpProtocol {
    #[serde(rename = "ICMPv4")]
    V4,
    #[serde(rename = "ICMPv6")]
    V6,
}

/// Service (protocol/port) match of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "resource_type")]
pub enum RuleService {
    #[serde(rename = "L4PortSetNSService")]
    L4 {
        l4_protocol: L4Protocol,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        source_ports: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        destination_ports: Vec<String>,
    },
    #[serde(rename = "ICMPTypeNSService")]
    Icmp {
        protocol: IcmpProtocol,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icmp_type: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icmp_code: Option<u8>,
    },
}

/// A single rule inside a backend firewall section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRule {
    pub display_name: String,
    pub action: RuleAction,
    #[serde(default)]
    pub direction: RuleDirection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RuleTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<RuleTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<RuleService>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_tos: Vec<RuleTarget>,
    #[serde(default)]
    pub logged: bool,
    #[serde(default)]
    pub disabled: bool,
    /// Catch-all rule closing a section.
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<FirewallSectionId>,
}

impl BackendRule {
    /// Creates a rule matching any traffic in both directions.
    pub fn new(display_name: impl Into<String>, action: RuleAction) -> Self {
        Self {
            display_name: display_name.into(),
            action,
            direction: RuleDirection::InOut,
            sources: Vec::new(),
            destinations: Vec::new(),
            services: Vec::new(),
            applied_tos: Vec::new(),
            logged: false,
            disabled: false,
            is_default: false,
            section_id: None,
        }
    }

    /// Creates an ALLOW rule.
    pub fn allow(display_name: impl Into<String>) -> Self {
        Self::new(display_name, RuleAction::Allow)
    }

    /// Creates a DROP rule.
    pub fn drop(display_name: impl Into<String>) -> Self {
        Self::new(display_name, RuleAction::Drop)
    }

    pub fn with_direction(mut self, direction: RuleDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_source(mut self, target: RuleTarget) -> Self {
        self.sources.push(target);
        self
    }

    pub fn with_destination(mut self, target: RuleTarget) -> Self {
        self.destinations.push(target);
        self
    }

    pub fn with_service(mut self, service: RuleService) -> Self {
        self.services.push(service);
        self
    }

    pub fn with_applied_to(mut self, target: RuleTarget) -> Self {
        self.applied_tos.push(target);
        self
    }

    /// Marks this rule as the default rule of `section`.
    pub fn as_default_of(mut self, section: &FirewallSectionId) -> Self {
        self.is_default = true;
        self.section_id = Some(section.clone());
        self
    }

    /// Checks the rule for payload errors the controller would reject.
    pub fn validate(&self) -> Result<(), String> {
        if self.display_name.trim().is_empty() {
            return Err("rule display_name cannot be empty".to_string());
        }

        for target in self.sources.iter().chain(&self.destinations) {
            if let RuleTarget::IpAddress(addr) = target {
                if addr.trim().is_empty() {
                    return Err(format!("rule {}: empty IP address target", self.display_name));
                }
            }
        }

        for service in &self.services {
            if let RuleService::L4 {
                source_ports,
                destination_ports,
                ..
            } = service
            {
                for port in source_ports.iter().chain(destination_ports) {
                    validate_port_range(port)
                        .map_err(|e| format!("rule {}: {}", self.display_name, e))?;
                }
            }
        }

        Ok(())
    }
}

/// Validates a port spec of the form `N` or `N-M` (1..=65535, N <= M).
fn validate_port_range(spec: &str) -> Result<(), String> {
    let parse = |s: &str| -> Result<u16, String> {
        match s.trim().parse::<u16>() {
            Ok(0) | Err(_) => Err(format!("invalid port '{}'", spec)),
            Ok(p) => Ok(p),
        }
    };

    match spec.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (parse(lo)?, parse(hi)?);
            if lo > hi {
                return Err(format!("invalid port range '{}'", spec));
            }
            Ok(())
        }
        None => parse(spec).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(id: &str) -> LogicalPortId {
        LogicalPortId::from_raw(id).unwrap()
    }

    #[test]
    fn test_builder() {
        let rule = BackendRule::allow("web")
            .with_direction(RuleDirection::In)
            .with_destination(RuleTarget::LogicalPort(port("lp-1")))
            .with_service(RuleService::L4 {
                l4_protocol: L4Protocol::Tcp,
                source_ports: vec![],
                destination_ports: vec!["443".to_string()],
            });

        assert_eq!(rule.action, RuleAction::Allow);
        assert_eq!(rule.direction, RuleDirection::In);
        assert!(rule.destinations[0].is_port(&port("lp-1")));
        assert!(!rule.is_default);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_default_rule_marker() {
        let section = FirewallSectionId::from_raw("fs-1").unwrap();
        let rule = BackendRule::allow("Default LR Layer3 Rule").as_default_of(&section);

        assert!(rule.is_default);
        assert_eq!(rule.section_id, Some(section));
    }

    #[test]
    fn test_validate_rejects_bad_ports() {
        let bad = |ports: &str| {
            BackendRule::drop("r")
                .with_service(RuleService::L4 {
                    l4_protocol: L4Protocol::Udp,
                    source_ports: vec![],
                    destination_ports: vec![ports.to_string()],
                })
                .validate()
        };

        assert!(bad("53").is_ok());
        assert!(bad("1000-2000").is_ok());
        assert!(bad("0").is_err());
        assert!(bad("70000").is_err());
        assert!(bad("2000-1000").is_err());
        assert!(bad("http").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        assert!(BackendRule::allow(" ").validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let rule = BackendRule::drop("Block port ingress")
            .with_direction(RuleDirection::In)
            .with_destination(RuleTarget::LogicalPort(port("lp-9")));

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["action"], "DROP");
        assert_eq!(json["direction"], "IN");
        assert_eq!(json["destinations"][0]["target_type"], "LogicalPort");
        assert_eq!(json["destinations"][0]["target_id"], "lp-9");
        assert!(json.get("sources").is_none());

        let back: BackendRule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn test_service_serde_tag() {
        let service = RuleService::Icmp {
            protocol: IcmpProtocol::V4,
            icmp_type: Some(8),
            icmp_code: None,
        };
        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(json["resource_type"], "ICMPTypeNSService");
        assert_eq!(json["protocol"], "ICMPv4");
    }
}
