//! Neutron-side data model for firewall sync.

use std::fmt;

use fwaas_backend::BackendRule;
use fwaas_orch_common::KeyOpFieldsValues;
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Neutron router id.
    RouterId
);
string_id!(
    /// Neutron port id.
    PortId
);
string_id!(
    /// Firewall group id.
    FirewallGroupId
);
string_id!(
    /// Project (tenant) id.
    TenantId
);

/// Identity of the caller of a sync operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    pub request_id: String,
    /// Admin contexts see every tenant's objects even in tenant scope.
    pub is_admin: bool,
}

impl RequestContext {
    /// Creates a tenant-scoped context.
    pub fn for_tenant(tenant_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId::new(tenant_id),
            request_id: request_id.into(),
            is_admin: false,
        }
    }

    /// Creates the service context used by the daemon itself.
    pub fn service(request_id: impl Into<String>) -> Self {
        Self {
            tenant_id: TenantId::new("service"),
            request_id: request_id.into(),
            is_admin: true,
        }
    }

    /// Returns true if objects owned by `tenant` are visible in tenant scope.
    pub fn can_see(&self, tenant: &TenantId) -> bool {
        self.is_admin || &self.tenant_id == tenant
    }
}

/// Privilege level of a directory read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadScope {
    /// Only objects visible to the caller's tenant
    Tenant,
    /// Platform-level view across all tenants
    Elevated,
}

impl ReadScope {
    /// Returns true if a read in this scope may return objects of `tenant`.
    pub fn allows(&self, ctx: &RequestContext, tenant: &TenantId) -> bool {
        match self {
            ReadScope::Elevated => true,
            ReadScope::Tenant => ctx.can_see(tenant),
        }
    }
}

/// Router attributes as stored by the core plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAttributes {
    pub id: RouterId,
    #[serde(default)]
    pub name: String,
    pub tenant_id: TenantId,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    /// External network id of the router's gateway, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_gateway: Option<String>,
}

impl RouterAttributes {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: RouterId::new(id),
            name: String::new(),
            tenant_id: TenantId::new(tenant_id),
            admin_state_up: true,
            external_gateway: None,
        }
    }

    pub fn with_gateway(mut self, network_id: impl Into<String>) -> Self {
        self.external_gateway = Some(network_id.into());
        self
    }

    pub fn has_gateway(&self) -> bool {
        self.external_gateway.is_some()
    }
}

/// A router interface port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouterInterface {
    pub port_id: PortId,
    pub router_id: RouterId,
}

impl RouterInterface {
    pub fn new(port_id: impl Into<String>, router_id: impl Into<String>) -> Self {
        Self {
            port_id: PortId::new(port_id),
            router_id: RouterId::new(router_id),
        }
    }
}

/// Lifecycle status of a firewall group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FirewallGroupStatus {
    #[default]
    Active,
    Inactive,
    Down,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Error,
}

impl FirewallGroupStatus {
    /// Returns true if a group in this status should be pushed to the backend.
    pub fn is_renderable(&self) -> bool {
        !matches!(self, Self::Error | Self::PendingDelete)
    }
}

impl fmt::Display for FirewallGroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Down => "DOWN",
            Self::PendingCreate => "PENDING_CREATE",
            Self::PendingUpdate => "PENDING_UPDATE",
            Self::PendingDelete => "PENDING_DELETE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallRuleAction {
    Allow,
    Deny,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallRuleProtocol {
    Tcp,
    Udp,
    Icmp,
}

/// A single firewall rule of a firewall group policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub action: FirewallRuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<FirewallRuleProtocol>,
    #[serde(default = "default_ip_version")]
    pub ip_version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip_address: Option<String>,
    /// Port or `min:max` range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<String>,
}

impl FirewallRule {
    pub fn new(id: impl Into<String>, action: FirewallRuleAction) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            enabled: true,
            action,
            protocol: None,
            ip_version: 4,
            source_ip_address: None,
            destination_ip_address: None,
            source_port: None,
            destination_port: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: FirewallRuleProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_destination_port(mut self, port: impl Into<String>) -> Self {
        self.destination_port = Some(port.into());
        self
    }

    pub fn with_source_ip(mut self, cidr: impl Into<String>) -> Self {
        self.source_ip_address = Some(cidr.into());
        self
    }

    pub fn with_destination_ip(mut self, cidr: impl Into<String>) -> Self {
        self.destination_ip_address = Some(cidr.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A firewall group attached to router ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallGroup {
    pub id: FirewallGroupId,
    #[serde(default)]
    pub name: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub status: FirewallGroupStatus,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub ingress_rules: Vec<FirewallRule>,
    #[serde(default)]
    pub egress_rules: Vec<FirewallRule>,
}

impl FirewallGroup {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: FirewallGroupId::new(id),
            name: String::new(),
            tenant_id: TenantId::new(tenant_id),
            status: FirewallGroupStatus::Active,
            admin_state_up: true,
            ingress_rules: Vec::new(),
            egress_rules: Vec::new(),
        }
    }

    pub fn with_ingress(mut self, rule: FirewallRule) -> Self {
        self.ingress_rules.push(rule);
        self
    }

    pub fn with_egress(mut self, rule: FirewallRule) -> Self {
        self.egress_rules.push(rule);
        self
    }

    pub fn with_status(mut self, status: FirewallGroupStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_admin_state(mut self, up: bool) -> Self {
        self.admin_state_up = up;
        self
    }
}

/// Backend-format rule contributed by the core plugin for a (router, port).
pub type PluginRule = BackendRule;

/// Notification that a router's firewall rendering may be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    FirewallGroupUpdated {
        router_id: RouterId,
        group_id: FirewallGroupId,
    },
    InterfaceAdded {
        router_id: RouterId,
        port_id: PortId,
    },
    InterfaceRemoved {
        router_id: RouterId,
        port_id: PortId,
    },
    GatewayChanged {
        router_id: RouterId,
    },
    /// Unconditional re-render (startup, operator request)
    Resync {
        router_id: RouterId,
    },
    RouterDeleted {
        router_id: RouterId,
    },
}

impl RouterEvent {
    pub fn router_id(&self) -> &RouterId {
        match self {
            Self::FirewallGroupUpdated { router_id, .. }
            | Self::InterfaceAdded { router_id, .. }
            | Self::InterfaceRemoved { router_id, .. }
            | Self::GatewayChanged { router_id }
            | Self::Resync { router_id }
            | Self::RouterDeleted { router_id } => router_id,
        }
    }

    /// Converts the event into a queue entry keyed by router id.
    pub fn to_entry(&self) -> KeyOpFieldsValues {
        let key = self.router_id().as_str();
        let fvs = match self {
            Self::RouterDeleted { .. } => return KeyOpFieldsValues::del(key),
            Self::FirewallGroupUpdated { group_id, .. } => vec![
                ("reason".to_string(), "firewall_group_updated".to_string()),
                ("firewall_group_id".to_string(), group_id.to_string()),
            ],
            Self::InterfaceAdded { port_id, .. } => vec![
                ("reason".to_string(), "interface_added".to_string()),
                ("port_id".to_string(), port_id.to_string()),
            ],
            Self::InterfaceRemoved { port_id, .. } => vec![
                ("reason".to_string(), "interface_removed".to_string()),
                ("port_id".to_string(), port_id.to_string()),
            ],
            Self::GatewayChanged { .. } => {
                vec![("reason".to_string(), "gateway_changed".to_string())]
            }
            Self::Resync { .. } => vec![("reason".to_string(), "resync".to_string())],
        };
        KeyOpFieldsValues::set(key, fvs)
    }
}

fn default_true() -> bool {
    true
}

fn default_ip_version() -> u8 {
    4
}
