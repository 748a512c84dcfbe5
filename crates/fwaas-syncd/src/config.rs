//! Configuration file support for fwaas-syncd.
//!
//! Loads and validates the daemon configuration from YAML. The optional
//! `topology` section seeds the in-memory directory and backend used in
//! simulation mode.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use fwaas_backend::{
    BackendId, BackendObjectKind, InMemoryBackend, LogicalPortId, LogicalRouterId,
    LogicalSwitchId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::fwaas::{
    FirewallGroup, FirewallGroupId, InMemoryDirectory, PluginRule, PortId, RouterAttributes,
    RouterId, RouterInterface, TenantId,
};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fwaas/fwaas-syncd.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete fwaas-syncd configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwaasSyncConfig {
    /// Master switch for FWaaS rendering
    #[serde(default = "default_true")]
    pub fwaas_enabled: bool,

    /// Only render routers with a firewall group on at least one interface
    #[serde(default)]
    pub require_attached_group: bool,

    /// Daemon heartbeat interval in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Routers synced per orch pass
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologySeed>,
}

/// Router entry of the topology seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSeed {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub tenant_id: String,
    /// External network of the router's gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_router_id: Option<String>,
    /// Firewall section of the backend router; none means the backend
    /// router exists without a section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_section_id: Option<String>,
}

/// Router interface entry of the topology seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSeed {
    pub id: String,
    pub router_id: String,
    pub backend_switch_id: String,
    pub backend_port_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugin_rules: Vec<PluginRule>,
}

/// Simulated topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologySeed {
    #[serde(default)]
    pub routers: Vec<RouterSeed>,
    /// Interfaces, in attachment order
    #[serde(default)]
    pub ports: Vec<PortSeed>,
    #[serde(default)]
    pub firewall_groups: Vec<FirewallGroup>,
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    128
}

impl Default for FwaasSyncConfig {
    fn default() -> Self {
        Self {
            fwaas_enabled: default_true(),
            require_attached_group: false,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            batch_size: default_batch_size(),
            topology: None,
        }
    }
}

impl FwaasSyncConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Loads configuration from a file, falling back to defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be > 0".to_string()));
        }
        if let Some(topology) = &self.topology {
            topology.validate()?;
        }
        Ok(())
    }
}

impl TopologySeed {
    /// Checks ids are unique and every reference resolves.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut routers = HashSet::new();
        for router in &self.routers {
            if !routers.insert(router.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate router id {}",
                    router.id
                )));
            }
            if router.backend_section_id.is_some() && router.backend_router_id.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "router {} has a backend section but no backend router",
                    router.id
                )));
            }
        }

        let mut groups = HashSet::new();
        for group in &self.firewall_groups {
            if !groups.insert(group.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate firewall group id {}",
                    group.id
                )));
            }
        }

        let mut ports = HashSet::new();
        for port in &self.ports {
            if !ports.insert(port.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate port id {}", port.id)));
            }
            if !routers.contains(port.router_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "port {} references unknown router {}",
                    port.id, port.router_id
                )));
            }
            if let Some(group_id) = &port.firewall_group_id {
                if !groups.contains(group_id.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "port {} references unknown firewall group {}",
                        port.id, group_id
                    )));
                }
            }
            for rule in &port.plugin_rules {
                rule.validate().map_err(|e| {
                    ConfigError::Invalid(format!("port {} plugin rule: {}", port.id, e))
                })?;
            }
        }
        Ok(())
    }

    /// Builds the in-memory directory and backend described by this seed.
    pub fn build(&self) -> ConfigResult<(InMemoryDirectory, InMemoryBackend)> {
        self.validate()?;
        let directory = InMemoryDirectory::new();
        let backend = InMemoryBackend::new();

        for router in &self.routers {
            let mut attrs = RouterAttributes::new(router.id.as_str(), router.tenant_id.as_str());
            attrs.name = router.name.clone();
            attrs.external_gateway = router.external_gateway.clone();
            directory.add_router(attrs);

            if let Some(raw) = &router.backend_router_id {
                let lr: LogicalRouterId = backend_id(raw, "backend_router_id")?;
                directory.map_router(RouterId::new(router.id.as_str()), lr.clone());
                match &router.backend_section_id {
                    Some(raw) => {
                        backend.add_router_section(lr, backend_id(raw, "backend_section_id")?)
                    }
                    None => backend.add_router_without_section(lr),
                }
            }
        }

        for group in &self.firewall_groups {
            directory.upsert_firewall_group(group.clone());
        }

        for port in &self.ports {
            let switch: LogicalSwitchId = backend_id(&port.backend_switch_id, "backend_switch_id")?;
            let lp: LogicalPortId = backend_id(&port.backend_port_id, "backend_port_id")?;
            let interface = RouterInterface::new(port.id.as_str(), port.router_id.as_str());
            directory.add_interface(interface, switch, lp);

            if let Some(group_id) = &port.firewall_group_id {
                directory.attach_firewall_group(
                    PortId::new(port.id.as_str()),
                    FirewallGroupId::new(group_id.as_str()),
                );
            }
            if !port.plugin_rules.is_empty() {
                directory.set_extra_rules(
                    RouterId::new(port.router_id.as_str()),
                    PortId::new(port.id.as_str()),
                    port.plugin_rules.clone(),
                );
            }
        }

        Ok((directory, backend))
    }

    /// Returns the ids of all seeded routers.
    pub fn router_ids(&self) -> Vec<RouterId> {
        self.routers
            .iter()
            .map(|r| RouterId::new(r.id.as_str()))
            .collect()
    }

    /// Returns the tenants owning seeded routers.
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<_> = self
            .routers
            .iter()
            .map(|r| TenantId::new(r.tenant_id.as_str()))
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }
}

fn backend_id<T: BackendObjectKind>(raw: &str, field: &str) -> ConfigResult<BackendId<T>> {
    BackendId::from_raw(raw).ok_or_else(|| ConfigError::Invalid(format!("{} cannot be empty", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fwaas::{CorePlugin, FirewallGroupStore, ReadScope, RequestContext};
    use fwaas_backend::{FirewallSectionApi, FirewallSectionId, LogicalRouterApi};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
fwaas_enabled: true
heartbeat_interval_ms: 250
topology:
  routers:
    - id: r1
      tenant_id: t1
      external_gateway: ext-net
      backend_router_id: lr-1
      backend_section_id: fs-1
    - id: r2
      tenant_id: t2
      backend_router_id: lr-2
  firewall_groups:
    - id: fwg-1
      tenant_id: t1
      ingress_rules:
        - id: allow-ssh
          action: allow
          protocol: tcp
          destination_port: "22"
  ports:
    - id: p1
      router_id: r1
      backend_switch_id: ls-1
      backend_port_id: lp-1
      firewall_group_id: fwg-1
      plugin_rules:
        - display_name: allow-dhcp
          action: ALLOW
    - id: p2
      router_id: r1
      backend_switch_id: ls-1
      backend_port_id: lp-2
"#;

    #[test]
    fn test_defaults() {
        let config = FwaasSyncConfig::default();
        assert!(config.fwaas_enabled);
        assert!(!config.require_attached_group);
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(1000));
        assert_eq!(config.batch_size, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = FwaasSyncConfig::from_yaml_str("require_attached_group: true\n").unwrap();
        assert!(config.fwaas_enabled);
        assert!(config.require_attached_group);
        assert_eq!(config.batch_size, 128);
        assert!(config.topology.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(matches!(
            FwaasSyncConfig::from_yaml_str("batch_size: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            FwaasSyncConfig::from_yaml_str("heartbeat_interval_ms: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            FwaasSyncConfig::from_yaml_str("batch_size: [not, a, number]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_topology_references_checked() {
        let yaml = r#"
topology:
  routers:
    - id: r1
      tenant_id: t1
  ports:
    - id: p1
      router_id: r9
      backend_switch_id: ls-1
      backend_port_id: lp-1
"#;
        let err = FwaasSyncConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown router r9"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = FwaasSyncConfig::load(file.path()).unwrap();
        assert_eq!(config.heartbeat_interval_ms, 250);
        let topology = config.topology.unwrap();
        assert_eq!(topology.routers.len(), 2);
        assert_eq!(
            topology.router_ids(),
            vec![RouterId::new("r1"), RouterId::new("r2")]
        );
        assert_eq!(
            topology.tenants(),
            vec![TenantId::new("t1"), TenantId::new("t2")]
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");

        assert!(matches!(
            FwaasSyncConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
        let config = FwaasSyncConfig::load_or_default(&path).unwrap();
        assert_eq!(config.batch_size, 128);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = FwaasSyncConfig::from_yaml_str(SAMPLE).unwrap();
        let yaml = config.to_yaml().unwrap();
        let again = FwaasSyncConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            again.topology.map(|t| t.ports.len()),
            config.topology.map(|t| t.ports.len())
        );
    }

    #[tokio::test]
    async fn test_build_topology() {
        let config = FwaasSyncConfig::from_yaml_str(SAMPLE).unwrap();
        let (directory, backend) = config.topology.unwrap().build().unwrap();
        let ctx = RequestContext::service("test");

        let interfaces = directory
            .router_interfaces(&ctx, ReadScope::Elevated, &RouterId::new("r1"))
            .await
            .unwrap();
        assert_eq!(interfaces.len(), 2);

        let group = directory
            .get_port_firewall_group(&ctx, ReadScope::Elevated, &PortId::new("p1"))
            .await
            .unwrap();
        assert_eq!(group.map(|g| g.id), Some(FirewallGroupId::new("fwg-1")));

        let extra = directory
            .get_extra_fw_rules(&ctx, &RouterId::new("r1"), &PortId::new("p1"))
            .await
            .unwrap();
        assert_eq!(extra.len(), 1);

        let fs1 = backend
            .get_firewall_section_id(&LogicalRouterId::from_raw("lr-1").unwrap())
            .await
            .unwrap();
        assert_eq!(fs1, FirewallSectionId::from_raw("fs-1"));
        assert!(backend.get_rules(&fs1.unwrap()).await.unwrap().is_empty());

        let fs2 = backend
            .get_firewall_section_id(&LogicalRouterId::from_raw("lr-2").unwrap())
            .await
            .unwrap();
        assert_eq!(fs2, None);
    }
}
