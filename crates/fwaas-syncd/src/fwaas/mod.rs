//! Firewall-as-a-Service sync.
//!
//! - [`types`]: Routers, ports, firewall groups and router events
//! - [`directory`]: Lookup traits and the in-memory directory
//! - [`driver`]: Firewall group to backend rule translation
//! - [`coordinator`]: The per-router sync itself
//! - [`orch`]: Event-driven orch wrapping the coordinator

pub mod coordinator;
pub mod directory;
pub mod driver;
pub mod error;
pub mod orch;
pub mod types;

pub use coordinator::{
    CoordinatorStats, EligibilityCheck, FirewallSyncCoordinator, FwaasEligibility,
};
pub use directory::{
    BackendMappingStore, CorePlugin, DirectoryError, DirectoryResult, FirewallGroupStore,
    InMemoryDirectory,
};
pub use driver::{
    EdgeFwaasDriver, FwaasDriver, BLOCK_EGRESS_RULE_NAME, BLOCK_INGRESS_RULE_NAME,
    DEFAULT_RULE_NAME,
};
pub use error::{FwaasSyncError, FwaasSyncResult};
pub use orch::{FwaasOrch, FwaasOrchConfig, FwaasOrchStats};
pub use types::{
    FirewallGroup, FirewallGroupId, FirewallGroupStatus, FirewallRule, FirewallRuleAction,
    FirewallRuleProtocol, PluginRule, PortId, ReadScope, RequestContext, RouterAttributes,
    RouterEvent, RouterId, RouterInterface, TenantId,
};
