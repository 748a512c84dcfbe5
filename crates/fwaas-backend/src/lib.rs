//! Typed client surface for the backend SDN controller.
//!
//! The sync daemon never talks to the controller's transport directly. It
//! goes through the traits in [`api`], which take strongly-typed object ids
//! and return [`BackendResult`]s, so a logical port id can never be passed
//! where a firewall section id is expected.
//!
//! # Architecture
//!
//! - [`types`]: Type-safe backend object ids
//! - [`error`]: Backend status codes and errors
//! - [`rule`]: The backend-native firewall rule model
//! - [`api`]: Firewall section and logical router APIs, plus an in-memory backend
//!
//! # Example
//!
//! ```ignore
//! use fwaas_backend::{BackendClient, BackendResult, FirewallSectionId, BackendRule};
//!
//! async fn reset(client: &BackendClient, section: &FirewallSectionId) -> BackendResult<()> {
//!     let default = BackendRule::allow("Default LR Layer3 Rule").as_default_of(section);
//!     client.firewall_section.update(section, vec![default]).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
pub mod rule;
pub mod types;

pub use api::{BackendClient, FirewallSectionApi, InMemoryBackend, LogicalRouterApi, SectionUpdate};
pub use error::{BackendError, BackendResult, BackendStatus};
pub use rule::{
    BackendRule, IcmpProtocol, L4Protocol, RuleAction, RuleDirection, RuleService, RuleTarget,
};
pub use types::{
    BackendId, BackendObjectKind, FirewallSectionId, FirewallSectionKind, LogicalPortId,
    LogicalPortKind, LogicalRouterId, LogicalRouterKind, LogicalSwitchId, LogicalSwitchKind,
};
