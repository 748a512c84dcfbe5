//! Firewall section API.

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::rule::BackendRule;
use crate::types::FirewallSectionId;

/// Acknowledgement of an accepted section update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionUpdate {
    pub section_id: FirewallSectionId,
    /// Section revision after the update.
    pub revision: u64,
    pub rule_count: usize,
}

/// Controller API for firewall sections.
///
/// `update` is a full replacement: after it succeeds the section holds
/// exactly `rules`, in order. The controller either accepts the whole list
/// or rejects it; there is no partial application.
#[async_trait]
pub trait FirewallSectionApi: Send + Sync {
    /// Replaces the rule list of `section` with `rules`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the section does not exist, `InvalidRequest` if any rule
    /// is malformed, `StaleRevision`/`Unavailable` for transient conflicts.
    async fn update(
        &self,
        section: &FirewallSectionId,
        rules: Vec<BackendRule>,
    ) -> BackendResult<SectionUpdate>;

    /// Reads back the current rule list of `section`.
    async fn get_rules(&self, section: &FirewallSectionId) -> BackendResult<Vec<BackendRule>>;
}
