//! Logical router API.

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::types::{FirewallSectionId, LogicalRouterId};

/// Controller API for logical routers.
#[async_trait]
pub trait LogicalRouterApi: Send + Sync {
    /// Returns the id of the firewall section attached to `router`.
    ///
    /// `Ok(None)` means the router exists but has no section; a missing
    /// router is `Err(NotFound)`.
    async fn get_firewall_section_id(
        &self,
        router: &LogicalRouterId,
    ) -> BackendResult<Option<FirewallSectionId>>;
}
