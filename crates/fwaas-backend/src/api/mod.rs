//! Backend API surfaces.
//!
//! Each submodule defines one controller API as an async trait. The sync
//! daemon only depends on these traits; the transport behind them is
//! supplied by the platform.
//!
//! # Available API Modules
//!
//! - [`firewall_section`]: Full-replace updates of a section's rule list
//! - [`logical_router`]: Router-to-section lookup
//! - [`memory`]: In-memory controller used by simulation mode and tests

pub mod firewall_section;
pub mod logical_router;
pub mod memory;

use std::sync::Arc;

pub use firewall_section::{FirewallSectionApi, SectionUpdate};
pub use logical_router::LogicalRouterApi;
pub use memory::InMemoryBackend;

/// Handle bundling the controller APIs the sync path needs.
#[derive(Clone)]
pub struct BackendClient {
    pub firewall_section: Arc<dyn FirewallSectionApi>,
    pub logical_router: Arc<dyn LogicalRouterApi>,
}

impl BackendClient {
    /// Creates a client from the two API implementations.
    pub fn new(
        firewall_section: Arc<dyn FirewallSectionApi>,
        logical_router: Arc<dyn LogicalRouterApi>,
    ) -> Self {
        Self {
            firewall_section,
            logical_router,
        }
    }

    /// Creates a client whose APIs are both served by `backend`.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: FirewallSectionApi + LogicalRouterApi + 'static,
    {
        Self {
            firewall_section: backend.clone(),
            logical_router: backend,
        }
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}
