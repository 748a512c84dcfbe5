//! Firewall sync errors.

use fwaas_backend::BackendError;
use fwaas_orch_common::TaskStatus;
use thiserror::Error;

use super::directory::DirectoryError;
use super::types::{PortId, RouterId};

/// Error aborting a router firewall sync.
///
/// Every variant except `Backend` is raised before the section is touched.
#[derive(Debug, Clone, Error)]
pub enum FwaasSyncError {
    #[error("No firewall section found for router {router_id}")]
    SectionNotFound { router_id: RouterId },

    #[error("Failed to resolve backend router for {router_id}: {source}")]
    RouterMapping {
        router_id: RouterId,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to resolve backend port for {port_id}: {source}")]
    PortMapping {
        port_id: PortId,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to look up firewall group of port {port_id}: {source}")]
    FirewallGroupLookup {
        port_id: PortId,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to read plugin rules for router {router_id} port {port_id}: {source}")]
    PluginRules {
        router_id: RouterId,
        port_id: PortId,
        #[source]
        source: DirectoryError,
    },

    #[error("Backend {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

impl FwaasSyncError {
    /// Returns true if the same sync may succeed if run again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            FwaasSyncError::SectionNotFound { .. } => false,
            FwaasSyncError::RouterMapping { source, .. }
            | FwaasSyncError::PortMapping { source, .. }
            | FwaasSyncError::FirewallGroupLookup { source, .. }
            | FwaasSyncError::PluginRules { source, .. } => source.is_retryable(),
            FwaasSyncError::Backend { source, .. } => source.is_retryable(),
        }
    }

    /// Maps this error to the status of the task that hit it.
    pub fn to_task_status(&self) -> TaskStatus {
        if self.is_retryable() {
            TaskStatus::NeedRetry
        } else {
            TaskStatus::Failed
        }
    }
}

pub type FwaasSyncResult<T> = Result<T, FwaasSyncError>;
