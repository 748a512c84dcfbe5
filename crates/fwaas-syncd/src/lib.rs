//! FWaaS sync daemon.
//!
//! Keeps each router's backend firewall section in line with the firewall
//! groups attached to the router's interfaces. Every sync rebuilds the full
//! rule list and replaces the section in one call.
//!
//! # Architecture
//!
//! ```text
//! [router events] ──> [FwaasOrch] ──> [FirewallSyncCoordinator] ──> [backend section API]
//!                          │                    │
//!                     [SyncDaemon]     [directory + driver]
//! ```
//!
//! # Key Components
//!
//! - [`fwaas::FirewallSyncCoordinator`]: Applicability check and section sync
//! - [`fwaas::EdgeFwaasDriver`]: Firewall group to backend rule translation
//! - [`fwaas::FwaasOrch`]: Per-router event queue driving the coordinator
//! - [`daemon::SyncDaemon`]: Heartbeat loop over registered orchs
//! - [`config`]: YAML configuration and simulated topology
//! - [`audit`]: Audit records and subscriber setup

pub mod audit;
pub mod config;
pub mod daemon;
pub mod fwaas;

pub use config::{ConfigError, FwaasSyncConfig, TopologySeed};
pub use daemon::{StopHandle, SyncDaemon, SyncDaemonConfig};
pub use fwaas::{
    FirewallSyncCoordinator, FwaasOrch, FwaasOrchConfig, FwaasSyncError, RequestContext,
    RouterId,
};
