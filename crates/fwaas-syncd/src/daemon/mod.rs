//! Daemon loop driving the registered orchs.

mod syncdaemon;

pub use syncdaemon::{StopHandle, SyncDaemon, SyncDaemonConfig};
