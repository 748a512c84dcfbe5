//! Common orchestration abstractions for the FWaaS sync daemon.
//!
//! This crate provides the core traits and types shared by the orchestration
//! modules of the firewall sync control plane:
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`Consumer`]: Per-key deduplicating queue of router events
//! - [`SyncMap`]: Map that never creates entries on lookup
//! - [`TaskStatus`]: Result classification for task processing
//!
//! # Architecture
//!
//! The orchestration architecture follows an event-driven model:
//!
//! 1. The owning plugin reports that a router's firewall-relevant state changed
//! 2. The event is queued on a Consumer, keyed by router id
//! 3. The daemon loop dispatches pending work to the owning Orch
//! 4. The Orch re-renders the router's rules into backend API calls
//!
//! # Example
//!
//! ```ignore
//! use fwaas_orch_common::{Orch, Consumer, TaskStatus};
//!
//! struct RouterOrch {
//!     events: Consumer,
//! }
//!
//! #[async_trait]
//! impl Orch for RouterOrch {
//!     fn name(&self) -> &str { "RouterOrch" }
//!
//!     async fn do_task(&mut self) {
//!         for entry in self.events.drain() {
//!             if self.process(&entry).await.is_retryable() {
//!                 self.events.retry(entry);
//!             }
//!         }
//!     }
//! }
//! ```

mod consumer;
mod orch;
mod sync_map;
mod task;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use orch::Orch;
pub use sync_map::SyncMap;
pub use task::TaskStatus;
