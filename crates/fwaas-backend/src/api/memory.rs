//! In-memory controller.
//!
//! Serves both [`FirewallSectionApi`] and [`LogicalRouterApi`] from process
//! memory. Simulation mode seeds it from the topology file; tests use it to
//! observe exactly which rule lists were pushed.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::debug;

use super::firewall_section::{FirewallSectionApi, SectionUpdate};
use super::logical_router::LogicalRouterApi;
use crate::error::{BackendError, BackendResult};
use crate::rule::BackendRule;
use crate::types::{FirewallSectionId, LogicalRouterId};

#[derive(Debug, Default)]
struct SectionState {
    rules: Vec<BackendRule>,
    revision: u64,
}

#[derive(Debug, Default)]
struct State {
    sections: HashMap<FirewallSectionId, SectionState>,
    router_sections: HashMap<LogicalRouterId, Option<FirewallSectionId>>,
    updates: Vec<(FirewallSectionId, Vec<BackendRule>)>,
    fail_next_update: Option<BackendError>,
}

/// In-memory implementation of the controller APIs.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a logical router and its (empty) firewall section.
    pub fn add_router_section(&self, router: LogicalRouterId, section: FirewallSectionId) {
        let mut state = self.lock();
        state.sections.entry(section.clone()).or_default();
        state.router_sections.insert(router, Some(section));
    }

    /// Registers a logical router that has no firewall section.
    pub fn add_router_without_section(&self, router: LogicalRouterId) {
        self.lock().router_sections.insert(router, None);
    }

    /// Makes the next `update` call fail with `error`.
    pub fn fail_next_update(&self, error: BackendError) {
        self.lock().fail_next_update = Some(error);
    }

    /// Returns every accepted update, oldest first.
    pub fn updates(&self) -> Vec<(FirewallSectionId, Vec<BackendRule>)> {
        self.lock().updates.clone()
    }

    /// Returns the number of accepted updates.
    pub fn update_count(&self) -> usize {
        self.lock().updates.len()
    }

    /// Returns the current rules of every section, sorted by section id.
    pub fn sections(&self) -> Vec<(FirewallSectionId, Vec<BackendRule>)> {
        let state = self.lock();
        let mut sections: Vec<_> = state
            .sections
            .iter()
            .map(|(id, s)| (id.clone(), s.rules.clone()))
            .collect();
        sections.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        sections
    }
}

#[async_trait]
impl FirewallSectionApi for InMemoryBackend {
    async fn update(
        &self,
        section: &FirewallSectionId,
        rules: Vec<BackendRule>,
    ) -> BackendResult<SectionUpdate> {
        let mut state = self.lock();

        if let Some(error) = state.fail_next_update.take() {
            return Err(error);
        }

        for rule in &rules {
            rule.validate().map_err(BackendError::invalid_request)?;
        }

        let entry = state
            .sections
            .get_mut(section)
            .ok_or_else(|| BackendError::not_found(format!("firewall section {}", section)))?;

        entry.rules = rules.clone();
        entry.revision += 1;
        let ack = SectionUpdate {
            section_id: section.clone(),
            revision: entry.revision,
            rule_count: rules.len(),
        };

        debug!(
            "section {} replaced with {} rules (revision {})",
            section, ack.rule_count, ack.revision
        );
        state.updates.push((section.clone(), rules));
        Ok(ack)
    }

    async fn get_rules(&self, section: &FirewallSectionId) -> BackendResult<Vec<BackendRule>> {
        self.lock()
            .sections
            .get(section)
            .map(|s| s.rules.clone())
            .ok_or_else(|| BackendError::not_found(format!("firewall section {}", section)))
    }
}

#[async_trait]
impl LogicalRouterApi for InMemoryBackend {
    async fn get_firewall_section_id(
        &self,
        router: &LogicalRouterId,
    ) -> BackendResult<Option<FirewallSectionId>> {
        self.lock()
            .router_sections
            .get(router)
            .cloned()
            .ok_or_else(|| BackendError::not_found(format!("logical router {}", router)))
    }
}
