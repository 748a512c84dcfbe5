//! Keyed event queue feeding an Orch.

use std::collections::{BTreeMap, VecDeque};

use log::debug;

/// Operation carried by a queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// The object changed and must be re-rendered
    Set,
    /// The object was removed
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// A field-value pair attached to an entry.
pub type FieldValue = (String, String);

/// Key, operation, and field-values tuple.
///
/// This is the unit of work queued on a [`Consumer`]. For firewall sync the
/// key is a router id and the fields describe why the router changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOpFieldsValues {
    /// The key (e.g. a router id)
    pub key: String,
    /// The operation (Set or Del)
    pub op: Operation,
    /// Field-value pairs (empty for Del operations)
    pub fvs: Vec<FieldValue>,
}

impl KeyOpFieldsValues {
    /// Creates a new entry.
    pub fn new(key: impl Into<String>, op: Operation, fvs: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            op,
            fvs,
        }
    }

    /// Creates a Set entry.
    pub fn set(key: impl Into<String>, fvs: Vec<FieldValue>) -> Self {
        Self::new(key, Operation::Set, fvs)
    }

    /// Creates a Del entry.
    pub fn del(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Del, vec![])
    }

    /// Returns the value for a field, if present.
    pub fn get_field(&self, field: &str) -> Option<&str> {
        self.fvs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue name used in logs and dumps
    pub table_name: String,
    /// Priority (lower = higher priority)
    pub priority: i32,
    /// Maximum entries handed out per drain
    pub batch_size: usize,
}

impl ConsumerConfig {
    /// Creates a new consumer config.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            priority: 0,
            batch_size: 128,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

/// Deduplicating queue of pending entries.
///
/// Entries are grouped per key so that a burst of notifications for the
/// same router collapses into a single pending sync:
///
/// - Multiple SET: merged (newer field values overwrite older ones)
/// - DEL: drops any pending SETs for the key
/// - DEL then SET: both kept, in order
///
/// Keys are drained in sorted order; operations on one key keep their order.
pub struct Consumer {
    config: ConsumerConfig,
    to_sync: BTreeMap<String, VecDeque<KeyOpFieldsValues>>,
    pending_count: usize,
}

impl Consumer {
    /// Creates a new consumer with the given configuration.
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    /// Returns the queue name.
    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Returns the priority.
    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    /// Returns true if there are pending entries.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Returns the number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending_count
    }

    /// Adds entries to the queue with deduplication.
    pub fn add_to_sync(&mut self, entries: Vec<KeyOpFieldsValues>) {
        for entry in entries {
            self.add_single_entry(entry);
        }
    }

    fn add_single_entry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();

        match entry.op {
            Operation::Del => {
                if !queue.is_empty() {
                    self.pending_count -= queue.len();
                    queue.clear();
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
            Operation::Set => {
                if let Some(last) = queue.back_mut() {
                    if last.op == Operation::Set {
                        debug!(
                            "{}: merging pending SET for {}",
                            self.config.table_name, entry.key
                        );
                        for (field, value) in entry.fvs {
                            match last.fvs.iter_mut().find(|(f, _)| *f == field) {
                                Some(existing) => existing.1 = value,
                                None => last.fvs.push((field, value)),
                            }
                        }
                        return;
                    }
                }
                queue.push_back(entry);
                self.pending_count += 1;
            }
        }
    }

    /// Drains up to `batch_size` entries, key by key.
    ///
    /// A key is never split across batches: once a key is taken, all its
    /// queued operations are returned together.
    pub fn drain(&mut self) -> Vec<KeyOpFieldsValues> {
        let mut result = Vec::new();

        while result.len() < self.config.batch_size {
            let Some((_key, queue)) = self.to_sync.pop_first() else {
                break;
            };
            self.pending_count -= queue.len();
            result.extend(queue);
        }

        result
    }

    /// Requeues an entry that failed processing.
    ///
    /// The entry goes to the front of its key's queue so it runs before any
    /// newer operation for the same key.
    pub fn retry(&mut self, entry: KeyOpFieldsValues) {
        let queue = self.to_sync.entry(entry.key.clone()).or_default();
        queue.push_front(entry);
        self.pending_count += 1;
    }

    /// Dumps pending entries for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!(
                        "{}: {} {:?}",
                        key,
                        if e.op.is_set() { "SET" } else { "DEL" },
                        e.fvs
                    )
                })
            })
            .collect()
    }
}
