//! Reference model of store content.
//!
//! The model applies [`Op`]s to a [`TestStore`] and tracks what the store has
//! acknowledged. Records touched by a command that failed, for instance
//! because power was cut, are moved to an uncertain set: they may or may not
//! be present afterwards, but if they are, their content must be intact.

use crate::fixtures::{chunk, TestStore};
use crate::generators::{Op, RECORD_TYPES};
use fds_core::{FindToken, RecordId, RecordKey, StoreEvent};
use std::collections::{BTreeMap, BTreeSet};

/// Key and payload bytes of a record.
pub type Content = (RecordKey, Vec<u8>);

/// Acknowledged and attempted store content.
#[derive(Debug, Clone, Default)]
pub struct Model {
    live: BTreeMap<RecordId, Content>,
    written: BTreeMap<RecordId, Content>,
    uncertain: BTreeSet<RecordId>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records acknowledged as present.
    pub fn live(&self) -> &BTreeMap<RecordId, Content> {
        &self.live
    }

    /// Records whose presence is unknown.
    pub fn uncertain(&self) -> &BTreeSet<RecordId> {
        &self.uncertain
    }

    fn target(&self, slot: usize) -> Option<(RecordId, RecordKey)> {
        if self.live.is_empty() {
            return None;
        }
        self.live
            .iter()
            .nth(slot % self.live.len())
            .map(|(id, (key, _))| (*id, *key))
    }

    fn forget(&mut self, id: RecordId) {
        self.live.remove(&id);
        self.uncertain.insert(id);
    }

    /// Applies one operation and waits for it to finish.
    ///
    /// Returns the event of the operation, or `None` if the store rejected
    /// the call synchronously or the operation had no target.
    pub fn apply(&mut self, store: &TestStore, op: &Op) -> Option<StoreEvent> {
        let event = match op {
            Op::Write { key, payload } => {
                let desc = store.write(*key, &[chunk(payload)]).ok()?;
                let content = (*key, chunk(payload).to_vec());
                self.written.insert(desc.record_id(), content.clone());
                let event = last_event(store)?;
                if event.is_ok() {
                    self.live.insert(desc.record_id(), content);
                } else {
                    self.uncertain.insert(desc.record_id());
                }
                event
            }
            Op::Update { slot, payload } => {
                let (old, key) = self.target(*slot)?;
                let desc = store
                    .update(&store.descriptor_from_id(old), key, &[chunk(payload)])
                    .ok()?;
                let content = (key, chunk(payload).to_vec());
                self.written.insert(desc.record_id(), content.clone());
                let event = last_event(store)?;
                if event.is_ok() {
                    self.live.remove(&old);
                    self.live.insert(desc.record_id(), content);
                } else {
                    self.forget(old);
                    self.uncertain.insert(desc.record_id());
                }
                event
            }
            Op::Clear { slot } => {
                let (id, _) = self.target(*slot)?;
                store.clear(&store.descriptor_from_id(id)).ok()?;
                let event = last_event(store)?;
                if event.is_ok() {
                    self.live.remove(&id);
                } else {
                    self.forget(id);
                }
                event
            }
            Op::ClearInstance { instance } => {
                store.clear_by_instance(*instance).ok()?;
                let event = last_event(store)?;
                let matching: Vec<RecordId> = self
                    .live
                    .iter()
                    .filter(|(_, (key, _))| key.instance == *instance)
                    .map(|(id, _)| *id)
                    .collect();
                for id in matching {
                    if event.is_ok() {
                        self.live.remove(&id);
                    } else {
                        self.forget(id);
                    }
                }
                event
            }
            // Collection never changes content, even when it fails.
            Op::Gc => {
                store.gc().ok()?;
                last_event(store)?
            }
        };
        Some(event)
    }

    /// Checks that every acknowledged record reads back intact and that the
    /// store holds nothing else.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch.
    pub fn verify(&self, store: &TestStore) -> Result<usize, String> {
        let checked = self.verify_live(store)?;
        let visible = self.verify_visible(store)?;
        if visible != self.live.len() {
            return Err(format!(
                "{visible} records visible, {} acknowledged",
                self.live.len()
            ));
        }
        let stat = store.stat().map_err(|e| e.to_string())?;
        if stat.valid_records as usize != self.live.len() {
            return Err(format!(
                "stat reports {} valid records, expected {}",
                stat.valid_records,
                self.live.len()
            ));
        }
        Ok(checked)
    }

    /// Checks that every acknowledged record, except uncertain ones, reads
    /// back intact.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing or damaged record.
    pub fn verify_live(&self, store: &TestStore) -> Result<usize, String> {
        let mut checked = 0;
        for (id, (key, data)) in &self.live {
            if self.uncertain.contains(id) {
                continue;
            }
            let read = store
                .read(&store.descriptor_from_id(*id))
                .map_err(|e| format!("{id} ({key}) unreadable: {e}"))?;
            if read != *data {
                return Err(format!("{id} ({key}) content differs"));
            }
            checked += 1;
        }
        Ok(checked)
    }

    /// Checks that every record visible through a key search was written by
    /// this model with the same key and content. Returns the number of
    /// visible records.
    ///
    /// # Errors
    ///
    /// Returns a description of the first unexpected record.
    pub fn verify_visible(&self, store: &TestStore) -> Result<usize, String> {
        let mut visible = 0;
        for record_type in RECORD_TYPES {
            let mut token = FindToken::default();
            while let Ok(desc) = store.find_by_type(record_type, &mut token) {
                let id = desc.record_id();
                let Some((key, data)) = self.written.get(&id) else {
                    return Err(format!("{id} was never written"));
                };
                if key.record_type != record_type {
                    return Err(format!("{id} found under type {record_type}, written as {key}"));
                }
                let read = store
                    .read(&desc)
                    .map_err(|e| format!("{id} ({key}) unreadable: {e}"))?;
                if read != *data {
                    return Err(format!("{id} ({key}) is torn"));
                }
                visible += 1;
            }
        }
        Ok(visible)
    }
}

/// Runs queued commands and returns the last event.
fn last_event(store: &TestStore) -> Option<StoreEvent> {
    store.settle().pop()
}
