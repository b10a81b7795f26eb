//! Per-call graph tracking.

use std::collections::HashMap;

use orb_common::protocol::{FixUp, PathToken};

use crate::value::{Value, ValueId};

/// Per-invocation codec state. Created fresh for each call and discarded
/// at envelope construction.
///
/// During marshalling it maps each visited cell to the path of its first
/// occurrence and keeps the ancestor stack that distinguishes cycles from
/// duplicates; fixups accumulate here. During unmarshalling it maps the
/// path of every identity-bearing cell to the native it produced, which
/// is what the bridge's fixup alias pass consumes.
#[derive(Debug, Default)]
pub struct SerializerState {
    path: Vec<PathToken>,
    first_occurrences: HashMap<ValueId, Vec<PathToken>>,
    ancestors: Vec<ValueId>,
    fixups: Vec<FixUp>,
    unmarshalled: HashMap<Vec<PathToken>, Value>,
}

impl SerializerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_path(&mut self, path: Vec<PathToken>) {
        self.path = path;
    }

    pub(crate) fn path_len(&self) -> usize {
        self.path.len()
    }

    pub(crate) fn extend_path(&mut self, tokens: &[PathToken]) {
        self.path.extend_from_slice(tokens);
    }

    pub(crate) fn truncate_path(&mut self, len: usize) {
        self.path.truncate(len);
    }

    pub(crate) fn current_path(&self) -> &[PathToken] {
        &self.path
    }

    /// The path where the cell was first marshalled, if it was.
    pub(crate) fn first_occurrence(&self, id: ValueId) -> Option<Vec<PathToken>> {
        self.first_occurrences.get(&id).cloned()
    }

    pub(crate) fn record_first_occurrence(&mut self, id: ValueId) {
        self.first_occurrences.insert(id, self.path.clone());
    }

    /// Whether the cell is on the current construction stack. Walking the
    /// stack, not the occurrence map, is what separates a cycle from a
    /// duplicate.
    pub(crate) fn is_ancestor(&self, id: ValueId) -> bool {
        self.ancestors.contains(&id)
    }

    pub(crate) fn push_ancestor(&mut self, id: ValueId) {
        self.ancestors.push(id);
    }

    pub(crate) fn pop_ancestor(&mut self) {
        self.ancestors.pop();
    }

    pub(crate) fn add_fixup(&mut self, target: Vec<PathToken>, source: Vec<PathToken>) {
        self.fixups.push(FixUp::new(target, source));
    }

    pub fn has_fixups(&self) -> bool {
        !self.fixups.is_empty()
    }

    /// Drains the fixups accumulated by marshalling, for the envelope.
    pub fn take_fixups(&mut self) -> Vec<FixUp> {
        std::mem::take(&mut self.fixups)
    }

    /// Records the native built for the current path.
    pub(crate) fn record_unmarshalled(&mut self, value: Value) {
        self.unmarshalled.insert(self.path.clone(), value);
    }

    /// Records the native one step below the current path. Wrapped
    /// containers use this so fixup paths that run through their payload
    /// member (`["list"][1]`) still resolve to the cell.
    pub(crate) fn record_unmarshalled_below(&mut self, member: PathToken, value: Value) {
        let mut path = self.path.clone();
        path.push(member);
        self.unmarshalled.insert(path, value);
    }

    /// The native built at `path`, if any identity-bearing value was.
    pub fn unmarshalled_at(&self, path: &[PathToken]) -> Option<Value> {
        self.unmarshalled.get(path).cloned()
    }
}
