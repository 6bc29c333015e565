//! Key break detection for one nesting level.

use crate::key::ColumnKey;
use crate::source::GettableByIndex;
use crate::value::FieldValue;

/// How the key of the current row relates to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    /// No previous row since the last reset
    First,
    /// Same key as the previous row
    Same,
    /// The key changed
    Break,
}

/// Tracks the group key of one level and the instance being assembled.
///
/// The pending instance is handed out by [`BreakDetector::take_pending`]
/// exactly once, so a group can never be flushed twice.
#[derive(Debug)]
pub struct BreakDetector<P> {
    key_columns: Vec<ColumnKey>,
    previous: Option<Vec<FieldValue>>,
    current: Vec<FieldValue>,
    pending: Option<P>,
}

impl<P> BreakDetector<P> {
    pub fn new(key_columns: Vec<ColumnKey>) -> Self {
        Self {
            key_columns,
            previous: None,
            current: Vec::new(),
            pending: None,
        }
    }

    pub fn key_columns(&self) -> &[ColumnKey] {
        &self.key_columns
    }

    /// Read the key of `row` and compare it with the previous row
    pub fn observe(&mut self, row: &dyn GettableByIndex) -> KeyTransition {
        self.current = self.key_columns.iter().map(|k| row.get(k)).collect();
        let transition = match &self.previous {
            None => KeyTransition::First,
            Some(previous) if *previous == self.current => KeyTransition::Same,
            Some(_) => KeyTransition::Break,
        };
        self.previous = Some(self.current.clone());
        transition
    }

    /// Key of the last observed row
    pub fn current_key(&self) -> &[FieldValue] {
        &self.current
    }

    /// Start a new group; `None` records a group with no instance
    pub fn start(&mut self, instance: Option<P>) {
        self.pending = instance;
    }

    pub fn pending_mut(&mut self) -> Option<&mut P> {
        self.pending.as_mut()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<P> {
        self.pending.take()
    }

    /// Forget the previous key so the next row starts a group. Any pending
    /// instance is dropped; flush it first.
    pub fn reset(&mut self) {
        self.previous = None;
        self.current.clear();
        self.pending = None;
    }
}
