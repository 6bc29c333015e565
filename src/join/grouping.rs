//! Row grouping for one-to-many joins.
//!
//! Each join level owns a [`BreakDetector`] and the nodes of its own join
//! collections. A row flows top-down: when a level's key breaks, its pending
//! instance (with every descendant flushed into it) is appended to the
//! parent, and the descendants start over with the new instance. Rows must
//! arrive ordered by the keys of every level.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::MapperResult;
use crate::join::break_detector::{BreakDetector, KeyTransition};
use crate::mapper::CompiledMapper;
use crate::meta::ObjectSetterFn;
use crate::source::GettableByIndex;

/// Grouping state of one join collection within one stream
pub trait JoinNode<T> {
    /// Feed a row. `parent_broke` is set when the parent started a new
    /// instance with this row, which always starts a new group here too.
    fn on_row(&mut self, parent: &mut T, row: &dyn GettableByIndex, parent_broke: bool) -> MapperResult<()>;

    /// Append the pending instance, if any, to `parent`
    fn flush(&mut self, parent: &mut T);
}

/// Creates per-stream nodes for a compiled join collection
pub trait JoinFactory<T>: Send + Sync {
    fn new_node(&self) -> Box<dyn JoinNode<T>>;
}

/// Factory for `Vec<P>` join collections
pub struct JoinListFactory<T, P> {
    mapper: Arc<CompiledMapper<P>>,
    push: ObjectSetterFn<T, P>,
}

impl<T, P> JoinListFactory<T, P> {
    pub fn new(mapper: Arc<CompiledMapper<P>>, push: ObjectSetterFn<T, P>) -> Self {
        Self { mapper, push }
    }
}

impl<T: 'static, P: 'static> JoinFactory<T> for JoinListFactory<T, P> {
    fn new_node(&self) -> Box<dyn JoinNode<T>> {
        Box::new(JoinListNode {
            detector: BreakDetector::new(self.mapper.group_columns().to_vec()),
            children: self.mapper.join_nodes(),
            mapper: self.mapper.clone(),
            push: self.push.clone(),
        })
    }
}

struct JoinListNode<T, P> {
    mapper: Arc<CompiledMapper<P>>,
    push: ObjectSetterFn<T, P>,
    detector: BreakDetector<P>,
    children: Vec<Box<dyn JoinNode<P>>>,
}

impl<T: 'static, P: 'static> JoinNode<T> for JoinListNode<T, P> {
    fn on_row(&mut self, parent: &mut T, row: &dyn GettableByIndex, parent_broke: bool) -> MapperResult<()> {
        if parent_broke {
            self.detector.reset();
        }
        match self.detector.observe(row) {
            KeyTransition::Same => {
                if let Some(pending) = self.detector.pending_mut() {
                    for child in &mut self.children {
                        child.on_row(pending, row, false)?;
                    }
                }
                Ok(())
            }
            KeyTransition::First | KeyTransition::Break => {
                self.flush(parent);
                if self.mapper.is_null_in(row) {
                    self.detector.start(None);
                    return Ok(());
                }
                self.detector.start(Some(self.mapper.map_dyn(row)?));
                if let Some(pending) = self.detector.pending_mut() {
                    for child in &mut self.children {
                        child.on_row(pending, row, true)?;
                    }
                }
                Ok(())
            }
        }
    }

    fn flush(&mut self, parent: &mut T) {
        if let Some(mut pending) = self.detector.take_pending() {
            for child in &mut self.children {
                child.flush(&mut pending);
            }
            (self.push)(parent, pending);
        }
    }
}

/// Assembles root instances from consecutive rows sharing a root key.
///
/// # Example
///
/// ```ignore
/// let mut grouping = GroupingMapper::new(mapper);
/// for row in rows {
///     grouping.push_row(&row);
///     while let Some(order) = grouping.next_ready() {
///         handle(order?);
///     }
/// }
/// grouping.finish();
/// ```
pub struct GroupingMapper<T> {
    mapper: Arc<CompiledMapper<T>>,
    detector: BreakDetector<T>,
    children: Vec<Box<dyn JoinNode<T>>>,
    ready: VecDeque<MapperResult<T>>,
}

impl<T: 'static> GroupingMapper<T> {
    pub fn new(mapper: Arc<CompiledMapper<T>>) -> Self {
        Self {
            detector: BreakDetector::new(mapper.group_columns().to_vec()),
            children: mapper.join_nodes(),
            mapper,
            ready: VecDeque::new(),
        }
    }

    /// Feed one row. Completed instances and row errors become available
    /// through [`GroupingMapper::next_ready`].
    pub fn push_row<S: GettableByIndex>(&mut self, row: &S) {
        let row: &dyn GettableByIndex = row;
        match self.detector.observe(row) {
            KeyTransition::Same => {
                if let Some(pending) = self.detector.pending_mut() {
                    for child in &mut self.children {
                        if let Err(e) = child.on_row(pending, row, false) {
                            self.ready.push_back(Err(e));
                        }
                    }
                }
            }
            KeyTransition::First | KeyTransition::Break => {
                self.flush();
                match self.mapper.map_dyn(row) {
                    Ok(instance) => {
                        self.detector.start(Some(instance));
                        if let Some(pending) = self.detector.pending_mut() {
                            for child in &mut self.children {
                                if let Err(e) = child.on_row(pending, row, true) {
                                    self.ready.push_back(Err(e));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        self.detector.start(None);
                        self.ready.push_back(Err(e));
                    }
                }
            }
        }
    }

    /// Complete the last group at end of input
    pub fn finish(&mut self) {
        self.flush();
    }

    pub fn next_ready(&mut self) -> Option<MapperResult<T>> {
        self.ready.pop_front()
    }

    fn flush(&mut self) {
        if let Some(mut instance) = self.detector.take_pending() {
            for child in &mut self.children {
                child.flush(&mut instance);
            }
            self.ready.push_back(Ok(instance));
        }
    }
}

/// Groups a stream of rows into root instances
pub struct Grouped<I, T> {
    rows: I,
    grouping: GroupingMapper<T>,
    finished: bool,
}

impl<I, T: 'static> Grouped<I, T> {
    pub fn new(rows: I, mapper: Arc<CompiledMapper<T>>) -> Self {
        Self {
            rows,
            grouping: GroupingMapper::new(mapper),
            finished: false,
        }
    }
}

impl<I, S, T> Iterator for Grouped<I, T>
where
    I: Iterator<Item = MapperResult<S>>,
    S: GettableByIndex,
    T: 'static,
{
    type Item = MapperResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.grouping.next_ready() {
                return Some(result);
            }
            if self.finished {
                return None;
            }
            match self.rows.next() {
                Some(Ok(row)) => self.grouping.push_row(&row),
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.grouping.finish();
                    self.finished = true;
                }
            }
        }
    }
}
