//! Reversible step mutations.
//!
//! Every mutating side effect of a simulation step is recorded as a
//! `Change`. A `StepChanges` is the ordered list produced during one
//! step; undo replays the list strictly in reverse to restore the
//! machine bit for bit.

use crate::core::exec::Execution;
use crate::core::reg::RegisterRef;
use crate::mem::cache::CacheBlock;
use crate::mem::main_memory::MemChange;
use crate::sim::multicycle::MultiCycleStep;

/// One reversible mutation.
#[derive(Clone, Debug)]
pub enum Change {
    /// A register value changed; `old` is the value before the step.
    RegisterValue { reg: RegisterRef, old: i32 },
    /// A register was locked by instruction `id`.
    RegisterLock { reg: RegisterRef, id: u64 },
    /// A register lock held by instruction `id` was released.
    RegisterUnlock { reg: RegisterRef, id: u64 },
    /// A main-memory mutation (byte/half/word write, endianness switch,
    /// heap allocation).
    Memory(MemChange),
    /// A cache operation at the given chain depth.
    CacheOperation {
        level: usize,
        hit: bool,
        slot: Option<usize>,
        old_block: Option<Box<CacheBlock>>,
    },
    /// The driver left the given step.
    Step { old: MultiCycleStep },
    /// The driver replaced its in-flight execution.
    CurrentExecution { old: Option<Box<Execution>> },
}

/// The ordered mutation record of one simulation step.
#[derive(Clone, Debug, Default)]
pub struct StepChanges {
    changes: Vec<Change>,
}

impl StepChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Consumes the record, yielding the changes newest first — the
    /// order undo must apply them in.
    pub fn into_reverse_iter(self) -> impl Iterator<Item = Change> {
        self.changes.into_iter().rev()
    }

    /// Drops every cache operation record. Used when the caches are
    /// reset mid-run and the history must not resurrect stale blocks.
    pub fn remove_cache_changes(&mut self) {
        self.changes
            .retain(|change| !matches!(change, Change::CacheOperation { .. }));
    }
}
