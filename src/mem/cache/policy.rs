//! Block replacement policies.
//!
//! A policy selects the victim slot for an incoming block. Empty slots
//! are always filled first; the policy only arbitrates between resident
//! blocks. FIFO and LRU break ties to the first minimum in iteration
//! order, so their eviction sequence is deterministic and reproducible.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use super::block::CacheBlock;

/// The victim selection strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyKind {
    /// Uniform random slot over the candidate set.
    Random,
    /// The block with the smallest creation time.
    Fifo,
    /// The block with the smallest modification time.
    Lru,
}

/// A replacement policy instance.
///
/// RANDOM owns its generator so a seeded configuration produces a
/// reproducible eviction order; FIFO and LRU are stateless.
#[derive(Clone, Debug)]
pub struct ReplacementPolicy {
    kind: PolicyKind,
    rng: SmallRng,
}

impl ReplacementPolicy {
    pub fn new(kind: PolicyKind, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { kind, rng }
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Returns the index (within `blocks`) of the slot to replace.
    ///
    /// The slice is the candidate set: the whole block array for a
    /// fully-associative cache, one set for a set-associative cache, or a
    /// single slot for a direct-mapped cache.
    pub fn victim_index(&mut self, blocks: &[Option<CacheBlock>]) -> usize {
        if let Some(empty) = blocks.iter().position(|slot| slot.is_none()) {
            return empty;
        }

        match self.kind {
            PolicyKind::Random => self.rng.gen_range(0..blocks.len()),
            PolicyKind::Fifo => Self::min_by_key(blocks, CacheBlock::creation_time),
            PolicyKind::Lru => Self::min_by_key(blocks, CacheBlock::modification_time),
        }
    }

    fn min_by_key(blocks: &[Option<CacheBlock>], key: impl Fn(&CacheBlock) -> u64) -> usize {
        let mut best = 0;
        let mut best_time = u64::MAX;
        for (index, slot) in blocks.iter().enumerate() {
            if let Some(block) = slot {
                let time = key(block);
                if time < best_time {
                    best = index;
                    best_time = time;
                }
            }
        }
        best
    }
}
