//! Cache organizations.
//!
//! One `Cache` struct realizes the full organization matrix: a `Mapping`
//! (direct, fully-associative, set-associative) selects the candidate
//! slots for an address, and a `WritePolicy` (write-through, write-back)
//! decides how stores reach the parent level. Every cache exclusively
//! owns its parent memory level, forming a chain that terminates at main
//! memory.
//!
//! Lookup protocol: an access computes the tag, counts one operation and
//! searches the candidate slots. A hit touches the block's modification
//! time. A miss with `create` set fills a new block from the parent
//! (byte by byte, so parent caches account their own operations) and
//! installs it over the victim chosen by the replacement policy; a
//! write-back cache flushes a dirty victim first. Reads always allocate.
//! Write-through stores never allocate and forward to the parent
//! unconditionally; write-back stores allocate, mark the block dirty and
//! defer the parent write until eviction or an explicit flush.

/// Cache line storage.
pub mod block;

/// Cache construction descriptors and the builder registry.
pub mod builder;

/// Block replacement policies.
pub mod policy;

/// Cache access accounting.
pub mod stats;

pub use block::CacheBlock;
pub use builder::{BuilderRegistry, CacheBuilder, CacheOrganization, Property, PropertyValue};
pub use policy::{PolicyKind, ReplacementPolicy};
pub use stats::CacheStats;

use serde::Deserialize;

use crate::common::Exception;
use crate::mem::level::MemoryLevel;
use crate::mem::Memory;

/// How stores propagate to the parent level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum WritePolicy {
    /// Stores reach the parent immediately.
    WriteThrough,
    /// Stores are buffered in the cache and written back on eviction or
    /// flush.
    WriteBack,
}

/// Slot selection strategy, with the shifts and masks derived from the
/// cache geometry at construction time.
#[derive(Clone, Copy, Debug)]
pub enum Mapping {
    /// One candidate slot per address.
    Direct { index_shift: u32 },
    /// Every slot is a candidate; blocks are found by tag alone.
    Associative,
    /// Candidates are the slots of one set.
    SetAssociative {
        set_shift: u32,
        sets_amount: u32,
        set_size: u32,
    },
}

/// One reversible cache mutation, recorded while journaling is enabled.
///
/// `slot` is the slot the operation touched (`None` for a miss that did
/// not allocate); `old_block` is a clone of the slot's content before the
/// operation. Replayed through [`Cache::undo_operation`].
#[derive(Clone, Debug)]
pub struct CacheOperation {
    pub hit: bool,
    pub slot: Option<usize>,
    pub old_block: Option<Box<CacheBlock>>,
}

/// A configured cache level.
#[derive(Clone)]
pub struct Cache {
    builder: CacheBuilder,
    parent: Box<MemoryLevel>,

    block_size: u32,
    blocks_amount: u32,
    tag_size: u32,
    tag_shift: u32,
    byte_mask: u32,

    mapping: Mapping,
    write_policy: WritePolicy,
    policy: ReplacementPolicy,

    blocks: Vec<Option<CacheBlock>>,
    saved: Option<(Vec<Option<CacheBlock>>, u64, u64)>,

    cache_time: u64,
    operations: u64,
    hits: u64,

    journal_enabled: bool,
    journal: Vec<CacheOperation>,
}

impl Cache {
    pub(crate) fn from_parts(
        builder: CacheBuilder,
        parent: MemoryLevel,
        tag_size: u32,
        mapping: Mapping,
        write_policy: WritePolicy,
        policy: ReplacementPolicy,
    ) -> Self {
        let block_size = builder.block_size;
        let blocks_amount = builder.blocks_amount;
        Self {
            builder,
            parent: Box::new(parent),
            block_size,
            blocks_amount,
            tag_size,
            tag_shift: 32 - tag_size,
            byte_mask: (block_size - 1) << 2 | 3,
            mapping,
            write_policy,
            policy,
            blocks: vec![None; blocks_amount as usize],
            saved: None,
            cache_time: 0,
            operations: 0,
            hits: 0,
            journal_enabled: false,
            journal: Vec::new(),
        }
    }

    /// The descriptor this cache was built from.
    pub fn builder(&self) -> &CacheBuilder {
        &self.builder
    }

    pub fn blocks_amount(&self) -> u32 {
        self.blocks_amount
    }

    /// Block size in words.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Tag width in bits.
    pub fn tag_size(&self) -> u32 {
        self.tag_size
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// A fresh snapshot of the access counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.operations, self.hits)
    }

    /// The block resident in the given slot, if any.
    pub fn block(&self, index: usize) -> Option<&CacheBlock> {
        self.blocks.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn parent(&self) -> &MemoryLevel {
        &self.parent
    }

    pub fn parent_mut(&mut self) -> &mut MemoryLevel {
        &mut self.parent
    }

    /// Enables or disables operation journaling on this cache and every
    /// level below it.
    pub fn set_journal_enabled(&mut self, enabled: bool) {
        self.journal_enabled = enabled;
        if !enabled {
            self.journal.clear();
        }
        self.parent.set_journal_enabled(enabled);
    }

    /// Removes and returns the operations journaled so far.
    pub fn drain_journal(&mut self) -> Vec<CacheOperation> {
        std::mem::take(&mut self.journal)
    }

    /// Reverses one journaled operation: decrements the counters and
    /// restores the touched slot to its previous content.
    pub fn undo_operation(&mut self, hit: bool, slot: Option<usize>, old_block: Option<CacheBlock>) {
        self.operations -= 1;
        if hit {
            self.hits -= 1;
        }
        if let Some(index) = slot {
            self.blocks[index] = old_block;
        }
    }

    /// Overwrites the access counters. Used only by state restoration.
    pub fn force_stats(&mut self, operations: u64, hits: u64) {
        self.operations = operations;
        self.hits = hits;
    }

    /// Writes every dirty block back to the parent. A no-op for
    /// write-through caches.
    pub fn flush(&mut self) -> Result<(), Exception> {
        if self.write_policy != WritePolicy::WriteBack {
            return Ok(());
        }
        for index in 0..self.blocks.len() {
            let dirty = self.blocks[index]
                .as_ref()
                .map(CacheBlock::is_dirty)
                .unwrap_or(false);
            if dirty {
                if let Some(block) = &self.blocks[index] {
                    block.write_to(&mut *self.parent)?;
                }
                if let Some(block) = self.blocks[index].as_mut() {
                    block.set_dirty(false);
                }
            }
        }
        Ok(())
    }

    /// Flushes, clears every slot and counter, and resets any cache
    /// below this one.
    pub fn reset(&mut self) -> Result<(), Exception> {
        self.flush()?;
        self.operations = 0;
        self.hits = 0;
        self.cache_time = 0;
        for slot in &mut self.blocks {
            *slot = None;
        }
        if let MemoryLevel::Cache(parent) = &mut *self.parent {
            parent.reset()?;
        }
        Ok(())
    }

    fn candidate_range(&self, address: u32) -> (usize, usize) {
        match self.mapping {
            Mapping::Direct { index_shift } => {
                let index = (address >> index_shift) & (self.blocks_amount - 1);
                (index as usize, 1)
            }
            Mapping::Associative => (0, self.blocks_amount as usize),
            Mapping::SetAssociative {
                set_shift,
                sets_amount,
                set_size,
            } => {
                let set = (address >> set_shift) & (sets_amount - 1);
                ((set * set_size) as usize, set_size as usize)
            }
        }
    }

    fn touch(&mut self, index: usize) {
        let time = self.cache_time;
        self.cache_time += 1;
        if let Some(block) = self.blocks[index].as_mut() {
            block.set_modification_time(time);
        }
    }

    /// Core lookup/fill protocol. Returns the slot holding the block for
    /// `address`, or `None` on a miss when `create` is not set.
    fn get_block(&mut self, address: u32, create: bool) -> Result<Option<usize>, Exception> {
        let tag = address >> self.tag_shift;
        let (first, len) = self.candidate_range(address);
        self.operations += 1;

        let mut found = None;
        for index in first..first + len {
            if let Some(block) = &self.blocks[index] {
                if block.tag() == tag {
                    found = Some(index);
                    break;
                }
            }
        }

        if let Some(index) = found {
            self.hits += 1;
            if self.journal_enabled {
                let old_block = self.blocks[index].clone().map(Box::new);
                self.journal.push(CacheOperation {
                    hit: true,
                    slot: Some(index),
                    old_block,
                });
            }
            return Ok(Some(index));
        }

        if !create {
            if self.journal_enabled {
                self.journal.push(CacheOperation {
                    hit: false,
                    slot: None,
                    old_block: None,
                });
            }
            return Ok(None);
        }

        let block_start = address & !self.byte_mask;
        let mut block = CacheBlock::new(tag, block_start, (self.block_size * 4) as usize);
        for offset in 0..block.data().len() {
            let byte = self.parent.get_byte(block_start + offset as u32)?;
            block.data_mut()[offset] = byte;
        }
        block.set_creation_time(self.cache_time);
        block.set_modification_time(self.cache_time);

        let victim = self.policy.victim_index(&self.blocks[first..first + len]);
        let index = first + victim;
        let old = self.blocks[index].take();

        if let Some(old_block) = &old {
            if self.write_policy == WritePolicy::WriteBack && old_block.is_dirty() {
                old_block.write_to(&mut *self.parent)?;
            }
        }

        if self.journal_enabled {
            self.journal.push(CacheOperation {
                hit: false,
                slot: Some(index),
                old_block: old.map(Box::new),
            });
        }
        self.blocks[index] = Some(block);
        Ok(Some(index))
    }

    fn offset_of(&self, address: u32) -> usize {
        (address & self.byte_mask) as usize
    }
}

impl Memory for Cache {
    fn get_byte(&mut self, address: u32) -> Result<u8, Exception> {
        match self.get_block(address, true)? {
            Some(index) => {
                self.touch(index);
                let offset = self.offset_of(address);
                Ok(self.blocks[index].as_ref().unwrap().get_byte(offset))
            }
            None => self.parent.get_byte(address),
        }
    }

    fn set_byte(&mut self, address: u32, value: u8) -> Result<u8, Exception> {
        match self.write_policy {
            WritePolicy::WriteThrough => {
                let old = self.parent.set_byte(address, value)?;
                if let Some(index) = self.get_block(address, false)? {
                    self.touch(index);
                    let offset = self.offset_of(address);
                    let _ = self.blocks[index].as_mut().unwrap().set_byte(offset, value);
                }
                Ok(old)
            }
            WritePolicy::WriteBack => {
                let index = match self.get_block(address, true)? {
                    Some(index) => index,
                    None => return self.parent.set_byte(address, value),
                };
                self.touch(index);
                let offset = self.offset_of(address);
                let block = self.blocks[index].as_mut().unwrap();
                let old = block.set_byte(offset, value);
                block.set_dirty(true);
                Ok(old)
            }
        }
    }

    fn get_half(&mut self, address: u32) -> Result<i16, Exception> {
        if address & 0x1 != 0 {
            return Err(Exception::address_load(address));
        }
        let big_endian = self.is_big_endian();
        match self.get_block(address, true)? {
            Some(index) => {
                self.touch(index);
                let offset = self.offset_of(address);
                Ok(self.blocks[index].as_ref().unwrap().get_half(offset, big_endian))
            }
            None => self.parent.get_half(address),
        }
    }

    fn set_half(&mut self, address: u32, value: i16) -> Result<i16, Exception> {
        if address & 0x1 != 0 {
            return Err(Exception::address_store(address));
        }
        let big_endian = self.is_big_endian();
        match self.write_policy {
            WritePolicy::WriteThrough => {
                let old = self.parent.set_half(address, value)?;
                if let Some(index) = self.get_block(address, false)? {
                    self.touch(index);
                    let offset = self.offset_of(address);
                    let _ = self.blocks[index]
                        .as_mut()
                        .unwrap()
                        .set_half(offset, value, big_endian);
                }
                Ok(old)
            }
            WritePolicy::WriteBack => {
                let index = match self.get_block(address, true)? {
                    Some(index) => index,
                    None => return self.parent.set_half(address, value),
                };
                self.touch(index);
                let offset = self.offset_of(address);
                let block = self.blocks[index].as_mut().unwrap();
                let old = block.set_half(offset, value, big_endian);
                block.set_dirty(true);
                Ok(old)
            }
        }
    }

    fn get_word(&mut self, address: u32) -> Result<i32, Exception> {
        if address & 0x3 != 0 {
            return Err(Exception::address_load(address));
        }
        let big_endian = self.is_big_endian();
        match self.get_block(address, true)? {
            Some(index) => {
                self.touch(index);
                let offset = self.offset_of(address);
                Ok(self.blocks[index].as_ref().unwrap().get_word(offset, big_endian))
            }
            None => self.parent.get_word(address),
        }
    }

    fn set_word(&mut self, address: u32, value: i32) -> Result<i32, Exception> {
        if address & 0x3 != 0 {
            return Err(Exception::address_store(address));
        }
        let big_endian = self.is_big_endian();
        match self.write_policy {
            WritePolicy::WriteThrough => {
                let old = self.parent.set_word(address, value)?;
                if let Some(index) = self.get_block(address, false)? {
                    self.touch(index);
                    let offset = self.offset_of(address);
                    let _ = self.blocks[index]
                        .as_mut()
                        .unwrap()
                        .set_word(offset, value, big_endian);
                }
                Ok(old)
            }
            WritePolicy::WriteBack => {
                let index = match self.get_block(address, true)? {
                    Some(index) => index,
                    None => return self.parent.set_word(address, value),
                };
                self.touch(index);
                let offset = self.offset_of(address);
                let block = self.blocks[index].as_mut().unwrap();
                let old = block.set_word(offset, value, big_endian);
                block.set_dirty(true);
                Ok(old)
            }
        }
    }

    fn is_big_endian(&self) -> bool {
        self.parent.is_big_endian()
    }

    fn set_big_endian(&mut self, big_endian: bool) {
        self.parent.set_big_endian(big_endian);
    }

    fn save_state(&mut self) {
        self.parent.save_state();
        self.saved = Some((self.blocks.clone(), self.operations, self.hits));
    }

    fn restore_state(&mut self) {
        self.parent.restore_state();
        if let Some((blocks, operations, hits)) = &self.saved {
            self.blocks = blocks.clone();
            self.operations = *operations;
            self.hits = *hits;
        }
    }
}
