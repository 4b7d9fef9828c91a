//! The memory level chain.
//!
//! A `MemoryLevel` is either a cache (owning the next level down) or
//! main memory, the end of the chain. Levels are addressed by depth:
//! level 0 is the outermost cache.

use crate::common::Exception;
use crate::mem::cache::{Cache, CacheOperation};
use crate::mem::main_memory::{MainMemory, MemChange};
use crate::mem::Memory;

/// One level of the memory hierarchy.
#[derive(Clone)]
pub enum MemoryLevel {
    Cache(Cache),
    Main(MainMemory),
}

impl MemoryLevel {
    /// Number of cache levels in front of main memory.
    pub fn cache_levels(&self) -> usize {
        match self {
            MemoryLevel::Cache(cache) => 1 + cache.parent().cache_levels(),
            MemoryLevel::Main(_) => 0,
        }
    }

    /// The cache at the given depth, outermost first.
    pub fn cache(&self, level: usize) -> Option<&Cache> {
        match self {
            MemoryLevel::Cache(cache) if level == 0 => Some(cache),
            MemoryLevel::Cache(cache) => cache.parent().cache(level - 1),
            MemoryLevel::Main(_) => None,
        }
    }

    /// Mutable access to the cache at the given depth.
    pub fn cache_mut(&mut self, level: usize) -> Option<&mut Cache> {
        match self {
            MemoryLevel::Cache(cache) => {
                if level == 0 {
                    Some(cache)
                } else {
                    cache.parent_mut().cache_mut(level - 1)
                }
            }
            MemoryLevel::Main(_) => None,
        }
    }

    /// The main memory at the end of the chain.
    pub fn main_memory(&self) -> &MainMemory {
        match self {
            MemoryLevel::Cache(cache) => cache.parent().main_memory(),
            MemoryLevel::Main(main) => main,
        }
    }

    /// Mutable access to the main memory at the end of the chain.
    pub fn main_memory_mut(&mut self) -> &mut MainMemory {
        match self {
            MemoryLevel::Cache(cache) => cache.parent_mut().main_memory_mut(),
            MemoryLevel::Main(main) => main,
        }
    }

    /// Enables or disables mutation journaling on every level.
    pub fn set_journal_enabled(&mut self, enabled: bool) {
        match self {
            MemoryLevel::Cache(cache) => cache.set_journal_enabled(enabled),
            MemoryLevel::Main(main) => main.set_journal_enabled(enabled),
        }
    }

    /// Drains the cache operation journals of every level, tagging each
    /// entry with its level depth.
    pub fn drain_cache_journal(&mut self) -> Vec<(usize, CacheOperation)> {
        let mut operations = Vec::new();
        let mut level = 0;
        let mut current = Some(self);
        while let Some(node) = current {
            match node {
                MemoryLevel::Cache(cache) => {
                    operations.extend(cache.drain_journal().into_iter().map(|op| (level, op)));
                    level += 1;
                    current = Some(cache.parent_mut());
                }
                MemoryLevel::Main(_) => current = None,
            }
        }
        operations
    }

    /// Drains the main memory mutation journal.
    pub fn drain_memory_journal(&mut self) -> Vec<MemChange> {
        self.main_memory_mut().drain_journal()
    }

    /// Resets every cache level (flushing write-back content first).
    pub fn reset_caches(&mut self) -> Result<(), Exception> {
        if let MemoryLevel::Cache(cache) = self {
            cache.reset()?;
        }
        Ok(())
    }

    /// Flushes every write-back cache level.
    pub fn flush_caches(&mut self) -> Result<(), Exception> {
        let mut current = Some(self);
        while let Some(node) = current {
            match node {
                MemoryLevel::Cache(cache) => {
                    cache.flush()?;
                    current = Some(cache.parent_mut());
                }
                MemoryLevel::Main(_) => current = None,
            }
        }
        Ok(())
    }
}

impl Memory for MemoryLevel {
    fn get_byte(&mut self, address: u32) -> Result<u8, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.get_byte(address),
            MemoryLevel::Main(main) => main.get_byte(address),
        }
    }

    fn set_byte(&mut self, address: u32, value: u8) -> Result<u8, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.set_byte(address, value),
            MemoryLevel::Main(main) => main.set_byte(address, value),
        }
    }

    fn get_half(&mut self, address: u32) -> Result<i16, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.get_half(address),
            MemoryLevel::Main(main) => main.get_half(address),
        }
    }

    fn set_half(&mut self, address: u32, value: i16) -> Result<i16, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.set_half(address, value),
            MemoryLevel::Main(main) => main.set_half(address, value),
        }
    }

    fn get_word(&mut self, address: u32) -> Result<i32, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.get_word(address),
            MemoryLevel::Main(main) => main.get_word(address),
        }
    }

    fn set_word(&mut self, address: u32, value: i32) -> Result<i32, Exception> {
        match self {
            MemoryLevel::Cache(cache) => cache.set_word(address, value),
            MemoryLevel::Main(main) => main.set_word(address, value),
        }
    }

    fn is_big_endian(&self) -> bool {
        match self {
            MemoryLevel::Cache(cache) => cache.is_big_endian(),
            MemoryLevel::Main(main) => main.is_big_endian(),
        }
    }

    fn set_big_endian(&mut self, big_endian: bool) {
        match self {
            MemoryLevel::Cache(cache) => cache.set_big_endian(big_endian),
            MemoryLevel::Main(main) => main.set_big_endian(big_endian),
        }
    }

    fn save_state(&mut self) {
        match self {
            MemoryLevel::Cache(cache) => cache.save_state(),
            MemoryLevel::Main(main) => main.save_state(),
        }
    }

    fn restore_state(&mut self) {
        match self {
            MemoryLevel::Cache(cache) => cache.restore_state(),
            MemoryLevel::Main(main) => main.restore_state(),
        }
    }
}
