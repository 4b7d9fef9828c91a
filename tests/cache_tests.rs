//! Integration tests for the cache hierarchy.

use mips_simulator::mem::cache::{CacheBuilder, CacheOrganization, PolicyKind, WritePolicy};
use mips_simulator::mem::main_memory::FIRST_DATA_ADDRESS;
use mips_simulator::mem::{MainMemory, Memory, MemoryLevel};

fn main_level() -> MemoryLevel {
    MemoryLevel::Main(MainMemory::mips32(false))
}

fn builder(organization: CacheOrganization, write_policy: WritePolicy) -> CacheBuilder {
    CacheBuilder::new(organization, write_policy)
}

/// Tests the write-miss-fill scenario on a direct-mapped write-back
/// cache: one miss on the store, a hit on the read-back, and the value
/// survives the round trip.
#[test]
fn test_write_back_direct_store_then_load() {
    let mut cache_builder = builder(CacheOrganization::Direct, WritePolicy::WriteBack);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 4;
    let mut cache = cache_builder.build(main_level()).unwrap();

    let address = FIRST_DATA_ADDRESS;
    cache.set_word(address, 23573).unwrap();

    let stats = cache.stats();
    assert_eq!(stats.operations, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 1);

    assert_eq!(cache.get_word(address).unwrap(), 23573);
    let stats = cache.stats();
    assert_eq!(stats.operations, 2);
    assert_eq!(stats.hits, 1);
}

/// Tests that hits and misses always account for every operation.
#[test]
fn test_hit_miss_accounting() {
    let mut cache_builder = builder(CacheOrganization::Associative, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 8;
    let mut cache = cache_builder.build(main_level()).unwrap();

    let block_bytes = 4 * 4;
    for _round in 0..3 {
        for block in 0..8u32 {
            let address = FIRST_DATA_ADDRESS + block * block_bytes;
            let _ = cache.get_word(address).unwrap();
        }
    }

    let stats = cache.stats();
    assert_eq!(stats.operations, 24);
    assert_eq!(stats.hits + stats.misses, stats.operations);
    assert_eq!(stats.misses, 8);
    assert_eq!(stats.hits, 16);
}

/// Tests that a write-through store reaches the parent immediately.
#[test]
fn test_write_through_propagates_to_parent() {
    let mut cache = builder(CacheOrganization::Direct, WritePolicy::WriteThrough)
        .build(main_level())
        .unwrap();

    let address = FIRST_DATA_ADDRESS + 8;
    cache.set_word(address, 0x1234_5678).unwrap();

    assert_eq!(cache.parent_mut().get_word(address).unwrap(), 0x1234_5678);
}

/// Tests that a write-back store is deferred until flush.
#[test]
fn test_write_back_defers_until_flush() {
    let mut cache = builder(CacheOrganization::Direct, WritePolicy::WriteBack)
        .build(main_level())
        .unwrap();

    let address = FIRST_DATA_ADDRESS;
    cache.set_word(address, 77).unwrap();

    assert_eq!(cache.parent_mut().get_word(address).unwrap(), 0);

    cache.flush().unwrap();
    assert_eq!(cache.parent_mut().get_word(address).unwrap(), 77);
}

/// Tests that eviction of a dirty block writes it back to the parent.
#[test]
fn test_write_back_flushes_dirty_victim_on_eviction() {
    let mut cache_builder = builder(CacheOrganization::Direct, WritePolicy::WriteBack);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 4;
    let mut cache = cache_builder.build(main_level()).unwrap();

    // Two addresses with the same index and different tags: the cache
    // spans 4 blocks of 16 bytes, so +64 wraps to the same slot.
    let first = FIRST_DATA_ADDRESS;
    let conflicting = FIRST_DATA_ADDRESS + 64;

    cache.set_word(first, 41).unwrap();
    assert_eq!(cache.parent_mut().get_word(first).unwrap(), 0);

    let _ = cache.get_word(conflicting).unwrap();
    assert_eq!(cache.parent_mut().get_word(first).unwrap(), 41);
}

/// Tests that reset flushes dirty content and clears the counters.
#[test]
fn test_reset_flushes_and_clears() {
    let mut cache = builder(CacheOrganization::Direct, WritePolicy::WriteBack)
        .build(main_level())
        .unwrap();

    let address = FIRST_DATA_ADDRESS + 4;
    cache.set_word(address, 9).unwrap();
    cache.reset().unwrap();

    let stats = cache.stats();
    assert_eq!(stats.operations, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(cache.parent_mut().get_word(address).unwrap(), 9);
    assert!(cache.block(0).is_none());
}

/// Tests that a fully-associative cache hits on a stored tag no matter
/// which slot holds it.
#[test]
fn test_associative_hits_any_slot() {
    let mut cache_builder = builder(CacheOrganization::Associative, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 4;
    let mut cache = cache_builder.build(main_level()).unwrap();

    let stride = 4 * 4;
    for block in 0..4u32 {
        let _ = cache.get_word(FIRST_DATA_ADDRESS + block * stride).unwrap();
    }

    let before = cache.stats();
    for block in 0..4u32 {
        let _ = cache.get_word(FIRST_DATA_ADDRESS + block * stride).unwrap();
    }
    let after = cache.stats();
    assert_eq!(after.hits - before.hits, 4);
}

/// Tests that addresses in different sets never contend for the same
/// replacement decision.
#[test]
fn test_set_associative_isolation() {
    let mut cache_builder = builder(CacheOrganization::SetAssociative, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 4;
    cache_builder.set_size = 2;
    cache_builder.policy = PolicyKind::Lru;
    let mut cache = cache_builder.build(main_level()).unwrap();

    // Two sets; the set index is bit 4 of the address. This address
    // lands in set 1.
    let other_set = FIRST_DATA_ADDRESS + 16;
    let _ = cache.get_word(other_set).unwrap();

    // Thrash set 0 far beyond its capacity.
    for block in 0..8u32 {
        let _ = cache.get_word(FIRST_DATA_ADDRESS + block * 32).unwrap();
    }

    let before = cache.stats();
    let _ = cache.get_word(other_set).unwrap();
    let after = cache.stats();
    assert_eq!(after.hits - before.hits, 1);
}

/// Tests FIFO eviction order: the oldest fill is evicted even when it
/// was recently touched.
#[test]
fn test_fifo_evicts_oldest_fill() {
    let mut cache_builder = builder(CacheOrganization::Associative, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 2;
    cache_builder.policy = PolicyKind::Fifo;
    let mut cache = cache_builder.build(main_level()).unwrap();

    let a = FIRST_DATA_ADDRESS;
    let b = FIRST_DATA_ADDRESS + 16;
    let c = FIRST_DATA_ADDRESS + 32;

    let _ = cache.get_word(a).unwrap();
    let _ = cache.get_word(b).unwrap();
    let _ = cache.get_word(a).unwrap();
    let _ = cache.get_word(c).unwrap();

    // A was filled first, so FIFO evicted it despite the recent touch.
    let before = cache.stats();
    let _ = cache.get_word(a).unwrap();
    let after = cache.stats();
    assert_eq!(after.misses - before.misses, 1);
}

/// Tests LRU eviction order: the least recently touched block goes.
#[test]
fn test_lru_evicts_least_recently_used() {
    let mut cache_builder = builder(CacheOrganization::Associative, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 2;
    cache_builder.policy = PolicyKind::Lru;
    let mut cache = cache_builder.build(main_level()).unwrap();

    let a = FIRST_DATA_ADDRESS;
    let b = FIRST_DATA_ADDRESS + 16;
    let c = FIRST_DATA_ADDRESS + 32;

    let _ = cache.get_word(a).unwrap();
    let _ = cache.get_word(b).unwrap();
    let _ = cache.get_word(a).unwrap();
    let _ = cache.get_word(c).unwrap();

    // B was the least recently used, so A is still resident.
    let before = cache.stats();
    let _ = cache.get_word(a).unwrap();
    let after = cache.stats();
    assert_eq!(after.hits - before.hits, 1);
}

/// Tests that a two-level chain routes misses through the next level.
#[test]
fn test_two_level_chain() {
    let inner = builder(CacheOrganization::Direct, WritePolicy::WriteThrough)
        .build(main_level())
        .unwrap();
    let mut outer = builder(CacheOrganization::Direct, WritePolicy::WriteThrough)
        .build(MemoryLevel::Cache(inner))
        .unwrap();

    let address = FIRST_DATA_ADDRESS;
    let _ = outer.get_word(address).unwrap();

    let level = MemoryLevel::Cache(outer);
    assert_eq!(level.cache_levels(), 2);
    assert_eq!(level.cache(0).unwrap().stats().misses, 1);
    // The outer fill reads the inner level byte by byte.
    assert!(level.cache(1).unwrap().stats().operations > 0);
}

/// Tests construction-time validation of the geometry.
#[test]
fn test_builder_validation() {
    let mut bad = builder(CacheOrganization::Direct, WritePolicy::WriteThrough);
    bad.block_size = 3;
    assert!(bad.build(main_level()).is_err());

    let mut bad = builder(CacheOrganization::SetAssociative, WritePolicy::WriteBack);
    bad.blocks_amount = 4;
    bad.set_size = 8;
    assert!(bad.build(main_level()).is_err());

    let ok = builder(CacheOrganization::SetAssociative, WritePolicy::WriteBack);
    assert!(ok.build(main_level()).is_ok());
}

/// Tests the derived geometry of a direct-mapped cache.
#[test]
fn test_tag_size_direct() {
    let mut cache_builder = builder(CacheOrganization::Direct, WritePolicy::WriteThrough);
    cache_builder.block_size = 4;
    cache_builder.blocks_amount = 16;
    let cache = cache_builder.build(main_level()).unwrap();

    // 32 - 2 (byte) - 2 (word-in-block) - 4 (index) = 24 tag bits.
    assert_eq!(cache.tag_size(), 24);
    assert_eq!(cache.block_size(), 4);
    assert_eq!(cache.blocks_amount(), 16);
}

/// Tests that builder properties expose the organization-specific
/// fields.
#[test]
fn test_builder_properties() {
    let direct = builder(CacheOrganization::Direct, WritePolicy::WriteThrough);
    let names: Vec<&str> = direct.properties().iter().map(|p| p.name).collect();
    assert!(names.contains(&"block_size"));
    assert!(!names.contains(&"set_size"));

    let set = builder(CacheOrganization::SetAssociative, WritePolicy::WriteBack);
    let names: Vec<&str> = set.properties().iter().map(|p| p.name).collect();
    assert!(names.contains(&"set_size"));
    assert!(names.contains(&"policy"));
}
