//! Integration tests for main memory.

use mips_simulator::common::ExceptionCause;
use mips_simulator::mem::main_memory::{FIRST_DATA_ADDRESS, FIRST_HEAP_ADDRESS, FIRST_TEXT_ADDRESS};
use mips_simulator::mem::{MainMemory, Memory};

/// Tests byte reads default to zero and writes round-trip.
#[test]
fn test_byte_round_trip() {
    let mut memory = MainMemory::mips32(false);
    assert_eq!(memory.get_byte(FIRST_DATA_ADDRESS).unwrap(), 0);

    let old = memory.set_byte(FIRST_DATA_ADDRESS, 0xAB).unwrap();
    assert_eq!(old, 0);
    assert_eq!(memory.get_byte(FIRST_DATA_ADDRESS).unwrap(), 0xAB);
}

/// Tests word byte order in both endiannesses.
#[test]
fn test_word_endianness() {
    let mut memory = MainMemory::mips32(false);
    let address = FIRST_DATA_ADDRESS;

    let _ = memory.set_word(address, 0x1122_3344).unwrap();
    assert_eq!(memory.get_byte(address).unwrap(), 0x44);
    assert_eq!(memory.get_byte(address + 3).unwrap(), 0x11);

    memory.set_big_endian(true);
    assert_eq!(memory.get_word(address).unwrap(), 0x4433_2211);
}

/// Tests halfword access and its alignment check.
#[test]
fn test_halfword_access() {
    let mut memory = MainMemory::mips32(false);
    let address = FIRST_DATA_ADDRESS;

    let _ = memory.set_half(address, 0x7F01).unwrap();
    assert_eq!(memory.get_half(address).unwrap(), 0x7F01);

    let error = memory.get_half(address + 1).unwrap_err();
    assert_eq!(error.cause, ExceptionCause::AddressLoad);
}

/// Tests that misaligned word accesses fault.
#[test]
fn test_word_alignment_fault() {
    let mut memory = MainMemory::mips32(false);

    let load = memory.get_word(FIRST_DATA_ADDRESS + 2).unwrap_err();
    assert_eq!(load.cause, ExceptionCause::AddressLoad);

    let store = memory.set_word(FIRST_DATA_ADDRESS + 2, 1).unwrap_err();
    assert_eq!(store.cause, ExceptionCause::AddressStore);
}

/// Tests that accesses outside every section fault.
#[test]
fn test_unmapped_address_fault() {
    let mut memory = MainMemory::mips32(false);

    let error = memory.get_word(0x0000_0000).unwrap_err();
    assert_eq!(error.cause, ExceptionCause::AddressLoad);
    assert_eq!(error.value, 0);

    assert!(memory.get_word(FIRST_TEXT_ADDRESS).is_ok());
}

/// Tests the heap allocator bump behavior and word rounding.
#[test]
fn test_allocate() {
    let mut memory = MainMemory::mips32(false);

    let first = memory.allocate(10);
    assert_eq!(first, FIRST_HEAP_ADDRESS);

    let second = memory.allocate(4);
    assert_eq!(second, FIRST_HEAP_ADDRESS + 12);
    assert_eq!(memory.next_data_address(), FIRST_HEAP_ADDRESS + 16);
}

/// Tests save/restore of the full memory state.
#[test]
fn test_save_and_restore_state() {
    let mut memory = MainMemory::mips32(false);
    let address = FIRST_DATA_ADDRESS;

    let _ = memory.set_word(address, 31).unwrap();
    memory.save_state();

    let _ = memory.set_word(address, 99).unwrap();
    let _ = memory.allocate(8);
    memory.restore_state();

    assert_eq!(memory.get_word(address).unwrap(), 31);
    assert_eq!(memory.next_data_address(), FIRST_HEAP_ADDRESS);

    // The snapshot survives repeated restores.
    let _ = memory.set_word(address, 55).unwrap();
    memory.restore_state();
    assert_eq!(memory.get_word(address).unwrap(), 31);
}

/// Tests the mutation journal and its reverse replay.
#[test]
fn test_journal_reverse_replay() {
    let mut memory = MainMemory::mips32(false);
    let address = FIRST_DATA_ADDRESS;

    memory.set_journal_enabled(true);
    let _ = memory.set_word(address, 10).unwrap();
    let _ = memory.set_word(address, 20).unwrap();
    let _ = memory.set_byte(address + 8, 5).unwrap();

    let journal = memory.drain_journal();
    assert_eq!(journal.len(), 3);

    for change in journal.iter().rev() {
        memory.undo_change(change);
    }
    assert_eq!(memory.get_word(address).unwrap(), 0);
    assert_eq!(memory.get_byte(address + 8).unwrap(), 0);
}

/// Tests that a deep copy shares nothing with the original.
#[test]
fn test_copy_is_deep() {
    let mut memory = MainMemory::mips32(false);
    let address = FIRST_DATA_ADDRESS;
    let _ = memory.set_word(address, 123).unwrap();

    let mut copy = memory.clone();
    let _ = copy.set_word(address, 456).unwrap();

    assert_eq!(memory.get_word(address).unwrap(), 123);
    assert_eq!(copy.get_word(address).unwrap(), 456);
}
