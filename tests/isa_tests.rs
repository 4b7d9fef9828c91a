//! Integration tests for instruction decoding.

use mips_simulator::core::alu::AluType;
use mips_simulator::isa::{asm, decode, Instruction};

/// Tests that the encoders and the decoder agree.
#[test]
fn test_decode_round_trip() {
    assert_eq!(decode(asm::nop()), Some(Instruction::Nop));
    assert_eq!(
        decode(asm::add(10, 8, 9)),
        Some(Instruction::Add { rd: 10, rs: 8, rt: 9 })
    );
    assert_eq!(
        decode(asm::addi(8, 0, -4)),
        Some(Instruction::Addi { rt: 8, rs: 0, imm: -4 })
    );
    assert_eq!(
        decode(asm::lw(11, 16, 29)),
        Some(Instruction::Lw { rt: 11, base: 29, offset: 16 })
    );
    assert_eq!(
        decode(asm::sw(11, -8, 29)),
        Some(Instruction::Sw { rt: 11, base: 29, offset: -8 })
    );
    assert_eq!(
        decode(asm::beq(8, 9, 3)),
        Some(Instruction::Beq { rs: 8, rt: 9, offset: 3 })
    );
    assert_eq!(
        decode(asm::j(0x0040_0020)),
        Some(Instruction::J { target: 0x0010_0008 })
    );
    assert_eq!(
        decode(asm::add_s(2, 0, 1)),
        Some(Instruction::AddS { fd: 2, fs: 0, ft: 1 })
    );
    assert_eq!(
        decode(asm::div_s(4, 3, 2)),
        Some(Instruction::DivS { fd: 4, fs: 3, ft: 2 })
    );
}

/// Tests that words outside the subset fail to decode.
#[test]
fn test_reserved_words() {
    assert_eq!(decode(0xFC00_0000), None);
    // SPECIAL with an unsupported function field.
    assert_eq!(decode(0x0000_0018), None);
    // A shift with a non-zero amount is not in the subset.
    assert_eq!(decode(0x0008_4080), None);
    // COP1 with a double-precision format field.
    assert_eq!(decode(0x4620_0800), None);
}

/// Tests the phase gates of the decoded instructions.
#[test]
fn test_phase_gates() {
    let load = decode(asm::lw(8, 0, 9)).unwrap();
    assert!(load.executes_memory());
    assert!(load.executes_write_back());

    let store = decode(asm::sw(8, 0, 9)).unwrap();
    assert!(store.executes_memory());
    assert!(!store.executes_write_back());

    let branch = decode(asm::beq(8, 9, 1)).unwrap();
    assert!(!branch.executes_memory());
    assert!(!branch.executes_write_back());
    assert!(branch.is_control_transfer());

    let alu = decode(asm::add(10, 8, 9)).unwrap();
    assert!(!alu.executes_memory());
    assert!(alu.executes_write_back());
}

/// Tests the functional-unit classification.
#[test]
fn test_alu_kinds() {
    assert_eq!(decode(asm::add(1, 2, 3)).unwrap().alu_kind(), AluType::Integer);
    assert_eq!(
        decode(asm::add_s(1, 2, 3)).unwrap().alu_kind(),
        AluType::FloatAddition
    );
    assert_eq!(
        decode(asm::mul_s(1, 2, 3)).unwrap().alu_kind(),
        AluType::FloatMultiplication
    );
    assert_eq!(
        decode(asm::div_s(1, 2, 3)).unwrap().alu_kind(),
        AluType::FloatDivision
    );
}
