//! Integration tests for the multi-ALU pipelined driver.

use mips_simulator::core::alu::{Alu, AluCollection, AluType};
use mips_simulator::core::reg::{RegisterFile, RegisterRef};
use mips_simulator::isa::asm;
use mips_simulator::mem::main_memory::{FIRST_DATA_ADDRESS, FIRST_TEXT_ADDRESS};
use mips_simulator::mem::{MainMemory, Memory, MemoryLevel};
use mips_simulator::sim::{loader, MultiAluPipelinedSimulation, SimulationData};

fn build_with(
    words: &[u32],
    data_words: &[(u32, i32)],
    data: SimulationData,
    alus: AluCollection,
) -> MultiAluPipelinedSimulation {
    let mut memory = MemoryLevel::Main(MainMemory::mips32(false));
    let last = loader::write_words(&mut memory, FIRST_TEXT_ADDRESS, words).unwrap();
    for (address, value) in data_words {
        let _ = memory.set_word(*address, *value).unwrap();
    }
    let registers = RegisterFile::new(FIRST_TEXT_ADDRESS);
    MultiAluPipelinedSimulation::new(registers, memory, data, alus, last)
}

fn build(words: &[u32], data: SimulationData) -> MultiAluPipelinedSimulation {
    build_with(
        words,
        &[],
        data,
        AluCollection::new(AluCollection::default_units()),
    )
}

/// Tests a dependent chain resolved through forwarding.
#[test]
fn test_forwarding_resolves_dependency() {
    let program = vec![
        asm::addi(8, 0, 5), // $t0 = 5
        asm::add(9, 8, 8),  // $t1 = 10, needs $t0 forwarded
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(8)), 5);
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 10);
    assert!(sim.raw_stalls() > 0);
    assert_eq!(sim.instructions_finished(), 2);
}

/// Tests the same chain with forwarding disabled: the consumer stalls
/// until the producer commits, and the result is still correct.
#[test]
fn test_stall_without_forwarding() {
    let program = vec![
        asm::addi(8, 0, 5),
        asm::add(9, 8, 8),
    ];
    let data = SimulationData {
        forwarding_enabled: false,
        ..SimulationData::default()
    };
    let mut sim = build(&program, data);
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 10);
    assert!(sim.raw_stalls() >= 2);
}

/// Tests that a taken branch squashes the wrong-path instruction.
#[test]
fn test_branch_squashes_wrong_path() {
    let program = vec![
        asm::beq(0, 0, 1),   // always taken
        asm::addi(8, 0, 99), // wrong path
        asm::addi(9, 0, 7),  // branch target
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(8)), 0);
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 7);
}

/// Tests that a pending writer stalls a later writer to the same
/// register and the final value is the younger one.
#[test]
fn test_waw_stall_orders_writes() {
    let program = vec![
        asm::addi(8, 0, 1),
        asm::addi(8, 0, 2),
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(8)), 2);
    assert!(sim.waw_stalls() > 0);
}

/// Tests the floating-point path end to end: loads into the FP
/// registers, a multi-cycle addition, and the store of the sum.
#[test]
fn test_float_add_through_memory() {
    let program = vec![
        asm::lui(16, 0x1001),  // $s0 = 0x10010000
        asm::lwc1(0, 0, 16),   // $f0 = 1.5
        asm::lwc1(1, 4, 16),   // $f1 = 2.25
        asm::add_s(2, 0, 1),   // $f2 = 3.75
        asm::swc1(2, 8, 16),   // word[$s0 + 8] = $f2
    ];
    let preload = [
        (FIRST_DATA_ADDRESS, 1.5f32.to_bits() as i32),
        (FIRST_DATA_ADDRESS + 4, 2.25f32.to_bits() as i32),
    ];
    let mut sim = build_with(
        &program,
        &preload,
        SimulationData::default(),
        AluCollection::new(AluCollection::default_units()),
    );
    sim.execute_all();

    assert!(sim.is_finished());
    let stored = sim.memory_mut().get_word(FIRST_DATA_ADDRESS + 8).unwrap();
    assert_eq!(stored as u32, 3.75f32.to_bits());
    assert_eq!(sim.instructions_finished(), 5);
}

/// Tests that a single float-addition unit serializes independent
/// additions through a structural stall.
#[test]
fn test_single_unit_structural_stall() {
    let program = vec![
        asm::add_s(2, 0, 1),
        asm::add_s(3, 0, 1),
    ];
    let alus = AluCollection::new(vec![
        Alu::new(AluType::Integer, 1),
        Alu::new(AluType::FloatAddition, 4),
    ]);
    let mut sim = build_with(&program, &[], SimulationData::default(), alus);
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.instructions_finished(), 2);
    assert!(sim.other_stalls() > 0);
}

/// Tests that the multi-cycle float units actually occupy their
/// latency: the add takes at least its four execute cycles.
#[test]
fn test_float_latency_occupies_unit() {
    let program = vec![asm::add_s(2, 0, 1)];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();

    assert!(sim.is_finished());
    // Fetch, decode, four execute cycles, memory, write-back and the
    // drain make the run strictly longer than the integer case.
    assert!(sim.cycles() >= 8);
}

/// Tests breakpoint stop and resume on the pipelined driver.
#[test]
fn test_pipeline_breakpoint() {
    let program = vec![
        asm::addi(8, 0, 1),
        asm::addi(9, 0, 2),
        asm::addi(10, 0, 3),
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.add_breakpoint(FIRST_TEXT_ADDRESS + 8);

    sim.execute_all();
    assert!(!sim.is_finished());

    sim.execute_all();
    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(10)), 3);
}

/// Tests reset and rerun on the pipelined driver.
#[test]
fn test_pipeline_reset() {
    let program = vec![
        asm::addi(8, 0, 5),
        asm::add(9, 8, 8),
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 10);

    sim.reset();
    assert_eq!(sim.cycles(), 0);
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 0);
    assert!(sim.is_pipeline_empty());
    assert_eq!(sim.alus().available(), sim.alus().len());

    sim.execute_all();
    assert!(sim.is_finished());
    assert_eq!(sim.registers().value(RegisterRef::Gpr(9)), 10);
}

/// Tests that a store observes the value of an in-flight producer
/// through forwarding.
#[test]
fn test_store_forwarded_value() {
    let program = vec![
        asm::lui(16, 0x1001),  // $s0 = 0x10010000
        asm::addi(8, 0, 42),   // $t0 = 42
        asm::sw(8, 0, 16),     // word[$s0] = $t0
    ];
    let mut sim = build(&program, SimulationData::default());
    sim.execute_all();

    assert!(sim.is_finished());
    assert_eq!(sim.memory_mut().get_word(FIRST_DATA_ADDRESS).unwrap(), 42);
}
