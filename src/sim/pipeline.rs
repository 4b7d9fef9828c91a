//! The multi-ALU pipelined simulation driver.
//!
//! Five pipeline stages with one execute slot per functional unit. An
//! instruction leases an ALU when it leaves decode and occupies it for
//! the unit's cycle count; the lease is released when the instruction
//! moves on to the memory stage or is squashed. Hazards are detected on
//! the register lock lists: a read of a register locked by an older
//! in-flight instruction stalls (or is satisfied through the forwarding
//! table), and a write to a register that is already locked stalls the
//! writer in decode. Taken branches and jumps squash every younger
//! instruction in the pipeline.
//!
//! The pipelined driver supports breakpoints, cooperative interruption
//! and reset; step rewind is only available on the multi-cycle driver.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::Exception;
use crate::core::alu::AluCollection;
use crate::core::exec::{ExecContext, Execution, ForwardingTable, PhaseError};
use crate::core::reg::RegisterFile;
use crate::isa;
use crate::mem::main_memory::{EXCEPTION_VECTOR, FIRST_KERNEL_TEXT_ADDRESS};
use crate::mem::{Memory, MemoryLevel};
use crate::sim::SimulationData;
use crate::stats::SimStats;

/// State of an instruction inside a pipeline slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// The stage's work has not completed this cycle.
    Pending,
    /// The stage's work is done; the slot is waiting to advance.
    Done,
    /// Squashed; the slot is drained at the next shift.
    Removed,
}

/// One occupied pipeline slot.
#[derive(Clone, Debug)]
pub struct PipelineSlot {
    pub execution: Execution,
    pub status: SlotStatus,
}

impl PipelineSlot {
    fn new(execution: Execution) -> Self {
        Self {
            execution,
            status: SlotStatus::Pending,
        }
    }
}

/// The pipelined driver.
pub struct MultiAluPipelinedSimulation {
    registers: RegisterFile,
    memory: MemoryLevel,
    data: SimulationData,
    breakpoints: HashSet<u32>,

    alus: AluCollection,
    fetch: Option<PipelineSlot>,
    decode: Option<PipelineSlot>,
    execute: Vec<Option<PipelineSlot>>,
    execute_cycles: Vec<u32>,
    memory_slot: Option<PipelineSlot>,
    writeback: Option<PipelineSlot>,

    instructions_started: u64,
    instructions_finished: u64,
    raws: u64,
    waws: u64,
    other_stalls: u64,
    cycles: u64,
    exceptions: u64,
    finished: bool,

    instruction_stack_bottom: u32,
    kernel_stack_bottom: u32,

    interrupted: Arc<AtomicBool>,
    forwards: ForwardingTable,
    pending_exception: Option<Exception>,
}

impl MultiAluPipelinedSimulation {
    /// Creates the driver. The memory and register state at this point
    /// becomes the reset state.
    pub fn new(
        mut registers: RegisterFile,
        mut memory: MemoryLevel,
        data: SimulationData,
        alus: AluCollection,
        instruction_stack_bottom: u32,
    ) -> Self {
        registers.save_state();
        memory.save_state();
        let slots = alus.len();
        Self {
            registers,
            memory,
            data,
            breakpoints: HashSet::new(),
            alus,
            fetch: None,
            decode: None,
            execute: vec![None; slots],
            execute_cycles: vec![0; slots],
            memory_slot: None,
            writeback: None,
            instructions_started: 0,
            instructions_finished: 0,
            raws: 0,
            waws: 0,
            other_stalls: 0,
            cycles: 0,
            exceptions: 0,
            finished: false,
            instruction_stack_bottom,
            kernel_stack_bottom: EXCEPTION_VECTOR,
            interrupted: Arc::new(AtomicBool::new(false)),
            forwards: ForwardingTable::new(),
            pending_exception: None,
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn memory(&self) -> &MemoryLevel {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryLevel {
        &mut self.memory
    }

    pub fn alus(&self) -> &AluCollection {
        &self.alus
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn instructions_finished(&self) -> u64 {
        self.instructions_finished
    }

    /// Cycles lost to read-after-write stalls.
    pub fn raw_stalls(&self) -> u64 {
        self.raws
    }

    /// Cycles lost to write-after-write stalls.
    pub fn waw_stalls(&self) -> u64 {
        self.waws
    }

    /// Cycles lost to structural stalls (busy units, occupied slots).
    pub fn other_stalls(&self) -> u64 {
        self.other_stalls
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn add_breakpoint(&mut self, address: u32) {
        let _ = self.breakpoints.insert(address);
    }

    pub fn interrupter(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            cycles: self.cycles,
            instructions: self.instructions_finished,
            exceptions: self.exceptions,
            raw_stalls: self.raws,
            waw_stalls: self.waws,
            other_stalls: self.other_stalls,
        }
    }

    /// Whether no instruction currently occupies any slot.
    pub fn is_pipeline_empty(&self) -> bool {
        self.fetch.is_none()
            && self.decode.is_none()
            && self.memory_slot.is_none()
            && self.writeback.is_none()
            && self.execute.iter().all(Option::is_none)
    }

    /// Runs cycles until the pipeline drains past the program bottom or
    /// the run is interrupted.
    pub fn execute_all(&mut self) {
        self.interrupted.store(false, Ordering::Relaxed);
        let mut first = true;
        while !self.finished && !self.is_interrupted() {
            self.cycle(first);
            first = false;
        }
    }

    /// Restores the machine to its construction-time state.
    pub fn reset(&mut self) {
        self.memory.restore_state();
        self.registers.restore_state();
        self.fetch = None;
        self.decode = None;
        for slot in &mut self.execute {
            *slot = None;
        }
        self.execute_cycles.fill(0);
        self.memory_slot = None;
        self.writeback = None;
        self.alus.reset();
        self.instructions_started = 0;
        self.instructions_finished = 0;
        self.raws = 0;
        self.waws = 0;
        self.other_stalls = 0;
        self.cycles = 0;
        self.exceptions = 0;
        self.finished = false;
        self.pending_exception = None;
        self.interrupted.store(false, Ordering::Relaxed);
    }

    /// Runs one pipeline cycle: every stage once, then the shift.
    pub fn cycle(&mut self, first: bool) {
        if self.finished {
            return;
        }

        self.rebuild_forwards();
        self.run_fetch(first);
        if self.is_interrupted() {
            return;
        }
        self.run_write_back();
        self.run_execute();
        self.run_memory();
        self.run_decode();

        if let Some(exception) = self.pending_exception.take() {
            self.handle_exception(exception);
        }

        self.shift();
        self.cycles += 1;
        self.check_finished();
    }

    fn context(&mut self) -> ExecContext<'_> {
        ExecContext {
            registers: &mut self.registers,
            memory: &mut self.memory,
            changes: None,
            forwards: &self.forwards,
            forwarding_enabled: self.data.forwarding_enabled,
            trace: self.data.trace,
        }
    }

    /// Collects the values published by the memory and write-back
    /// occupants, oldest first so younger producers win.
    fn rebuild_forwards(&mut self) {
        let mut table = ForwardingTable::new();
        if let Some(slot) = &self.writeback {
            table.merge_from(&slot.execution);
        }
        if let Some(slot) = &self.memory_slot {
            table.merge_from(&slot.execution);
        }
        self.forwards = table;
    }

    fn past_bottom(&self, pc: u32) -> bool {
        if pc >= FIRST_KERNEL_TEXT_ADDRESS {
            pc > self.kernel_stack_bottom
        } else {
            pc > self.instruction_stack_bottom
        }
    }

    fn run_fetch(&mut self, first: bool) {
        if self.fetch.is_some() {
            return;
        }
        let pc = self.registers.pc();
        if self.past_bottom(pc) {
            return;
        }
        if self.breakpoints.contains(&pc) && !first {
            self.interrupt();
            return;
        }

        match self.memory.get_word(pc) {
            Ok(word) => match isa::decode(word as u32) {
                Some(instruction) => {
                    if self.data.trace {
                        eprintln!("IF  pc={:#010x} inst={:#010x}", pc, word as u32);
                    }
                    let execution = Execution::new(instruction, pc, self.instructions_started);
                    self.instructions_started += 1;
                    let mut slot = PipelineSlot::new(execution);
                    slot.status = SlotStatus::Done;
                    self.fetch = Some(slot);
                }
                None => {
                    self.pending_exception = Some(Exception::reserved_instruction(pc));
                }
            },
            Err(exception) => self.pending_exception = Some(exception),
        }
    }

    fn run_write_back(&mut self) {
        let Some(mut slot) = self.writeback.take() else {
            return;
        };
        if slot.status != SlotStatus::Pending {
            self.writeback = Some(slot);
            return;
        }
        let result = {
            let mut ctx = self.context();
            slot.execution.write_back(&mut ctx)
        };
        match result {
            Ok(()) => slot.status = SlotStatus::Done,
            Err(PhaseError::Hazard(_)) => self.raws += 1,
            Err(PhaseError::Exception(exception)) => {
                slot.status = SlotStatus::Removed;
                self.pending_exception = Some(exception);
            }
        }
        self.writeback = Some(slot);
    }

    fn run_execute(&mut self) {
        for index in 0..self.execute.len() {
            let Some(mut slot) = self.execute[index].take() else {
                continue;
            };
            if slot.status != SlotStatus::Pending {
                self.execute[index] = Some(slot);
                continue;
            }

            if self.execute_cycles[index] < self.alus.alus()[index].cycles_required {
                self.execute_cycles[index] += 1;
            }
            if self.execute_cycles[index] < self.alus.alus()[index].cycles_required {
                self.execute[index] = Some(slot);
                continue;
            }

            let result = {
                let mut ctx = self.context();
                slot.execution.execute(&mut ctx)
            };
            match result {
                Ok(()) => {
                    slot.status = SlotStatus::Done;
                    if let Some(target) = slot.execution.taken_jump() {
                        let _ = self.registers.set_pc(target);
                        let id = slot.execution.id();
                        self.execute[index] = Some(slot);
                        self.squash_younger(id);
                        continue;
                    }
                }
                Err(PhaseError::Hazard(_)) => self.raws += 1,
                Err(PhaseError::Exception(exception)) => {
                    slot.status = SlotStatus::Removed;
                    self.pending_exception = Some(exception);
                }
            }
            self.execute[index] = Some(slot);
        }
    }

    fn run_memory(&mut self) {
        let Some(mut slot) = self.memory_slot.take() else {
            return;
        };
        if slot.status != SlotStatus::Pending {
            self.memory_slot = Some(slot);
            return;
        }
        let result = {
            let mut ctx = self.context();
            slot.execution.memory(&mut ctx)
        };
        match result {
            Ok(()) => slot.status = SlotStatus::Done,
            Err(PhaseError::Hazard(_)) => self.raws += 1,
            Err(PhaseError::Exception(exception)) => {
                slot.status = SlotStatus::Removed;
                self.pending_exception = Some(exception);
            }
        }
        self.memory_slot = Some(slot);
    }

    fn run_decode(&mut self) {
        let Some(mut slot) = self.decode.take() else {
            return;
        };
        if slot.status != SlotStatus::Pending {
            self.decode = Some(slot);
            return;
        }

        // A pending writer to the same destination would commit out of
        // order; stall until it settles.
        if let Some(destination) = slot.execution.destination() {
            if self.registers.reg(destination).is_locked() {
                self.waws += 1;
                self.decode = Some(slot);
                return;
            }
        }

        let result = {
            let mut ctx = self.context();
            slot.execution.decode(&mut ctx)
        };
        match result {
            Ok(()) => slot.status = SlotStatus::Done,
            Err(PhaseError::Hazard(_)) => self.raws += 1,
            Err(PhaseError::Exception(exception)) => {
                slot.status = SlotStatus::Removed;
                self.pending_exception = Some(exception);
            }
        }
        self.decode = Some(slot);
    }

    /// Squashes every instruction younger than `id` (wrong-path fetches
    /// after a taken branch).
    fn squash_younger(&mut self, id: u64) {
        if let Some(slot) = &mut self.fetch {
            if slot.execution.id() > id {
                slot.status = SlotStatus::Removed;
            }
        }
        if let Some(slot) = &mut self.decode {
            if slot.execution.id() > id {
                slot.status = SlotStatus::Removed;
            }
        }
        for slot in self.execute.iter_mut().flatten() {
            if slot.execution.id() > id {
                slot.status = SlotStatus::Removed;
            }
        }
        if let Some(slot) = &mut self.memory_slot {
            if slot.execution.id() > id {
                slot.status = SlotStatus::Removed;
            }
        }
        if let Some(slot) = &mut self.writeback {
            if slot.execution.id() > id {
                slot.status = SlotStatus::Removed;
            }
        }
    }

    /// The interrupt path: squash the whole pipeline, release every
    /// lease and redirect control to the exception vector.
    fn handle_exception(&mut self, exception: Exception) {
        let slots: Vec<PipelineSlot> = self
            .fetch
            .take()
            .into_iter()
            .chain(self.decode.take())
            .chain(self.execute.iter_mut().filter_map(Option::take))
            .chain(self.memory_slot.take())
            .chain(self.writeback.take())
            .collect();
        for mut slot in slots {
            self.release_slot_locks(&mut slot);
        }
        self.alus.reset();
        self.execute_cycles.fill(0);
        let _ = self.registers.set_pc(EXCEPTION_VECTOR);
        self.exceptions += 1;
        if self.data.trace {
            eprintln!("[Exception] {exception}");
        }
    }

    fn release_slot_locks(&mut self, slot: &mut PipelineSlot) {
        let mut ctx = ExecContext {
            registers: &mut self.registers,
            memory: &mut self.memory,
            changes: None,
            forwards: &self.forwards,
            forwarding_enabled: self.data.forwarding_enabled,
            trace: self.data.trace,
        };
        slot.execution.unlock_all(&mut ctx);
    }

    /// Whether the instruction in execute slot `index` may advance to
    /// the memory stage. Entry is strictly in program order: overtaking
    /// an older occupant would let a consumer starve waiting on a value
    /// its producer can no longer deliver, and would reorder memory
    /// writes and unresolved branches.
    fn can_move_to_memory(&self, index: usize) -> bool {
        let Some(candidate) = &self.execute[index] else {
            return false;
        };
        let id = candidate.execution.id();
        self.execute.iter().enumerate().all(|(other_index, slot)| {
            other_index == index
                || slot.as_ref().map_or(true, |other| {
                    other.status == SlotStatus::Removed || other.execution.id() > id
                })
        })
    }

    fn shift(&mut self) {
        // Retire or drain the write-back slot.
        if let Some(mut slot) = self.writeback.take() {
            match slot.status {
                SlotStatus::Done => self.instructions_finished += 1,
                SlotStatus::Removed => self.release_slot_locks(&mut slot),
                SlotStatus::Pending => self.writeback = Some(slot),
            }
        }

        // Memory to write-back.
        if let Some(mut slot) = self.memory_slot.take() {
            match slot.status {
                SlotStatus::Removed => self.release_slot_locks(&mut slot),
                SlotStatus::Done if self.writeback.is_none() => {
                    slot.status = SlotStatus::Pending;
                    self.writeback = Some(slot);
                }
                SlotStatus::Done => {
                    self.other_stalls += 1;
                    self.memory_slot = Some(slot);
                }
                SlotStatus::Pending => self.memory_slot = Some(slot),
            }
        }

        // Drain squashed execute slots, releasing their units.
        for index in 0..self.execute.len() {
            if matches!(
                self.execute[index].as_ref().map(|slot| slot.status),
                Some(SlotStatus::Removed)
            ) {
                if let Some(mut slot) = self.execute[index].take() {
                    self.release_slot_locks(&mut slot);
                }
                self.alus.release(index);
                self.execute_cycles[index] = 0;
            }
        }

        // Oldest finished execute slot to memory.
        if self.memory_slot.is_none() {
            let mut oldest: Option<usize> = None;
            for (index, slot) in self.execute.iter().enumerate() {
                let Some(candidate) = slot else { continue };
                if candidate.status != SlotStatus::Done || !self.can_move_to_memory(index) {
                    continue;
                }
                let older = oldest.map_or(true, |best| {
                    self.execute[best]
                        .as_ref()
                        .map_or(true, |slot| slot.execution.id() > candidate.execution.id())
                });
                if older {
                    oldest = Some(index);
                }
            }
            match oldest {
                Some(index) => {
                    if let Some(mut slot) = self.execute[index].take() {
                        slot.status = SlotStatus::Pending;
                        self.memory_slot = Some(slot);
                    }
                    self.alus.release(index);
                    self.execute_cycles[index] = 0;
                }
                None => {
                    if self
                        .execute
                        .iter()
                        .flatten()
                        .any(|slot| slot.status == SlotStatus::Done)
                    {
                        self.other_stalls += 1;
                    }
                }
            }
        }

        // Decode to an execute slot, leasing a matching unit.
        if let Some(mut slot) = self.decode.take() {
            match slot.status {
                SlotStatus::Removed => self.release_slot_locks(&mut slot),
                SlotStatus::Done => {
                    let kind = slot.execution.instruction().alu_kind();
                    match self.alus.request(kind) {
                        Some((index, _)) => {
                            slot.status = SlotStatus::Pending;
                            self.execute_cycles[index] = 0;
                            self.execute[index] = Some(slot);
                        }
                        None => {
                            self.other_stalls += 1;
                            self.decode = Some(slot);
                        }
                    }
                }
                SlotStatus::Pending => self.decode = Some(slot),
            }
        }

        // Fetch to decode; the program counter advances only when the
        // fetched instruction actually enters the pipeline.
        if let Some(mut slot) = self.fetch.take() {
            match slot.status {
                SlotStatus::Removed => self.release_slot_locks(&mut slot),
                SlotStatus::Done if self.decode.is_none() => {
                    slot.status = SlotStatus::Pending;
                    self.decode = Some(slot);
                    let pc = self.registers.pc();
                    let _ = self.registers.set_pc(pc.wrapping_add(4));
                }
                SlotStatus::Done => {
                    self.other_stalls += 1;
                    self.fetch = Some(slot);
                }
                SlotStatus::Pending => self.fetch = Some(slot),
            }
        }
    }

    fn check_finished(&mut self) {
        if !self.finished && self.past_bottom(self.registers.pc()) && self.is_pipeline_empty() {
            self.finished = true;
            println!("Execution finished. Dropped off bottom.");
        }
    }
}
