//! The multi-cycle simulation driver.
//!
//! One instruction is in flight at a time and advances through the
//! steps `FETCH -> DECODE -> EXECUTE -> (MEMORY) -> (WRITE_BACK)`, one
//! step per cycle. The memory and write-back steps are skipped when the
//! in-flight execution reports it does not use them.
//!
//! When undo is enabled, every step opens a `StepChanges` record; all
//! register mutations, main-memory writes and cache operations of the
//! step land in it, and the record is pushed onto a bounded history.
//! `undo_last_step` pops the newest record and replays it backwards,
//! restoring the machine exactly.
//!
//! Runtime faults are routed through the interrupt manager: the step's
//! record is discarded, the in-flight instruction is squashed, the
//! driver returns to `FETCH` and the program counter is redirected to
//! the exception vector.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::Exception;
use crate::core::exec::{ExecContext, Execution, ForwardingTable, PhaseError};
use crate::core::reg::{RegisterFile, RegisterRef};
use crate::isa;
use crate::mem::main_memory::{EXCEPTION_VECTOR, FIRST_KERNEL_TEXT_ADDRESS};
use crate::mem::{Memory, MemoryLevel};
use crate::sim::changes::{Change, StepChanges};
use crate::sim::SimulationData;
use crate::stats::SimStats;

/// Bound on the undo history; the oldest record is discarded beyond it.
pub const MAX_CHANGES: usize = 10_000;

/// The step the driver will run next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiCycleStep {
    Fetch,
    Decode,
    Execute,
    Memory,
    WriteBack,
}

/// Passed to the step-completed callback.
#[derive(Clone, Copy, Debug)]
pub struct StepEvent {
    pub cycle: u64,
    pub step: MultiCycleStep,
    pub pc: u32,
}

/// The multi-cycle driver.
pub struct MultiCycleSimulation {
    registers: RegisterFile,
    memory: MemoryLevel,
    data: SimulationData,

    breakpoints: HashSet<u32>,
    changes: VecDeque<StepChanges>,
    current_changes: Option<StepChanges>,
    current_step: MultiCycleStep,
    current_execution: Option<Execution>,

    cycles: u64,
    executed_instructions: u64,
    exceptions: u64,
    finished: bool,

    instruction_stack_bottom: u32,
    kernel_stack_bottom: u32,

    interrupted: Arc<AtomicBool>,
    forwards: ForwardingTable,
    on_step: Option<Box<dyn FnMut(&StepEvent)>>,
}

impl MultiCycleSimulation {
    /// Creates the driver. The memory and register state at this point
    /// becomes the reset state, and `instruction_stack_bottom` is the
    /// address of the last instruction of the loaded program.
    pub fn new(
        mut registers: RegisterFile,
        mut memory: MemoryLevel,
        data: SimulationData,
        instruction_stack_bottom: u32,
    ) -> Self {
        registers.save_state();
        memory.save_state();
        memory.set_journal_enabled(data.undo_enabled);
        Self {
            registers,
            memory,
            data,
            breakpoints: HashSet::new(),
            changes: VecDeque::new(),
            current_changes: None,
            current_step: MultiCycleStep::Fetch,
            current_execution: None,
            cycles: 0,
            executed_instructions: 0,
            exceptions: 0,
            finished: false,
            instruction_stack_bottom,
            kernel_stack_bottom: EXCEPTION_VECTOR,
            interrupted: Arc::new(AtomicBool::new(false)),
            forwards: ForwardingTable::new(),
            on_step: None,
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

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn executed_instructions(&self) -> u64 {
        self.executed_instructions
    }

    pub fn current_step(&self) -> MultiCycleStep {
        self.current_step
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of undo records currently held.
    pub fn history_len(&self) -> usize {
        self.changes.len()
    }

    pub fn add_breakpoint(&mut self, address: u32) {
        let _ = self.breakpoints.insert(address);
    }

    pub fn remove_breakpoint(&mut self, address: u32) {
        let _ = self.breakpoints.remove(&address);
    }

    /// Installs the step-completed callback consumed by external
    /// listeners.
    pub fn set_on_step(&mut self, callback: Box<dyn FnMut(&StepEvent)>) {
        self.on_step = Some(callback);
    }

    /// A handle external controllers can set to interrupt the run
    /// cooperatively.
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
            instructions: self.executed_instructions,
            exceptions: self.exceptions,
            ..SimStats::default()
        }
    }

    /// Runs steps until the program drops off its bottom or the run is
    /// interrupted (breakpoint or external flag).
    pub fn execute_all(&mut self) {
        self.interrupted.store(false, Ordering::Relaxed);
        let mut first = true;
        while !self.finished && !self.is_interrupted() {
            self.step(first);
            first = false;
        }
    }

    /// Runs one step. `first` suppresses the breakpoint check so a run
    /// can resume from a breakpoint address.
    pub fn step(&mut self, first: bool) {
        if self.finished {
            return;
        }

        if self.data.undo_enabled {
            self.current_changes = Some(StepChanges::new());
        }

        let executing = self.current_step;
        let result = match executing {
            MultiCycleStep::Fetch => self.fetch(first),
            MultiCycleStep::Decode => self.run_decode(),
            MultiCycleStep::Execute => self.run_execute(),
            MultiCycleStep::Memory => self.run_memory(),
            MultiCycleStep::WriteBack => self.run_write_back(),
        };

        match result {
            Ok(()) => {}
            Err(PhaseError::Hazard(_)) => {
                // Stall: the producing instruction has not committed
                // yet. Drop the record and retry the same step.
                self.discard_step();
                self.cycles += 1;
                return;
            }
            Err(PhaseError::Exception(exception)) => {
                if !self.is_interrupted() {
                    self.request_exception(exception);
                }
                self.cycles += 1;
                return;
            }
        }

        if self.is_interrupted() {
            self.discard_step();
            return;
        }

        self.cycles += 1;
        self.close_step(executing);
    }

    /// Pops the newest undo record and replays it backwards. Returns
    /// whether a step was actually undone.
    pub fn undo_last_step(&mut self) -> bool {
        if !self.data.undo_enabled {
            return false;
        }
        let Some(changes) = self.changes.pop_back() else {
            return false;
        };

        self.finished = false;
        if self.current_step == MultiCycleStep::Fetch {
            // The undone step completed an instruction.
            self.executed_instructions -= 1;
        }

        for change in changes.into_reverse_iter() {
            self.apply_reverse(change);
        }
        self.cycles -= 1;
        true
    }

    /// Restores the machine to its construction-time state.
    pub fn reset(&mut self) {
        self.memory.restore_state();
        self.registers.restore_state();
        self.discard_step();
        self.changes.clear();
        self.current_execution = None;
        self.current_step = MultiCycleStep::Fetch;
        self.cycles = 0;
        self.executed_instructions = 0;
        self.exceptions = 0;
        self.finished = false;
        self.interrupted.store(false, Ordering::Relaxed);
    }

    /// Resets every cache level and purges cache operations from the
    /// undo history so a later undo cannot resurrect stale blocks.
    pub fn reset_caches(&mut self) -> Result<(), Exception> {
        self.memory.reset_caches()?;
        let _ = self.memory.drain_cache_journal();
        let _ = self.memory.drain_memory_journal();
        for changes in &mut self.changes {
            changes.remove_cache_changes();
        }
        Ok(())
    }

    fn context(&mut self) -> ExecContext<'_> {
        ExecContext {
            registers: &mut self.registers,
            memory: &mut self.memory,
            changes: self.current_changes.as_mut(),
            forwards: &self.forwards,
            forwarding_enabled: false,
            trace: self.data.trace,
        }
    }

    fn record_step(&mut self) {
        let old = self.current_step;
        if let Some(changes) = self.current_changes.as_mut() {
            changes.push(Change::Step { old });
        }
    }

    fn discard_step(&mut self) {
        self.current_changes = None;
        let _ = self.memory.drain_cache_journal();
        let _ = self.memory.drain_memory_journal();
    }

    fn close_step(&mut self, executing: MultiCycleStep) {
        if let Some(mut changes) = self.current_changes.take() {
            for (level, operation) in self.memory.drain_cache_journal() {
                changes.push(Change::CacheOperation {
                    level,
                    hit: operation.hit,
                    slot: operation.slot,
                    old_block: operation.old_block,
                });
            }
            for change in self.memory.drain_memory_journal() {
                changes.push(Change::Memory(change));
            }
            self.changes.push_back(changes);
            if self.changes.len() > MAX_CHANGES {
                let _ = self.changes.pop_front();
            }
        }

        let event = StepEvent {
            cycle: self.cycles - 1,
            step: executing,
            pc: self.registers.pc(),
        };
        if let Some(callback) = &mut self.on_step {
            callback(&event);
        }
    }

    /// The interrupt manager: squash the in-flight instruction, discard
    /// the step record and redirect control to the exception vector.
    fn request_exception(&mut self, exception: Exception) {
        self.discard_step();
        if let Some(mut execution) = self.current_execution.take() {
            let mut ctx = self.context();
            execution.unlock_all(&mut ctx);
        }
        self.current_step = MultiCycleStep::Fetch;
        let _ = self.registers.set_pc(EXCEPTION_VECTOR);
        self.exceptions += 1;
        if self.data.trace {
            eprintln!("[Exception] {exception}");
        }
    }

    fn fetch(&mut self, first: bool) -> Result<(), PhaseError> {
        let pc = self.registers.pc();

        if self.breakpoints.contains(&pc) && !first {
            self.discard_step();
            self.interrupt();
            return Ok(());
        }

        let old_step = self.current_step;
        let old_execution = self.current_execution.clone().map(Box::new);
        if let Some(changes) = self.current_changes.as_mut() {
            changes.push(Change::Step { old: old_step });
            changes.push(Change::CurrentExecution { old: old_execution });
        }

        {
            let next = pc.wrapping_add(4) as i32;
            let mut ctx = self.context();
            ctx.write_register(RegisterRef::Pc, next);
        }

        let word = self.memory.get_word(pc)? as u32;
        let instruction =
            isa::decode(word).ok_or_else(|| Exception::reserved_instruction(pc))?;

        if self.data.trace {
            eprintln!("IF  pc={pc:#010x} inst={word:#010x}");
        }

        self.current_execution = Some(Execution::new(instruction, pc, self.executed_instructions));
        self.current_step = MultiCycleStep::Decode;
        Ok(())
    }

    fn run_decode(&mut self) -> Result<(), PhaseError> {
        self.record_step();
        let Some(mut execution) = self.current_execution.take() else {
            return Ok(());
        };
        let result = {
            let mut ctx = self.context();
            execution.decode(&mut ctx)
        };
        self.current_execution = Some(execution);
        result?;
        self.current_step = MultiCycleStep::Execute;
        Ok(())
    }

    fn run_execute(&mut self) -> Result<(), PhaseError> {
        self.record_step();
        let Some(mut execution) = self.current_execution.take() else {
            return Ok(());
        };
        let result = {
            let mut ctx = self.context();
            execution.execute(&mut ctx)
        };
        if let Err(error) = result {
            self.current_execution = Some(execution);
            return Err(error);
        }

        if self.is_interrupted() {
            self.current_execution = Some(execution);
            self.discard_step();
            return Ok(());
        }

        if let Some(target) = execution.taken_jump() {
            let mut ctx = self.context();
            ctx.write_register(RegisterRef::Pc, target as i32);
        }

        let executes_memory = execution.executes_memory();
        let executes_write_back = execution.executes_write_back();
        self.current_execution = Some(execution);

        if executes_memory {
            self.current_step = MultiCycleStep::Memory;
        } else if executes_write_back {
            self.current_step = MultiCycleStep::WriteBack;
        } else {
            self.finish_instruction();
        }
        Ok(())
    }

    fn run_memory(&mut self) -> Result<(), PhaseError> {
        self.record_step();
        let Some(mut execution) = self.current_execution.take() else {
            return Ok(());
        };
        let result = {
            let mut ctx = self.context();
            execution.memory(&mut ctx)
        };
        if let Err(error) = result {
            self.current_execution = Some(execution);
            return Err(error);
        }
        let executes_write_back = execution.executes_write_back();
        self.current_execution = Some(execution);

        if executes_write_back {
            self.current_step = MultiCycleStep::WriteBack;
        } else {
            self.finish_instruction();
        }
        Ok(())
    }

    fn run_write_back(&mut self) -> Result<(), PhaseError> {
        self.record_step();
        let Some(mut execution) = self.current_execution.take() else {
            return Ok(());
        };
        let result = {
            let mut ctx = self.context();
            execution.write_back(&mut ctx)
        };
        self.current_execution = Some(execution);
        result?;
        self.finish_instruction();
        Ok(())
    }

    fn finish_instruction(&mut self) {
        self.current_step = MultiCycleStep::Fetch;
        self.executed_instructions += 1;
        self.check_finished();
    }

    fn check_finished(&mut self) {
        let pc = self.registers.pc();
        let past_bottom = if pc >= FIRST_KERNEL_TEXT_ADDRESS {
            pc > self.kernel_stack_bottom
        } else {
            pc > self.instruction_stack_bottom
        };
        if past_bottom && !self.finished {
            self.finished = true;
            println!("Execution finished. Dropped off bottom.");
        }
    }

    fn apply_reverse(&mut self, change: Change) {
        match change {
            Change::RegisterValue { reg, old } => {
                let _ = self.registers.set_value(reg, old);
            }
            Change::RegisterLock { reg, id } => {
                let _ = self.registers.reg_mut(reg).unlock(id);
            }
            Change::RegisterUnlock { reg, id } => {
                self.registers.reg_mut(reg).lock(id);
            }
            Change::Memory(mem_change) => {
                self.memory.main_memory_mut().undo_change(&mem_change);
            }
            Change::CacheOperation {
                level,
                hit,
                slot,
                old_block,
            } => {
                if let Some(cache) = self.memory.cache_mut(level) {
                    cache.undo_operation(hit, slot, old_block.map(|block| *block));
                }
            }
            Change::Step { old } => self.current_step = old,
            Change::CurrentExecution { old } => {
                self.current_execution = old.map(|execution| *execution);
            }
        }
    }
}
