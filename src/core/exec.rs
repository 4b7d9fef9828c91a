//! Per-instruction execution objects.
//!
//! An `Execution` carries one in-flight instruction through its four
//! phases: decode, execute, memory and write-back. The phase bodies use
//! a small set of primitives over the register file:
//!
//! * `requires` — declare a source register; raises a read-after-write
//!   hazard if it is locked by an older instruction and the driving
//!   simulation cannot forward.
//! * `value` — read a declared or committed value, falling back to the
//!   forwarding table.
//! * `lock` / `unlock` — mark a destination register pending/settled.
//! * `set_and_unlock` — commit a value and clear the lock, the standard
//!   write-back idiom.
//! * `forward` — publish a not-yet-committed value so later-stage
//!   consumers can read it without waiting for write-back.
//!
//! Every register mutation goes through the context so the driving
//! simulation can record it for undo.

use std::collections::HashMap;

use crate::common::Exception;
use crate::core::reg::{RegisterFile, RegisterRef};
use crate::isa::Instruction;
use crate::mem::{Memory, MemoryLevel};
use crate::sim::changes::{Change, StepChanges};

/// Why a phase could not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseError {
    /// A source register is locked by an older in-flight instruction
    /// and no forwarded value is available. The driver stalls and
    /// retries the phase.
    Hazard(RegisterRef),
    /// A runtime fault; routed to the interrupt manager.
    Exception(Exception),
}

impl From<Exception> for PhaseError {
    fn from(exception: Exception) -> Self {
        PhaseError::Exception(exception)
    }
}

/// Values published by still-in-flight producers, keyed by register.
#[derive(Clone, Debug, Default)]
pub struct ForwardingTable {
    values: HashMap<RegisterRef, i32>,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: RegisterRef) -> Option<i32> {
        self.values.get(&reg).copied()
    }

    /// Publishes every value an execution has forwarded so far. Later
    /// merges overwrite earlier ones, so callers merge oldest first.
    pub fn merge_from(&mut self, execution: &Execution) {
        for (&reg, &value) in &execution.forwarded {
            let _ = self.values.insert(reg, value);
        }
    }
}

/// The state an execution phase runs against, borrowed from the driving
/// simulation for the duration of one phase.
pub struct ExecContext<'a> {
    pub registers: &'a mut RegisterFile,
    pub memory: &'a mut MemoryLevel,
    pub changes: Option<&'a mut StepChanges>,
    pub forwards: &'a ForwardingTable,
    pub forwarding_enabled: bool,
    pub trace: bool,
}

impl ExecContext<'_> {
    fn record(&mut self, change: Change) {
        if let Some(changes) = self.changes.as_mut() {
            changes.push(change);
        }
    }

    /// Writes a register value, recording the previous one.
    pub fn write_register(&mut self, reg: RegisterRef, value: i32) {
        let old = self.registers.set_value(reg, value);
        self.record(Change::RegisterValue { reg, old });
    }

    fn lock_register(&mut self, reg: RegisterRef, id: u64) {
        self.registers.reg_mut(reg).lock(id);
        self.record(Change::RegisterLock { reg, id });
    }

    fn unlock_register(&mut self, reg: RegisterRef, id: u64) {
        if self.registers.reg_mut(reg).unlock(id) {
            self.record(Change::RegisterUnlock { reg, id });
        }
    }
}

/// One in-flight instruction and its per-phase scratch state.
#[derive(Clone, Debug)]
pub struct Execution {
    instruction: Instruction,
    address: u32,
    id: u64,
    decoded: HashMap<RegisterRef, i32>,
    forwarded: HashMap<RegisterRef, i32>,
    locked: Vec<RegisterRef>,
    result: i32,
    mem_address: u32,
    taken_jump: Option<u32>,
}

impl Execution {
    pub fn new(instruction: Instruction, address: u32, id: u64) -> Self {
        Self {
            instruction,
            address,
            id,
            decoded: HashMap::new(),
            forwarded: HashMap::new(),
            locked: Vec::new(),
            result: 0,
            mem_address: 0,
            taken_jump: None,
        }
    }

    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// Address the instruction was fetched from.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Monotonic instruction id; older instructions have smaller ids.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn executes_memory(&self) -> bool {
        self.instruction.executes_memory()
    }

    pub fn executes_write_back(&self) -> bool {
        self.instruction.executes_write_back()
    }

    /// The branch/jump target if the execute phase redirected control.
    pub fn taken_jump(&self) -> Option<u32> {
        self.taken_jump
    }

    /// The destination register committed at write-back, if any.
    pub fn destination(&self) -> Option<RegisterRef> {
        match self.instruction {
            Instruction::Add { rd, .. }
            | Instruction::Addu { rd, .. }
            | Instruction::Sub { rd, .. }
            | Instruction::And { rd, .. }
            | Instruction::Or { rd, .. }
            | Instruction::Slt { rd, .. } => Some(RegisterRef::Gpr(rd)),
            Instruction::Addi { rt, .. }
            | Instruction::Addiu { rt, .. }
            | Instruction::Lui { rt, .. }
            | Instruction::Lw { rt, .. } => Some(RegisterRef::Gpr(rt)),
            Instruction::Lwc1 { ft, .. } => Some(RegisterRef::Fpr(ft)),
            Instruction::AddS { fd, .. }
            | Instruction::MulS { fd, .. }
            | Instruction::DivS { fd, .. } => Some(RegisterRef::Fpr(fd)),
            _ => None,
        }
    }

    // region primitives

    fn requires(
        &mut self,
        ctx: &mut ExecContext<'_>,
        reg: RegisterRef,
        required_on_memory: bool,
    ) -> Result<(), PhaseError> {
        let register = ctx.registers.reg(reg);
        if !register.is_locked() || register.is_locked_only_by(self.id) {
            let value = ctx.registers.value(reg);
            let _ = self.decoded.insert(reg, value);
            return Ok(());
        }

        if ctx.forwarding_enabled {
            // The producer commits no later than our memory phase; the
            // value will be forwarded by then.
            if required_on_memory {
                return Ok(());
            }
            if let Some(value) = ctx.forwards.get(reg) {
                let _ = self.decoded.insert(reg, value);
                return Ok(());
            }
        }

        Err(PhaseError::Hazard(reg))
    }

    fn value(&mut self, ctx: &mut ExecContext<'_>, reg: RegisterRef) -> Result<i32, PhaseError> {
        if let Some(&value) = self.decoded.get(&reg) {
            return Ok(value);
        }
        let register = ctx.registers.reg(reg);
        if !register.is_locked_before(self.id) {
            return Ok(ctx.registers.value(reg));
        }
        if let Some(value) = ctx.forwards.get(reg) {
            if ctx.trace {
                eprintln!(
                    "[Forward] pc={:#010x} {:?} value={:#x}",
                    self.address, reg, value
                );
            }
            let _ = self.decoded.insert(reg, value);
            return Ok(value);
        }
        Err(PhaseError::Hazard(reg))
    }

    fn lock(&mut self, ctx: &mut ExecContext<'_>, reg: RegisterRef) {
        // $zero never carries a pending value.
        if reg == RegisterRef::Gpr(0) {
            return;
        }
        ctx.lock_register(reg, self.id);
        self.locked.push(reg);
    }

    fn set_and_unlock(&mut self, ctx: &mut ExecContext<'_>, reg: RegisterRef, value: i32) {
        ctx.unlock_register(reg, self.id);
        if let Some(position) = self.locked.iter().position(|&locked| locked == reg) {
            let _ = self.locked.remove(position);
        }
        ctx.write_register(reg, value);
    }

    /// Releases every lock this execution still holds. Used when the
    /// instruction is squashed.
    pub fn unlock_all(&mut self, ctx: &mut ExecContext<'_>) {
        for reg in std::mem::take(&mut self.locked) {
            ctx.unlock_register(reg, self.id);
        }
    }

    fn forward(&mut self, ctx: &ExecContext<'_>, reg: RegisterRef, value: i32) {
        if ctx.forwarding_enabled && reg != RegisterRef::Gpr(0) {
            let _ = self.forwarded.insert(reg, value);
        }
    }

    // endregion

    // region phases

    pub fn decode(&mut self, ctx: &mut ExecContext<'_>) -> Result<(), PhaseError> {
        match self.instruction {
            Instruction::Nop | Instruction::J { .. } => Ok(()),
            Instruction::Add { rd, rs, rt }
            | Instruction::Addu { rd, rs, rt }
            | Instruction::Sub { rd, rs, rt }
            | Instruction::And { rd, rs, rt }
            | Instruction::Or { rd, rs, rt }
            | Instruction::Slt { rd, rs, rt } => {
                self.requires(ctx, RegisterRef::Gpr(rs), false)?;
                self.requires(ctx, RegisterRef::Gpr(rt), false)?;
                self.lock(ctx, RegisterRef::Gpr(rd));
                Ok(())
            }
            Instruction::Addi { rt, rs, .. } | Instruction::Addiu { rt, rs, .. } => {
                self.requires(ctx, RegisterRef::Gpr(rs), false)?;
                self.lock(ctx, RegisterRef::Gpr(rt));
                Ok(())
            }
            Instruction::Lui { rt, .. } => {
                self.lock(ctx, RegisterRef::Gpr(rt));
                Ok(())
            }
            Instruction::Lw { rt, base, .. } => {
                self.requires(ctx, RegisterRef::Gpr(base), false)?;
                self.lock(ctx, RegisterRef::Gpr(rt));
                Ok(())
            }
            Instruction::Sw { rt, base, .. } => {
                self.requires(ctx, RegisterRef::Gpr(base), false)?;
                // The stored value is not needed until the memory phase.
                self.requires(ctx, RegisterRef::Gpr(rt), true)?;
                Ok(())
            }
            Instruction::Lwc1 { ft, base, .. } => {
                self.requires(ctx, RegisterRef::Gpr(base), false)?;
                self.lock(ctx, RegisterRef::Fpr(ft));
                Ok(())
            }
            Instruction::Swc1 { ft, base, .. } => {
                self.requires(ctx, RegisterRef::Gpr(base), false)?;
                self.requires(ctx, RegisterRef::Fpr(ft), true)?;
                Ok(())
            }
            Instruction::Beq { rs, rt, .. } | Instruction::Bne { rs, rt, .. } => {
                self.requires(ctx, RegisterRef::Gpr(rs), false)?;
                self.requires(ctx, RegisterRef::Gpr(rt), false)?;
                Ok(())
            }
            Instruction::AddS { fd, fs, ft }
            | Instruction::MulS { fd, fs, ft }
            | Instruction::DivS { fd, fs, ft } => {
                self.requires(ctx, RegisterRef::Fpr(fs), false)?;
                self.requires(ctx, RegisterRef::Fpr(ft), false)?;
                self.lock(ctx, RegisterRef::Fpr(fd));
                Ok(())
            }
        }
    }

    pub fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<(), PhaseError> {
        match self.instruction {
            Instruction::Nop => Ok(()),
            Instruction::Add { rd, rs, rt } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                let sum = a
                    .checked_add(b)
                    .ok_or_else(|| Exception::overflow(self.address))?;
                self.result = sum;
                self.forward(ctx, RegisterRef::Gpr(rd), sum);
                Ok(())
            }
            Instruction::Addu { rd, rs, rt } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                self.result = a.wrapping_add(b);
                self.forward(ctx, RegisterRef::Gpr(rd), self.result);
                Ok(())
            }
            Instruction::Sub { rd, rs, rt } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                let difference = a
                    .checked_sub(b)
                    .ok_or_else(|| Exception::overflow(self.address))?;
                self.result = difference;
                self.forward(ctx, RegisterRef::Gpr(rd), difference);
                Ok(())
            }
            Instruction::And { rd, rs, rt } => {
                self.result = self.value(ctx, RegisterRef::Gpr(rs))?
                    & self.value(ctx, RegisterRef::Gpr(rt))?;
                self.forward(ctx, RegisterRef::Gpr(rd), self.result);
                Ok(())
            }
            Instruction::Or { rd, rs, rt } => {
                self.result = self.value(ctx, RegisterRef::Gpr(rs))?
                    | self.value(ctx, RegisterRef::Gpr(rt))?;
                self.forward(ctx, RegisterRef::Gpr(rd), self.result);
                Ok(())
            }
            Instruction::Slt { rd, rs, rt } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                self.result = (a < b) as i32;
                self.forward(ctx, RegisterRef::Gpr(rd), self.result);
                Ok(())
            }
            Instruction::Addi { rt, rs, imm } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let sum = a
                    .checked_add(imm as i32)
                    .ok_or_else(|| Exception::overflow(self.address))?;
                self.result = sum;
                self.forward(ctx, RegisterRef::Gpr(rt), sum);
                Ok(())
            }
            Instruction::Addiu { rt, rs, imm } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                self.result = a.wrapping_add(imm as i32);
                self.forward(ctx, RegisterRef::Gpr(rt), self.result);
                Ok(())
            }
            Instruction::Lui { rt, imm } => {
                self.result = (imm as i32) << 16;
                self.forward(ctx, RegisterRef::Gpr(rt), self.result);
                Ok(())
            }
            Instruction::Lw { base, offset, .. }
            | Instruction::Sw { base, offset, .. }
            | Instruction::Lwc1 { base, offset, .. }
            | Instruction::Swc1 { base, offset, .. } => {
                let address = self.value(ctx, RegisterRef::Gpr(base))?;
                self.mem_address = (address as u32).wrapping_add(offset as i32 as u32);
                Ok(())
            }
            Instruction::Beq { rs, rt, offset } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                if a == b {
                    self.taken_jump = Some(self.branch_target(offset));
                }
                Ok(())
            }
            Instruction::Bne { rs, rt, offset } => {
                let a = self.value(ctx, RegisterRef::Gpr(rs))?;
                let b = self.value(ctx, RegisterRef::Gpr(rt))?;
                if a != b {
                    self.taken_jump = Some(self.branch_target(offset));
                }
                Ok(())
            }
            Instruction::J { target } => {
                let base = self.address.wrapping_add(4) & 0xF000_0000;
                self.taken_jump = Some(base | target << 2);
                Ok(())
            }
            Instruction::AddS { fd, fs, ft } => {
                let result = self.float_value(ctx, fs)? + self.float_value(ctx, ft)?;
                self.result = result.to_bits() as i32;
                self.forward(ctx, RegisterRef::Fpr(fd), self.result);
                Ok(())
            }
            Instruction::MulS { fd, fs, ft } => {
                let result = self.float_value(ctx, fs)? * self.float_value(ctx, ft)?;
                self.result = result.to_bits() as i32;
                self.forward(ctx, RegisterRef::Fpr(fd), self.result);
                Ok(())
            }
            Instruction::DivS { fd, fs, ft } => {
                let result = self.float_value(ctx, fs)? / self.float_value(ctx, ft)?;
                self.result = result.to_bits() as i32;
                self.forward(ctx, RegisterRef::Fpr(fd), self.result);
                Ok(())
            }
        }
    }

    pub fn memory(&mut self, ctx: &mut ExecContext<'_>) -> Result<(), PhaseError> {
        match self.instruction {
            Instruction::Lw { rt, .. } => {
                let word = ctx.memory.get_word(self.mem_address)?;
                self.result = word;
                self.forward(ctx, RegisterRef::Gpr(rt), word);
                Ok(())
            }
            Instruction::Lwc1 { ft, .. } => {
                let word = ctx.memory.get_word(self.mem_address)?;
                self.result = word;
                self.forward(ctx, RegisterRef::Fpr(ft), word);
                Ok(())
            }
            Instruction::Sw { rt, .. } => {
                let value = self.value(ctx, RegisterRef::Gpr(rt))?;
                let _ = ctx.memory.set_word(self.mem_address, value)?;
                Ok(())
            }
            Instruction::Swc1 { ft, .. } => {
                let value = self.value(ctx, RegisterRef::Fpr(ft))?;
                let _ = ctx.memory.set_word(self.mem_address, value)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn write_back(&mut self, ctx: &mut ExecContext<'_>) -> Result<(), PhaseError> {
        if let Some(destination) = self.destination() {
            let result = self.result;
            self.set_and_unlock(ctx, destination, result);
        }
        Ok(())
    }

    // endregion

    fn branch_target(&self, offset: i16) -> u32 {
        self.address
            .wrapping_add(4)
            .wrapping_add(((offset as i32) << 2) as u32)
    }

    fn float_value(&mut self, ctx: &mut ExecContext<'_>, reg: u8) -> Result<f32, PhaseError> {
        let bits = self.value(ctx, RegisterRef::Fpr(reg))?;
        Ok(f32::from_bits(bits as u32))
    }
}
