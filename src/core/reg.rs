//! Registers and the register file.
//!
//! A register carries, besides its value, the list of in-flight
//! instruction ids that have locked it. The lock is an advisory hazard
//! flag consulted by the execution phases, not a synchronization
//! primitive: the single-threaded step drivers make real races
//! impossible, but the lock semantics are load-bearing for hazard
//! detection.

use crate::mem::main_memory::{GLOBAL_POINTER, STACK_POINTER};

/// Identifies a register of the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegisterRef {
    /// General-purpose register (0-31). Register 0 is hardwired to zero.
    Gpr(u8),
    /// Floating-point register (0-31), holding raw bits.
    Fpr(u8),
    Hi,
    Lo,
    Pc,
}

/// A single register: a 32-bit value plus its lock list.
#[derive(Clone, Debug, Default)]
pub struct Register {
    value: i32,
    default_value: i32,
    locked_by: Vec<u64>,
}

impl Register {
    pub fn new(default_value: i32) -> Self {
        Self {
            value: default_value,
            default_value,
            locked_by: Vec::new(),
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Writes the value, returning the previous one.
    pub fn set_value(&mut self, value: i32) -> i32 {
        let old = self.value;
        self.value = value;
        old
    }

    pub fn is_locked(&self) -> bool {
        !self.locked_by.is_empty()
    }

    /// Whether every holder of this register's lock is `id` itself.
    pub fn is_locked_only_by(&self, id: u64) -> bool {
        self.locked_by.iter().all(|&locker| locker == id)
    }

    /// Whether an instruction older than `id` holds the lock.
    pub fn is_locked_before(&self, id: u64) -> bool {
        self.locked_by.iter().any(|&locker| locker < id)
    }

    pub fn lock(&mut self, id: u64) {
        self.locked_by.push(id);
    }

    /// Releases one lock held by `id`. Returns whether a lock was
    /// actually released.
    pub fn unlock(&mut self, id: u64) -> bool {
        if let Some(position) = self.locked_by.iter().position(|&locker| locker == id) {
            let _ = self.locked_by.remove(position);
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.value = self.default_value;
        self.locked_by.clear();
    }
}

/// The complete register file: 32 general-purpose registers, 32
/// floating-point registers, `hi`/`lo` and the program counter.
#[derive(Clone)]
pub struct RegisterFile {
    gprs: Vec<Register>,
    fprs: Vec<Register>,
    hi: Register,
    lo: Register,
    pc: Register,
    saved: Option<Box<RegisterFile>>,
}

impl RegisterFile {
    /// Creates a file with the conventional MIPS32 start-up values:
    /// `$sp` at the top of the user stack, `$gp` in the static data
    /// segment, and the program counter at `pc`.
    pub fn new(pc: u32) -> Self {
        let mut gprs: Vec<Register> = (0..32).map(|_| Register::new(0)).collect();
        gprs[28] = Register::new(GLOBAL_POINTER as i32);
        gprs[29] = Register::new(STACK_POINTER as i32);
        Self {
            gprs,
            fprs: (0..32).map(|_| Register::new(0)).collect(),
            hi: Register::new(0),
            lo: Register::new(0),
            pc: Register::new(pc as i32),
            saved: None,
        }
    }

    pub fn reg(&self, reference: RegisterRef) -> &Register {
        match reference {
            RegisterRef::Gpr(index) => &self.gprs[index as usize],
            RegisterRef::Fpr(index) => &self.fprs[index as usize],
            RegisterRef::Hi => &self.hi,
            RegisterRef::Lo => &self.lo,
            RegisterRef::Pc => &self.pc,
        }
    }

    pub fn reg_mut(&mut self, reference: RegisterRef) -> &mut Register {
        match reference {
            RegisterRef::Gpr(index) => &mut self.gprs[index as usize],
            RegisterRef::Fpr(index) => &mut self.fprs[index as usize],
            RegisterRef::Hi => &mut self.hi,
            RegisterRef::Lo => &mut self.lo,
            RegisterRef::Pc => &mut self.pc,
        }
    }

    /// Reads a register value. Register `$zero` always reads 0.
    pub fn value(&self, reference: RegisterRef) -> i32 {
        match reference {
            RegisterRef::Gpr(0) => 0,
            other => self.reg(other).value(),
        }
    }

    /// Writes a register value, returning the previous one. Writes to
    /// `$zero` are silently ignored.
    pub fn set_value(&mut self, reference: RegisterRef, value: i32) -> i32 {
        match reference {
            RegisterRef::Gpr(0) => 0,
            other => self.reg_mut(other).set_value(value),
        }
    }

    pub fn pc(&self) -> u32 {
        self.pc.value() as u32
    }

    pub fn set_pc(&mut self, pc: u32) -> u32 {
        self.pc.set_value(pc as i32) as u32
    }

    /// Takes a snapshot used by [`RegisterFile::restore_state`].
    pub fn save_state(&mut self) {
        let mut copy = self.clone();
        copy.saved = None;
        self.saved = Some(Box::new(copy));
    }

    /// Restores the last snapshot, keeping it for later restores.
    pub fn restore_state(&mut self) {
        if let Some(saved) = self.saved.clone() {
            let keep = self.saved.take();
            *self = *saved;
            self.saved = keep;
        }
    }

    /// Resets every register to its default value and drops all locks.
    pub fn reset(&mut self) {
        for register in self.gprs.iter_mut().chain(self.fprs.iter_mut()) {
            register.reset();
        }
        self.hi.reset();
        self.lo.reset();
        self.pc.reset();
    }
}
