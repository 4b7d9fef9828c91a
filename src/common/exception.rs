//! Exception and error types.
//!
//! Runtime faults (address errors, reserved instructions, arithmetic
//! overflow) are represented as `Exception` values routed to the
//! simulation's interrupt manager. Configuration mistakes are represented
//! as `ConfigError` values and abort construction before any simulation
//! starts.

use std::fmt;

/// Cause of a runtime exception.
///
/// The numeric codes follow the MIPS32 `Cause.ExcCode` encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionCause {
    /// External or software interrupt.
    Interrupt,
    /// Misaligned or out-of-range address on a load or instruction fetch.
    AddressLoad,
    /// Misaligned or out-of-range address on a store.
    AddressStore,
    /// The fetched word does not decode to a known instruction.
    ReservedInstruction,
    /// Signed arithmetic overflow.
    ArithmeticOverflow,
}

impl ExceptionCause {
    /// Returns the MIPS32 exception code for this cause.
    pub fn code(self) -> u32 {
        match self {
            ExceptionCause::Interrupt => 0,
            ExceptionCause::AddressLoad => 4,
            ExceptionCause::AddressStore => 5,
            ExceptionCause::ReservedInstruction => 10,
            ExceptionCause::ArithmeticOverflow => 12,
        }
    }
}

/// A runtime fault raised during simulation.
///
/// Carries the faulting address (or the program counter for instruction
/// related causes). Exceptions are recovered through the interrupt
/// manager; they never abort the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exception {
    pub cause: ExceptionCause,
    pub value: u32,
}

impl Exception {
    pub fn new(cause: ExceptionCause, value: u32) -> Self {
        Self { cause, value }
    }

    pub fn address_load(address: u32) -> Self {
        Self::new(ExceptionCause::AddressLoad, address)
    }

    pub fn address_store(address: u32) -> Self {
        Self::new(ExceptionCause::AddressStore, address)
    }

    pub fn reserved_instruction(pc: u32) -> Self {
        Self::new(ExceptionCause::ReservedInstruction, pc)
    }

    pub fn overflow(pc: u32) -> Self {
        Self::new(ExceptionCause::ArithmeticOverflow, pc)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            ExceptionCause::Interrupt => write!(f, "interrupt"),
            ExceptionCause::AddressLoad => {
                write!(f, "address error on load at {:#010x}", self.value)
            }
            ExceptionCause::AddressStore => {
                write!(f, "address error on store at {:#010x}", self.value)
            }
            ExceptionCause::ReservedInstruction => {
                write!(f, "reserved instruction at {:#010x}", self.value)
            }
            ExceptionCause::ArithmeticOverflow => {
                write!(f, "arithmetic overflow at {:#010x}", self.value)
            }
        }
    }
}

/// A configuration violation detected at construction time.
///
/// These are programmer or configuration errors, not runtime conditions:
/// construction fails fast and no simulation is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A size field that must be a power of two is not.
    NotPowerOfTwo { field: &'static str, value: u32 },
    /// The set size exceeds the total number of blocks.
    SetSizeTooLarge { set_size: u32, blocks_amount: u32 },
    /// The block count is not a multiple of the set size.
    UnevenSets { set_size: u32, blocks_amount: u32 },
    /// A cache level references an unknown builder name.
    UnknownBuilder(String),
    /// A memory access fell outside every configured section.
    UnknownSection(u32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotPowerOfTwo { field, value } => {
                write!(f, "{field} must be a power of two, got {value}")
            }
            ConfigError::SetSizeTooLarge {
                set_size,
                blocks_amount,
            } => write!(
                f,
                "set size {set_size} exceeds the block count {blocks_amount}"
            ),
            ConfigError::UnevenSets {
                set_size,
                blocks_amount,
            } => write!(
                f,
                "block count {blocks_amount} is not a multiple of the set size {set_size}"
            ),
            ConfigError::UnknownBuilder(name) => write!(f, "unknown cache builder '{name}'"),
            ConfigError::UnknownSection(address) => {
                write!(f, "no memory section contains {address:#010x}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
