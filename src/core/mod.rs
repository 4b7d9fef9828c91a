//! CPU core components.
//!
//! The register file with its advisory hazard locks, the functional-unit
//! pool, and the per-instruction execution objects stepped through the
//! pipeline phases by the simulation drivers.

/// Functional unit descriptors and the exclusive lease pool.
pub mod alu;

/// Per-instruction execution objects and phase primitives.
pub mod exec;

/// Registers and the register file.
pub mod reg;

pub use alu::{Alu, AluCollection, AluType};
pub use exec::{ExecContext, Execution, ForwardingTable, PhaseError};
pub use reg::{Register, RegisterFile, RegisterRef};
