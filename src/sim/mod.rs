//! Simulation drivers.
//!
//! Two execution engines share the register file, memory chain and
//! execution objects: the multi-cycle driver runs one instruction at a
//! time through discrete steps and keeps a bounded undo history; the
//! multi-ALU pipelined driver keeps several instructions in flight with
//! hazard detection, forwarding and exclusive functional-unit leases.

/// Reversible step mutations and the undo record.
pub mod changes;

/// Program loading helpers.
pub mod loader;

/// The multi-cycle driver with undo support.
pub mod multicycle;

/// The multi-ALU pipelined driver.
pub mod pipeline;

pub use changes::{Change, StepChanges};
pub use multicycle::{MultiCycleSimulation, MultiCycleStep, MAX_CHANGES};
pub use pipeline::MultiAluPipelinedSimulation;

/// Behavioral switches shared by the drivers.
#[derive(Clone, Copy, Debug)]
pub struct SimulationData {
    /// Record a reversible change list per step.
    pub undo_enabled: bool,
    /// Resolve read-after-write hazards through the forwarding table
    /// instead of stalling until write-back.
    pub forwarding_enabled: bool,
    /// Emit per-step traces to stderr.
    pub trace: bool,
}

impl Default for SimulationData {
    fn default() -> Self {
        Self {
            undo_enabled: true,
            forwarding_enabled: true,
            trace: false,
        }
    }
}
