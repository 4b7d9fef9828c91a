//! Functional units and the lease pool.
//!
//! An `Alu` describes one functional unit: its kind and how many cycles
//! an operation occupies it. The `AluCollection` hands out exclusive
//! leases: a checkout removes the unit from the available map, a release
//! re-inserts it. An index is never in both states at once and the total
//! unit count is constant across checkout/release cycles.

use std::collections::BTreeMap;

use serde::Deserialize;

/// The kind of operation a functional unit performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum AluType {
    Integer,
    FloatAddition,
    FloatMultiplication,
    FloatDivision,
}

/// One functional unit.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Alu {
    pub kind: AluType,
    pub cycles_required: u32,
}

impl Alu {
    pub fn new(kind: AluType, cycles_required: u32) -> Self {
        Self {
            kind,
            cycles_required,
        }
    }
}

/// An exclusive-lease pool of functional units.
#[derive(Clone, Debug)]
pub struct AluCollection {
    alus: Vec<Alu>,
    available: BTreeMap<usize, Alu>,
}

impl AluCollection {
    pub fn new(alus: Vec<Alu>) -> Self {
        let available = alus.iter().copied().enumerate().collect();
        Self { alus, available }
    }

    /// The conventional unit mix: two integer units plus one unit per
    /// floating-point operation class.
    pub fn default_units() -> Vec<Alu> {
        vec![
            Alu::new(AluType::Integer, 1),
            Alu::new(AluType::Integer, 1),
            Alu::new(AluType::FloatAddition, 4),
            Alu::new(AluType::FloatMultiplication, 7),
            Alu::new(AluType::FloatDivision, 23),
        ]
    }

    pub fn alus(&self) -> &[Alu] {
        &self.alus
    }

    pub fn len(&self) -> usize {
        self.alus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alus.is_empty()
    }

    /// Number of units currently available for checkout.
    pub fn available(&self) -> usize {
        self.available.len()
    }

    /// Leases the lowest-indexed available unit of the given kind.
    /// Returns `None` when every matching unit is checked out; the
    /// caller must stall.
    pub fn request(&mut self, kind: AluType) -> Option<(usize, Alu)> {
        let index = self
            .available
            .iter()
            .find(|(_, alu)| alu.kind == kind)
            .map(|(&index, _)| index)?;
        let alu = self.available.remove(&index)?;
        Some((index, alu))
    }

    /// Returns a leased unit to the pool.
    pub fn release(&mut self, index: usize) {
        debug_assert!(
            !self.available.contains_key(&index),
            "functional unit {index} released twice"
        );
        let _ = self.available.insert(index, self.alus[index]);
    }

    /// Makes every unit available again. Used on simulation reset.
    pub fn reset(&mut self) {
        self.available = self.alus.iter().copied().enumerate().collect();
    }
}
