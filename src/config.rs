//! Configuration loading and parsing.
//!
//! The TOML configuration selects the driver architecture, the cache
//! hierarchy and the functional-unit mix. Cache levels name a builder
//! prototype from the registry and override individual geometry fields.
//! Every field carries a default so a partial (or empty) file is valid.

use serde::Deserialize;

use crate::common::ConfigError;
use crate::core::alu::{Alu, AluCollection};
use crate::mem::cache::{BuilderRegistry, PolicyKind};
use crate::mem::{MainMemory, MemoryLevel};
use crate::sim::SimulationData;

/// Which execution engine drives the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    MultiCycle,
    MultiAluPipelined,
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Cache levels, outermost (closest to the core) first.
    #[serde(default)]
    pub cache: Vec<CacheLevelConfig>,

    /// Functional units for the pipelined driver.
    #[serde(default)]
    pub alu: Vec<Alu>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_architecture")]
    pub architecture: Architecture,

    #[serde(default)]
    pub trace: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            architecture: default_architecture(),
            trace: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_undo")]
    pub undo: bool,

    #[serde(default = "default_forwarding")]
    pub forwarding: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            undo: default_undo(),
            forwarding: default_forwarding(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub big_endian: bool,
}

/// One cache level: a builder prototype name plus field overrides.
#[derive(Debug, Deserialize)]
pub struct CacheLevelConfig {
    pub builder: String,

    #[serde(default)]
    pub block_size: Option<u32>,

    #[serde(default)]
    pub blocks_amount: Option<u32>,

    #[serde(default)]
    pub set_size: Option<u32>,

    #[serde(default)]
    pub policy: Option<PolicyKind>,

    #[serde(default)]
    pub random_seed: Option<u64>,
}

fn default_architecture() -> Architecture {
    Architecture::MultiCycle
}

fn default_undo() -> bool {
    true
}

fn default_forwarding() -> bool {
    true
}

impl Config {
    /// Builds the memory chain: main memory wrapped by the configured
    /// cache levels, innermost built first.
    pub fn build_memory(&self, registry: &BuilderRegistry) -> Result<MemoryLevel, ConfigError> {
        let mut level = MemoryLevel::Main(MainMemory::mips32(self.memory.big_endian));
        for entry in self.cache.iter().rev() {
            let prototype = registry
                .get(&entry.builder)
                .ok_or_else(|| ConfigError::UnknownBuilder(entry.builder.clone()))?;
            let mut builder = prototype.clone();
            if let Some(block_size) = entry.block_size {
                builder.block_size = block_size;
            }
            if let Some(blocks_amount) = entry.blocks_amount {
                builder.blocks_amount = blocks_amount;
            }
            if let Some(set_size) = entry.set_size {
                builder.set_size = set_size;
            }
            if let Some(policy) = entry.policy {
                builder.policy = policy;
            }
            if let Some(seed) = entry.random_seed {
                builder.random_seed = Some(seed);
            }
            level = MemoryLevel::Cache(builder.build(level)?);
        }
        Ok(level)
    }

    /// The functional-unit pool for the pipelined driver; the standard
    /// mix when the configuration names none.
    pub fn build_alus(&self) -> AluCollection {
        if self.alu.is_empty() {
            AluCollection::new(AluCollection::default_units())
        } else {
            AluCollection::new(self.alu.clone())
        }
    }

    pub fn simulation_data(&self) -> SimulationData {
        SimulationData {
            undo_enabled: self.simulation.undo,
            forwarding_enabled: self.simulation.forwarding,
            trace: self.general.trace,
        }
    }
}
