//! Cache construction.
//!
//! A `CacheBuilder` is a validated configuration descriptor: it carries
//! the organization, write policy and geometry of a cache and produces a
//! configured instance wrapping a parent memory level. The
//! `BuilderRegistry` maps builder names to default descriptors; the
//! configuration layer looks prototypes up there instead of consulting
//! process-wide statics.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::common::ConfigError;
use crate::mem::cache::policy::{PolicyKind, ReplacementPolicy};
use crate::mem::cache::{Cache, Mapping, WritePolicy};
use crate::mem::level::MemoryLevel;

/// How addresses map to candidate slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum CacheOrganization {
    Direct,
    Associative,
    SetAssociative,
}

/// A typed, named configuration field of a builder.
///
/// Consumed by external configuration front ends; the core only
/// guarantees the names and types are stable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub value: PropertyValue,
}

/// Value of a builder property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyValue {
    Integer(u32),
    Policy(PolicyKind),
    Organization(CacheOrganization),
    WritePolicy(WritePolicy),
}

fn default_block_size() -> u32 {
    4
}

fn default_blocks_amount() -> u32 {
    16
}

fn default_set_size() -> u32 {
    2
}

fn default_policy() -> PolicyKind {
    PolicyKind::Lru
}

/// A cache configuration descriptor.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheBuilder {
    pub organization: CacheOrganization,
    pub write_policy: WritePolicy,

    /// Block size in words. Must be a power of two.
    #[serde(default = "default_block_size")]
    pub block_size: u32,

    /// Total number of blocks. Must be a power of two.
    #[serde(default = "default_blocks_amount")]
    pub blocks_amount: u32,

    /// Blocks per set. Only meaningful for set-associative caches.
    #[serde(default = "default_set_size")]
    pub set_size: u32,

    /// Replacement policy for associative organizations.
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,

    /// Seed for the RANDOM policy. `None` seeds from entropy.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl CacheBuilder {
    /// Creates a descriptor with default geometry for the given
    /// organization and write policy.
    pub fn new(organization: CacheOrganization, write_policy: WritePolicy) -> Self {
        Self {
            organization,
            write_policy,
            block_size: default_block_size(),
            blocks_amount: default_blocks_amount(),
            set_size: default_set_size(),
            policy: default_policy(),
            random_seed: None,
        }
    }

    /// Validates the descriptor and builds a cache wrapping `parent`.
    pub fn build(&self, parent: MemoryLevel) -> Result<Cache, ConfigError> {
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "block_size",
                value: self.block_size,
            });
        }
        if !self.blocks_amount.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "blocks_amount",
                value: self.blocks_amount,
            });
        }

        let block_bits = self.block_size.trailing_zeros();
        let mapping;
        let tag_size;

        match self.organization {
            CacheOrganization::Direct => {
                mapping = Mapping::Direct {
                    index_shift: 2 + block_bits,
                };
                tag_size = 32 - 2 - block_bits - self.blocks_amount.trailing_zeros();
            }
            CacheOrganization::Associative => {
                mapping = Mapping::Associative;
                tag_size = 32 - 2 - block_bits;
            }
            CacheOrganization::SetAssociative => {
                if !self.set_size.is_power_of_two() {
                    return Err(ConfigError::NotPowerOfTwo {
                        field: "set_size",
                        value: self.set_size,
                    });
                }
                if self.set_size > self.blocks_amount {
                    return Err(ConfigError::SetSizeTooLarge {
                        set_size: self.set_size,
                        blocks_amount: self.blocks_amount,
                    });
                }
                if self.blocks_amount % self.set_size != 0 {
                    return Err(ConfigError::UnevenSets {
                        set_size: self.set_size,
                        blocks_amount: self.blocks_amount,
                    });
                }
                let sets_amount = self.blocks_amount / self.set_size;
                mapping = Mapping::SetAssociative {
                    set_shift: 2 + block_bits,
                    sets_amount,
                    set_size: self.set_size,
                };
                tag_size = 32 - 2 - block_bits - sets_amount.trailing_zeros();
            }
        }

        let policy = ReplacementPolicy::new(self.policy, self.random_seed);
        Ok(Cache::from_parts(
            self.clone(),
            parent,
            tag_size,
            mapping,
            self.write_policy,
            policy,
        ))
    }

    /// The typed configuration fields of this descriptor.
    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property {
                name: "organization",
                value: PropertyValue::Organization(self.organization),
            },
            Property {
                name: "write_policy",
                value: PropertyValue::WritePolicy(self.write_policy),
            },
            Property {
                name: "block_size",
                value: PropertyValue::Integer(self.block_size),
            },
            Property {
                name: "blocks_amount",
                value: PropertyValue::Integer(self.blocks_amount),
            },
        ];
        match self.organization {
            CacheOrganization::Direct => {}
            CacheOrganization::Associative => properties.push(Property {
                name: "policy",
                value: PropertyValue::Policy(self.policy),
            }),
            CacheOrganization::SetAssociative => {
                properties.push(Property {
                    name: "set_size",
                    value: PropertyValue::Integer(self.set_size),
                });
                properties.push(Property {
                    name: "policy",
                    value: PropertyValue::Policy(self.policy),
                });
            }
        }
        properties
    }
}

/// An explicit registry of named builder prototypes.
///
/// Passed into the configuration path; cloning a prototype and applying
/// overrides yields the descriptor for a concrete level.
#[derive(Clone, Debug, Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<String, CacheBuilder>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the six standard organizations.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let combinations = [
            ("write-through-direct", CacheOrganization::Direct, WritePolicy::WriteThrough),
            ("write-through-associative", CacheOrganization::Associative, WritePolicy::WriteThrough),
            ("write-through-set-associative", CacheOrganization::SetAssociative, WritePolicy::WriteThrough),
            ("write-back-direct", CacheOrganization::Direct, WritePolicy::WriteBack),
            ("write-back-associative", CacheOrganization::Associative, WritePolicy::WriteBack),
            ("write-back-set-associative", CacheOrganization::SetAssociative, WritePolicy::WriteBack),
        ];
        for (name, organization, write_policy) in combinations {
            registry.register(name, CacheBuilder::new(organization, write_policy));
        }
        registry
    }

    pub fn register(&mut self, name: &str, builder: CacheBuilder) {
        let _ = self.builders.insert(name.to_string(), builder);
    }

    pub fn get(&self, name: &str) -> Option<&CacheBuilder> {
        self.builders.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }
}
