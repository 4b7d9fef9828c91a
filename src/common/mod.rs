//! Common types shared across the MIPS simulator.
//!
//! This module provides the exception and configuration-error types used
//! throughout the memory hierarchy and the execution engines.

/// Runtime exception and configuration error definitions.
pub mod exception;

pub use exception::{ConfigError, Exception, ExceptionCause};
