//! Configuration for bufmap
//!
//! Centralized configuration with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::error::{BufMapError, Result};

/// Smallest buffer a map can be built on
pub const MIN_BUFFER_CAPACITY: usize = 64;

/// Largest buffer a map can address (offsets are 31-bit)
pub const MAX_BUFFER_CAPACITY: usize = i32::MAX as usize;

/// Default upper bound for a single growth step
pub const DEFAULT_MAX_INCREMENT: usize = 64 * 1024 * 1024;

/// Main configuration for a BinaryMap instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Hash Directory Configuration
    // -------------------------------------------------------------------------
    /// Ratio of entries to modulo at which the modulo grows
    /// (the default 0.875 grows once the key count reaches 87.5% of the modulo)
    pub max_load_factor: f64,

    /// Ratio of entries to the next lower modulo at which the modulo
    /// shrinks; must be smaller than `max_load_factor`
    pub min_load_factor: f64,

    // -------------------------------------------------------------------------
    // Validation Configuration
    // -------------------------------------------------------------------------
    /// Wipe unused portions of the buffer (slower, hides stale data)
    pub strict: bool,

    /// Run the structural check before and after every public operation
    pub check_invariants: bool,

    // -------------------------------------------------------------------------
    // Buffer Configuration
    // -------------------------------------------------------------------------
    pub buffer: BufferConfig,
}

/// Capacity bounds for a buffer manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Starting capacity; also the capacity the buffer never shrinks below
    pub initial_capacity: usize,

    /// Capacity the buffer never grows beyond
    pub max_capacity: usize,

    /// Largest number of bytes added by one doubling step
    pub max_increment: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            max_capacity: 64 * 1024 * 1024, // 64 MB
            max_increment: DEFAULT_MAX_INCREMENT,
        }
    }
}

impl BufferConfig {
    /// Verify the capacity bounds
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity < MIN_BUFFER_CAPACITY {
            return Err(BufMapError::Config(format!(
                "initial capacity {} is below the minimum of {}",
                self.initial_capacity, MIN_BUFFER_CAPACITY
            )));
        }
        if self.max_capacity > MAX_BUFFER_CAPACITY {
            return Err(BufMapError::Config(format!(
                "max capacity {} exceeds the addressable maximum of {}",
                self.max_capacity, MAX_BUFFER_CAPACITY
            )));
        }
        if self.initial_capacity > self.max_capacity {
            return Err(BufMapError::Config(format!(
                "initial capacity {} exceeds max capacity {}",
                self.initial_capacity, self.max_capacity
            )));
        }
        if self.max_increment == 0 {
            return Err(BufMapError::Config("max increment must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_load_factor: 0.875,
            min_load_factor: 0.750,
            strict: false,
            check_invariants: false,
            buffer: BufferConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Verify load factors and capacity bounds
    pub fn validate(&self) -> Result<()> {
        let max = self.max_load_factor;
        let min = self.min_load_factor;
        if !(max > 0.0 && max <= 8.0) {
            return Err(BufMapError::Config(format!(
                "Illegal MaxLoadFactor value ({}); MaxLoadFactor is a percentage such that 100% is expressed as 1.00",
                max
            )));
        }
        if !(min > 0.0 && min <= 8.0) {
            return Err(BufMapError::Config(format!(
                "Illegal MinLoadFactor value ({}); MinLoadFactor is a percentage such that 100% is expressed as 1.00",
                min
            )));
        }
        if min >= max {
            return Err(BufMapError::Config(format!(
                "Illegal threshold values (MaxLoadFactor={}, MinLoadFactor={}); MinLoadFactor must be smaller than MaxLoadFactor",
                max, min
            )));
        }
        self.buffer.validate()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the load factor at which the modulo grows
    pub fn max_load_factor(mut self, factor: f64) -> Self {
        self.config.max_load_factor = factor;
        self
    }

    /// Set the load factor at which the modulo shrinks
    pub fn min_load_factor(mut self, factor: f64) -> Self {
        self.config.min_load_factor = factor;
        self
    }

    /// Enable or disable wiping of unused buffer space
    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    /// Enable or disable the structural check around every operation
    pub fn check_invariants(mut self, check: bool) -> Self {
        self.config.check_invariants = check;
        self
    }

    /// Set the initial (and minimum) buffer capacity in bytes
    pub fn initial_capacity(mut self, bytes: usize) -> Self {
        self.config.buffer.initial_capacity = bytes;
        self
    }

    /// Set the maximum buffer capacity in bytes
    pub fn max_capacity(mut self, bytes: usize) -> Self {
        self.config.buffer.max_capacity = bytes;
        self
    }

    /// Set the largest single growth step in bytes
    pub fn max_increment(mut self, bytes: usize) -> Self {
        self.config.buffer.max_increment = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
