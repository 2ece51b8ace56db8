//! Capacity policy
//!
//! Grow/shrink arithmetic shared by every resizable buffer manager.

use crate::config::BufferConfig;
use crate::error::{BufMapError, Result};

/// Fraction of capacity above which the buffer grows
const GROWTH_FACTOR: f64 = 0.90;

/// Fraction of capacity below which the buffer shrinks
const SHRINKAGE_FACTOR: f64 = 0.40;

/// Capacity bounds and the thresholds derived from the current capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPolicy {
    capacity: usize,
    min_capacity: usize,
    max_capacity: usize,
    max_increment: usize,
    growth_threshold: usize,
    shrinkage_threshold: usize,
}

impl CapacityPolicy {
    /// Create a policy starting at `initial`, which is also the minimum
    pub fn new(config: &BufferConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_bounds(
            config.initial_capacity,
            config.initial_capacity,
            config.max_capacity,
            config.max_increment,
        ))
    }

    /// Create a policy with an explicit current capacity
    pub fn with_bounds(capacity: usize, min_capacity: usize, max_capacity: usize, max_increment: usize) -> Self {
        let mut policy = Self {
            capacity,
            min_capacity,
            max_capacity,
            max_increment: max_increment.max(1),
            growth_threshold: 0,
            shrinkage_threshold: 0,
        };
        policy.calibrate();
        policy
    }

    /// A policy that never resizes
    pub fn fixed(capacity: usize) -> Self {
        Self::with_bounds(capacity, capacity, capacity, capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn max_increment(&self) -> usize {
        self.max_increment
    }

    pub fn growth_threshold(&self) -> usize {
        self.growth_threshold
    }

    pub fn shrinkage_threshold(&self) -> usize {
        self.shrinkage_threshold
    }

    /// Capacity needed so that `required` bytes sit under the growth
    /// threshold; `None` if the current capacity already suffices
    pub fn plan_grow(&self, required: usize) -> Result<Option<usize>> {
        if required > self.max_capacity {
            return Err(BufMapError::out_of_memory(required, self.max_capacity));
        }

        let mut plan = *self;
        while required > plan.growth_threshold {
            let step = plan.capacity.min(plan.max_increment);
            let next = (plan.capacity + step).min(plan.max_capacity);
            if next == plan.capacity {
                break;
            }
            plan.capacity = next;
            plan.calibrate();
        }

        Ok((plan.capacity != self.capacity).then_some(plan.capacity))
    }

    /// Capacity to shrink to while keeping room for `required` bytes;
    /// `None` if no shrink is called for
    pub fn plan_shrink(&self, required: usize) -> Option<usize> {
        let mut plan = *self;
        while required < plan.shrinkage_threshold {
            let next = (plan.capacity / 2).max(plan.min_capacity);
            if next < required || next == plan.capacity {
                break;
            }
            plan.capacity = next;
            plan.calibrate();
        }

        (plan.capacity != self.capacity).then_some(plan.capacity)
    }

    /// Record a completed resize
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.calibrate();
    }

    fn calibrate(&mut self) {
        let capacity = self.capacity;

        self.growth_threshold = if capacity >= self.max_capacity {
            capacity
        } else {
            ((capacity as f64 * GROWTH_FACTOR) as usize).min(self.max_capacity)
        };

        self.shrinkage_threshold = if capacity <= self.min_capacity {
            0
        } else {
            ((capacity as f64 * SHRINKAGE_FACTOR) as usize).max(self.min_capacity)
        };
    }
}
