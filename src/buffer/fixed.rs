//! Fixed-size heap buffer

use crate::error::{BufMapError, Result};

use super::{BufferManager, CapacityPolicy};

/// A heap buffer that never changes size
///
/// Every allocation beyond its capacity reports `OutOfMemory`.
pub struct FixedBufferManager {
    data: Vec<u8>,
    policy: CapacityPolicy,
}

impl FixedBufferManager {
    /// Allocate a zeroed buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self> {
        Self::from_vec(vec![0u8; capacity])
    }

    /// Take ownership of existing bytes (for example a previously saved map)
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        let capacity = data.len();
        if capacity < crate::config::MIN_BUFFER_CAPACITY || capacity > crate::config::MAX_BUFFER_CAPACITY {
            return Err(BufMapError::Config(format!(
                "fixed buffer size {} is outside [{}, {}]",
                capacity,
                crate::config::MIN_BUFFER_CAPACITY,
                crate::config::MAX_BUFFER_CAPACITY
            )));
        }
        Ok(Self {
            data,
            policy: CapacityPolicy::fixed(capacity),
        })
    }

    /// Release the underlying bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl BufferManager for FixedBufferManager {
    fn buffer(&self) -> &[u8] {
        &self.data
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn min_capacity(&self) -> usize {
        self.policy.min_capacity()
    }

    fn max_capacity(&self) -> usize {
        self.policy.max_capacity()
    }

    fn growth_threshold(&self) -> usize {
        self.policy.growth_threshold()
    }

    fn shrinkage_threshold(&self) -> usize {
        self.policy.shrinkage_threshold()
    }

    fn grow(&mut self, required: usize) -> Result<()> {
        // a fixed policy has nothing to grow to once the bound check passes
        self.policy.plan_grow(required).map(|_| ())
    }

    fn shrink(&mut self, _required: usize) -> Result<()> {
        Ok(())
    }
}
