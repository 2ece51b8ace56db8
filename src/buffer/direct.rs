//! Direct (native memory) buffer
//!
//! Backed by an anonymous memory map so the stored data lives outside the
//! allocator heap. Resizing maps a fresh region and copies the common prefix.

use memmap2::MmapMut;
use tracing::info;

use crate::config::BufferConfig;
use crate::error::Result;

use super::{BufferManager, CapacityPolicy};

/// Anonymous-memory buffer that grows and shrinks within its policy
pub struct DirectBufferManager {
    map: MmapMut,
    policy: CapacityPolicy,
}

impl DirectBufferManager {
    /// Map `config.initial_capacity` bytes of zeroed memory
    pub fn new(config: &BufferConfig) -> Result<Self> {
        let policy = CapacityPolicy::new(config)?;
        let map = MmapMut::map_anon(policy.capacity())?;
        Ok(Self { map, policy })
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    fn resize(&mut self, capacity: usize) -> Result<()> {
        let old = self.policy.capacity();
        let mut map = MmapMut::map_anon(capacity)?;
        let keep = old.min(capacity);
        map[..keep].copy_from_slice(&self.map[..keep]);
        self.map = map;
        self.policy.set_capacity(capacity);

        info!(old_capacity = old, new_capacity = capacity, "Resized direct buffer");
        Ok(())
    }
}

impl BufferManager for DirectBufferManager {
    fn buffer(&self) -> &[u8] {
        &self.map
    }

    fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.map
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
        match self.policy.plan_grow(required)? {
            Some(capacity) => self.resize(capacity),
            None => Ok(()),
        }
    }

    fn shrink(&mut self, required: usize) -> Result<()> {
        match self.policy.plan_shrink(required) {
            Some(capacity) => self.resize(capacity),
            None => Ok(()),
        }
    }
}
