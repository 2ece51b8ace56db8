//! Memory-mapped file buffer
//!
//! The file bytes are exactly the buffer contents; there is no separate
//! header or footer. The file length always equals the current capacity.
//!
//! ## Lifecycle
//! - `create`: new file sized to the initial capacity
//! - `open`: reuse an existing file (see `BinaryMap::restore`)
//! - `flush` / `close`: write dirty pages back
//! - `destroy`: unmap and delete the file

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info};

use crate::config::BufferConfig;
use crate::error::{BufMapError, Result};

use super::{BufferManager, CapacityPolicy};

/// File-backed buffer that grows and shrinks by resizing the file
pub struct MappedBufferManager {
    path: PathBuf,
    file: File,
    map: MmapMut,
    policy: CapacityPolicy,
}

impl MappedBufferManager {
    /// Create (or truncate) the file at `path`
    pub fn create(path: impl AsRef<Path>, config: &BufferConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let policy = CapacityPolicy::new(config)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(policy.capacity() as u64)?;

        // Safety: the file is owned by this manager for the lifetime of the map
        let map = unsafe { MmapOptions::new().map_mut(&file)? };

        info!(
            path = %path.display(),
            capacity = policy.capacity(),
            "Created mapped buffer"
        );

        Ok(Self { path, file, map, policy })
    }

    /// Open an existing file; its length becomes the current capacity
    pub fn open(path: impl AsRef<Path>, config: &BufferConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        config.validate()?;

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len() as usize;
        if len < config.initial_capacity || len > config.max_capacity {
            return Err(BufMapError::Config(format!(
                "mapped file {} has length {} outside [{}, {}]",
                path.display(),
                len,
                config.initial_capacity,
                config.max_capacity
            )));
        }

        // Safety: the file is owned by this manager for the lifetime of the map
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        let policy = CapacityPolicy::with_bounds(
            len,
            config.initial_capacity,
            config.max_capacity,
            config.max_increment,
        );

        info!(path = %path.display(), capacity = len, "Opened mapped buffer");

        Ok(Self { path, file, map, policy })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    /// Write modified pages back to the file
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Flush and release the mapping, leaving the file in place
    pub fn close(self) -> Result<()> {
        self.flush()?;
        debug!(path = %self.path.display(), "Closed mapped buffer");
        Ok(())
    }

    /// Release the mapping and delete the file
    pub fn destroy(self) -> Result<()> {
        let Self { path, file, map, .. } = self;
        drop(map);
        drop(file);
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "Destroyed mapped buffer");
        Ok(())
    }

    fn resize(&mut self, capacity: usize) -> Result<()> {
        let old = self.policy.capacity();
        self.map.flush()?;
        self.file.set_len(capacity as u64)?;

        // Safety: see `create`
        self.map = unsafe { MmapOptions::new().map_mut(&self.file)? };
        self.policy.set_capacity(capacity);

        info!(
            path = %self.path.display(),
            old_capacity = old,
            new_capacity = capacity,
            "Resized mapped buffer"
        );
        Ok(())
    }
}

impl BufferManager for MappedBufferManager {
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
