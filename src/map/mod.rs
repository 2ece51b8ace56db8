//! Map Module
//!
//! A hash map whose entries live entirely inside one flat byte buffer.
//!
//! ## Responsibilities
//! - get/put/remove/clear over binary keys and values
//! - Segregated free-list allocation with split and merge
//! - Incremental rehash (one bucket per operation)
//! - Incremental compaction (one step per operation), full compaction
//!   before the buffer shrinks
//! - Structural self-check and dump for debugging
//!
//! ## Operation Flow
//! ```text
//!   put(k, v)
//!     │
//!     ├─▶ compact_next()          one compaction step
//!     ├─▶ find_entry_block(k)     one rehash step, bucket walk
//!     ├─▶ allocate_block(cb)      grow check → free lists → compact_until
//!     ├─▶ link + close            header/key/value flushed to the buffer
//!     └─▶ check_modulo()          maybe start an incremental rehash
//! ```
//!
//! Blocks are addressed by offset. Handles onto them come from a small
//! fixed cache and are always closed before a public operation returns.

mod alloc;
mod cache;
mod chain;
mod check;
mod compact;
mod hash;
mod iter;
mod restore;

pub use cache::MAX_OPEN_BLOCKS;
pub use check::MapStats;
pub use hash::BUCKET_COUNTS;
pub use iter::{Entries, KeyCursor, Keys, Values};

use std::path::Path;

use tracing::warn;

use crate::binary::Binary;
use crate::block::{MAX_SIZE_CODES, MIN_ENTRY, NIL};
use crate::buffer::{BufferManager, DirectBufferManager, FixedBufferManager, MappedBufferManager};
use crate::config::Config;
use crate::error::{BufMapError, Result};

use cache::BlockCache;

/// Off-heap binary key/value map
///
/// ## Concurrency
/// All operations take `&mut self`; even reads advance the incremental
/// rehash. Share a map between threads through `SharedBinaryMap`.
pub struct BinaryMap<M: BufferManager> {
    /// Owner of the backing buffer
    manager: M,

    /// Load factors and validation switches
    config: Config,

    // -------------------------------------------------------------------------
    // Entry Accounting
    // -------------------------------------------------------------------------
    entries: usize,
    key_bytes: usize,
    value_bytes: usize,

    // -------------------------------------------------------------------------
    // Hash Directory
    // -------------------------------------------------------------------------
    /// Bucket heads; length is max(modulo, previous modulo) while rehashing
    buckets: Vec<u32>,
    bucket_level: usize,
    modulo: u32,
    prev_modulo: u32,
    grow_count: usize,
    shrink_count: usize,
    /// Next bucket to rehash, NIL when not rehashing
    next_rehash: u32,

    // -------------------------------------------------------------------------
    // Free Space
    // -------------------------------------------------------------------------
    /// Free list heads indexed by size code
    free_lists: [u32; MAX_SIZE_CODES],
    /// Where the next incremental compaction step starts
    next_compact: u32,
    last_block: u32,

    /// Open block handles
    cache: BlockCache,
}

// =============================================================================
// Construction
// =============================================================================

impl<M: BufferManager> BinaryMap<M> {
    /// Build an empty map over `manager` with default settings
    pub fn new(manager: M) -> Result<Self> {
        Self::with_config(manager, Config::default())
    }

    /// Build an empty map over `manager`
    ///
    /// Any existing buffer content is discarded; see `restore` to reuse it.
    pub fn with_config(manager: M, config: Config) -> Result<Self> {
        let mut map = Self::unformatted(manager, config)?;
        map.clear_buffer()?;
        if map.config.check_invariants {
            map.check("after construction")?;
        }
        Ok(map)
    }

    /// Map state with no blocks written yet
    fn unformatted(manager: M, config: Config) -> Result<Self> {
        config.validate()?;
        if manager.capacity() < crate::config::MIN_BUFFER_CAPACITY {
            return Err(BufMapError::Config(format!(
                "buffer of {} bytes is below the minimum of {}",
                manager.capacity(),
                crate::config::MIN_BUFFER_CAPACITY
            )));
        }

        let mut map = Self {
            manager,
            config,
            entries: 0,
            key_bytes: 0,
            value_bytes: 0,
            buckets: Vec::new(),
            bucket_level: 0,
            modulo: 0,
            prev_modulo: 0,
            grow_count: 0,
            shrink_count: 0,
            next_rehash: NIL,
            free_lists: [NIL; MAX_SIZE_CODES],
            next_compact: NIL,
            last_block: 0,
            cache: BlockCache::new(),
        };
        map.initialize_buckets();
        Ok(map)
    }

    /// The buffer manager
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Give up the map and return its buffer manager
    ///
    /// The buffer keeps its block structure and can be handed to `restore`.
    pub fn into_manager(self) -> M {
        self.manager
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl BinaryMap<FixedBufferManager> {
    /// Map over a heap buffer of exactly `capacity` bytes
    pub fn fixed(capacity: usize) -> Result<Self> {
        Self::new(FixedBufferManager::new(capacity)?)
    }
}

impl BinaryMap<DirectBufferManager> {
    /// Map over anonymous memory bounded by `config.buffer`
    pub fn direct(config: Config) -> Result<Self> {
        let manager = DirectBufferManager::new(&config.buffer)?;
        Self::with_config(manager, config)
    }
}

impl BinaryMap<MappedBufferManager> {
    /// Map over a new file at `path`
    pub fn create_mapped(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let manager = MappedBufferManager::create(path, &config.buffer)?;
        Self::with_config(manager, config)
    }

    /// Reopen the map stored in `path`, or create it if the file is missing
    pub fn open_mapped(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let manager = MappedBufferManager::open(path, &config.buffer)?;
            Self::restore(manager, config)
        } else {
            Self::create_mapped(path, config)
        }
    }
}

// =============================================================================
// Map Operations
// =============================================================================

impl<M: BufferManager> BinaryMap<M> {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn contains_key(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        self.guarded("containsKey()", |map| match map.find_entry_block(key)? {
            Some(r) => {
                map.close_block(r)?;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// True if `key` is present with exactly `value`
    pub fn contains_entry(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.get(key)?.map_or(false, |found| &found[..] == value.as_ref()))
    }

    /// Value stored for `key`
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Binary>> {
        let key = key.as_ref();
        self.guarded("get()", |map| match map.find_entry_block(key)? {
            Some(r) => {
                let value = map.block_value(r)?;
                map.close_block(r)?;
                Ok(Some(value))
            }
            None => Ok(None),
        })
    }

    /// Store `value` under `key`, returning the previous value
    ///
    /// A failed put leaves the map as it was.
    pub fn put(&mut self, key: impl Into<Binary>, value: impl Into<Binary>) -> Result<Option<Binary>> {
        let key = key.into();
        let value = value.into();
        key.validate("key")?;
        value.validate("value")?;
        self.guarded("put()", |map| map.put_entry(key, value))
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Binary>> {
        let key = key.as_ref();
        self.guarded("remove()", |map| map.remove_entry(key))
    }

    /// Remove every entry, leaving one free block spanning the buffer
    pub fn clear(&mut self) -> Result<()> {
        self.guarded("clear()", |map| map.clear_entries())
    }

    /// Every (key, value) pair in buffer order
    pub fn entries_snapshot(&mut self) -> Result<Vec<(Binary, Binary)>> {
        self.guarded("entries_snapshot()", |map| {
            let mut entries = Vec::with_capacity(map.entries);
            let mut of = 0;
            while of != NIL {
                let r = map.open_block(of)?;
                if map.blk(r).is_entry() {
                    let key = map.block_key(r)?;
                    let value = map.block_value(r)?;
                    entries.push((key, value));
                }
                of = map.blk(r).next_block();
                map.close_block(r)?;
            }
            Ok(entries)
        })
    }

    // -------------------------------------------------------------------------
    // Capacity Accounting
    // -------------------------------------------------------------------------

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.manager.capacity()
    }

    /// Bytes taken by entry headers, keys and values
    pub fn used_capacity(&self) -> usize {
        self.entries * MIN_ENTRY + self.key_bytes + self.value_bytes
    }

    pub fn free_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.used_capacity())
    }

    pub fn is_strict(&self) -> bool {
        self.config.strict
    }

    pub(crate) fn capacity_u32(&self) -> u32 {
        self.manager.capacity() as u32
    }

    // -------------------------------------------------------------------------
    // Operation Bodies
    // -------------------------------------------------------------------------

    /// Run `op` between optional invariant checks; abandon open handles if
    /// it fails
    fn guarded<T>(&mut self, desc: &str, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.config.check_invariants {
            self.check(&format!("before {}", desc))?;
        }

        let result = op(self);
        if result.is_err() {
            self.cache.reset();
        }
        let value = result?;

        if self.config.check_invariants {
            self.check(&format!("after {}", desc))?;
        }
        Ok(value)
    }

    fn put_entry(&mut self, key: Binary, value: Binary) -> Result<Option<Binary>> {
        self.compact_next()?;

        let mut r = match self.find_entry_block(&key)? {
            Some(r) => r,
            None => {
                self.store_entry(key, value)?;
                self.check_modulo()?;
                return Ok(None);
            }
        };

        let old = self.block_value(r)?;
        let dif = value.len() as i64 - old.len() as i64;
        let fill = self.block_fill(r) as i64;

        if dif > fill {
            // verify that the data will fit in the map
            let grow = (dif - fill) as usize;
            let headroom = self.free_capacity()
                + self.manager.max_capacity().saturating_sub(self.manager.capacity());
            if grow > headroom {
                self.close_block(r)?;
                warn!(required = grow, available = self.free_capacity(), "Out of memory on put");
                return Err(BufMapError::out_of_memory(grow, self.free_capacity()));
            }

            let len = self.block_len(r) as usize;
            self.forget_entry(key.len(), old.len());
            self.free_block(r)?;

            r = match self.allocate_block(len + grow) {
                Ok(r) => r,
                Err(e) if e.is_out_of_memory() => {
                    warn!(key_len = key.len(), "Relocation failed; restoring previous value");
                    self.store_entry(key, old)?;
                    return Err(e);
                }
                Err(e) => return Err(e),
            };
            self.count_entry(key.len(), old.len());
            self.blk_mut(r).set_key(key);
            self.link(r)?;
        } else if dif < 0 && self.config.strict {
            self.clear_block_value(r)?;
        }

        let new_len = value.len();
        self.blk_mut(r).set_value(value);
        self.close_block(r)?;
        self.value_bytes = self.value_bytes - old.len() + new_len;

        // if the entry got smaller, consider shrinking the buffer
        if dif < 0 {
            self.check_buffer_shrink()?;
        }

        Ok(Some(old))
    }

    /// Allocate, fill and link a new entry block
    fn store_entry(&mut self, key: Binary, value: Binary) -> Result<()> {
        let (key_len, value_len) = (key.len(), value.len());
        let r = self.allocate_block(MIN_ENTRY + key_len + value_len)?;
        self.blk_mut(r).set_key(key);
        self.blk_mut(r).set_value(value);
        self.link(r)?;
        self.close_block(r)?;
        self.count_entry(key_len, value_len);
        Ok(())
    }

    fn remove_entry(&mut self, key: &[u8]) -> Result<Option<Binary>> {
        let r = match self.find_entry_block(key)? {
            Some(r) => r,
            None => return Ok(None),
        };

        let value = self.block_value(r)?;
        let (key_len, value_len) = (self.blk(r).key_len() as usize, self.blk(r).value_len() as usize);
        self.forget_entry(key_len, value_len);
        let empty = self.entries == 0;

        self.free_block(r)?;

        if empty {
            self.clear_entries()?;
        }

        // incremental compact after the remove
        self.compact_next()?;
        self.check_buffer_shrink()?;

        Ok(Some(value))
    }

    fn clear_entries(&mut self) -> Result<()> {
        self.clear_free_lists();
        self.initialize_buckets();
        self.clear_buffer()?;
        self.check_buffer_shrink()
    }

    fn count_entry(&mut self, key_len: usize, value_len: usize) {
        self.entries += 1;
        self.key_bytes += key_len;
        self.value_bytes += value_len;
    }

    fn forget_entry(&mut self, key_len: usize, value_len: usize) {
        self.entries -= 1;
        self.key_bytes -= key_len;
        self.value_bytes -= value_len;
    }
}
