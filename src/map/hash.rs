//! Hash directory
//!
//! Bucket heads, modulo selection and incremental rehash.
//!
//! ## Incremental Rehash
//! ```text
//!   modulo change:  prev_modulo = modulo, modulo = BUCKET_COUNTS[level ± 1]
//!                   buckets.len() = max(modulo, prev_modulo)
//!
//!   every lookup:   rehash bucket next_rehash (old layout → new layout)
//!                   next_rehash += 1 until it reaches prev_modulo
//!
//!   lookup:         bucket(hash % modulo), then bucket(hash % prev_modulo)
//! ```

use tracing::debug;

use crate::binary::hash_bytes;
use crate::block::NIL;
use crate::buffer::BufferManager;
use crate::error::Result;

use super::cache::BlockRef;
use super::BinaryMap;

/// Pre-selected modulos, one per bucket level
pub const BUCKET_COUNTS: [u32; 12] = [
    7, 47, 199, 797, 3191, 12799, 51199, 204797, 819187, 3276799, 13107197, 52428767,
];

impl<M: BufferManager> BinaryMap<M> {
    // =========================================================================
    // Directory State
    // =========================================================================

    /// Reset to the smallest level with every bucket empty
    pub(super) fn initialize_buckets(&mut self) {
        self.buckets.clear();
        self.set_bucket_level(0);
        self.set_bucket_count(self.modulo as usize);
        self.prev_modulo = self.modulo;
        self.next_rehash = NIL;
    }

    pub(super) fn set_bucket_level(&mut self, level: usize) {
        let level = level.min(BUCKET_COUNTS.len() - 1);
        self.bucket_level = level;

        let modulo = BUCKET_COUNTS[level];
        let shrink_modulo = if level == 0 { 0 } else { BUCKET_COUNTS[level - 1] };

        self.modulo = modulo;
        self.grow_count = if level == BUCKET_COUNTS.len() - 1 {
            // no modulo to grow to
            usize::MAX
        } else {
            (modulo as f64 * self.config.max_load_factor) as usize
        };
        self.shrink_count = (shrink_modulo as f64 * self.config.min_load_factor) as usize;
    }

    /// Resize the bucket array, keeping existing heads
    pub(super) fn set_bucket_count(&mut self, count: usize) {
        self.buckets.resize(count, NIL);
    }

    pub(super) fn clear_bucket_offsets(&mut self) {
        self.buckets.fill(NIL);
    }

    pub(super) fn clear_free_lists(&mut self) {
        self.free_lists.fill(NIL);
    }

    pub(super) fn calculate_bucket(&self, hash: u32) -> usize {
        (hash % self.modulo) as usize
    }

    pub(super) fn calculate_previous_bucket(&self, hash: u32) -> usize {
        (hash % self.prev_modulo) as usize
    }

    /// Number of buckets currently allocated
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_level(&self) -> usize {
        self.bucket_level
    }

    pub fn modulo(&self) -> u32 {
        self.modulo
    }

    pub fn previous_modulo(&self) -> u32 {
        self.prev_modulo
    }

    pub fn is_rehashing(&self) -> bool {
        self.modulo != self.prev_modulo
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Locate the entry block for `key`; the caller must close it
    pub(super) fn find_entry_block(&mut self, key: &[u8]) -> Result<Option<BlockRef>> {
        // incremental rehash
        self.rehash_next()?;

        let hash = hash_bytes(key);
        let bucket = self.calculate_bucket(hash);
        if let Some(r) = self.search_bucket(bucket, hash, key)? {
            return Ok(Some(r));
        }

        // the key may not have been rehashed yet
        if self.is_rehashing() {
            let previous = self.calculate_previous_bucket(hash);
            if previous != bucket {
                return self.search_bucket(previous, hash, key);
            }
        }

        Ok(None)
    }

    fn search_bucket(&mut self, bucket: usize, hash: u32, key: &[u8]) -> Result<Option<BlockRef>> {
        let mut of = self.buckets[bucket];
        while of != NIL {
            let r = self.open_block(of)?;
            let block = self.blk(r);
            if block.key_hash() == hash && block.key_len() as usize == key.len() {
                let found = self.block_key(r)?;
                if &found[..] == key {
                    return Ok(Some(r));
                }
            }
            of = self.blk(r).next_node();
            self.close_block(r)?;
        }
        Ok(None)
    }

    // =========================================================================
    // Modulo Management
    // =========================================================================

    /// Move to the next bucket level up or down once the entry count
    /// crosses a threshold
    pub(super) fn check_modulo(&mut self) -> Result<()> {
        let entries = self.entries;
        let delta: isize = if entries < self.shrink_count {
            -1
        } else if entries >= self.grow_count {
            1
        } else {
            return Ok(());
        };

        // only one previous modulo is tracked at a time
        if self.is_rehashing() {
            self.rehash_all()?;
        }

        self.prev_modulo = self.modulo;
        let level = self.bucket_level as isize + delta;
        self.set_bucket_level(level.max(0) as usize);
        self.set_bucket_count(self.modulo.max(self.prev_modulo) as usize);

        debug!(
            entries,
            level = self.bucket_level,
            modulo = self.modulo,
            previous_modulo = self.prev_modulo,
            "Changed bucket level"
        );

        if self.is_rehashing() {
            self.next_rehash = 0;
        }
        Ok(())
    }

    /// Move every block of `bucket` that belongs elsewhere under the
    /// current modulo
    fn rehash(&mut self, bucket: usize) -> Result<()> {
        let mut of = self.buckets[bucket];
        while of != NIL {
            let r = self.open_block(of)?;
            of = self.blk(r).next_node();

            if self.calculate_bucket(self.blk(r).key_hash()) != bucket {
                self.unlink(r)?;
                self.link(r)?;
            }

            self.close_block(r)?;
        }
        Ok(())
    }

    /// One step of incremental rehash
    pub(super) fn rehash_next(&mut self) -> Result<()> {
        if self.is_rehashing() {
            let mut bucket = self.next_rehash;
            let count = self.prev_modulo;

            if bucket < count {
                self.rehash(bucket as usize)?;
                bucket += 1;
                self.next_rehash = bucket;
            }

            if bucket >= count {
                self.rehash_complete();
            }
        }
        Ok(())
    }

    /// Finish any incremental rehash in progress
    pub(super) fn rehash_all(&mut self) -> Result<()> {
        if self.is_rehashing() {
            for bucket in self.next_rehash as usize..self.buckets.len() {
                self.rehash(bucket)?;
            }
            self.rehash_complete();
        }
        Ok(())
    }

    fn rehash_complete(&mut self) {
        self.next_rehash = NIL;
        self.prev_modulo = self.modulo;

        // only the current modulo's buckets are needed now
        self.set_bucket_count(self.modulo as usize);
    }
}
