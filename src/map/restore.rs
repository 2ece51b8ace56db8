//! Restore a map from a buffer that already holds one
//!
//! The block chain is the only persistent structure; free lists, buckets
//! and counters are rebuilt from it.

use tracing::debug;

use crate::block::{BlockHeader, BlockType, MIN_FREE, NIL};
use crate::buffer::BufferManager;
use crate::config::Config;
use crate::error::{BufMapError, Result};

use super::hash::BUCKET_COUNTS;
use super::BinaryMap;

impl<M: BufferManager> BinaryMap<M> {
    /// Rebuild a map over the blocks already laid out in `manager`'s buffer
    pub fn restore(manager: M, config: Config) -> Result<Self> {
        let mut map = Self::unformatted(manager, config)?;
        let offsets = map.scan_blocks()?;

        // smallest level whose modulo is not already overloaded
        let level = (0..BUCKET_COUNTS.len())
            .find(|&level| {
                map.set_bucket_level(level);
                map.entries < map.grow_count
            })
            .unwrap_or(BUCKET_COUNTS.len() - 1);
        map.set_bucket_level(level);
        map.buckets.clear();
        map.set_bucket_count(map.modulo as usize);
        map.prev_modulo = map.modulo;
        map.next_rehash = NIL;

        map.clear_free_lists();
        for &of in &offsets {
            let r = map.open_block(of)?;
            map.blk_mut(r).set_next_node(NIL);
            map.blk_mut(r).set_prev_node(NIL);
            map.link(r)?;
            map.close_block(r)?;
        }
        map.compact_begin();

        debug!(
            entries = map.entries,
            blocks = offsets.len(),
            capacity = map.capacity(),
            level,
            "Restored map"
        );

        map.check("after restore")?;
        Ok(map)
    }

    /// Walk and validate the block chain, recounting entries
    fn scan_blocks(&mut self) -> Result<Vec<u32>> {
        let capacity = self.capacity_u32();
        let buffer = self.manager.buffer();

        let mut offsets = Vec::new();
        let (mut entries, mut key_bytes, mut value_bytes) = (0, 0, 0);
        let mut prev = NIL;
        let mut prev_free = false;
        let mut of = 0;

        while of != NIL {
            let header = BlockHeader::read(buffer, of)?;
            if header.prev_block != prev {
                return Err(restore_error(format!(
                    "block at offset {} has previous offset {} but follows {}",
                    of, header.prev_block, prev
                )));
            }
            if header.next_block != NIL && (header.next_block <= of || header.next_block > capacity - MIN_FREE) {
                return Err(restore_error(format!(
                    "block at offset {} has next offset {} out of order",
                    of, header.next_block
                )));
            }

            match header.block_type {
                BlockType::Free => {
                    if prev_free {
                        return Err(restore_error(format!(
                            "two contiguous free blocks found at {} and {}",
                            prev, of
                        )));
                    }
                    prev_free = true;
                }
                BlockType::Entry => {
                    entries += 1;
                    key_bytes += header.key_len as usize;
                    value_bytes += header.value_len as usize;
                    prev_free = false;
                }
                BlockType::None => {
                    return Err(restore_error(format!("block of type NONE at offset {}", of)));
                }
            }

            offsets.push(of);
            prev = of;
            of = header.next_block;
        }

        self.entries = entries;
        self.key_bytes = key_bytes;
        self.value_bytes = value_bytes;
        self.last_block = prev;
        Ok(offsets)
    }
}

fn restore_error(msg: String) -> BufMapError {
    BufMapError::Corrupt(format!("restore: {}", msg))
}
