//! Compaction and buffer resizing
//!
//! ## Compaction Step
//! ```text
//!   free, entry     →  entry, free        slide the entry down; the free
//!                                         block takes the entry's fill and
//!                                         merges with whatever follows
//!   entry with fill ≥ 17                  split the fill off as a free block
//!   entry with fill < 17, next block      slide the next block down by the fill
//! ```
//!
//! Each step moves the compaction cursor forward. One sweep from offset 0
//! pushes all free space to the end of the buffer, where a shrink can
//! release it.

use tracing::debug;

use crate::block::{move_entry_data, BlockType, MIN_FREE, NIL};
use crate::buffer::BufferManager;
use crate::error::{BufMapError, Result};

use super::cache::BlockRef;
use super::BinaryMap;

/// Full sweeps `compact_until` may make before giving up
const MAX_COMPACT_SWEEPS: usize = 2;

/// Outcome of one compaction step
#[derive(Debug, Clone, Copy, Default)]
struct Step {
    /// Length of the free block left at the cursor, zero if none
    free_len: u32,
    /// The cursor ran off the end of the buffer and restarted at 0
    wrapped: bool,
}

impl<M: BufferManager> BinaryMap<M> {
    // =========================================================================
    // Incremental Compaction
    // =========================================================================

    /// Restart compaction at the front of the buffer
    pub(super) fn compact_begin(&mut self) {
        self.next_compact = 0;
    }

    /// One compaction step, run by every mutating operation
    pub(super) fn compact_next(&mut self) -> Result<()> {
        if self.entries > 0 {
            self.compact_until(0)?;
        }
        Ok(())
    }

    /// Compact until a free block of at least `required` bytes exists
    ///
    /// With `required == 0` exactly one step runs.
    pub(super) fn compact_until(&mut self, required: usize) -> Result<()> {
        if self.next_compact == NIL {
            self.compact_begin();
        }

        let mut sweeps = 0;
        loop {
            let step = self.compact_step()?;
            if step.free_len as usize >= required {
                return Ok(());
            }
            if step.wrapped {
                sweeps += 1;
                if sweeps > MAX_COMPACT_SWEEPS {
                    return Err(self.report_out_of_memory(required));
                }
            }
        }
    }

    /// Pack every entry to the front in one sweep
    ///
    /// All free space ends up in a single trailing free block, except for
    /// fill too small to split off the last entry.
    pub(super) fn compact_all(&mut self) -> Result<()> {
        self.compact_begin();
        let mut steps = 1;
        while !self.compact_step()?.wrapped {
            steps += 1;
        }
        self.compact_begin();
        debug!(steps, used = self.used_capacity(), "Compacted buffer");
        Ok(())
    }

    fn compact_step(&mut self) -> Result<Step> {
        let r = self.open_block(self.next_compact)?;
        let step = if self.blk(r).is_free() {
            self.compact_free(r)?
        } else {
            self.compact_entry(r)?
        };
        if step.wrapped {
            self.compact_begin();
        }
        Ok(step)
    }

    /// Swap a free block with the entry that follows it; the free block
    /// takes over the entry's fill
    fn compact_free(&mut self, free: BlockRef) -> Result<Step> {
        let f = self.blk(free).offset();
        let next = self.blk(free).next_block();
        if next == NIL {
            // all free space is already at the end
            let free_len = self.block_len(free);
            self.close_block(free)?;
            return Ok(Step {
                free_len,
                wrapped: true,
            });
        }

        let entry = self.open_block(next)?;
        if !self.blk(entry).is_entry() {
            return Err(BufMapError::Corrupt(format!(
                "two contiguous free blocks found at {} and {}",
                f, next
            )));
        }

        let free_len = self.block_len(free);
        let fill = self.block_fill(entry);
        let tight = self.blk(entry).tight_length();
        let (prev, after) = (self.blk(free).prev_block(), self.blk(entry).next_block());
        let (key_len, value_len) = (self.blk(entry).key_len(), self.blk(entry).value_len());

        self.unlink(free)?;
        self.unlink(entry)?;

        move_entry_data(self.manager.buffer_mut(), next, f, key_len, value_len)?;

        // no handle may be opened between these two moves
        let moved_free = f + tight;
        self.move_block(free, moved_free);
        self.move_block(entry, f);

        self.blk_mut(entry).set_prev_block(prev);
        self.blk_mut(entry).set_next_block(moved_free);
        self.blk_mut(free).set_prev_block(f);
        self.blk_mut(free).set_next_block(after);

        if after != NIL {
            let a = self.open_block(after)?;
            self.blk_mut(a).set_prev_block(moved_free);
            self.close_block(a)?;
        }

        if self.config.strict {
            self.wipe(moved_free, (free_len + fill) as usize)?;
        }

        self.link(entry)?;
        self.link(free)?;
        self.close_block(entry)?;

        self.merge(free)?;
        let free_len = self.block_len(free);
        let wrapped = self.blk(free).next_block() == NIL;
        self.close_block(free)?;

        Ok(Step { free_len, wrapped })
    }

    /// Reclaim the fill at the end of an entry
    fn compact_entry(&mut self, entry: BlockRef) -> Result<Step> {
        let next = self.blk(entry).next_block();
        let fill = self.block_fill(entry);

        if fill >= MIN_FREE {
            let step = self.split_fill(entry, fill)?;
            self.close_block(entry)?;
            return Ok(step);
        }

        if fill == 0 || next == NIL {
            self.close_block(entry)?;
            if next == NIL {
                return Ok(Step {
                    free_len: 0,
                    wrapped: true,
                });
            }
            self.next_compact = next;
            return Ok(Step::default());
        }

        // too small for a free block: slide the next block down over it
        let n = self.open_block(next)?;
        let target = next - fill;
        let after = self.blk(n).next_block();
        let free = self.blk(n).is_free();

        self.unlink(n)?;
        if free {
            self.move_block(n, target);
        } else {
            let (key_len, value_len) = (self.blk(n).key_len(), self.blk(n).value_len());
            move_entry_data(self.manager.buffer_mut(), next, target, key_len, value_len)?;
            self.move_block(n, target);
        }

        self.blk_mut(entry).set_next_block(target);

        if after != NIL {
            let a = self.open_block(after)?;
            self.blk_mut(a).set_prev_block(target);
            self.close_block(a)?;
        }

        if self.config.strict {
            let used = if free { MIN_FREE } else { self.blk(n).tight_length() };
            let len = self.block_len(n);
            self.wipe(target + used, (len - used) as usize)?;
        }

        self.link(n)?;
        let free_len = if free { self.block_len(n) } else { 0 };
        self.next_compact = target;
        self.close_block(n)?;
        self.close_block(entry)?;

        Ok(Step {
            free_len,
            wrapped: false,
        })
    }

    /// Carve the fill of an entry off into a new free block and merge it
    /// forward
    fn split_fill(&mut self, entry: BlockRef, fill: u32) -> Result<Step> {
        let of = self.blk(entry).offset();
        let next = self.blk(entry).next_block();
        let at = of + self.blk(entry).tight_length();

        let free = self.init_block(at)?;
        self.blk_mut(free).set_block_type(BlockType::Free);
        self.blk_mut(free).set_prev_block(of);
        self.blk_mut(free).set_next_block(next);

        if next != NIL {
            let n = self.open_block(next)?;
            self.blk_mut(n).set_prev_block(at);
            self.close_block(n)?;
        }
        self.blk_mut(entry).set_next_block(at);

        if self.config.strict {
            self.wipe(at, fill as usize)?;
        }

        self.link(free)?;
        self.merge(free)?;

        let free_len = self.block_len(free);
        let wrapped = self.blk(free).next_block() == NIL;
        self.next_compact = self.blk(free).offset();
        self.close_block(free)?;

        Ok(Step { free_len, wrapped })
    }

    // =========================================================================
    // Buffer Resizing
    // =========================================================================

    /// Grow the buffer if `additional` more bytes would cross the growth
    /// threshold
    pub(super) fn check_buffer_grow(&mut self, additional: usize) -> Result<()> {
        let required = self.used_capacity() + additional;
        if required <= self.manager.growth_threshold() {
            return Ok(());
        }
        if required > self.manager.max_capacity() {
            return Err(self.report_out_of_memory(additional));
        }

        let old_capacity = self.capacity_u32();
        let last = self.open_last_block()?;
        let free = self.blk(last).is_free();
        if free {
            // its size code is about to change
            self.unlink(last)?;
        }

        if let Err(e) = self.manager.grow(required) {
            if free {
                self.link(last)?;
            }
            self.close_block(last)?;
            return Err(e);
        }

        let new_capacity = self.capacity_u32();
        if self.config.strict && new_capacity > old_capacity {
            self.wipe(old_capacity, (new_capacity - old_capacity) as usize)?;
        }

        if free {
            self.link(last)?;
        } else if new_capacity - old_capacity >= MIN_FREE {
            // the last block is an entry, so the new space needs its own block
            let last_offset = self.blk(last).offset();
            let tail = self.init_block(old_capacity)?;
            self.blk_mut(tail).set_block_type(BlockType::Free);
            self.blk_mut(tail).set_prev_block(last_offset);
            self.blk_mut(tail).set_next_block(NIL);
            self.blk_mut(last).set_next_block(old_capacity);
            self.link(tail)?;
            self.close_block(tail)?;
        }
        self.close_block(last)?;

        debug!(old_capacity, new_capacity, "Buffer grown");
        Ok(())
    }

    /// Release free space at the end of the buffer once usage drops below
    /// the shrinkage threshold
    pub(super) fn check_buffer_shrink(&mut self) -> Result<()> {
        let required = self.used_capacity() + MIN_FREE as usize;
        if required >= self.manager.shrinkage_threshold() {
            return Ok(());
        }

        self.compact_all()?;

        let old_capacity = self.capacity_u32();
        let last = self.open_last_block()?;
        if !self.blk(last).is_free() {
            // no trailing free block to give back
            return self.close_block(last);
        }

        let required = required.max((self.blk(last).offset() + MIN_FREE) as usize);
        self.unlink(last)?;
        let resized = self.manager.shrink(required);
        self.link(last)?;
        self.close_block(last)?;
        resized?;

        debug!(old_capacity, new_capacity = self.capacity_u32(), "Buffer shrunk");
        Ok(())
    }

    fn open_last_block(&mut self) -> Result<BlockRef> {
        let r = self.open_block(self.last_block)?;
        if self.blk(r).next_block() != NIL {
            let next = self.blk(r).next_block();
            self.close_block(r)?;
            return Err(BufMapError::Corrupt(format!(
                "block at offset {} is recorded as last but is followed by {}",
                self.last_block, next
            )));
        }
        Ok(r)
    }

    /// Discard all blocks, leaving one free block spanning the buffer
    pub(super) fn clear_buffer(&mut self) -> Result<()> {
        self.next_compact = NIL;

        if self.config.strict {
            let capacity = self.capacity();
            self.wipe(0, capacity)?;
        }

        self.entries = 0;
        self.key_bytes = 0;
        self.value_bytes = 0;

        let r = self.init_block(0)?;
        self.blk_mut(r).set_block_type(BlockType::Free);
        self.link(r)?;
        self.close_block(r)?;

        self.compact_begin();
        Ok(())
    }
}
