//! Free-list allocator
//!
//! ## Allocation Order
//! 1. First block of any strictly larger size class
//! 2. Out of memory if the free capacity is too small
//! 3. Incremental compaction until a large enough free block exists,
//!    then the larger size classes again
//! 4. Linear scan of the exact size class
//!
//! Free blocks are merged with free neighbours as soon as they appear, so
//! two free blocks are never adjacent.

use tracing::warn;

use crate::block::{calculate_size_code, BlockType, MAX_SIZE_CODES, MIN_ENTRY, MIN_SPLIT, NIL};
use crate::buffer::BufferManager;
use crate::error::{BufMapError, Result};

use super::cache::BlockRef;
use super::BinaryMap;

impl<M: BufferManager> BinaryMap<M> {
    /// Obtain an unlinked entry block of at least `len` bytes
    pub(super) fn allocate_block(&mut self, len: usize) -> Result<BlockRef> {
        debug_assert!(len >= MIN_ENTRY);

        // consider expanding the buffer
        self.check_buffer_grow(len)?;

        let code = calculate_size_code(len as u32);
        if let Some(r) = self.allocate_from_larger(code, len)? {
            return Ok(r);
        }

        if len > self.free_capacity() {
            return Err(self.report_out_of_memory(len));
        }

        self.compact_until(len)?;

        if let Some(r) = self.allocate_from_larger(code, len)? {
            return Ok(r);
        }

        let mut of = self.free_lists[code];
        while of != NIL {
            let r = self.open_block(of)?;
            if self.block_len(r) as usize >= len {
                self.allocate(r, len as u32)?;
                return Ok(r);
            }
            of = self.blk(r).next_node();
            self.close_block(r)?;
        }

        // compaction already produced enough free space, so this is a defect
        Err(self.report_out_of_memory(len))
    }

    fn allocate_from_larger(&mut self, code: usize, len: usize) -> Result<Option<BlockRef>> {
        for larger in code + 1..MAX_SIZE_CODES {
            let of = self.free_lists[larger];
            if of != NIL {
                let r = self.open_block(of)?;
                self.allocate(r, len as u32)?;
                return Ok(Some(r));
            }
        }
        Ok(None)
    }

    pub(super) fn report_out_of_memory(&self, required: usize) -> BufMapError {
        let available = self.free_capacity();
        warn!(required, available, "Out of memory");
        BufMapError::out_of_memory(required, available)
    }

    // =========================================================================
    // Block Operations
    // =========================================================================

    /// Turn a free block into an unlinked entry block of at least `len` bytes
    fn allocate(&mut self, r: BlockRef, len: u32) -> Result<()> {
        self.expect_free(r, "allocate")?;
        self.split(r, len)?;
        self.unlink(r)?;
        self.blk_mut(r).set_block_type(BlockType::Entry);
        Ok(())
    }

    /// Return an entry block to free space and close it
    pub(super) fn free_block(&mut self, r: BlockRef) -> Result<()> {
        if !self.blk(r).is_entry() {
            return Err(BufMapError::Corrupt(format!(
                "attempt to free non-entry block at offset {}",
                self.blk(r).offset()
            )));
        }

        self.unlink(r)?;
        self.blk_mut(r).set_block_type(BlockType::Free);
        self.link(r)?;

        if self.config.strict {
            self.clear_block(r)?;
        }

        self.merge(r)?;
        self.close_block(r)
    }

    /// Keep the first `retain` bytes, carving the rest off as a new free
    /// block when it is big enough to be worth tracking
    pub(super) fn split(&mut self, r: BlockRef, retain: u32) -> Result<()> {
        self.expect_free(r, "split")?;

        let this = self.blk(r).offset();
        let len = self.block_len(r);
        if len.saturating_sub(retain) < MIN_SPLIT {
            return Ok(());
        }

        let that_of = this + retain;
        let that = self.init_block(that_of)?;
        self.blk_mut(that).set_block_type(BlockType::Free);

        self.unlink(r)?;
        // that is already unlinked (it's new)

        let next = self.blk(r).next_block();
        if next != NIL {
            let n = self.open_block(next)?;
            self.blk_mut(n).set_prev_block(that_of);
            self.close_block(n)?;
        }

        self.blk_mut(r).set_next_block(that_of);
        self.blk_mut(that).set_prev_block(this);
        self.blk_mut(that).set_next_block(next);

        self.link(r)?;
        self.link(that)?;

        self.close_block(that)
    }

    /// Absorb free neighbours into this free block
    pub(super) fn merge(&mut self, r: BlockRef) -> Result<()> {
        self.expect_free(r, "merge")?;

        let block = self.blk(r);
        let (prev_old, next_old, of_old) = (block.prev_block(), block.next_block(), block.offset());
        let (mut prev_new, mut next_new, mut of_new) = (prev_old, next_old, of_old);

        self.unlink(r)?;

        if prev_old != NIL {
            let p = self.open_block(prev_old)?;
            if self.blk(p).is_free() {
                // take the previous block's position
                of_new = self.blk(p).offset();
                prev_new = self.blk(p).prev_block();

                self.unlink(p)?;
                self.discard_block(p)?;
            } else {
                self.close_block(p)?;
            }
        }

        if next_old != NIL {
            let n = self.open_block(next_old)?;
            if self.blk(n).is_free() {
                next_new = self.blk(n).next_block();

                self.unlink(n)?;
                self.discard_block(n)?;
            } else {
                self.close_block(n)?;
            }
        }

        // the block after the merged span must point back at its new start
        if (of_old != of_new || next_old != next_new) && next_new != NIL {
            let n = self.open_block(next_new)?;
            if self.blk(n).is_free() {
                return Err(BufMapError::Corrupt(format!(
                    "two contiguous free blocks found at {} and {}",
                    of_new, next_new
                )));
            }
            self.blk_mut(n).set_prev_block(of_new);
            self.close_block(n)?;
        }

        self.move_block(r, of_new);
        self.blk_mut(r).set_prev_block(prev_new);
        self.blk_mut(r).set_next_block(next_new);

        self.link(r)
    }

    fn expect_free(&self, r: BlockRef, op: &str) -> Result<()> {
        if self.blk(r).is_free() {
            Ok(())
        } else {
            Err(BufMapError::Corrupt(format!(
                "{} of non-free block at offset {}",
                op,
                self.blk(r).offset()
            )))
        }
    }
}
