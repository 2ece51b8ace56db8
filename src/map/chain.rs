//! Block handles and node chains
//!
//! Opening, closing and relocating handles, plus linking blocks into and out
//! of their free list or hash bucket.

use crate::binary::Binary;
use crate::block::{self, Block, BlockType, NIL, OFFSET_VALUE};
use crate::buffer::BufferManager;
use crate::error::{BufMapError, Result};

use super::cache::BlockRef;
use super::BinaryMap;

impl<M: BufferManager> BinaryMap<M> {
    // =========================================================================
    // Handle Lifecycle
    // =========================================================================

    /// Open the block at `offset`, reading its header on first use
    pub(super) fn open_block(&mut self, offset: u32) -> Result<BlockRef> {
        let r = self.cache.grab(offset)?;
        if self.cache.get(r).block_type() == BlockType::None {
            let buffer = self.manager.buffer();
            self.cache.get_mut(r).read_header(buffer)?;
        }
        Ok(r)
    }

    /// Open a handle for a block that does not exist yet
    pub(super) fn init_block(&mut self, offset: u32) -> Result<BlockRef> {
        let r = self.cache.grab(offset)?;
        if self.cache.get(r).block_type() != BlockType::None {
            return Err(BufMapError::IllegalState(format!(
                "block at offset {} is already open",
                offset
            )));
        }
        Ok(r)
    }

    /// Release a handle, flushing it once its last user is done
    pub(super) fn close_block(&mut self, r: BlockRef) -> Result<()> {
        let block = self.cache.get(r);
        if block.next_block() == NIL {
            self.last_block = block.offset();
        }

        if self.cache.release(r)? {
            let buffer = self.manager.buffer_mut();
            let block = self.cache.get_mut(r);
            block.flush(buffer)?;
            block.reset();
        }
        Ok(())
    }

    /// Release a handle whose block has been absorbed by another
    pub(super) fn discard_block(&mut self, r: BlockRef) -> Result<()> {
        if !self.cache.release(r)? {
            return Err(BufMapError::IllegalState(format!(
                "discarded block at offset {} is still in use",
                self.blk(r).offset()
            )));
        }

        // keep incremental compaction pointing at a live block
        let (offset, prev) = (self.blk(r).offset(), self.blk(r).prev_block());
        if offset == self.next_compact {
            self.next_compact = if prev == NIL { 0 } else { prev };
        }

        if self.config.strict {
            self.clear_block(r)?;
        }

        self.cache.get_mut(r).reset();
        Ok(())
    }

    pub(super) fn blk(&self, r: BlockRef) -> &Block {
        self.cache.get(r)
    }

    pub(super) fn blk_mut(&mut self, r: BlockRef) -> &mut Block {
        self.cache.get_mut(r)
    }

    /// Move a handle to a new offset, dragging the compaction cursor along
    pub(super) fn move_block(&mut self, r: BlockRef, offset: u32) {
        let old = self.blk(r).offset();
        if offset != old {
            if old == self.next_compact {
                self.next_compact = offset;
            }
            self.blk_mut(r).set_offset(offset);
        }
    }

    pub(super) fn block_len(&self, r: BlockRef) -> u32 {
        self.blk(r).length(self.capacity_u32())
    }

    pub(super) fn block_fill(&self, r: BlockRef) -> u32 {
        self.blk(r).fill_length(self.capacity_u32())
    }

    pub(super) fn block_size_code(&self, r: BlockRef) -> usize {
        self.blk(r).size_code(self.capacity_u32())
    }

    pub(super) fn block_key(&mut self, r: BlockRef) -> Result<Binary> {
        let buffer = self.manager.buffer();
        self.cache.get_mut(r).key(buffer)
    }

    pub(super) fn block_value(&mut self, r: BlockRef) -> Result<Binary> {
        let buffer = self.manager.buffer();
        self.cache.get_mut(r).value(buffer)
    }

    // =========================================================================
    // Wiping
    // =========================================================================

    /// Reset `len` bytes at `offset` to the fill byte
    pub(super) fn wipe(&mut self, offset: u32, len: usize) -> Result<()> {
        block::wipe(self.manager.buffer_mut(), offset, len)
    }

    /// Wipe the whole span of a block
    pub(super) fn clear_block(&mut self, r: BlockRef) -> Result<()> {
        let (offset, len) = (self.blk(r).offset(), self.block_len(r));
        self.wipe(offset, len as usize)
    }

    /// Wipe the value (and its length) of an entry block
    pub(super) fn clear_block_value(&mut self, r: BlockRef) -> Result<()> {
        let block = self.blk(r);
        let offset = block.offset() + OFFSET_VALUE + block.key_len();
        let len = block.value_len() as usize + 4;
        self.wipe(offset, len)
    }

    // =========================================================================
    // Node Chains
    // =========================================================================

    /// Push the block onto the head of its free list or hash bucket
    pub(super) fn link(&mut self, r: BlockRef) -> Result<()> {
        let block = self.blk(r);
        let this = block.offset();
        match block.block_type() {
            BlockType::None => {
                return Err(BufMapError::Corrupt(format!(
                    "Illegal link of type NONE at offset {}",
                    this
                )))
            }
            BlockType::Free | BlockType::Entry => {}
        }

        if block.next_node() != NIL || block.prev_node() != NIL {
            return Err(BufMapError::Corrupt(format!(
                "Attempt to link node at offset {} which has node offsets next={} prev={}",
                this,
                block.next_node(),
                block.prev_node()
            )));
        }

        let free = block.is_free();
        let (which, head) = if free {
            let code = self.block_size_code(r);
            (code, self.free_lists[code])
        } else {
            let bucket = self.calculate_bucket(block.key_hash());
            (bucket, self.buckets[bucket])
        };

        if head != NIL {
            let h = self.open_block(head)?;
            self.blk_mut(h).set_prev_node(this);
            self.close_block(h)?;
        }

        let block = self.blk_mut(r);
        block.set_next_node(head);
        block.set_prev_node(NIL);

        if free {
            self.free_lists[which] = this;
        } else {
            self.buckets[which] = this;
        }
        Ok(())
    }

    /// Take the block out of its free list or hash bucket
    pub(super) fn unlink(&mut self, r: BlockRef) -> Result<()> {
        let block = self.blk(r);
        let this = block.offset();
        if block.block_type() == BlockType::None {
            return Err(BufMapError::Corrupt(format!(
                "Illegal unlink of type NONE at offset {}",
                this
            )));
        }

        let (next, prev) = (block.next_node(), block.prev_node());

        if next != NIL {
            let n = self.open_block(next)?;
            self.blk_mut(n).set_prev_node(prev);
            self.close_block(n)?;
        }

        if prev == NIL {
            if self.blk(r).is_free() {
                // head of a free list
                let code = self.block_size_code(r);
                if self.free_lists[code] != this {
                    return Err(BufMapError::Corrupt(format!(
                        "First free block for size code {} is at offset {} but the block at offset {} \
                         has size code {} and a previous offset of NIL",
                        code, self.free_lists[code], this, code
                    )));
                }
                self.free_lists[code] = next;
            } else {
                // head of a hash bucket, under either modulo
                let hash = self.blk(r).key_hash();
                let mut bucket = self.calculate_bucket(hash);
                if self.buckets[bucket] != this {
                    bucket = self.calculate_previous_bucket(hash);
                }
                if self.buckets.get(bucket) != Some(&this) {
                    return Err(BufMapError::Corrupt(format!(
                        "First Entry block for bucket {} is at offset {:?} but the block at offset {} \
                         has hash={} and a previous offset of NIL",
                        bucket,
                        self.buckets.get(bucket),
                        this,
                        hash
                    )));
                }
                self.buckets[bucket] = next;
            }
        } else {
            let p = self.open_block(prev)?;
            self.blk_mut(p).set_next_node(next);
            self.close_block(p)?;
        }

        let block = self.blk_mut(r);
        block.set_next_node(NIL);
        block.set_prev_node(NIL);
        Ok(())
    }
}
