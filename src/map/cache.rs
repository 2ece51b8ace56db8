//! Open block cache
//!
//! A fixed arena of block handles. Opening an offset that is already open
//! returns the same handle with its use count raised, so every holder sees
//! the same pending header changes.

use crate::block::{Block, NIL};
use crate::error::{BufMapError, Result};

/// Most block handles that may be open at once
pub const MAX_OPEN_BLOCKS: usize = 8;

/// Index of an open handle in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockRef(usize);

pub(crate) struct BlockCache {
    blocks: Vec<Block>,
    uses: [u32; MAX_OPEN_BLOCKS],
}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            blocks: (0..MAX_OPEN_BLOCKS).map(|_| Block::new()).collect(),
            uses: [0; MAX_OPEN_BLOCKS],
        }
    }

    /// Find the handle open at `offset`, or bind a free one to it
    pub fn grab(&mut self, offset: u32) -> Result<BlockRef> {
        let mut vacant = None;
        for (i, block) in self.blocks.iter().enumerate() {
            if self.uses[i] == 0 {
                vacant = vacant.or(Some(i));
            } else if block.offset() == offset {
                self.uses[i] += 1;
                return Ok(BlockRef(i));
            }
        }

        match vacant {
            Some(i) => {
                self.blocks[i].init(offset);
                self.uses[i] = 1;
                Ok(BlockRef(i))
            }
            None => Err(BufMapError::IllegalState(
                "grab_block(): ran out of blocks".to_string(),
            )),
        }
    }

    /// Drop one use; true when the handle is no longer open
    pub fn release(&mut self, r: BlockRef) -> Result<bool> {
        let uses = &mut self.uses[r.0];
        if *uses == 0 {
            return Err(BufMapError::IllegalState(format!(
                "attempt to release block {} that was not open",
                r.0
            )));
        }
        *uses -= 1;
        Ok(*uses == 0)
    }

    pub fn get(&self, r: BlockRef) -> &Block {
        &self.blocks[r.0]
    }

    pub fn get_mut(&mut self, r: BlockRef) -> &mut Block {
        &mut self.blocks[r.0]
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        self.uses.iter().filter(|&&uses| uses > 0).count()
    }

    /// Offsets of the open handles, with NIL for vacant slots
    pub fn open_offsets(&self) -> Vec<u32> {
        self.blocks
            .iter()
            .zip(self.uses.iter())
            .map(|(block, &uses)| if uses > 0 { block.offset() } else { NIL })
            .collect()
    }

    /// Abandon every open handle without flushing
    pub fn reset(&mut self) {
        for (block, uses) in self.blocks.iter_mut().zip(self.uses.iter_mut()) {
            block.reset();
            *uses = 0;
        }
    }
}
