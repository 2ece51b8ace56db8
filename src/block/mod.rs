//! Block Module
//!
//! The storage unit of the map: a contiguous byte range in the buffer.
//!
//! ## Responsibilities
//! - Block header layout and constants
//! - In-memory block handle with dirty tracking for header, key and value
//! - Size-code classification for the free lists
//!
//! ## Block Layout (big-endian)
//! ```text
//! ┌────────┬──────────┬──────────┬──────────┬──────────┐
//! │Type (1)│NextBlk(4)│PrevBlk(4)│NextNode 4│PrevNode 4│   free block (17)
//! └────────┴──────────┴──────────┴──────────┴──────────┘
//! ┌─────────────── 17 byte header ───────────────┬─────────┬────────┬─────┬────────┬───────┬──────┐
//! │                                              │ Hash (4)│KeyLen 4│ Key │ValLen 4│ Value │ Fill │
//! └──────────────────────────────────────────────┴─────────┴────────┴─────┴────────┴───────┴──────┘
//! ```
//!
//! The block chain (next/prev block) orders every block by offset. The node
//! chain (next/prev node) links a free block into its size-code free list or
//! an entry block into its hash bucket.

mod codec;
mod size_code;

pub use codec::{move_entry_data, read_binary, read_u32, wipe, write_binary, BlockHeader};
pub use size_code::calculate_size_code;

use crate::binary::Binary;
use crate::error::{BufMapError, Result};

// =============================================================================
// Layout Constants
// =============================================================================

/// Offset value meaning "no block"
pub const NIL: u32 = u32::MAX;

/// Offset of the key hash within an entry block
pub const OFFSET_HASH: u32 = 17;

/// Offset of the key length (followed by the key) within an entry block
pub const OFFSET_KEY: u32 = 21;

/// Offset of the value length, not counting the key bytes
pub const OFFSET_VALUE: u32 = 25;

/// Smallest remainder worth splitting off as a separate free block
pub const MIN_SPLIT: u32 = 64;

/// Size of a free block header
pub const MIN_FREE: u32 = 17;

/// Size of an entry block holding an empty key and an empty value
pub const MIN_ENTRY: usize = 29;

/// Number of free lists
pub const MAX_SIZE_CODES: usize = 26;

const MIN_ENTRY_U32: u32 = MIN_ENTRY as u32;

/// Kind of block stored at an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    /// Handle not yet read or initialized
    None = 0,
    Free = 1,
    Entry = 2,
}

impl BlockType {
    /// Decode the on-buffer type tag
    pub fn from_u8(tag: u8, offset: u32) -> Result<Self> {
        match tag {
            1 => Ok(BlockType::Free),
            2 => Ok(BlockType::Entry),
            0 => Err(BufMapError::Corrupt(format!(
                "Illegal block type (NONE) found at offset {}",
                offset
            ))),
            other => Err(BufMapError::Corrupt(format!(
                "Illegal block type ({}) found at offset {}",
                other, offset
            ))),
        }
    }
}

// =============================================================================
// Block Handle
// =============================================================================

/// A transient view of one block
///
/// Setters only record the change; nothing reaches the buffer until
/// `flush` runs when the last user closes the handle.
#[derive(Debug, Clone)]
pub struct Block {
    block_type: BlockType,
    offset: u32,
    next_block: u32,
    prev_block: u32,
    next_node: u32,
    prev_node: u32,

    hash: u32,
    key_len: u32,
    value_len: u32,
    key: Option<Binary>,
    value: Option<Binary>,

    header_dirty: bool,
    key_dirty: bool,
    value_dirty: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Block {
    pub fn new() -> Self {
        Self {
            block_type: BlockType::None,
            offset: NIL,
            next_block: NIL,
            prev_block: NIL,
            next_node: NIL,
            prev_node: NIL,
            hash: 0,
            key_len: 0,
            value_len: 0,
            key: None,
            value: None,
            header_dirty: false,
            key_dirty: false,
            value_dirty: false,
        }
    }

    /// Forget all state, returning the handle to the unopened condition
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Bind an unopened handle to an offset
    pub fn init(&mut self, offset: u32) {
        self.reset();
        self.offset = offset;
    }

    // -------------------------------------------------------------------------
    // Header Accessors
    // -------------------------------------------------------------------------

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        if block_type != self.block_type {
            self.block_type = block_type;
            self.header_dirty = true;
            if block_type != BlockType::Entry {
                // a free block carries no key or value
                self.key_dirty = false;
                self.value_dirty = false;
            }
        }
    }

    pub fn is_free(&self) -> bool {
        self.block_type == BlockType::Free
    }

    pub fn is_entry(&self) -> bool {
        self.block_type == BlockType::Entry
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Move the handle; the header is rewritten at the new offset on flush
    pub fn set_offset(&mut self, offset: u32) {
        if offset != self.offset {
            self.offset = offset;
            self.header_dirty = true;
        }
    }

    /// Total span of the block; the last block runs to the end of the buffer
    pub fn length(&self, capacity: u32) -> u32 {
        let end = if self.next_block == NIL {
            capacity
        } else {
            self.next_block
        };
        end.saturating_sub(self.offset)
    }

    pub fn size_code(&self, capacity: u32) -> usize {
        calculate_size_code(self.length(capacity))
    }

    pub fn next_block(&self) -> u32 {
        self.next_block
    }

    pub fn set_next_block(&mut self, offset: u32) {
        if offset != self.next_block {
            self.next_block = offset;
            self.header_dirty = true;
        }
    }

    pub fn prev_block(&self) -> u32 {
        self.prev_block
    }

    pub fn set_prev_block(&mut self, offset: u32) {
        if offset != self.prev_block {
            self.prev_block = offset;
            self.header_dirty = true;
        }
    }

    pub fn next_node(&self) -> u32 {
        self.next_node
    }

    pub fn set_next_node(&mut self, offset: u32) {
        if offset != self.next_node {
            self.next_node = offset;
            self.header_dirty = true;
        }
    }

    pub fn prev_node(&self) -> u32 {
        self.prev_node
    }

    pub fn set_prev_node(&mut self, offset: u32) {
        if offset != self.prev_node {
            self.prev_node = offset;
            self.header_dirty = true;
        }
    }

    // -------------------------------------------------------------------------
    // Entry Accessors
    // -------------------------------------------------------------------------

    pub fn key_hash(&self) -> u32 {
        self.hash
    }

    pub fn key_len(&self) -> u32 {
        self.key_len
    }

    pub fn value_len(&self) -> u32 {
        self.value_len
    }

    /// The key, read from `buffer` on first access
    pub fn key(&mut self, buffer: &[u8]) -> Result<Binary> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }
        let key = read_binary(buffer, self.offset + OFFSET_KEY)?;
        if key.len() as u32 != self.key_len {
            return Err(BufMapError::Corrupt(format!(
                "key at offset {} has length {} but the header records {}",
                self.offset,
                key.len(),
                self.key_len
            )));
        }
        self.key = Some(key.clone());
        Ok(key)
    }

    pub fn set_key(&mut self, key: Binary) {
        if self.key.as_ref() != Some(&key) {
            self.key_len = key.len() as u32;
            self.hash = key.hash_code();
            self.key = Some(key);
            self.key_dirty = true;
        }
    }

    /// The value, read from `buffer` on first access
    pub fn value(&mut self, buffer: &[u8]) -> Result<Binary> {
        if let Some(value) = &self.value {
            return Ok(value.clone());
        }
        let value = read_binary(buffer, self.value_len_offset())?;
        if value.len() as u32 != self.value_len {
            return Err(BufMapError::Corrupt(format!(
                "value at offset {} has length {} but the header records {}",
                self.offset,
                value.len(),
                self.value_len
            )));
        }
        self.value = Some(value.clone());
        Ok(value)
    }

    pub fn set_value(&mut self, value: Binary) {
        if self.value.as_ref() != Some(&value) {
            self.value_len = value.len() as u32;
            self.value = Some(value);
            self.value_dirty = true;
        }
    }

    /// Offset of the value length field
    pub fn value_len_offset(&self) -> u32 {
        self.offset + OFFSET_VALUE + self.key_len
    }

    /// Bytes of the span not used by the header or the key/value data
    pub fn fill_length(&self, capacity: u32) -> u32 {
        let length = self.length(capacity);
        if self.is_entry() {
            length.saturating_sub(MIN_ENTRY_U32 + self.key_len + self.value_len)
        } else {
            length.saturating_sub(MIN_FREE)
        }
    }

    /// Bytes of the span actually occupied (entry header plus key and value)
    pub fn tight_length(&self) -> u32 {
        MIN_ENTRY_U32 + self.key_len + self.value_len
    }

    // -------------------------------------------------------------------------
    // Block I/O
    // -------------------------------------------------------------------------

    /// Load the header (and for entries the hash and both lengths)
    pub fn read_header(&mut self, buffer: &[u8]) -> Result<()> {
        if self.header_dirty {
            return Err(BufMapError::IllegalState(format!(
                "Attempt to re-read header for block at offset {} after header was modified",
                self.offset
            )));
        }
        let header = BlockHeader::read(buffer, self.offset)?;
        self.block_type = header.block_type;
        self.next_block = header.next_block;
        self.prev_block = header.prev_block;
        self.next_node = header.next_node;
        self.prev_node = header.prev_node;
        self.hash = header.hash;
        self.key_len = header.key_len;
        self.value_len = header.value_len;
        Ok(())
    }

    /// Write pending header, key and value changes
    pub fn flush(&mut self, buffer: &mut [u8]) -> Result<()> {
        if self.header_dirty {
            self.header().write(buffer, self.offset)?;
            self.header_dirty = false;
        }
        if self.key_dirty {
            if let Some(key) = &self.key {
                codec::write_u32(buffer, self.offset + OFFSET_HASH, self.hash)?;
                write_binary(buffer, self.offset + OFFSET_KEY, key)?;
            }
            self.key_dirty = false;
        }
        if self.value_dirty {
            if let Some(value) = &self.value {
                write_binary(buffer, self.value_len_offset(), value)?;
            }
            self.value_dirty = false;
        }
        Ok(())
    }

    fn header(&self) -> BlockHeader {
        BlockHeader {
            block_type: self.block_type,
            next_block: self.next_block,
            prev_block: self.prev_block,
            next_node: self.next_node,
            prev_node: self.prev_node,
            hash: self.hash,
            key_len: self.key_len,
            value_len: self.value_len,
        }
    }
}
