//! Block codec
//!
//! Offset-addressed reads and writes of block headers and length-prefixed
//! binaries. All integers are big-endian.

use bytes::{Buf, BufMut, Bytes};

use crate::binary::Binary;
use crate::error::{BufMapError, Result};

use super::{BlockType, MIN_FREE, OFFSET_HASH};

/// Size of the entry-only header fields (hash, key length, value length)
const ENTRY_FIELDS_SIZE: usize = 12;

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type: BlockType,
    pub next_block: u32,
    pub prev_block: u32,
    pub next_node: u32,
    pub prev_node: u32,
    /// Entry blocks only
    pub hash: u32,
    pub key_len: u32,
    pub value_len: u32,
}

impl BlockHeader {
    /// Read the header of the block at `offset`
    ///
    /// For an entry block the hash, key length and value length are read as
    /// well; the key and value bytes are skipped.
    pub fn read(buffer: &[u8], offset: u32) -> Result<Self> {
        let mut input = slice_at(buffer, offset, MIN_FREE as usize)?;

        let tag = input.get_u8();
        let block_type = BlockType::from_u8(tag, offset)?;
        let next_block = input.get_u32();
        let prev_block = input.get_u32();
        let next_node = input.get_u32();
        let prev_node = input.get_u32();

        let mut header = Self {
            block_type,
            next_block,
            prev_block,
            next_node,
            prev_node,
            hash: 0,
            key_len: 0,
            value_len: 0,
        };

        if block_type == BlockType::Entry {
            let mut input = slice_at(buffer, offset + OFFSET_HASH, 8)?;
            header.hash = input.get_u32();
            header.key_len = input.get_u32();

            let value_at = offset
                .checked_add(OFFSET_HASH + 8)
                .and_then(|of| of.checked_add(header.key_len))
                .ok_or_else(|| out_of_range(offset, header.key_len as usize))?;
            header.value_len = read_u32(buffer, value_at)?;
        }

        Ok(header)
    }

    /// Write the 17 byte common header at `offset`
    pub fn write(&self, buffer: &mut [u8], offset: u32) -> Result<()> {
        if self.block_type == BlockType::None {
            return Err(BufMapError::IllegalState(format!(
                "Attempt to write block of type NONE at offset {}",
                offset
            )));
        }
        let mut out = slice_at_mut(buffer, offset, MIN_FREE as usize)?;
        out.put_u8(self.block_type as u8);
        out.put_u32(self.next_block);
        out.put_u32(self.prev_block);
        out.put_u32(self.next_node);
        out.put_u32(self.prev_node);
        Ok(())
    }
}

// =============================================================================
// Primitive Access
// =============================================================================

pub fn read_u32(buffer: &[u8], offset: u32) -> Result<u32> {
    let mut input = slice_at(buffer, offset, 4)?;
    Ok(input.get_u32())
}

pub fn write_u32(buffer: &mut [u8], offset: u32, value: u32) -> Result<()> {
    let mut out = slice_at_mut(buffer, offset, 4)?;
    out.put_u32(value);
    Ok(())
}

/// Read a length-prefixed binary at `offset`
pub fn read_binary(buffer: &[u8], offset: u32) -> Result<Binary> {
    let len = read_u32(buffer, offset)? as usize;
    let data = slice_at(buffer, offset + 4, len)?;
    Ok(Binary::from(Bytes::copy_from_slice(data)))
}

/// Write a length-prefixed binary at `offset`
pub fn write_binary(buffer: &mut [u8], offset: u32, bin: &Binary) -> Result<()> {
    let mut out = slice_at_mut(buffer, offset, 4 + bin.len())?;
    out.put_u32(bin.len() as u32);
    out.put_slice(bin);
    Ok(())
}

/// Overwrite `len` bytes at `offset` with the fill byte
pub fn wipe(buffer: &mut [u8], offset: u32, len: usize) -> Result<()> {
    slice_at_mut(buffer, offset, len)?.fill(0);
    Ok(())
}

/// Move the hash, both lengths, key and value of an entry from the block at
/// `from` to the block at `to`
pub fn move_entry_data(buffer: &mut [u8], from: u32, to: u32, key_len: u32, value_len: u32) -> Result<usize> {
    let len = key_len as usize + value_len as usize + ENTRY_FIELDS_SIZE;
    let src = (from + OFFSET_HASH) as usize;
    let dest = (to + OFFSET_HASH) as usize;
    if src.max(dest) + len > buffer.len() {
        return Err(out_of_range(from.max(to), len));
    }
    buffer.copy_within(src..src + len, dest);
    Ok(len)
}

fn slice_at(buffer: &[u8], offset: u32, len: usize) -> Result<&[u8]> {
    let start = offset as usize;
    start
        .checked_add(len)
        .filter(|&end| end <= buffer.len())
        .map(|end| &buffer[start..end])
        .ok_or_else(|| out_of_range(offset, len))
}

fn slice_at_mut(buffer: &mut [u8], offset: u32, len: usize) -> Result<&mut [u8]> {
    let start = offset as usize;
    let capacity = buffer.len();
    match start.checked_add(len) {
        Some(end) if end <= capacity => Ok(&mut buffer[start..end]),
        _ => Err(out_of_range(offset, len)),
    }
}

fn out_of_range(offset: u32, len: usize) -> BufMapError {
    BufMapError::Corrupt(format!(
        "access of {} bytes at offset {} (0x{:x}) is outside the buffer",
        len, offset, offset
    ))
}
