//! Tests for blocks
//!
//! These tests verify:
//! - Size-code classification
//! - Header encoding in the buffer
//! - Lazy key/value reads and dirty-tracked flushes
//! - Bounds checking of every buffer access

use bufmap::binary::Binary;
use bufmap::block::{
    calculate_size_code, move_entry_data, read_u32, write_binary, Block, BlockHeader, BlockType, MAX_SIZE_CODES,
    MIN_ENTRY, NIL, OFFSET_KEY,
};
use bufmap::BufMapError;

// =============================================================================
// Helper Functions
// =============================================================================

fn entry_block(offset: u32, key: &str, value: &str) -> Block {
    let mut block = Block::new();
    block.init(offset);
    block.set_block_type(BlockType::Entry);
    block.set_key(Binary::from(key));
    block.set_value(Binary::from(value));
    block
}

// =============================================================================
// Size Code Tests
// =============================================================================

#[test]
fn test_size_code_boundaries() {
    assert_eq!(calculate_size_code(0), 0);
    assert_eq!(calculate_size_code(63), 0);
    assert_eq!(calculate_size_code(64), 1);
    assert_eq!(calculate_size_code(127), 1);
    assert_eq!(calculate_size_code(128), 2);
    assert_eq!(calculate_size_code(255), 2);
    assert_eq!(calculate_size_code(256), 3);
    assert_eq!(calculate_size_code(1 << 20), 15);
}

#[test]
fn test_size_code_caps_at_last_list() {
    assert_eq!(calculate_size_code(u32::MAX), MAX_SIZE_CODES - 1);
    assert_eq!(calculate_size_code(i32::MAX as u32), MAX_SIZE_CODES - 1);
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_free_header_layout() {
    let mut buffer = vec![0u8; 64];
    let header = BlockHeader {
        block_type: BlockType::Free,
        next_block: 40,
        prev_block: NIL,
        next_node: NIL,
        prev_node: 8,
        hash: 0,
        key_len: 0,
        value_len: 0,
    };
    header.write(&mut buffer, 0).unwrap();

    assert_eq!(buffer[0], 1);
    assert_eq!(read_u32(&buffer, 1).unwrap(), 40);
    assert_eq!(read_u32(&buffer, 5).unwrap(), NIL);
    assert_eq!(read_u32(&buffer, 13).unwrap(), 8);
    assert_eq!(BlockHeader::read(&buffer, 0).unwrap(), header);
}

#[test]
fn test_type_none_is_corrupt() {
    let buffer = vec![0u8; 64];
    assert!(matches!(BlockHeader::read(&buffer, 0), Err(BufMapError::Corrupt(_))));
}

#[test]
fn test_unknown_type_is_corrupt() {
    let mut buffer = vec![0u8; 64];
    buffer[0] = 9;
    assert!(matches!(BlockHeader::read(&buffer, 0), Err(BufMapError::Corrupt(_))));
}

#[test]
fn test_header_past_end_is_corrupt() {
    let buffer = vec![1u8; 20];
    assert!(matches!(BlockHeader::read(&buffer, 10), Err(BufMapError::Corrupt(_))));
}

// =============================================================================
// Block Handle Tests
// =============================================================================

#[test]
fn test_flush_then_read_entry() {
    let mut buffer = vec![0u8; 128];
    let mut block = entry_block(16, "key", "value");
    block.flush(&mut buffer).unwrap();

    let mut reread = Block::new();
    reread.init(16);
    reread.read_header(&buffer).unwrap();

    assert!(reread.is_entry());
    assert_eq!(reread.key_len(), 3);
    assert_eq!(reread.value_len(), 5);
    assert_eq!(reread.key_hash(), Binary::from("key").hash_code());
    assert_eq!(reread.key(&buffer).unwrap(), Binary::from("key"));
    assert_eq!(reread.value(&buffer).unwrap(), Binary::from("value"));
    assert_eq!(reread.tight_length() as usize, MIN_ENTRY + 8);
}

#[test]
fn test_length_and_fill() {
    let mut block = entry_block(0, "ab", "cd");
    block.set_next_block(50);
    assert_eq!(block.length(128), 50);
    assert_eq!(block.fill_length(128), 50 - (MIN_ENTRY as u32 + 4));

    block.set_next_block(NIL);
    assert_eq!(block.length(128), 128);
}

#[test]
fn test_reread_after_modification_is_rejected() {
    let buffer = vec![0u8; 64];
    let mut block = Block::new();
    block.init(0);
    block.set_next_block(32);
    assert!(matches!(block.read_header(&buffer), Err(BufMapError::IllegalState(_))));
}

#[test]
fn test_value_past_end_is_corrupt() {
    let mut buffer = vec![0u8; 128];
    let mut block = entry_block(0, "key", "v");
    block.flush(&mut buffer).unwrap();

    // value length field follows the 3 byte key
    buffer[28..32].copy_from_slice(&0x00ff_ffffu32.to_be_bytes());

    let mut reread = Block::new();
    reread.init(0);
    reread.read_header(&buffer).unwrap();
    assert_eq!(reread.key(&buffer).unwrap(), Binary::from("key"));
    assert!(matches!(reread.value(&buffer), Err(BufMapError::Corrupt(_))));
}

#[test]
fn test_write_binary_past_end_is_corrupt() {
    let mut buffer = vec![0u8; 32];
    let result = write_binary(&mut buffer, OFFSET_KEY, &Binary::from("too long for this"));
    assert!(matches!(result, Err(BufMapError::Corrupt(_))));
}

#[test]
fn test_move_entry_data() {
    let mut buffer = vec![0u8; 128];
    let mut block = entry_block(64, "k", "v");
    block.flush(&mut buffer).unwrap();

    let moved = move_entry_data(&mut buffer, 64, 0, 1, 1).unwrap();
    assert_eq!(moved, 14);

    let mut relocated = Block::new();
    relocated.init(0);
    relocated.set_block_type(BlockType::Entry);
    relocated.flush(&mut buffer).unwrap();

    let mut reread = Block::new();
    reread.init(0);
    reread.read_header(&buffer).unwrap();
    assert_eq!(reread.key(&buffer).unwrap(), Binary::from("k"));
    assert_eq!(reread.value(&buffer).unwrap(), Binary::from("v"));
}
