//! Tests for MappedBufferManager
//!
//! These tests verify:
//! - File length tracks capacity through create, grow and shrink
//! - Contents survive close and reopen
//! - Reopen bounds checking
//! - Destroy removes the file

use std::fs;
use std::path::PathBuf;

use bufmap::buffer::{BufferManager, MappedBufferManager};
use bufmap::config::BufferConfig;
use bufmap::BufMapError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("map.buf");
    (temp_dir, path)
}

fn small_config() -> BufferConfig {
    BufferConfig {
        initial_capacity: 256,
        max_capacity: 4096,
        ..BufferConfig::default()
    }
}

fn file_len(path: &PathBuf) -> u64 {
    fs::metadata(path).unwrap().len()
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_create_sizes_file() {
    let (_temp, path) = setup_temp_file();
    let manager = MappedBufferManager::create(&path, &small_config()).unwrap();
    assert_eq!(manager.capacity(), 256);
    assert_eq!(file_len(&path), 256);
    assert_eq!(manager.path(), path.as_path());
}

#[test]
fn test_grow_and_shrink_resize_file() {
    let (_temp, path) = setup_temp_file();
    let mut manager = MappedBufferManager::create(&path, &small_config()).unwrap();

    manager.grow(400).unwrap();
    assert_eq!(manager.capacity(), 512);
    assert_eq!(file_len(&path), 512);

    manager.shrink(17).unwrap();
    assert_eq!(manager.capacity(), 256);
    assert_eq!(file_len(&path), 256);
}

#[test]
fn test_contents_survive_reopen() {
    let (_temp, path) = setup_temp_file();
    {
        let mut manager = MappedBufferManager::create(&path, &small_config()).unwrap();
        manager.buffer_mut()[..5].copy_from_slice(b"hello");
        manager.close().unwrap();
    }

    let manager = MappedBufferManager::open(&path, &small_config()).unwrap();
    assert_eq!(&manager.buffer()[..5], b"hello");
    assert_eq!(manager.capacity(), 256);
}

#[test]
fn test_reopen_keeps_grown_capacity() {
    let (_temp, path) = setup_temp_file();
    {
        let mut manager = MappedBufferManager::create(&path, &small_config()).unwrap();
        manager.grow(1000).unwrap();
        manager.close().unwrap();
    }

    let manager = MappedBufferManager::open(&path, &small_config()).unwrap();
    assert_eq!(manager.capacity(), 2048);
    assert_eq!(manager.min_capacity(), 256);
}

#[test]
fn test_open_rejects_file_outside_bounds() {
    let (_temp, path) = setup_temp_file();
    fs::write(&path, vec![0u8; 100]).unwrap();

    let result = MappedBufferManager::open(&path, &small_config());
    assert!(matches!(result, Err(BufMapError::Config(_))));
}

#[test]
fn test_open_missing_file_is_io_error() {
    let (_temp, path) = setup_temp_file();
    let result = MappedBufferManager::open(&path, &small_config());
    assert!(matches!(result, Err(BufMapError::Io(_))));
}

#[test]
fn test_destroy_removes_file() {
    let (_temp, path) = setup_temp_file();
    let manager = MappedBufferManager::create(&path, &small_config()).unwrap();
    manager.destroy().unwrap();
    assert!(!path.exists());
}
