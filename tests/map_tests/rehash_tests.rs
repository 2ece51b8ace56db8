//! Tests for the hash directory
//!
//! These tests verify:
//! - Bucket level changes at the load factor thresholds
//! - Lookups during an incremental rehash
//! - Rehash completion after one bucket per operation
//! - Modulo shrink on insertion after removals

use bufmap::map::BUCKET_COUNTS;
use bufmap::{BinaryMap, Binary, Config, DirectBufferManager};

// =============================================================================
// Helper Functions
// =============================================================================

fn checked_map() -> BinaryMap<DirectBufferManager> {
    let config = Config::builder()
        .initial_capacity(4096)
        .max_capacity(1 << 22)
        .check_invariants(true)
        .build();
    BinaryMap::direct(config).unwrap()
}

fn key(i: usize) -> String {
    format!("key{:05}", i)
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_initial_directory() {
    let map = checked_map();
    assert_eq!(map.bucket_level(), 0);
    assert_eq!(map.modulo(), BUCKET_COUNTS[0]);
    assert_eq!(map.bucket_count(), 7);
    assert!(!map.is_rehashing());
}

#[test]
fn test_level_grows_at_max_load_factor() {
    let mut map = checked_map();

    // 7 * 0.875 = 6 entries trigger the next level
    for i in 0..5 {
        map.put(key(i), "v").unwrap();
    }
    assert_eq!(map.bucket_level(), 0);

    map.put(key(5), "v").unwrap();
    assert_eq!(map.bucket_level(), 1);
    assert_eq!(map.modulo(), 47);
    assert_eq!(map.previous_modulo(), 7);
    assert_eq!(map.bucket_count(), 47);
    assert!(map.is_rehashing());
}

#[test]
fn test_lookups_during_rehash() {
    let mut map = checked_map();
    for i in 0..6 {
        map.put(key(i), format!("v{}", i)).unwrap();
    }
    assert!(map.is_rehashing());

    // one bucket of the previous modulo is rehashed per lookup
    for i in 0..6 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(format!("v{}", i))));
    }
    assert!(map.is_rehashing());

    assert!(map.contains_key(key(0)).unwrap());
    assert!(!map.is_rehashing());
    assert_eq!(map.bucket_count(), 47);
    for i in 0..6 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(format!("v{}", i))));
    }
}

#[test]
fn test_many_levels() {
    let mut map = checked_map();
    for i in 0..1000 {
        map.put(key(i), "x").unwrap();
    }
    // 797 * 0.875 = 697 <= 1000 < 3191 * 0.875
    assert_eq!(map.bucket_level(), 4);
    assert_eq!(map.modulo(), 3191);
    for i in 0..1000 {
        assert!(map.contains_key(key(i)).unwrap());
    }
}

#[test]
fn test_second_level_tracks_previous_modulo() {
    let mut map = checked_map();
    // 47 * 0.875 = 41 entries reach level 2
    for i in 0..42 {
        map.put(key(i), "x").unwrap();
    }
    assert_eq!(map.bucket_level(), 2);
    assert_eq!(map.previous_modulo(), 47);
    for i in 0..42 {
        assert!(map.contains_key(key(i)).unwrap());
    }
}

// =============================================================================
// Shrink Tests
// =============================================================================

#[test]
fn test_level_shrinks_on_insert_after_removals() {
    let mut map = checked_map();
    for i in 0..6 {
        map.put(key(i), "v").unwrap();
    }
    assert_eq!(map.bucket_level(), 1);

    for i in 0..3 {
        map.remove(key(i)).unwrap();
    }
    // removals alone never change the level
    assert_eq!(map.bucket_level(), 1);

    // 7 * 0.75 = 5; four entries is below the shrink count
    map.put(key(100), "v").unwrap();
    assert_eq!(map.bucket_level(), 0);
    assert_eq!(map.modulo(), 7);
    assert_eq!(map.previous_modulo(), 47);
    assert!(map.is_rehashing());
    assert_eq!(map.bucket_count(), 47);

    for i in 3..6 {
        assert!(map.contains_key(key(i)).unwrap());
    }
    for _ in 0..47 {
        map.get(key(100)).unwrap();
    }
    assert!(!map.is_rehashing());
    assert_eq!(map.bucket_count(), 7);
    for i in 3..6 {
        assert!(map.contains_key(key(i)).unwrap());
    }
}

#[test]
fn test_clear_resets_directory() {
    let mut map = checked_map();
    for i in 0..100 {
        map.put(key(i), "v").unwrap();
    }
    map.clear().unwrap();
    assert_eq!(map.bucket_level(), 0);
    assert_eq!(map.bucket_count(), 7);
    assert!(!map.is_rehashing());
}
