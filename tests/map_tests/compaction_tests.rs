//! Tests for compaction
//!
//! These tests verify:
//! - Allocation that only succeeds after compacting fragmented space
//! - Full compaction before the buffer shrinks
//! - No two free blocks ever end up adjacent
//! - Fill left by values shrunk in place is reclaimed
//! - Dump output

use bufmap::{BinaryMap, Binary, Config, DirectBufferManager, FixedBufferManager};

// =============================================================================
// Helper Functions
// =============================================================================

fn checked_fixed(capacity: usize, strict: bool) -> BinaryMap<FixedBufferManager> {
    let config = Config::builder().strict(strict).check_invariants(true).build();
    BinaryMap::with_config(FixedBufferManager::new(capacity).unwrap(), config).unwrap()
}

fn key(i: usize) -> String {
    format!("key{:05}", i)
}

/// Fill the map with 40 entries of 87 bytes, then punch a hole every other
/// entry
fn fragment(map: &mut BinaryMap<FixedBufferManager>) {
    for i in 0..40 {
        map.put(key(i), vec![i as u8; 50]).unwrap();
    }
    for i in (0..40).step_by(2) {
        map.remove(key(i)).unwrap();
    }
}

/// Fill the map with 8 entries of 117 bytes, then shrink every value in
/// place so each entry carries 60 bytes of fill
fn fill_fragment(map: &mut BinaryMap<FixedBufferManager>) {
    for i in 0..8 {
        map.put(key(i), vec![i as u8; 80]).unwrap();
    }
    for i in 0..8 {
        map.put(key(i), vec![i as u8; 20]).unwrap();
    }
}

/// Entry header bytes on top of key and value
const ENTRY_OVERHEAD: usize = 29;

// =============================================================================
// Fragmentation Tests
// =============================================================================

#[test]
fn test_large_put_after_fragmentation() {
    let mut map = checked_fixed(4096, false);
    fragment(&mut map);
    assert_eq!(map.len(), 20);

    // no single hole is large enough, but the free space in total is
    map.put("big", vec![9u8; 1000]).unwrap();

    assert_eq!(map.get("big").unwrap(), Some(Binary::from(vec![9u8; 1000])));
    for i in (1..40).step_by(2) {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![i as u8; 50])));
    }
}

#[test]
fn test_large_put_after_fragmentation_strict() {
    let mut map = checked_fixed(4096, true);
    fragment(&mut map);

    map.put("big", vec![9u8; 1000]).unwrap();
    map.check("after compacting put").unwrap();
    for i in (1..40).step_by(2) {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![i as u8; 50])));
    }
}

#[test]
fn test_growing_values_relocate() {
    let mut map = checked_fixed(8192, false);
    for i in 0..20 {
        map.put(key(i), "small").unwrap();
    }
    for round in 1..6 {
        for i in 0..20 {
            map.put(key(i), vec![round as u8; round * 40]).unwrap();
        }
    }
    for i in 0..20 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![5u8; 200])));
    }
}

#[test]
fn test_out_of_memory_when_space_is_exhausted() {
    let mut map = checked_fixed(4096, false);
    fragment(&mut map);

    // more than the free capacity can ever hold
    let err = map.put("huge", vec![0u8; 3500]).unwrap_err();
    assert!(err.is_out_of_memory());
    assert_eq!(map.len(), 20);
}

#[test]
fn test_operations_keep_compacting() {
    let mut map = checked_fixed(4096, false);
    fragment(&mut map);

    // every get/put/remove pair moves the compaction cursor
    for round in 0..200 {
        let i = 1 + 2 * (round % 20);
        map.put(key(i), vec![round as u8; 50]).unwrap();
    }
    map.check("after many updates").unwrap();
}

// =============================================================================
// Fill Reclamation Tests
// =============================================================================

#[test]
fn test_large_put_after_values_shrink_in_place() {
    let mut map = checked_fixed(1024, false);
    fill_fragment(&mut map);
    assert_eq!(map.used_capacity(), 8 * (ENTRY_OVERHEAD + 8 + 20));

    // the free space is scattered over the fill of every entry
    let len = map.free_capacity() - ENTRY_OVERHEAD - 3;
    map.put("big", vec![7u8; len]).unwrap();

    assert_eq!(map.free_capacity(), 0);
    assert_eq!(map.get("big").unwrap(), Some(Binary::from(vec![7u8; len])));
    for i in 0..8 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![i as u8; 20])));
    }
}

#[test]
fn test_large_put_after_values_shrink_in_place_strict() {
    let mut map = checked_fixed(1024, true);
    fill_fragment(&mut map);

    let len = map.free_capacity() - ENTRY_OVERHEAD - 3;
    map.put("big", vec![7u8; len]).unwrap();
    map.check("after packing fill").unwrap();
    for i in 0..8 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![i as u8; 20])));
    }
}

#[test]
fn test_shrink_reclaims_fill() {
    let config = Config::builder()
        .initial_capacity(1024)
        .max_capacity(1 << 20)
        .check_invariants(true)
        .build();
    let mut map: BinaryMap<DirectBufferManager> = BinaryMap::direct(config).unwrap();

    // 40 entries of 237 bytes grow the buffer to 16 KiB
    for i in 0..40 {
        map.put(key(i), vec![1u8; 200]).unwrap();
    }
    assert_eq!(map.capacity(), 16384);

    // shrinking every value in place leaves 1880 bytes in use, which a
    // 4 KiB buffer holds above its shrinkage threshold
    for i in 0..40 {
        map.put(key(i), vec![2u8; 10]).unwrap();
    }
    assert_eq!(map.used_capacity(), 40 * (ENTRY_OVERHEAD + 8 + 10));
    assert_eq!(map.capacity(), 4096);

    for i in 0..30 {
        map.remove(key(i)).unwrap();
    }
    assert_eq!(map.capacity(), 1024);
    for i in 30..40 {
        assert_eq!(map.get(key(i)).unwrap(), Some(Binary::from(vec![2u8; 10])));
    }
}

// =============================================================================
// Dump Tests
// =============================================================================

#[test]
fn test_dump_lists_structure() {
    let mut map = BinaryMap::fixed(128).unwrap();
    map.put("k", "v").unwrap();

    let dump = map.dump();
    assert!(dump.contains("entries=1"));
    assert!(dump.contains("capacity=128"));
    assert!(dump.contains("Buckets: ["));
    assert!(dump.contains("Free lists: ["));
    assert!(dump.contains("nil"));
    // 128 bytes at 32 per row
    assert!(dump.contains("00000060: "));
}
