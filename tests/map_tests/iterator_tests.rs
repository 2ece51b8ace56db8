//! Tests for iteration
//!
//! These tests verify:
//! - Keys, values and entries visit every mapping exactly once
//! - Removal through an iterator
//! - Detached cursors detect a changed bucket count
//! - Cursor misuse is reported

use std::collections::HashSet;

use bufmap::{BinaryMap, Binary, BufMapError, Config, DirectBufferManager};

// =============================================================================
// Helper Functions
// =============================================================================

fn filled_map(count: usize) -> BinaryMap<DirectBufferManager> {
    let config = Config::builder()
        .initial_capacity(1024)
        .max_capacity(1 << 20)
        .check_invariants(true)
        .build();
    let mut map = BinaryMap::direct(config).unwrap();
    for i in 0..count {
        map.put(key(i), value(i)).unwrap();
    }
    map
}

fn key(i: usize) -> String {
    format!("key{:05}", i)
}

fn value(i: usize) -> String {
    format!("value-{}", i)
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_keys_visit_every_key_once() {
    let mut map = filled_map(100);
    let keys: Vec<Binary> = map.keys().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(keys.len(), 100);
    let unique: HashSet<Binary> = keys.into_iter().collect();
    let expected: HashSet<Binary> = (0..100).map(|i| Binary::from(key(i))).collect();
    assert_eq!(unique, expected);
}

#[test]
fn test_keys_of_empty_map() {
    let mut map = filled_map(0);
    assert_eq!(map.keys().unwrap().count(), 0);
}

#[test]
fn test_entries_match_get() {
    let mut map = filled_map(30);
    let entries: Vec<(Binary, Binary)> = map.entries().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(entries.len(), 30);
    for (k, v) in entries {
        assert_eq!(map.get(&k).unwrap(), Some(v));
    }
}

#[test]
fn test_values() {
    let mut map = filled_map(10);
    let mut values: Vec<String> = map
        .values()
        .unwrap()
        .map(|v| v.unwrap().to_string())
        .collect();
    values.sort();

    let mut expected: Vec<String> = (0..10).map(value).collect();
    expected.sort();
    assert_eq!(values, expected);
}

#[test]
fn test_iteration_finishes_pending_rehash() {
    let mut map = filled_map(6);
    assert!(map.is_rehashing());

    let count = map.keys().unwrap().count();
    assert_eq!(count, 6);
    assert!(!map.is_rehashing());
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_remove_through_keys() {
    let mut map = filled_map(50);
    {
        let mut keys = map.keys().unwrap();
        while let Some(k) = keys.next() {
            let k = k.unwrap();
            if k.as_ref().ends_with(b"0") || k.as_ref().ends_with(b"5") {
                keys.remove_current().unwrap();
            }
        }
    }

    assert_eq!(map.len(), 40);
    for i in 0..50 {
        assert_eq!(map.contains_key(key(i)).unwrap(), i % 5 != 0);
    }
}

#[test]
fn test_remove_every_entry_through_entries() {
    let mut map = filled_map(25);
    {
        let mut entries = map.entries().unwrap();
        while let Some(entry) = entries.next() {
            entry.unwrap();
            entries.remove_current().unwrap();
        }
    }
    assert!(map.is_empty());
    map.check("after draining").unwrap();
}

#[test]
fn test_remove_without_next_is_illegal() {
    let mut map = filled_map(3);
    let mut cursor = map.key_cursor().unwrap();
    assert!(matches!(cursor.remove(&mut map), Err(BufMapError::IllegalState(_))));

    cursor.next(&mut map).unwrap().unwrap();
    cursor.remove(&mut map).unwrap();
    assert!(matches!(cursor.remove(&mut map), Err(BufMapError::IllegalState(_))));
    assert_eq!(map.len(), 2);
}

// =============================================================================
// Concurrent Modification Tests
// =============================================================================

#[test]
fn test_cursor_detects_bucket_count_change() {
    let mut map = filled_map(3);
    let mut cursor = map.key_cursor().unwrap();

    // six entries move the map to the next bucket level
    for i in 3..10 {
        map.put(key(i), value(i)).unwrap();
    }

    match cursor.next(&mut map) {
        Err(BufMapError::ConcurrentModification { expected, actual }) => {
            assert_eq!(expected, 7);
            assert_eq!(actual, 47);
        }
        other => panic!("expected concurrent modification, got {:?}", other),
    }

    // the cursor stays finished
    assert_eq!(cursor.next(&mut map).unwrap(), None);
}

#[test]
fn test_cursor_over_cleared_map_just_ends() {
    let mut map = filled_map(60);
    let mut cursor = map.key_cursor().unwrap();
    assert!(cursor.next(&mut map).unwrap().is_some());

    map.clear().unwrap();

    // keys already read from the current bucket are still handed out; after
    // that the changed bucket count ends the walk since nothing is left
    let mut rest = 0;
    while cursor.next(&mut map).unwrap().is_some() {
        rest += 1;
    }
    assert!(rest < 60);
}

#[test]
fn test_cursor_tolerates_value_updates() {
    let mut map = filled_map(20);
    let mut cursor = map.key_cursor().unwrap();

    let mut seen = 0;
    while let Some(k) = cursor.next(&mut map).unwrap() {
        map.put(k, "updated").unwrap();
        seen += 1;
    }
    assert_eq!(seen, 20);
    assert_eq!(map.get(key(7)).unwrap(), Some(Binary::from("updated")));
}
