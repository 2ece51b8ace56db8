//! Tests for CapacityPolicy
//!
//! These tests verify:
//! - Growth and shrinkage thresholds
//! - Grow planning by bounded doubling
//! - Shrink planning by halving toward the minimum
//! - Fixed policies

use bufmap::buffer::CapacityPolicy;
use bufmap::config::{BufferConfig, DEFAULT_MAX_INCREMENT};
use bufmap::BufMapError;

// =============================================================================
// Helper Functions
// =============================================================================

fn policy(capacity: usize) -> CapacityPolicy {
    CapacityPolicy::with_bounds(capacity, 256, 4096, DEFAULT_MAX_INCREMENT)
}

// =============================================================================
// Threshold Tests
// =============================================================================

#[test]
fn test_thresholds_at_minimum() {
    let p = policy(256);
    assert_eq!(p.growth_threshold(), 230);
    // never shrink below the minimum
    assert_eq!(p.shrinkage_threshold(), 0);
}

#[test]
fn test_thresholds_at_maximum() {
    let p = policy(4096);
    assert_eq!(p.growth_threshold(), 4096);
    assert_eq!(p.shrinkage_threshold(), 1638);
}

#[test]
fn test_shrinkage_threshold_respects_minimum() {
    let p = policy(512);
    assert_eq!(p.shrinkage_threshold(), 256);
}

#[test]
fn test_new_validates_config() {
    let config = BufferConfig {
        initial_capacity: 32,
        ..BufferConfig::default()
    };
    assert!(matches!(CapacityPolicy::new(&config), Err(BufMapError::Config(_))));
}

// =============================================================================
// Grow Planning Tests
// =============================================================================

#[test]
fn test_plan_grow_not_needed() {
    assert_eq!(policy(256).plan_grow(200).unwrap(), None);
}

#[test]
fn test_plan_grow_doubles() {
    assert_eq!(policy(256).plan_grow(231).unwrap(), Some(512));
    assert_eq!(policy(256).plan_grow(1000).unwrap(), Some(2048));
}

#[test]
fn test_plan_grow_stops_at_maximum() {
    assert_eq!(policy(256).plan_grow(4000).unwrap(), Some(4096));
}

#[test]
fn test_plan_grow_beyond_maximum_is_out_of_memory() {
    let err = policy(256).plan_grow(4097).unwrap_err();
    assert!(err.is_out_of_memory());
}

#[test]
fn test_plan_grow_bounded_increment() {
    let p = CapacityPolicy::with_bounds(1000, 1000, 10_000, 100);
    // 1000 -> 1100 -> 1200, each step adding at most 100
    assert_eq!(p.plan_grow(1000).unwrap(), Some(1200));
}

// =============================================================================
// Shrink Planning Tests
// =============================================================================

#[test]
fn test_plan_shrink_halves_to_minimum() {
    assert_eq!(policy(1024).plan_shrink(17), Some(256));
}

#[test]
fn test_plan_shrink_keeps_required() {
    assert_eq!(policy(4096).plan_shrink(1500), Some(2048));
}

#[test]
fn test_plan_shrink_not_needed() {
    assert_eq!(policy(1024).plan_shrink(500), None);
    assert_eq!(policy(256).plan_shrink(0), None);
}

// =============================================================================
// Fixed Policy Tests
// =============================================================================

#[test]
fn test_fixed_policy_never_resizes() {
    let p = CapacityPolicy::fixed(1024);
    assert_eq!(p.growth_threshold(), 1024);
    assert_eq!(p.shrinkage_threshold(), 0);
    assert_eq!(p.plan_grow(1024).unwrap(), None);
    assert!(p.plan_grow(1025).unwrap_err().is_out_of_memory());
    assert_eq!(p.plan_shrink(0), None);
}
