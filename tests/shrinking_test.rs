//! # Shrinking Test Suite
//!
//! Checks on the greedy shrinker as seen through full property runs and
//! through [`Shrinker`] directly: the final value still fails, is never larger
//! than the original, and the search terminates within its budget.

use conjecture_shapes::{
    run_property, run_typed, shaped_record, shrink, sort_key, Allocator, BudgetAllocator,
    GeneratedValue, PropertyConfig, ShapeDescriptor, ShapeRegistry, Shrinker, ShrinkStatus,
    Variant,
};

fn seeded(seed: u64) -> PropertyConfig {
    PropertyConfig::default().with_seed(seed)
}

fn ints(values: &[i128]) -> GeneratedValue {
    GeneratedValue::Sequence(values.iter().map(|v| GeneratedValue::Int(*v)).collect())
}

#[derive(Debug)]
struct Order {
    quantity: u32,
    note: Option<String>,
}

shaped_record!(Order {
    quantity: u32,
    note: Option<String>,
});

#[test]
fn test_shrinks_to_boundary_of_failing_region() {
    let result = run_property(seeded(1), &ShapeDescriptor::signed(32), |v: &GeneratedValue| {
        v.as_int().map_or(false, |n| n > -30)
    });
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("-30"));
}

#[test]
fn test_sequence_shrinks_to_single_offending_element() {
    let result = run_property(
        seeded(2),
        &ShapeDescriptor::sequence(ShapeDescriptor::unsigned(8)),
        |v: &GeneratedValue| {
            v.as_sequence()
                .map_or(false, |xs| xs.iter().filter_map(GeneratedValue::as_int).all(|n| n < 50))
        },
    );
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("[50]"));
}

#[test]
fn test_optional_shrinks_to_none() {
    let result = run_property(
        seeded(3),
        &ShapeDescriptor::optional(ShapeDescriptor::text()),
        |_: &GeneratedValue| false,
    );
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("None"));
}

#[test]
fn test_enumeration_shrinks_to_first_failing_variant() {
    let shape = ShapeDescriptor::enumeration(vec![
        Variant::unit("Idle"),
        Variant::with_payload("Running", ShapeDescriptor::unsigned(16)),
        Variant::with_payload("Stopped", ShapeDescriptor::text()),
    ]);
    let result = run_property(seeded(4), &shape, |v: &GeneratedValue| {
        v.as_variant().map_or(false, |(index, _)| index == 0)
    });
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("Running(0)"));
}

#[test]
fn test_text_shrinks_toward_spaces() {
    let result = run_property(seeded(5), &ShapeDescriptor::text(), |v: &GeneratedValue| {
        v.as_bytes().map_or(false, |bytes| bytes.len() < 3)
    });
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("\"   \""));
}

#[test]
fn test_typed_record_shrinks_fields_independently() {
    let result = run_typed::<Order, _, _>(seeded(6), |order: Order| order.quantity < 40);
    assert!(!result.passed);
    assert_eq!(result.best_counterexample(), Some("{quantity: 40, note: None}"));
}

#[test]
fn test_shrunk_value_is_never_larger() {
    let shape = ShapeDescriptor::sequence(ShapeDescriptor::signed(16));
    let registry = ShapeRegistry::new();
    let original = ints(&[-7, 19, 0, 33, -2, 12]);
    let fails = |v: &GeneratedValue| {
        v.as_sequence()
            .map_or(false, |xs| xs.iter().filter_map(GeneratedValue::as_int).any(|n| n.abs() > 15))
    };
    let shrunk = shrink(&shape, &original, &registry, fails, 1000).unwrap();
    assert!(fails(&shrunk));
    assert!(sort_key(&shrunk) < sort_key(&original));
    assert_eq!(shrunk, ints(&[16]));
}

#[test]
fn test_shrinker_terminates_on_tiny_budget() {
    let shape = ShapeDescriptor::sequence(ShapeDescriptor::unsigned(64));
    let registry = ShapeRegistry::new();
    let mut alloc = BudgetAllocator::new(1 << 16);
    let original = ints(&[500, 400, 300]);
    let outcome = Shrinker::new(&shape, &registry, &mut alloc, 10).shrink(&original, |_| true);
    assert_eq!(outcome.attempts, 10);
    assert_eq!(outcome.status, ShrinkStatus::BudgetExhausted);
    assert!(outcome.shrunk.is_some());
}

#[test]
fn test_shrinker_reaches_natural_minimum() {
    let shape = ShapeDescriptor::sequence(ShapeDescriptor::unsigned(8));
    let registry = ShapeRegistry::new();
    let mut alloc = BudgetAllocator::new(1 << 16);
    let outcome = Shrinker::new(&shape, &registry, &mut alloc, 1000).shrink(&ints(&[3, 1]), |_| true);
    assert_eq!(outcome.status, ShrinkStatus::Minimal);
    assert_eq!(outcome.shrunk, Some(ints(&[0])));
}

#[test]
fn test_shrinker_stops_when_allocator_refuses() {
    let shape = ShapeDescriptor::sequence(ShapeDescriptor::unsigned(8));
    let registry = ShapeRegistry::new();
    let mut alloc = BudgetAllocator::new(0);
    let outcome = Shrinker::new(&shape, &registry, &mut alloc, 1000).shrink(&ints(&[3, 1]), |_| true);
    assert_eq!(outcome.status, ShrinkStatus::OutOfMemory);
    assert_eq!(outcome.shrunk, None);
    assert_eq!(alloc.in_use(), 0);
}

#[test]
fn test_shrinker_stops_at_local_minimum() {
    let shape = ShapeDescriptor::unsigned(8);
    let registry = ShapeRegistry::new();
    let mut alloc = BudgetAllocator::new(1 << 16);
    let outcome = Shrinker::new(&shape, &registry, &mut alloc, 1000)
        .shrink(&GeneratedValue::Int(10), |v| v.as_int() == Some(10));
    assert_eq!(outcome.status, ShrinkStatus::LocalMinimum);
    assert_eq!(outcome.shrunk, None);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.steps, 0);
    assert_eq!(alloc.in_use(), 0);
}
