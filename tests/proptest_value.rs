//! Property-based tests for the value model.
//!
//! Tests the following properties:
//! - comparison is reflexive and antisymmetric across all tags
//! - same-tag comparisons agree with the natural order
//! - truthiness of null and object handles
//! - integral numbers survive a trip through text

use cinder::lang::{ObjectHandle, Value};
use proptest::prelude::*;
use std::cmp::Ordering;

// =============================================================================
// Strategies
// =============================================================================

fn arb_number() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

fn arb_handle() -> impl Strategy<Value = ObjectHandle> {
    1u32..10_000u32
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        arb_number().prop_map(Value::Number),
        "[a-z0-9 .-]{0,8}".prop_map(Value::Text),
        arb_handle().prop_map(Value::Object),
    ]
}

// =============================================================================
// Comparison laws
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn compare_is_reflexive(v in arb_value()) {
        prop_assert_eq!(v.compare(&v), Ordering::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
    }

    #[test]
    fn null_sorts_below_everything_else(v in arb_value()) {
        prop_assume!(v != Value::Null);
        prop_assert_eq!(Value::Null.compare(&v), Ordering::Less);
    }

    #[test]
    fn text_compares_bytewise(a in "[a-z0-9]{0,8}", b in "[a-z0-9]{0,8}") {
        let expected = a.as_bytes().cmp(b.as_bytes());
        prop_assert_eq!(Value::Text(a).compare(&Value::Text(b)), expected);
    }

    #[test]
    fn integers_compare_numerically(a in -100_000i32..100_000, b in -100_000i32..100_000) {
        let ordering = Value::Number(a as f32).compare(&Value::Number(b as f32));
        prop_assert_eq!(ordering, a.cmp(&b));
    }

    #[test]
    fn numbers_within_epsilon_are_equal(x in -1000.0f32..1000.0f32) {
        let nudged = Value::Number(x + 1.0e-6);
        prop_assert_eq!(Value::Number(x).compare(&nudged), Ordering::Equal);
    }
}

// =============================================================================
// Coercion laws
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn object_handles_are_truthy(h in arb_handle()) {
        prop_assert!(Value::Object(h).as_bool());
        prop_assert!(!Value::Null.as_bool());
    }

    #[test]
    fn integral_numbers_roundtrip_through_text(n in -1_000_000i32..1_000_000) {
        let text = Value::Number(n as f32).as_text();
        prop_assert_eq!(&text, &n.to_string());
        prop_assert_eq!(Value::Text(text).as_number(), n as f32);
    }

    #[test]
    fn copy_is_independent(v in arb_value()) {
        let mut copy = Value::Null;
        v.copy_into(&mut copy);
        prop_assert_eq!(&copy, &v);

        copy.set_text("CHANGED");
        prop_assert_ne!(&copy, &v);
    }
}
