//! `encode_for_storage`/`decode_runtime_value` round-trip property (spec
//! §4.F's wire format) plus `NodeId` determinism under `proptest`.

use proptest::prelude::*;
use voxlogica::codec::{decode_runtime_value, encode_for_storage};
use voxlogica::ir::{compute_node_id, OutputKind};
use voxlogica::value::{NdArray, ScalarValue, VoxValue, MAX_PAGE_SIZE};

fn scalar_strategy() -> impl Strategy<Value = ScalarValue> {
    prop_oneof![
        Just(ScalarValue::Null),
        any::<bool>().prop_map(ScalarValue::Bool),
        any::<i64>().prop_map(ScalarValue::Integer),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(ScalarValue::Number),
        ".{0,16}".prop_map(ScalarValue::Str),
    ]
}

proptest! {
    #[test]
    fn scalar_round_trips_through_the_codec(scalar in scalar_strategy()) {
        let value = VoxValue::Scalar(scalar);
        let encoded = encode_for_storage(&value, MAX_PAGE_SIZE).unwrap();
        let decoded = decode_runtime_value(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn ndarray_round_trips_through_the_codec(data in prop::collection::vec(any::<f64>().prop_filter("finite", |f| f.is_finite()), 0..64)) {
        let array = NdArray { shape: vec![data.len()], data };
        let value = VoxValue::NdArray(array);
        let encoded = encode_for_storage(&value, MAX_PAGE_SIZE).unwrap();
        let decoded = decode_runtime_value(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn node_id_is_a_pure_function_of_its_inputs(operator in "[a-z]{1,8}", attrs in "[a-z]{0,8}") {
        let a = compute_node_id("primitive", &operator, &[], &[], &serde_json::json!({ "k": attrs }), OutputKind::Scalar);
        let b = compute_node_id("primitive", &operator, &[], &[], &serde_json::json!({ "k": attrs }), OutputKind::Scalar);
        prop_assert_eq!(a, b);
    }
}
