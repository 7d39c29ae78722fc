//! Proptest generators for property-based testing.

use proptest::prelude::*;

use outbox_core::{NewOperation, ParamValue, Parameters, Timestamp};

/// Generate a scalar parameter value.
///
/// Floats are finite; non-finite values are rejected on enqueue.
pub fn param_value() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        any::<bool>().prop_map(ParamValue::Bool),
        any::<i64>().prop_map(ParamValue::Integer),
        (-1.0e9f64..1.0e9f64).prop_map(ParamValue::Float),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(ParamValue::String),
    ]
}

/// Generate a parameter name.
pub fn param_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Generate a parameter map.
pub fn parameters() -> impl Strategy<Value = Parameters> {
    prop::collection::btree_map(param_name(), param_value(), 0..8)
}

/// Generate an endpoint path.
pub fn endpoint() -> impl Strategy<Value = String> {
    "/api/[a-z]{1,12}(/[a-z0-9]{1,8}){0,2}"
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    0i64..=i64::MAX / 2
}

/// Generate a valid operation.
pub fn new_operation() -> impl Strategy<Value = NewOperation> {
    (endpoint(), parameters(), timestamp()).prop_map(|(endpoint, parameters, created_at)| {
        NewOperation::new(endpoint, parameters).with_created_at(created_at)
    })
}
