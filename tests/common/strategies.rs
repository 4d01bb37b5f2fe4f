use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use stepwise_core::models::ContextValue;

/// Child kinds of the standard hierarchy, one per branch
pub const LEAF_KINDS: [&str; 4] = ["timeout", "contention", "validation", "parse"];

pub fn context_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,24}"
}

pub fn context_value_strategy() -> impl Strategy<Value = ContextValue> {
    prop_oneof![
        ".{0,32}".prop_map(ContextValue::String),
        any::<i32>().prop_map(ContextValue::Integer),
        any::<i64>().prop_map(ContextValue::Long),
        // Quarter steps stay exact through the decimal text encoding
        (-1_000_000i32..1_000_000).prop_map(|n| ContextValue::Double(f64::from(n) / 4.0)),
        any::<bool>().prop_map(ContextValue::Boolean),
        (0i64..4_102_444_800i64).prop_map(|secs| {
            ContextValue::Date(Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
        }),
    ]
}

pub fn context_entries_strategy() -> impl Strategy<Value = Vec<(String, ContextValue)>> {
    prop::collection::vec((context_key_strategy(), context_value_strategy()), 0..16)
}
