//! Merging per-window response bodies into one response.
//!
//! Windows are folded in ascending `offset + limit` order no matter when
//! they completed. Per field:
//! - arrays are concatenated; a later null or non-array never replaces
//!   what has been collected
//! - numbers keep the first value seen, except additive fields which are
//!   summed; a later null or non-number leaves them untouched
//! - strings, booleans, nulls and objects take the last value seen
//!
//! A body that is a bare array is treated as `results`; any other
//! non-object body is stored under `value`.

use std::collections::BTreeSet;

use marketlens_domain::constants::{DEFAULT_ADDITIVE_FIELDS, RESULTS_FIELD, VALUE_FIELD};
use marketlens_domain::{MergedResponse, PaginationWindow};
use serde_json::{Map, Number, Value};
use tracing::warn;

/// Field rules for [`MergePolicy::merge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    additive_fields: BTreeSet<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self { additive_fields: DEFAULT_ADDITIVE_FIELDS.iter().map(ToString::to_string).collect() }
    }
}

impl MergePolicy {
    /// Policy with no additive fields.
    #[must_use]
    pub fn first_wins() -> Self {
        Self { additive_fields: BTreeSet::new() }
    }

    #[must_use]
    pub fn with_additive_field(mut self, name: impl Into<String>) -> Self {
        self.additive_fields.insert(name.into());
        self
    }

    #[must_use]
    pub fn additive_fields(&self) -> &BTreeSet<String> {
        &self.additive_fields
    }

    /// Fold window bodies in position order.
    #[must_use]
    pub fn merge(&self, mut responses: Vec<(PaginationWindow, Value)>) -> MergedResponse {
        responses.sort_by_key(|(window, _)| (window.position(), window.offset));

        let mut body = Map::new();
        let mut windows = Vec::with_capacity(responses.len());
        for (window, value) in responses {
            windows.push(window);
            for (key, incoming) in normalise(value) {
                self.merge_field(&mut body, key, incoming);
            }
        }
        MergedResponse::new(body, windows)
    }

    fn merge_field(&self, body: &mut Map<String, Value>, key: String, incoming: Value) {
        let Some(existing) = body.get_mut(&key) else {
            body.insert(key, incoming);
            return;
        };

        let additive = self.additive_fields.contains(&key);
        match (existing, incoming) {
            (Value::Array(items), Value::Array(more)) => items.extend(more),
            (Value::Array(_) | Value::Number(_), Value::Null) => {}
            (Value::Array(_), other) => {
                warn!(field = %key, kind = kind_of(&other), "merge.non_list_ignored");
            }
            (slot, Value::Number(next)) => {
                if let Value::Number(current) = &*slot {
                    if additive {
                        let sum = add_numbers(current, &next);
                        *slot = sum;
                    }
                } else if slot.is_null() {
                    *slot = Value::Number(next);
                }
            }
            (Value::Number(_), other) if additive => {
                warn!(field = %key, kind = kind_of(&other), "merge.non_numeric_ignored");
            }
            (slot, other) => *slot = other,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn normalise(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Array(items) => {
            let mut map = Map::new();
            map.insert(RESULTS_FIELD.to_string(), Value::Array(items));
            map
        }
        other => {
            let mut map = Map::new();
            map.insert(VALUE_FIELD.to_string(), other);
            map
        }
    }
}

fn add_numbers(a: &Number, b: &Number) -> Value {
    if let Some(sum) = a.as_i64().zip(b.as_i64()).and_then(|(x, y)| x.checked_add(y)) {
        return Value::from(sum);
    }
    if let Some(sum) = a.as_u64().zip(b.as_u64()).and_then(|(x, y)| x.checked_add(y)) {
        return Value::from(sum);
    }
    let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    Number::from_f64(sum).map_or(Value::Null, Value::Number)
}
