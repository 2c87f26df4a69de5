//! Merged response handed to consumers after a dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::pagination::PaginationWindow;
use crate::constants::RESULTS_FIELD;

/// Logical union of every window's response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedResponse {
    body: Map<String, Value>,
    windows: Vec<PaginationWindow>,
}

impl MergedResponse {
    #[must_use]
    pub fn new(body: Map<String, Value>, windows: Vec<PaginationWindow>) -> Self {
        Self { body, windows }
    }

    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// The concatenated `results` list, empty when the route returns none.
    #[must_use]
    pub fn results(&self) -> &[Value] {
        self.body.get(RESULTS_FIELD).and_then(Value::as_array).map_or(&[], Vec::as_slice)
    }

    /// Windows that contributed, in merge order.
    #[must_use]
    pub fn windows(&self) -> &[PaginationWindow] {
        &self.windows
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}
