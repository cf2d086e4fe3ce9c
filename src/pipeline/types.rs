//! Pipeline data types.

use serde::{Deserialize, Serialize};

/// A stored todo record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub name: String,
}

/// Successful `GET /todos` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResponse {
    /// In store enumeration order, which is not stable across calls.
    pub todos: Vec<TodoItem>,
    /// Auth payload, passed through verbatim.
    pub user: serde_json::Value,
}

/// Fault injection switches taken from the query string.
///
/// A flag is set when any of its occurrences has a non-empty value.
/// Parsing never fails; unknown keys and repeats are tolerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultFlags {
    pub slow: bool,
    pub fail: bool,
}

impl FaultFlags {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut flags = Self::default();
        let Some(query) = query else {
            return flags;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "slow" => flags.slow = true,
                "fail" => flags.fail = true,
                _ => {}
            }
        }
        flags
    }
}
