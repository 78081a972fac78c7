//! Air quality index payloads
//!
//! The upstream index response is kept verbatim; the ordinal value shown on
//! the map is derived from it on demand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Highest ordinal on the index scale ("very bad").
pub const MAX_INDEX_VALUE: u8 = 5;

/// Marker colour for stations whose index is unknown.
pub const NO_DATA_COLOR: &str = "#95a5a6";

/// Opaque upstream index JSON for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexPayload(pub Value);

impl IndexPayload {
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// Ordinal index value `0..=5`, or `None` when the payload has no usable
    /// value.
    ///
    /// Shapes are tried in a fixed order and the first one holding a usable
    /// value wins:
    /// 1. `AqIndex["Wartość indeksu"]` (current API)
    /// 2. `stIndexLevel.id` (legacy API)
    /// 3. top-level `"Wartość indeksu"`
    #[must_use]
    pub fn usable_index_value(&self) -> Option<u8> {
        let candidates = [
            self.0.get("AqIndex").and_then(|v| v.get("Wartość indeksu")),
            self.0.get("stIndexLevel").and_then(|v| v.get("id")),
            self.0.get("Wartość indeksu"),
        ];

        candidates.into_iter().flatten().find_map(as_index_value)
    }
}

fn as_index_value(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    u8::try_from(n).ok().filter(|v| *v <= MAX_INDEX_VALUE)
}

/// Worst (highest) known index among a group of markers, used to colour a
/// cluster. `None` when no member has a value yet.
pub fn dominant_index_value<I>(values: I) -> Option<u8>
where
    I: IntoIterator<Item = Option<u8>>,
{
    values.into_iter().flatten().max()
}

/// Map marker colour for an index value.
#[must_use]
pub fn marker_color(value: Option<u8>) -> &'static str {
    match value {
        Some(0) => "#1e8449", // very good
        Some(1) => "#52be80", // good
        Some(2) => "#f4d03f", // moderate
        Some(3) => "#f39c12", // sufficient
        Some(4) => "#e74c3c", // bad
        Some(5) => "#a93226", // very bad
        _ => NO_DATA_COLOR,
    }
}
