//! Custom deserializers for forgiving parsing of model-produced JSON.
//!
//! The model is instructed, not guaranteed, to follow the artifact schema. These helpers
//! coerce near-misses (nulls, numbers where strings were asked for, a bare string where a
//! list was asked for) into the expected shape instead of rejecting the whole artifact.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserializes a string field, tolerating `null` and scalar values.
///
/// # Accepted Formats
///
/// * **String**: used as-is
/// * **Null / missing**: empty string
/// * **Number / bool**: rendered with `to_string`
///
/// # Errors
///
/// Returns an error for arrays and objects.
pub fn de_forgiving_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Option::<Value>::deserialize(deserializer)?;
    match v {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(D::Error::custom(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

/// Deserializes a list of strings, tolerating a bare string, `null`, and scalar items.
///
/// # Examples
///
/// ```json
/// { "key_metrics": ["688 customers > $1M", "$110.5M FCF"] }   // canonical
/// { "key_metrics": "688 customers > $1M" }                   // -> one-element list
/// { "key_metrics": null }                                    // -> empty list
/// { "key_metrics": ["NRR", 125] }                            // -> ["NRR", "125"]
/// ```
///
/// Null items and empty strings are dropped.
pub fn de_forgiving_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let v = Option::<Value>::deserialize(deserializer)?;
    let items = match v {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(single @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => vec![single],
        Some(other) => {
            return Err(D::Error::custom(format!(
                "expected a list of strings, got {}",
                other
            )));
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Null => {}
            Value::String(s) => {
                if !s.trim().is_empty() {
                    out.push(s);
                }
            }
            Value::Number(n) => out.push(n.to_string()),
            Value::Bool(b) => out.push(b.to_string()),
            other => {
                return Err(D::Error::custom(format!(
                    "expected a string list item, got {}",
                    other
                )));
            }
        }
    }
    Ok(out)
}
