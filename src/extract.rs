//! Structured extraction from unstructured model replies
//!
//! The model is told to return bare JSON but routinely wraps it in prose or code fences.
//! Extraction is a deliberate heuristic: take the text from the FIRST opening bracket of
//! the expected kind to the LAST matching closing bracket (greedy, outermost span) and
//! parse that. Anything outside the span is ignored; anything inside must be valid JSON
//! of the expected top-level kind.
//!
//! No field-level validation beyond what [`crate::schemas`] deserialization tolerates.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::schemas::{QuestionBatch, ResponseDraft, normalize_batch_ids};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no JSON payload found in model reply")]
    NoJsonFound,
    #[error("malformed JSON payload: {message}")]
    MalformedJson { message: String },
}

/// Expected top-level JSON kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Array,
    Object,
}

impl JsonShape {
    fn brackets(self) -> (char, char) {
        match self {
            JsonShape::Array => ('[', ']'),
            JsonShape::Object => ('{', '}'),
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            JsonShape::Array => value.is_array(),
            JsonShape::Object => value.is_object(),
        }
    }
}

/// Outermost bracketed span of the given shape.
///
/// No opening bracket at all is [`ExtractionError::NoJsonFound`]. An opening bracket with
/// no closing bracket after it is a truncated payload (typically a reply cut off by the
/// token budget) and reported as [`ExtractionError::MalformedJson`].
pub fn find_json_span(raw: &str, shape: JsonShape) -> Result<&str, ExtractionError> {
    let (open, close) = shape.brackets();
    let start = raw.find(open).ok_or(ExtractionError::NoJsonFound)?;
    match raw.rfind(close) {
        Some(end) if end > start => Ok(&raw[start..=end]),
        _ => Err(ExtractionError::MalformedJson {
            message: format!("unterminated payload: no closing '{}'", close),
        }),
    }
}

/// Locate and parse the payload, checking only its top-level kind
pub fn extract_json(raw: &str, shape: JsonShape) -> Result<Value, ExtractionError> {
    let span = find_json_span(raw, shape)?;
    let value: Value =
        serde_json::from_str(span).map_err(|e| ExtractionError::MalformedJson {
            message: e.to_string(),
        })?;
    if !shape.matches(&value) {
        return Err(ExtractionError::MalformedJson {
            message: format!("expected top-level {:?}", shape),
        });
    }
    debug!("Extracted {:?} payload of {} chars", shape, span.len());
    Ok(value)
}

/// Extract and deserialize into an artifact type
pub fn extract<T: DeserializeOwned>(raw: &str, shape: JsonShape) -> Result<T, ExtractionError> {
    let value = extract_json(raw, shape)?;
    serde_json::from_value(value).map_err(|e| ExtractionError::MalformedJson {
        message: e.to_string(),
    })
}

/// Question batch from a reply; ids are normalised to be unique within the batch.
/// An empty array is not a usable batch.
pub fn extract_questions(raw: &str) -> Result<QuestionBatch, ExtractionError> {
    let mut batch: QuestionBatch = extract(raw, JsonShape::Array)?;
    if batch.is_empty() {
        return Err(ExtractionError::MalformedJson {
            message: "empty question batch".to_string(),
        });
    }
    normalize_batch_ids(&mut batch);
    Ok(batch)
}

pub fn extract_response(raw: &str) -> Result<ResponseDraft, ExtractionError> {
    extract(raw, JsonShape::Object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{Category, RiskLevel};

    #[test]
    fn prose_only_is_no_json() {
        assert_eq!(
            extract_json("not json at all", JsonShape::Array),
            Err(ExtractionError::NoJsonFound)
        );
        assert_eq!(
            extract_json("a } b { c", JsonShape::Array),
            Err(ExtractionError::NoJsonFound)
        );
    }

    #[test]
    fn truncated_array_is_malformed() {
        assert!(matches!(
            extract_json("[1,2,", JsonShape::Array),
            Err(ExtractionError::MalformedJson { .. })
        ));
        assert!(matches!(
            extract_json("closing ] before opening [", JsonShape::Array),
            Err(ExtractionError::MalformedJson { .. })
        ));
        assert!(matches!(
            extract_json("[1,2,]", JsonShape::Array),
            Err(ExtractionError::MalformedJson { .. })
        ));
    }

    #[test]
    fn surrounding_prose_is_ignored() {
        let v = extract_json(r#"prefix text [{"id":"q1"}] suffix text"#, JsonShape::Array).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 1);
    }

    #[test]
    fn greedy_span_spans_multiple_arrays() {
        // Two separate arrays in one reply are not a single valid payload
        assert!(matches!(
            extract_json("[1] and [2]", JsonShape::Array),
            Err(ExtractionError::MalformedJson { .. })
        ));
    }

    #[test]
    fn whitespace_does_not_change_result() {
        let payload = r#"[{"id":"q1","question":"Why?"}]"#;
        let bare = extract_json(payload, JsonShape::Array).unwrap();
        let padded = extract_json(&format!("\n\t  {}  \n\n", payload), JsonShape::Array).unwrap();
        assert_eq!(bare, padded);
    }

    #[test]
    fn code_fences_are_tolerated() {
        let raw = "Here you go:\n```json\n{\"risk_level\": \"High\", \"response_text\": \"ok\"}\n```";
        let draft = extract_response(raw).unwrap();
        assert_eq!(draft.risk_level, RiskLevel::High);
        assert_eq!(draft.response_text, "ok");
        assert!(draft.talking_points.is_empty());
    }

    #[test]
    fn questions_typed_and_normalised() {
        let raw = r#"[
            {"id":"q1","question":"A?","category":"AI Strategy","difficulty":"Hard","context":"c"},
            {"id":"q1","question":"B?","category":"Growth","difficulty":"Very Hard","context":"c"}
        ]"#;
        let batch = extract_questions(raw).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].category, Category::AiStrategy);
        assert_eq!(batch[1].id, "q1-2");
    }

    #[test]
    fn null_category_keeps_the_batch() {
        let raw = r#"[{"id":"q1","question":"Why?","category":null,"difficulty":"Hard","context":null}]"#;
        let batch = extract_questions(raw).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].question, "Why?");
        assert_eq!(batch[0].category, Category::default());
        assert_eq!(batch[0].context, "");
    }

    #[test]
    fn null_risk_level_keeps_the_draft() {
        let raw = r#"{"talking_points":["a"],"response_text":"ok","risk_level":null}"#;
        let draft = extract_response(raw).unwrap();
        assert_eq!(draft.response_text, "ok");
        assert_eq!(draft.risk_level, RiskLevel::default());
        assert_eq!(draft.risk_level.label(), "");
    }

    #[test]
    fn empty_batch_is_malformed() {
        assert!(matches!(
            extract_questions("Sure: []"),
            Err(ExtractionError::MalformedJson { .. })
        ));
        // Generic extraction still accepts it
        assert_eq!(extract_json("[]", JsonShape::Array).unwrap(), serde_json::json!([]));
    }

    #[test]
    fn array_of_scalars_is_malformed_for_questions() {
        assert!(matches!(
            extract_questions("[1, 2, 3]"),
            Err(ExtractionError::MalformedJson { .. })
        ));
    }

    #[test]
    fn object_shape_for_response() {
        // An object nested in an array still yields the outermost object span
        let raw = r#"[{"response_text":"inner"}]"#;
        let draft = extract_response(raw).unwrap();
        assert_eq!(draft.response_text, "inner");

        assert_eq!(
            extract_response("no braces here"),
            Err(ExtractionError::NoJsonFound)
        );
    }
}
