//! Response decoding
//!
//! Raw completions are decoded into typed results and checked for
//! structural validity before anything is cached. JSON may arrive inside a
//! markdown fence or surrounded by prose.

use serde::de::DeserializeOwned;

use super::types::{Movement, ScaffoldDraft};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Completion was empty")]
    Empty,

    #[error("No JSON object found in completion")]
    NoJson,

    #[error("Completion does not match the expected shape: {0}")]
    Schema(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// A result type the model can produce
pub trait DecodeResponse: Sized {
    fn decode(raw: &str) -> Result<Self, ParseError>;
}

impl DecodeResponse for ScaffoldDraft {
    fn decode(raw: &str) -> Result<Self, ParseError> {
        let draft: ScaffoldDraft = decode_json(raw)?;
        non_empty("title", &draft.title)?;
        if draft.movements.is_empty() {
            return Err(ParseError::Invalid {
                field: "movements".into(),
                reason: "at least one movement is required".into(),
            });
        }
        for (i, movement) in draft.movements.iter().enumerate() {
            non_empty(&format!("movements[{i}].title"), &movement.title)?;
        }
        Ok(draft)
    }
}

impl DecodeResponse for Movement {
    fn decode(raw: &str) -> Result<Self, ParseError> {
        // Some models wrap a single movement as {"movement": {...}}
        let value: serde_json::Value = decode_json(raw)?;
        let value = match value.get("movement") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => value,
        };
        let movement: Movement = serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
        non_empty("title", &movement.title)?;
        Ok(movement)
    }
}

/// Prose results (expansion, refinement)
impl DecodeResponse for String {
    fn decode(raw: &str) -> Result<Self, ParseError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(text.to_string())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ParseError> {
    if value.trim().is_empty() {
        Err(ParseError::Invalid {
            field: field.to_string(),
            reason: "must not be empty".into(),
        })
    } else {
        Ok(())
    }
}

/// Locate a JSON object in `raw` and decode it into `T`.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let value = extract_json(raw).ok_or(ParseError::NoJson)?;
    serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))
}

/// First parseable JSON object in `content`: a ```json fence wins, then the
/// whole text, then each balanced `{...}` span in order.
pub fn extract_json(content: &str) -> Option<serde_json::Value> {
    if let Some(start) = content.find("```json") {
        let body = &content[start + 7..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(content.trim()) {
        return Some(value);
    }

    for (idx, _) in content.match_indices('{') {
        let Some(span) = balanced_object(&content[idx..]) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(span) {
            return Some(value);
        }
    }

    None
}

/// Prefix of `s` (which starts with `{`) up to its matching `}`, honoring
/// string literals and escapes.
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
