//! JSON extraction from free-text model responses.
//!
//! Every phase of the pipeline depends on pulling a well-formed JSON value
//! out of prose that may wrap it in fenced code blocks or surround it with
//! commentary. Fallback order: fenced block, then the substring starting at
//! the first `{`/`[`, then the raw text. Parse failure is a hard error for
//! the call that produced the response.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::client::ModelError;

/// Extract the first well-formed JSON object or array from a response.
pub fn extract_json(text: &str) -> Result<Value, ModelError> {
    if let Some(block) = fenced_block(text) {
        if let Some(value) = first_value(block) {
            return Ok(value);
        }
    }
    if let Some(value) = first_value(text) {
        return Ok(value);
    }
    Err(ModelError::Malformed(format!(
        "no JSON object or array found in {}-char response",
        text.len()
    )))
}

/// Extract and deserialize a typed payload in one step.
pub fn parse_response<T: DeserializeOwned>(text: &str) -> Result<T, ModelError> {
    let value = extract_json(text)?;
    serde_json::from_value(value)
        .map_err(|e| ModelError::Malformed(format!("unexpected response shape: {}", e)))
}

/// Content of the first fenced code block, language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip a language tag like "json" up to the end of the fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// First JSON object/array parsed from `text`, ignoring trailing prose.
fn first_value(text: &str) -> Option<Value> {
    let start = text.find(['{', '['])?;
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) if value.is_object() || value.is_array() => Some(value),
        _ => None,
    }
}
