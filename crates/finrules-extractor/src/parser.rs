//! Parse LLM output into rule and classification records
//!
//! Models wrap their JSON in prose or markdown fences. The response is
//! scanned for balanced top-level `{...}` objects (braces inside string
//! literals are ignored) and each candidate is tried in order until one
//! deserializes into the expected shape.

use crate::error::ExtractorError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Confidence assumed when the model omits one
const DEFAULT_CONFIDENCE: f64 = 0.5;

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// One rule as returned by the extraction prompt
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRule {
    /// Rule text
    pub text: String,
    /// Suggested track id, or "unknown"
    #[serde(default)]
    pub track: Option<String>,
    /// Model confidence
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Model notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Extraction response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    /// Rules found in the batch
    pub rules: Vec<RawRule>,
}

/// Track classification response
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MappingResponse {
    /// Track id, or "none"
    pub track_id: Option<String>,
    /// Model confidence
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Explanation
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Parse an extraction response
pub fn parse_extraction_response(response: &str) -> Result<Vec<RawRule>, ExtractorError> {
    let parsed: ExtractionResponse = parse_first_object(response)?;
    Ok(parsed
        .rules
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .collect())
}

/// Parse a track classification response
pub fn parse_mapping_response(response: &str) -> Result<MappingResponse, ExtractorError> {
    parse_first_object(response)
}

/// First balanced JSON object in `response` that deserializes as `T`
pub fn parse_first_object<T: DeserializeOwned>(response: &str) -> Result<T, ExtractorError> {
    let body = strip_code_fences(response);
    let mut last_error = None;

    for candidate in json_objects(body) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!("Skipping JSON candidate: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => ExtractorError::InvalidFormat(format!("no object matched the expected shape: {}", e)),
        None => ExtractorError::InvalidFormat("no JSON object in response".to_string()),
    })
}

/// Inner text of a markdown code block, or the trimmed input
fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Balanced top-level `{...}` substrings, in order
pub fn json_objects(text: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    objects
}
