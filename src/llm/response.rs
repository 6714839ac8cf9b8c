use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("No JSON object found in response")]
    NotFound,
}

/// Pulls a JSON object out of model output
///
/// Accepts a bare object, a fenced markdown block, or an object embedded in prose
/// (first `{` to last `}`).
pub fn extract_json(response: &str) -> Result<String, ParseError> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(trimmed.to_string());
    }

    if trimmed.contains("```") {
        if let Some(json) = extract_from_markdown_block(trimmed) {
            return Ok(json);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(trimmed[start..=end].to_string()),
        _ => Err(ParseError::NotFound),
    }
}

fn extract_from_markdown_block(text: &str) -> Option<String> {
    let re = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    let json = re.captures(text)?.get(1)?.as_str().trim();
    (json.starts_with('{') && json.ends_with('}')).then(|| json.to_string())
}

pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, ParseError> {
    let json = extract_json(response)?;
    serde_json::from_str(&json).map_err(|e| {
        warn!("JSON parse error: {}", e);
        ParseError::InvalidJson(format!(
            "{}: {}",
            e,
            json.chars().take(100).collect::<String>()
        ))
    })
}
