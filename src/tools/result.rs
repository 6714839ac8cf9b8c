use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Outcome of one tool invocation
///
/// Failures (errors, timeouts, cancellations) are values, never propagated
/// errors, so one tool cannot take down its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    #[serde(with = "crate::util::duration_ms")]
    pub duration: Duration,
    pub payload: Value,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ToolResult {
    pub fn success(tool_name: impl Into<String>, payload: Value, duration: Duration) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            duration,
            payload,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            duration,
            payload: Value::Null,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    pub fn timed_out(tool_name: impl Into<String>, timeout: Duration) -> Self {
        let tool_name = tool_name.into();
        let message = format!(
            "{} timed out after {:.1}s",
            tool_name,
            timeout.as_secs_f64()
        );
        Self::failure(tool_name, message, timeout)
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Flags payloads that report `truncated` or `limited` as partial
    pub fn with_partial_warning(self) -> Self {
        let partial = ["truncated", "limited"]
            .iter()
            .any(|key| self.payload.get(key).and_then(Value::as_bool) == Some(true));
        if !partial {
            return self;
        }
        let warning = format!(
            "{} returned partial results: a file or finding limit was reached",
            self.tool_name
        );
        self.with_warning(warning)
    }

    /// Languages a tool reported in its payload under `detected_languages`
    pub fn detected_languages(&self) -> Vec<String> {
        self.payload
            .get("detected_languages")
            .and_then(Value::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}
