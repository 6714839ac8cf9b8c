//! Configuration management for reposcope
//!
//! Settings are loaded from environment variables with defaults. CLI flags are
//! applied on top by the command handlers. Component configurations
//! ([`PlannerConfig`], [`EngineConfig`], [`ConversationConfig`]) are derived from
//! the process-wide [`ReposcopeConfig`].
//!
//! # Environment Variables
//!
//! - `REPOSCOPE_PROVIDER`: LLM provider (ollama|openai|anthropic|gemini|xai|groq) - default: "ollama"
//! - `REPOSCOPE_MODEL`: Model name - default: "qwen2.5-coder:7b" for Ollama
//! - `REPOSCOPE_REQUEST_TIMEOUT`: LLM request timeout in seconds - default: "60"
//! - `REPOSCOPE_TOOL_TIMEOUT`: Per-tool timeout in seconds - default: "300"
//! - `REPOSCOPE_MAX_PARALLEL`: Fast tools per parallel batch - default: "3"
//! - `REPOSCOPE_MAX_PARALLEL_MEDIUM`: Medium tools per parallel batch - default: "2"
//! - `REPOSCOPE_MAX_TURNS`: Hard turn ceiling for agentic runs - default: "30"
//! - `REPOSCOPE_MIN_TOOLS`: Tools that must run before an agentic run may complete - default: "4"
//! - `REPOSCOPE_BUDGET_TURNS` / `REPOSCOPE_BUDGET_TOOLS`: verbose-run stop thresholds - default: "20" / "12"
//! - `REPOSCOPE_CALL_INTERVAL_MS`: Minimum spacing between model calls - default: "2000"
//! - `REPOSCOPE_WORKSPACE_DIR`: Where remote repositories are cloned - default: user cache dir + "reposcope"
//! - `REPOSCOPE_LOG_LEVEL`: Logging level - default: "info"
//!
//! Provider credentials are read by genai from the standard variables
//! (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OLLAMA_HOST`, ...).

use crate::conversation::ConversationConfig;
use crate::execution::{EngineConfig, PlannerConfig};
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_PARALLEL: usize = 3;
const DEFAULT_MAX_PARALLEL_MEDIUM: usize = 2;
const DEFAULT_MAX_TURNS: usize = 30;
const DEFAULT_MIN_TOOLS: usize = 4;
const DEFAULT_BUDGET_TURNS: usize = 20;
const DEFAULT_BUDGET_TOOLS: usize = 12;
const DEFAULT_CALL_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, anthropic, gemini, xai, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone)]
pub struct ReposcopeConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub request_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub max_parallel: usize,
    pub max_parallel_medium: usize,
    pub max_turns: usize,
    pub min_tools_before_completion: usize,
    pub budget_turn_threshold: usize,
    pub budget_tool_threshold: usize,
    pub call_interval_ms: u64,
    pub workspace_dir: PathBuf,
    /// trace, debug, info, warn, error
    pub log_level: String,
}

pub fn parse_provider(s: &str) -> Result<AdapterKind, ConfigError> {
    AdapterKind::from_lower_str(&s.to_lowercase())
        .ok_or_else(|| ConfigError::InvalidProvider(s.to_string()))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn default_workspace_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join("reposcope")
        .join("workspaces")
}

impl Default for ReposcopeConfig {
    fn default() -> Self {
        let provider = env::var("REPOSCOPE_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::Ollama);

        let model = env::var("REPOSCOPE_MODEL").unwrap_or_else(|_| match provider {
            AdapterKind::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
            AdapterKind::Anthropic => "claude-sonnet-4-5".to_string(),
            AdapterKind::OpenAI => "gpt-4o-mini".to_string(),
            _ => "default-model".to_string(),
        });

        let workspace_dir = env::var("REPOSCOPE_WORKSPACE_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(default_workspace_dir);

        let log_level = env::var("REPOSCOPE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            provider,
            model,
            request_timeout_secs: env_parsed(
                "REPOSCOPE_REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            tool_timeout_secs: env_parsed("REPOSCOPE_TOOL_TIMEOUT", DEFAULT_TOOL_TIMEOUT_SECS),
            max_parallel: env_parsed("REPOSCOPE_MAX_PARALLEL", DEFAULT_MAX_PARALLEL),
            max_parallel_medium: env_parsed(
                "REPOSCOPE_MAX_PARALLEL_MEDIUM",
                DEFAULT_MAX_PARALLEL_MEDIUM,
            ),
            max_turns: env_parsed("REPOSCOPE_MAX_TURNS", DEFAULT_MAX_TURNS),
            min_tools_before_completion: env_parsed("REPOSCOPE_MIN_TOOLS", DEFAULT_MIN_TOOLS),
            budget_turn_threshold: env_parsed("REPOSCOPE_BUDGET_TURNS", DEFAULT_BUDGET_TURNS),
            budget_tool_threshold: env_parsed("REPOSCOPE_BUDGET_TOOLS", DEFAULT_BUDGET_TOOLS),
            call_interval_ms: env_parsed("REPOSCOPE_CALL_INTERVAL_MS", DEFAULT_CALL_INTERVAL_MS),
            workspace_dir,
            log_level,
        }
    }
}

impl ReposcopeConfig {
    /// Range-checks numeric settings and the log level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }
        if self.tool_timeout_secs == 0 || self.tool_timeout_secs > 3_600 {
            return Err(ConfigError::ValidationFailed(
                "Tool timeout must be between 1 second and 1 hour".to_string(),
            ));
        }
        if self.max_parallel == 0 || self.max_parallel_medium == 0 {
            return Err(ConfigError::ValidationFailed(
                "Parallelism limits must be at least 1".to_string(),
            ));
        }
        if self.max_turns == 0 || self.max_turns > 200 {
            return Err(ConfigError::ValidationFailed(
                "Max turns must be between 1 and 200".to_string(),
            ));
        }
        if self.budget_turn_threshold > self.max_turns {
            return Err(ConfigError::ValidationFailed(format!(
                "Budget turn threshold ({}) cannot exceed max turns ({})",
                self.budget_turn_threshold, self.max_turns
            )));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig::default()
            .with_max_parallel(self.max_parallel)
            .with_max_parallel_medium(self.max_parallel_medium)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_tool_timeout(self.tool_timeout())
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig::default()
            .with_max_turns(self.max_turns)
            .with_min_tools_before_completion(self.min_tools_before_completion)
            .with_budget(self.budget_turn_threshold, self.budget_tool_threshold)
            .with_min_call_interval(Duration::from_millis(self.call_interval_ms))
            .with_tool_timeout(self.tool_timeout())
    }

    pub fn to_display_map(&self) -> std::collections::BTreeMap<String, String> {
        let mut map = std::collections::BTreeMap::new();

        map.insert("provider".to_string(), self.provider.as_str().to_string());
        map.insert("model".to_string(), self.model.clone());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert(
            "tool_timeout_secs".to_string(),
            self.tool_timeout_secs.to_string(),
        );
        map.insert("max_parallel".to_string(), self.max_parallel.to_string());
        map.insert(
            "max_parallel_medium".to_string(),
            self.max_parallel_medium.to_string(),
        );
        map.insert("max_turns".to_string(), self.max_turns.to_string());
        map.insert(
            "workspace_dir".to_string(),
            self.workspace_dir.display().to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for ReposcopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reposcope Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Tool Timeout: {}s", self.tool_timeout_secs)?;
        writeln!(
            f,
            "  Parallelism: {} fast / {} medium",
            self.max_parallel, self.max_parallel_medium
        )?;
        writeln!(f, "  Max Turns: {}", self.max_turns)?;
        writeln!(f, "  Workspace: {}", self.workspace_dir.display())?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
