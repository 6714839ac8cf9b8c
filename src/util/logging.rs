//! Structured logging setup
//!
//! Console output by default, JSON when requested. `RUST_LOG` directives are
//! honoured on top of the configured level. Initialization happens once per
//! process; later calls are ignored.
//!
//! # Example
//!
//! ```no_run
//! use reposcope::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(tool = "repository_explorer", "Tool registered");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// HTTP stacks are chatty at debug level
const QUIET_CRATES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "genai"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate
    pub level: Level,

    /// JSON lines instead of human-readable output
    pub use_json: bool,

    /// Include the module target (e.g. reposcope::execution::engine)
    pub include_target: bool,

    /// Include file and line number
    pub include_location: bool,

    /// Include thread ids and names
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with full metadata, for log shipping
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
        }
    }
}

/// Parses a log level, case-insensitively; unknown values fall back to INFO
///
/// ```
/// use reposcope::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn directive(spec: &str) -> Option<Directive> {
    spec.parse().ok()
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Some(own) = directive(&format!("reposcope={}", level)) {
        filter = filter.add_directive(own);
    }

    if env::var("RUST_LOG").is_err() {
        for name in QUIET_CRATES {
            if let Some(quiet) = directive(&format!("{}=warn", name)) {
                filter = filter.add_directive(quiet);
            }
        }
    }
    filter
}

pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        // Logs go to stderr so command output on stdout stays machine-readable
        if config.use_json {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `REPOSCOPE_LOG_LEVEL` and `REPOSCOPE_LOG_JSON`
pub fn init_from_env() {
    init_logging(config_from_env());
}

fn config_from_env() -> LoggingConfig {
    let level = env::var("REPOSCOPE_LOG_LEVEL")
        .map(|l| parse_level(&l))
        .unwrap_or(Level::INFO);

    let use_json = env::var("REPOSCOPE_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level(" info "), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("ERROR"), Level::ERROR);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.include_target);
    }

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert!(config.use_json);
        assert!(config.include_location);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("REPOSCOPE_LOG_LEVEL", "debug");
        std::env::set_var("REPOSCOPE_LOG_JSON", "true");
        let config = config_from_env();
        std::env::remove_var("REPOSCOPE_LOG_LEVEL");
        std::env::remove_var("REPOSCOPE_LOG_JSON");

        assert_eq!(config.level, Level::DEBUG);
        assert!(config.use_json);
    }

    #[test]
    fn test_directives_parse() {
        assert!(directive("reposcope=debug").is_some());
        assert!(directive("reqwest=warn").is_some());
    }
}
