//! Logging initialization.
//!
//! Library code only emits `tracing` events. Applications (and tests that
//! want output) call `init_logging` once at startup; later calls are no-ops.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level filter. `RUST_LOG` overrides it when set.
    pub default_level: String,

    /// Emit JSON lines instead of compact text.
    pub json: bool,

    /// Include the event target (module path) in every line.
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".into(),
            json: false,
            with_target: true,
        }
    }
}

/// Initialize logging with the given default level.
///
/// ```ignore
/// stowage_common::init_logging("debug");
/// tracing::info!("store opened");
/// ```
pub fn init_logging(level: &str) -> bool {
    init_with_config(&LogConfig {
        default_level: level.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns false when a global subscriber was already installed.
pub fn init_with_config(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .compact()
            .try_init()
    };

    installed.is_ok()
}

/// Parses a level name, case-insensitively. `warning` is accepted for `warn`.
///
/// Returns `None` for anything that is not a single level, so callers can
/// reject it instead of silently logging at some other level.
pub fn parse_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Lowercase directive name of `level`, as `EnvFilter` writes it.
pub fn level_name(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, "info");
        assert!(!config.json);
        assert!(config.with_target);
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level(" debug "), Some(Level::DEBUG));
        assert_eq!(parse_level("Warning"), Some(Level::WARN));
        assert_eq!(parse_level("nonsense"), None);
        assert_eq!(parse_level("info,stowage=debug"), None);
        assert_eq!(level_name(Level::WARN), "warn");
    }

    #[test]
    fn second_init_is_a_no_op() {
        init_logging("warn");
        assert!(!init_logging("debug"));
    }
}
