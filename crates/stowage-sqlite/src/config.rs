//! Store configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;
use stowage_common::{level_name, parse_level, LogConfig};

use crate::notifier::DEFAULT_CHANGES_CAPACITY;
use crate::{StowageError, StowageResult};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Default journal mode for file-backed databases.
pub const DEFAULT_JOURNAL_MODE: &str = "WAL";

/// Configuration for opening a [`SqliteStore`](crate::SqliteStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file. `None` opens an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Journal mode applied to file-backed databases.
    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,
    /// How long a blocked write waits for the database lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Enforce foreign key constraints.
    #[serde(default = "default_true")]
    pub foreign_keys: bool,
    /// Change sets buffered per subscriber before it lags.
    #[serde(default = "default_changes_capacity")]
    pub changes_capacity: usize,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_journal_mode() -> String {
    DEFAULT_JOURNAL_MODE.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_changes_capacity() -> usize {
    DEFAULT_CHANGES_CAPACITY
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: default_journal_mode(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
            changes_capacity: DEFAULT_CHANGES_CAPACITY,
            log_level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a database file at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Default configuration overridden from environment.
    pub fn from_env() -> StowageResult<Self> {
        let mut config = Self::default();
        config.load_from_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> StowageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> StowageResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    ///
    /// Reads `STOWAGE_DB_PATH`, `STOWAGE_LOG_LEVEL` and
    /// `STOWAGE_BUSY_TIMEOUT_MS`.
    pub fn load_from_env(&mut self) -> StowageResult<()> {
        if let Ok(path) = std::env::var("STOWAGE_DB_PATH") {
            self.path = Some(PathBuf::from(path));
        }
        if let Ok(level) = std::env::var("STOWAGE_LOG_LEVEL") {
            self.set_log_level(&level)?;
        }
        if let Ok(timeout) = std::env::var("STOWAGE_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = timeout.parse().map_err(|_| {
                StowageError::Config(format!("STOWAGE_BUSY_TIMEOUT_MS is not a number: {timeout}"))
            })?;
        }
        Ok(())
    }

    /// Sets `log_level`, normalized to its lowercase name.
    pub fn set_log_level(&mut self, level: &str) -> StowageResult<()> {
        let parsed = parse_level(level)
            .ok_or_else(|| StowageError::Config(format!("unknown log level: {level}")))?;
        self.log_level = level_name(parsed);
        Ok(())
    }

    /// PRAGMA statements applied when a connection is opened.
    pub fn pragmas(&self) -> String {
        let mut pragmas = String::new();
        if self.path.is_some() {
            pragmas.push_str(&format!("PRAGMA journal_mode = {};\n", self.journal_mode));
            pragmas.push_str("PRAGMA synchronous = NORMAL;\n");
        }
        pragmas.push_str(&format!(
            "PRAGMA foreign_keys = {};\n",
            if self.foreign_keys { "ON" } else { "OFF" }
        ));
        pragmas.push_str(&format!("PRAGMA busy_timeout = {};\n", self.busy_timeout_ms));
        pragmas
    }

    /// Logging configuration matching `log_level`.
    ///
    /// An unknown level (say, a hand-edited config file) falls back to
    /// the default level with a warning.
    pub fn log_config(&self) -> LogConfig {
        let level = match parse_level(&self.log_level) {
            Some(level) => level_name(level),
            None => {
                warn!(
                    level = %self.log_level,
                    fallback = DEFAULT_LOG_LEVEL,
                    "Unknown log level"
                );
                DEFAULT_LOG_LEVEL.to_string()
            }
        };
        LogConfig {
            default_level: level,
            ..LogConfig::default()
        }
    }
}
