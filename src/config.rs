use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type. Absent or empty disables database support entirely.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Database file, or `:memory:` for an in-memory database.
    pub path: String,
    pub busy_timeout_ms: u64,
    pub begin_mode: BeginMode,
    pub on_begin_failure: BeginFailure,
    /// Directory `init_sql` script paths are resolved against.
    pub script_root: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: None,
            path: ":memory:".to_string(),
            busy_timeout_ms: 5000,
            begin_mode: BeginMode::default(),
            on_begin_failure: BeginFailure::default(),
            script_root: PathBuf::from("."),
        }
    }
}

/// Locking behavior of `BEGIN`.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BeginMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl BeginMode {
    pub fn statement(self) -> &'static str {
        match self {
            BeginMode::Deferred => "BEGIN DEFERRED",
            BeginMode::Immediate => "BEGIN IMMEDIATE",
            BeginMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// What happens to the session's connection when `BEGIN` fails.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeginFailure {
    /// Drop the connection so the session starts clean.
    #[default]
    Unbind,
    /// Leave the connection bound in auto-commit mode.
    KeepBound,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| Error::Config(err.to_string()))
    }

    /// The configured database type, or `None` when database support is off.
    pub fn database_type(&self) -> Option<&str> {
        self.database
            .kind
            .as_deref()
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_database_section() {
        let config = Config::from_toml(
            r#"
            [database]
            type = "sqlite"
            path = "data/app.db"
            busy_timeout_ms = 250
            begin_mode = "immediate"
            on_begin_failure = "keep_bound"
            script_root = "sql"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_type(), Some("sqlite"));
        assert_eq!(config.database.path, "data/app.db");
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.database.begin_mode, BeginMode::Immediate);
        assert_eq!(config.database.on_begin_failure, BeginFailure::KeepBound);
        assert_eq!(config.database.script_root, PathBuf::from("sql"));
    }

    #[test]
    fn missing_or_blank_type_disables_database() {
        assert_eq!(Config::from_toml("").unwrap().database_type(), None);
        let blank = Config::from_toml("[database]\ntype = \"  \"\n").unwrap();
        assert_eq!(blank.database_type(), None);
        assert_eq!(blank.database.path, ":memory:");
    }

    #[test]
    fn rejects_unknown_begin_mode() {
        let err = Config::from_toml("[database]\nbegin_mode = \"eager\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
