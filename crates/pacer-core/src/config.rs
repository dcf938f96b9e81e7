//! TOML configuration for debouncers.
//!
//! Durations are plain millisecond numbers. Anything non-finite or not
//! positive becomes a zero wait, matching how the engines treat such values.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [debounce.search]
//! wait_ms = 300
//! max_wait_ms = 1000
//! leading = true
//!
//! [debounce.search.retry]
//! max_attempts = 3
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::async_debouncer::AsyncDebouncerOptions;
use crate::debouncer::DebouncerOptions;
use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use crate::param::{Param, coerce_millis};
use crate::retry::RetryPolicy;

// =============================================================================
// Retry
// =============================================================================

/// Retry settings for async executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: f64,
    pub max_delay_ms: f64,
    pub backoff_factor: f64,
    pub jitter_percent: f64,
    /// Omit to retry until aborted.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100.0,
            max_delay_ms: 30_000.0,
            backoff_factor: 2.0,
            jitter_percent: 0.1,
            max_attempts: Some(1),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            coerce_millis(self.initial_delay_ms),
            coerce_millis(self.max_delay_ms),
            self.backoff_factor,
            self.jitter_percent,
            self.max_attempts,
        )
    }

    fn validate(&self) -> Result<()> {
        if !self.backoff_factor.is_finite() || !self.jitter_percent.is_finite() {
            return Err(ConfigError::ValidationError(
                "retry backoff_factor and jitter_percent must be finite".to_string(),
            )
            .into());
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "retry max_attempts must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// Debounce
// =============================================================================

/// Literal options for one debouncer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub enabled: bool,
    pub wait_ms: f64,
    pub max_wait_ms: Option<f64>,
    pub leading: bool,
    pub trailing: bool,
    /// Async only. Omit to reject handles only when no error callback is set.
    pub throw_on_error: Option<bool>,
    pub key: Option<String>,
    pub retry: RetryConfig,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_ms: 0.0,
            max_wait_ms: None,
            leading: false,
            trailing: true,
            throw_on_error: None,
            key: None,
            retry: RetryConfig::default(),
        }
    }
}

impl DebounceConfig {
    /// Parse and validate a single debouncer table.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file holding a single debouncer table.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&read_config(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.key.as_deref(), Some(key) if key.trim().is_empty()) {
            return Err(ConfigError::ValidationError("key must not be empty".to_string()).into());
        }
        self.retry.validate()
    }

    #[must_use]
    pub fn wait(&self) -> Duration {
        coerce_millis(self.wait_ms)
    }

    #[must_use]
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(coerce_millis)
    }

    /// Options for a sync [`Debouncer`](crate::Debouncer). Callbacks and
    /// mirror hubs are attached by the caller.
    #[must_use]
    pub fn debouncer_options<A>(&self) -> DebouncerOptions<A> {
        DebouncerOptions {
            enabled: Param::Value(self.enabled),
            wait: Param::Value(self.wait()),
            max_wait: self.max_wait().map(Param::Value),
            leading: self.leading,
            trailing: self.trailing,
            key: self.key.clone(),
            ..DebouncerOptions::default()
        }
    }

    /// Options for an [`AsyncDebouncer`](crate::AsyncDebouncer).
    #[must_use]
    pub fn async_debouncer_options<A, T, E>(&self) -> AsyncDebouncerOptions<A, T, E> {
        AsyncDebouncerOptions {
            enabled: Param::Value(self.enabled),
            wait: Param::Value(self.wait()),
            max_wait: self.max_wait().map(Param::Value),
            leading: self.leading,
            trailing: self.trailing,
            key: self.key.clone(),
            throw_on_error: self.throw_on_error,
            retry: self.retry.to_policy(),
            ..AsyncDebouncerOptions::default()
        }
    }
}

// =============================================================================
// File
// =============================================================================

/// A whole configuration file: logging plus named debouncers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub logging: LogConfig,
    pub debounce: BTreeMap<String, DebounceConfig>,
}

impl PacerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        for (name, debounce) in &config.debounce {
            debounce.validate().map_err(|e| {
                ConfigError::ValidationError(format!("debounce.{name}: {e}"))
            })?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&read_config(path)?)
    }

    /// Named debouncer settings; the table name becomes the key when none is set.
    #[must_use]
    pub fn debouncer(&self, name: &str) -> Option<DebounceConfig> {
        self.debounce.get(name).map(|config| {
            let mut config = config.clone();
            config.key.get_or_insert_with(|| name.to_string());
            config
        })
    }
}

fn read_config(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()).into());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;

    #[test]
    fn defaults_match_engine_defaults() {
        let config = DebounceConfig::default();
        let opts: DebouncerOptions<u32> = config.debouncer_options();
        assert_eq!(opts.wait.literal(), Some(&Duration::ZERO));
        assert!(opts.max_wait.is_none());
        assert!(!opts.leading);
        assert!(opts.trailing);

        let opts: AsyncDebouncerOptions<u32, u32, String> = config.async_debouncer_options();
        assert_eq!(opts.retry, RetryPolicy::single_attempt());
        assert_eq!(opts.throw_on_error, None);
    }

    #[test]
    fn parses_single_table() {
        let config = DebounceConfig::from_toml_str(
            r#"
            wait_ms = 250
            max_wait_ms = 1000.0
            leading = true
            trailing = false
            key = "search"

            [retry]
            max_attempts = 4
            initial_delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.wait(), Duration::from_millis(250));
        assert_eq!(config.max_wait(), Some(Duration::from_secs(1)));
        assert!(config.leading);
        assert!(!config.trailing);

        let policy = config.retry.to_policy();
        assert_eq!(policy.max_attempts, Some(4));
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn bad_durations_become_zero() {
        let config = DebounceConfig {
            wait_ms: -20.0,
            max_wait_ms: Some(f64::NAN),
            ..DebounceConfig::default()
        };
        assert_eq!(config.wait(), Duration::ZERO);
        assert_eq!(config.max_wait(), Some(Duration::ZERO));
    }

    #[test]
    fn huge_durations_saturate() {
        let config = DebounceConfig::from_toml_str("wait_ms = 1e300\nmax_wait_ms = 1.7e308").unwrap();
        assert_eq!(config.wait(), Duration::MAX);
        assert_eq!(config.max_wait(), Some(Duration::MAX));
        let opts: DebouncerOptions<u32> = config.debouncer_options();
        assert_eq!(opts.wait.literal(), Some(&Duration::MAX));
    }

    #[test]
    fn retry_factor_and_jitter_are_clamped() {
        let retry = RetryConfig {
            backoff_factor: 0.5,
            jitter_percent: 3.0,
            ..RetryConfig::default()
        };
        let policy = retry.to_policy();
        assert!((policy.backoff_factor - 1.0).abs() < f64::EPSILON);
        assert!((policy.jitter_percent - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_zero_attempts_and_blank_key() {
        let err = DebounceConfig::from_toml_str("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ValidationError(_))));

        let err = DebounceConfig::from_toml_str("key = \"  \"").unwrap_err();
        assert!(err.to_string().contains("key must not be empty"));
    }

    #[test]
    fn parse_errors_are_config_errors() {
        let err = DebounceConfig::from_toml_str("wait_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_file_with_named_debouncers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [logging]
            level = "debug"
            format = "json"

            [debounce.search]
            wait_ms = 300

            [debounce.save]
            wait_ms = 1000
            key = "autosave"
            throw_on_error = true
            "#
        )
        .unwrap();

        let config = PacerConfig::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, crate::logging::LogFormat::Json);

        let search = config.debouncer("search").unwrap();
        assert_eq!(search.key.as_deref(), Some("search"));
        assert_eq!(search.wait(), Duration::from_millis(300));

        let save = config.debouncer("save").unwrap();
        assert_eq!(save.key.as_deref(), Some("autosave"));
        assert_eq!(save.throw_on_error, Some(true));

        assert!(config.debouncer("missing").is_none());
    }

    #[test]
    fn load_single_table_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "wait_ms = 40\nthrow_on_error = false\n").unwrap();
        let config = DebounceConfig::load(file.path()).unwrap();
        assert_eq!(config.wait(), Duration::from_millis(40));
        assert_eq!(config.throw_on_error, Some(false));
    }

    #[test]
    fn load_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = PacerConfig::load(&tmp.path().join("pacer.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_reports_invalid_table_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[debounce.broken.retry]\nmax_attempts = 0\n").unwrap();
        let err = PacerConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("debounce.broken"));
    }

    #[test]
    fn empty_file_is_default() {
        let config = PacerConfig::from_toml_str("").unwrap();
        assert!(config.debounce.is_empty());
        assert_eq!(config.logging.level, "info");
    }
}
