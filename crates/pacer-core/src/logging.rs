//! Subscriber setup for the `[logging]` table of a [`PacerConfig`].
//!
//! The engines only emit `tracing` events. Applications that load a
//! configuration file can hand its logging table to [`init_logging`]:
//!
//! ```ignore
//! let config = pacer_core::PacerConfig::load(path)?;
//! pacer_core::logging::init_logging(&config.logging)?;
//! ```
//!
//! Events carry `key` and, for async executions, `execution_id`.
//!
//! [`PacerConfig`]: crate::PacerConfig

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tracing_fmt};

static INSTALLED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Line format for stderr and the optional log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// The `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info` or `pacer_core=trace`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    /// Also append events to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl LogConfig {
    /// The filter to install: `RUST_LOG` if it parses, else `level`.
    ///
    /// `level` is validated either way so a bad config file is reported even
    /// when the environment overrides it.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        let configured = EnvFilter::try_new(&self.level)
            .map_err(|_| LogError::InvalidLevel(self.level.clone()))?;
        Ok(EnvFilter::try_from_default_env().unwrap_or(configured))
    }
}

fn open_log_file(path: &Path) -> Result<File, LogError> {
    let open = || -> io::Result<File> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    };
    open().map_err(|source| LogError::OpenFile {
        path: path.display().to_string(),
        source,
    })
}

fn output_layers(format: LogFormat, file: Option<File>) -> Vec<BoxedLayer> {
    let mut layers = Vec::with_capacity(2);
    match format {
        LogFormat::Pretty => {
            layers.push(tracing_fmt::layer().with_writer(io::stderr).boxed());
            if let Some(file) = file {
                layers.push(
                    tracing_fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .boxed(),
                );
            }
        }
        LogFormat::Json => {
            layers.push(
                tracing_fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(io::stderr)
                    .boxed(),
            );
            if let Some(file) = file {
                layers.push(
                    tracing_fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_writer(Mutex::new(file))
                        .boxed(),
                );
            }
        }
    }
    layers
}

/// Install the global subscriber described by `config`.
///
/// Only the first successful call installs anything; later calls return
/// [`LogError::AlreadyInitialized`].
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = config.filter()?;
    if is_logging_initialized() {
        return Err(LogError::AlreadyInitialized);
    }
    let file = config.file.as_deref().map(open_log_file).transpose()?;

    let subscriber = tracing_subscriber::registry()
        .with(output_layers(config.format, file))
        .with(filter);
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INSTALLED.set(());

    tracing::info!(
        level = %config.level,
        format = config.format.as_str(),
        file = ?config.file,
        "logging initialized"
    );
    Ok(())
}

#[must_use]
pub fn is_logging_initialized() -> bool {
    INSTALLED.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacerConfig;
    use crate::debouncer::{Debouncer, DebouncerOptions};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn logging_table_defaults() {
        let config = PacerConfig::from_toml_str("").unwrap().logging;
        assert_eq!(config, LogConfig::default());

        let config = PacerConfig::from_toml_str("[logging]\nformat = \"json\"\nfile = \"logs/pacer.log\"")
            .unwrap()
            .logging;
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file.as_deref(), Some(Path::new("logs/pacer.log")));
    }

    #[test]
    fn unknown_format_is_a_parse_error() {
        assert!(PacerConfig::from_toml_str("[logging]\nformat = \"xml\"").is_err());
    }

    #[test]
    fn invalid_level_is_rejected_before_install() {
        let config = LogConfig {
            level: "pacer_core=loud".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(config.filter(), Err(LogError::InvalidLevel(_))));
        assert!(matches!(init_logging(&config), Err(LogError::InvalidLevel(_))));
    }

    #[test]
    fn log_file_parent_is_created() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("pacer.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unopenable_log_file_names_the_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = open_log_file(tmp.path()).unwrap_err();
        assert!(matches!(err, LogError::OpenFile { .. }));
        assert!(err.to_string().contains(&tmp.path().display().to_string()));
    }

    #[test]
    fn second_install_is_refused() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = LogConfig {
            level: "warn".to_string(),
            file: Some(tmp.path().join("pacer.log")),
            ..LogConfig::default()
        };
        // The only test that installs a global subscriber.
        init_logging(&config).unwrap();
        assert!(is_logging_initialized());
        assert!(tmp.path().join("pacer.log").exists());
        assert!(matches!(init_logging(&config), Err(LogError::AlreadyInitialized)));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_events_render_as_json_lines() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::registry()
            .with(
                tracing_fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(move || sink.clone()),
            )
            .with(EnvFilter::new("pacer_core=debug"));
        let _guard = tracing::subscriber::set_default(subscriber);

        let debouncer = Debouncer::new(
            |_: u32| {},
            DebouncerOptions::default()
                .with_wait(Duration::ZERO)
                .with_leading(true)
                .with_key("logging-test"),
        );
        debouncer.maybe_execute(1);

        let text = captured.text();
        let line = text
            .lines()
            .find(|line| line.contains("leading edge execution"))
            .unwrap();
        let event: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(event["target"], "pacer_core::debouncer");
        assert!(event["key"].as_str().unwrap().contains("logging-test"));
    }
}
