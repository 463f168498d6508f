//! Logging setup driven by the logging configuration document.
//!
//! The document is YAML and supports:
//!
//! ```yaml
//! level: info                # default filter
//! loggers:                   # per-target levels
//!   tranqu_grpc: debug
//!   h2: warn
//! format: console            # console | compact | json
//! ansi: true
//! with_target: true
//! file: ~/logs/tranqu.log    # optional, stderr when unset
//! otlp_endpoint: http://localhost:4317   # optional OpenTelemetry export
//! service_name: tranqu-server
//! ```
//!
//! Levels are checked when the document is loaded. Besides the tracing names
//! (`off`, `error`, `warn`, `info`, `debug`, `trace`, any case) the Python
//! names `warning`, `critical`, `fatal` and `notset` are accepted. Anything
//! else is a configuration error.
//!
//! `RUST_LOG` applies only when the document sets neither `level` nor
//! `loggers`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{ConfigError, load_document};
use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field output (development).
    #[default]
    Console,
    /// Single-line human-readable output.
    Compact,
    /// JSON structured logging (production).
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter (e.g., "info", "debug"); `info` when unset.
    #[serde(default)]
    pub level: Option<String>,

    /// Level overrides per target.
    #[serde(default)]
    pub loggers: BTreeMap<String, String>,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Colorize console output.
    #[serde(default = "default_true")]
    pub ansi: bool,

    /// Include the event target.
    #[serde(default = "default_true")]
    pub with_target: bool,

    /// Append to this file instead of writing to stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Service name reported to OpenTelemetry.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OpenTelemetry OTLP endpoint (e.g., "<http://localhost:4317>").
    /// If None, OpenTelemetry export is disabled.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_service_name() -> String {
    "tranqu-server".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            loggers: BTreeMap::new(),
            format: LogFormat::default(),
            ansi: true,
            with_target: true,
            file: None,
            service_name: default_service_name(),
            otlp_endpoint: None,
        }
    }
}

impl LoggingConfig {
    /// Load the logging document at `path`. An empty document yields the
    /// defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::from_value(load_document(path)?).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Deserialize an already resolved document and normalize its levels.
    pub fn from_value(document: Value) -> std::result::Result<Self, ConfigError> {
        if document.is_null() {
            return Ok(Self::default());
        }
        let mut config: Self =
            serde_yaml_ng::from_value(document).map_err(|e| ConfigError::ParseError {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;
        config.normalize_levels()?;
        Ok(config)
    }

    /// Rewrite every level to its tracing name, rejecting unknown ones.
    fn normalize_levels(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(level) = &self.level {
            let level = level_name(parse_level(level).map_err(|message| {
                ConfigError::ValidationError(format!("level: {message}"))
            })?);
            self.level = Some(level);
        }

        for (target, level) in &mut self.loggers {
            let malformed = |c: char| c.is_whitespace() || ",=[]{}".contains(c);
            if target.is_empty() || target.contains(malformed) {
                return Err(ConfigError::ValidationError(format!(
                    "loggers: invalid target {target:?}"
                )));
            }
            *level = level_name(parse_level(level).map_err(|message| {
                ConfigError::ValidationError(format!("loggers.{target}: {message}"))
            })?);
        }

        Ok(())
    }

    /// `EnvFilter` directives for this configuration.
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.level.clone().unwrap_or_else(|| "info".to_string()))
            .chain(
                self.loggers
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if self.level.is_none() && self.loggers.is_empty() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(self.filter_directives())
            .map_err(|e| Error::Logging(format!("invalid log filter: {e}")))
    }
}

/// Parse a level name, accepting the Python logging aliases.
fn parse_level(name: &str) -> std::result::Result<LevelFilter, String> {
    match name.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(LevelFilter::WARN),
        "critical" | "fatal" => Ok(LevelFilter::ERROR),
        "notset" => Ok(LevelFilter::TRACE),
        other => other
            .parse::<LevelFilter>()
            .map_err(|_| format!("unknown log level {name:?}")),
    }
}

fn level_name(level: LevelFilter) -> String {
    level.to_string().to_ascii_lowercase()
}

fn fmt_layer<S, W>(config: &LoggingConfig, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(config.with_target)
        .with_ansi(ansi)
        .with_writer(writer);

    match config.format {
        LogFormat::Console => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the log file cannot be opened, the OTLP pipeline cannot be
/// built, or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = config.env_filter()?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Logging(format!("cannot open {}: {e}", path.display())))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), config.ansi),
    };
    let fmt_layer = fmt_layer(config, writer, ansi);

    // Setup OpenTelemetry if endpoint is configured
    if let Some(endpoint) = &config.otlp_endpoint {
        let otlp_exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint.clone());

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(otlp_exporter)
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_id_generator(RandomIdGenerator::default())
                    .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
                        "service.name",
                        config.service_name.clone(),
                    )])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .map_err(|e| Error::Logging(e.to_string()))?;

        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| Error::Logging(e.to_string()))?;

        tracing::info!(endpoint = %endpoint, "Logging initialized with OpenTelemetry export");
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| Error::Logging(e.to_string()))?;

        tracing::debug!("Logging initialized (OpenTelemetry disabled)");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml(text: &str) -> Value {
        serde_yaml_ng::from_str(text).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert!(config.level.is_none());
        assert_eq!(config.format, LogFormat::Console);
        assert_eq!(config.service_name, "tranqu-server");
        assert!(config.file.is_none());
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(
            LoggingConfig::from_value(Value::Null).unwrap(),
            LoggingConfig::default()
        );
    }

    #[test]
    fn test_filter_directives() {
        let config = LoggingConfig::from_value(yaml(
            r"
level: warn
loggers:
  tranqu_grpc: debug
  h2: error
format: json
",
        ))
        .unwrap();

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter_directives(), "warn,h2=error,tranqu_grpc=debug");
    }

    #[test]
    fn test_default_filter_is_info() {
        assert_eq!(LoggingConfig::default().filter_directives(), "info");
    }

    #[test]
    fn test_python_level_names() {
        let config = LoggingConfig::from_value(yaml(
            r"
level: WARNING
loggers:
  tranqu_engine: critical
  h2: notset
",
        ))
        .unwrap();

        assert_eq!(config.level.as_deref(), Some("warn"));
        assert_eq!(config.filter_directives(), "warn,h2=trace,tranqu_engine=error");
    }

    #[test]
    fn test_warning_level_keeps_warnings_and_errors() {
        let config = LoggingConfig::from_value(yaml("level: warning")).unwrap();
        let subscriber = tracing_subscriber::registry().with(config.env_filter().unwrap());

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "tranqu_grpc::server::service", tracing::Level::ERROR));
            assert!(tracing::enabled!(target: "tranqu_grpc::server::service", tracing::Level::WARN));
            assert!(!tracing::enabled!(target: "tranqu_grpc::server::service", tracing::Level::INFO));
        });
    }

    #[test]
    fn test_unknown_level_is_rejected() {
        let err = LoggingConfig::from_value(yaml("level: verbose")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_logger_level_is_rejected() {
        let err = LoggingConfig::from_value(yaml("loggers:\n  tranqu_grpc: loud\n")).unwrap_err();
        match err {
            ConfigError::ValidationError(message) => assert!(message.contains("tranqu_grpc")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_logger_target_is_rejected() {
        let err = LoggingConfig::from_value(yaml("loggers:\n  'a,b': info\n")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(LoggingConfig::from_value(yaml("format: xml")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"level: debug\nformat: compact\nansi: false\n")
            .unwrap();

        let config = LoggingConfig::load(file.path()).unwrap();
        assert_eq!(config.level.as_deref(), Some("debug"));
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.ansi);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LoggingConfig::load("/nonexistent/logging.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
