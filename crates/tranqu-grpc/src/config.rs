//! Configuration management for the Tranqu gRPC server.
//!
//! Configuration is read from a YAML document. Before the document is
//! deserialized, every string in it is passed through
//! [`resolve_environment`]:
//!
//! 1. a leading `~` (alone or followed by `/`) becomes the home directory
//! 2. `$NAME` and `${NAME}` become the value of the environment variable
//!
//! Undefined variables are left in place verbatim, so `$MISSING` stays
//! `$MISSING`. A `.env` file in the working directory is loaded first and
//! can supply variables.
//!
//! ```yaml
//! proto:
//!   max_workers: 10
//!   address: "[::]:50051"
//! engine:
//!   command: python3
//!   args: ["~/tranqu-server/scripts/tranqu_bridge.py"]
//!   env:
//!     PYTHONPATH: "$HOME/tranqu/src"
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tranqu_engine::ProcessConfig;

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// gRPC listener settings. Required.
    pub proto: ProtoConfig,

    /// Transpilation engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Health and metrics endpoint settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// gRPC listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtoConfig {
    /// Number of calls served concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Listen address (e.g., "[::]:50051")
    #[serde(default = "default_address")]
    pub address: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    /// Maximum gRPC message size in bytes (default: 16 MB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,
}

/// Engine process settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub process: ProcessConfig,

    /// Allow only one engine call at a time
    #[serde(default)]
    pub serialize: bool,
}

/// Health and metrics HTTP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Bind address of the HTTP server; disabled when unset
    #[serde(default)]
    pub http_address: Option<String>,
}

// Default value functions
fn default_max_workers() -> usize {
    10
}

fn default_address() -> String {
    "[::]:50051".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30 // 30 seconds
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

impl Default for ProtoConfig {
    fn default() -> Self {
        ProtoConfig {
            max_workers: default_max_workers(),
            address: default_address(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            max_message_size_bytes: default_max_message_size(),
        }
    }
}

impl Config {
    /// Load, resolve and validate the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let document = load_document(path)?;
        let config = Self::from_value(document).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Deserialize and validate an already resolved document.
    pub fn from_value(document: Value) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml_ng::from_value(document).map_err(|e| ConfigError::ParseError {
                path: PathBuf::new(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proto.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "proto.max_workers must be greater than 0".to_string(),
            ));
        }

        self.listen_address()?;

        if self.engine.process.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.command must not be empty".to_string(),
            ));
        }

        if let Some(address) = &self.observability.http_address {
            address.parse::<SocketAddr>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "Invalid observability.http_address: {address}"
                ))
            })?;
        }

        Ok(())
    }

    /// Resolve `proto.address` to a socket address.
    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        let invalid =
            || ConfigError::ValidationError(format!("Invalid proto.address: {}", self.proto.address));

        self.proto
            .address
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }

    /// Parsed health server address, if enabled.
    pub fn http_address(&self) -> Option<SocketAddr> {
        self.observability
            .http_address
            .as_deref()
            .and_then(|a| a.parse().ok())
    }
}

/// Source of home directory and environment variables for expansion.
pub trait Environment {
    fn home_dir(&self) -> Option<PathBuf>;
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed home directory and variable set, independent of the process.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    pub home: Option<PathBuf>,
    pub vars: HashMap<String, String>,
}

impl StaticEnvironment {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            vars: HashMap::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl Environment for StaticEnvironment {
    fn home_dir(&self) -> Option<PathBuf> {
        self.home.clone()
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Expand `~` and environment variables in every string of `node`, using the
/// process environment.
pub fn resolve_environment(node: Value) -> Value {
    resolve_environment_with(node, &ProcessEnvironment)
}

/// Expand `~` and environment variables in every string of `node`.
///
/// Mapping keys, numbers, booleans and nulls are left untouched.
pub fn resolve_environment_with<E: Environment + ?Sized>(node: Value, env: &E) -> Value {
    match node {
        Value::Mapping(mapping) => Value::Mapping(
            mapping
                .into_iter()
                .map(|(key, value)| (key, resolve_environment_with(value, env)))
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| resolve_environment_with(item, env))
                .collect(),
        ),
        Value::String(text) => Value::String(expand_vars(&expand_user(&text, env), env)),
        Value::Tagged(mut tagged) => {
            tagged.value = resolve_environment_with(tagged.value, env);
            Value::Tagged(tagged)
        }
        scalar @ (Value::Null | Value::Bool(_) | Value::Number(_)) => scalar,
    }
}

/// Replace a leading `~` path segment with the home directory.
fn expand_user<E: Environment + ?Sized>(text: &str, env: &E) -> String {
    let rest = match text.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return text.to_string(),
    };
    match env.home_dir() {
        Some(home) => format!("{}{rest}", home.display()),
        None => text.to_string(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace `$NAME` and `${NAME}` with variable values; unknown names stay.
fn expand_vars<E: Environment + ?Sized>(text: &str, env: &E) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, token_len) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !is_name_char(c))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let token = &rest[pos..pos + 1 + token_len];
        let value = if name.is_empty() { None } else { env.var(name) };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(if token_len == 0 { "$" } else { token }),
        }
        rest = &rest[pos + 1 + token_len..];
    }

    out.push_str(rest);
    out
}

/// Read a YAML document and resolve environment references in it.
pub fn load_document(path: &Path) -> Result<Value, ConfigError> {
    load_document_with(path, &ProcessEnvironment)
}

/// [`load_document`] with an explicit environment.
pub fn load_document_with<E: Environment + ?Sized>(
    path: &Path,
    env: &E,
) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let document: Value =
        serde_yaml_ng::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(resolve_environment_with(document, env))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading {}: {message}", path.display())]
    IoError { path: PathBuf, message: String },

    #[error("Parse error in {}: {message}", path.display())]
    ParseError { path: PathBuf, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}
