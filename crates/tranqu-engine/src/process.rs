//! Engine adapter that runs the transpiler as a child process.
//!
//! One process is spawned per call. The normalized [`TranspileInput`] is
//! written to the child's stdin as a single JSON document and stdin is
//! closed. The child answers with a [`TranspileOutput`] JSON document on
//! stdout and exits with status 0. Any other exit status is a rejection and
//! stderr carries the reason.
//!
//! ```text
//! server ──stdin {program, program_lib, ...}──▶ bridge ──▶ tranqu
//!        ◀─stdout {transpiled_program, stats, virtual_physical_mapping}─┘
//! ```
//!
//! Calls never share a process, so the adapter is safe for concurrent use.
//! The price is start-up cost: every call pays for interpreter start, the
//! Tranqu and Qiskit imports, and a fresh `Tranqu()` instance. Size
//! `proto.max_workers` with that in mind.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::transpiler::Transpiler;
use crate::types::{TranspileInput, TranspileOutput};

/// How to launch the engine process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Executable to run.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory of the child (inherited when unset).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_command() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["scripts/tranqu_bridge.py".to_string()]
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }
}

impl ProcessConfig {
    /// Create a config for an arbitrary command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Transpiler backed by an external process.
pub struct ProcessTranspiler {
    config: ProcessConfig,
}

impl ProcessTranspiler {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Transpiler for ProcessTranspiler {
    fn name(&self) -> &str {
        "process"
    }

    async fn transpile(&self, input: TranspileInput) -> EngineResult<TranspileOutput> {
        let payload = serde_json::to_vec(&input)?;

        debug!(command = %self.config.command, args = ?self.config.args, "Spawning engine process");

        let mut child = self.command().spawn().map_err(|source| EngineError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Io(io::Error::other("engine stdin is not piped")))?;

        // Feed stdin while collecting stdout so a chatty child cannot deadlock us.
        let feed = async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("engine exited with {}", output.status)
            } else {
                stderr
            };
            return Err(EngineError::Rejected(reason));
        }
        // A child may exit without draining its input.
        match fed {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }

        let result: TranspileOutput = serde_json::from_slice(&output.stdout)?;
        result.ensure_program()
    }
}
