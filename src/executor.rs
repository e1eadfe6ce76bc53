//! Sequential multi-command execution on one session.
//!
//! Commands run strictly in order, one channel at a time, because later
//! commands may depend on what earlier ones changed on the router. The first
//! failure stops the batch: the caller gets the results completed so far plus
//! the failing command, and the remaining commands are never sent.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::ssh::{RemoteShell, SshError};

/// Outcome of one command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    /// Combined stdout/stderr.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn succeeded(command: &str, output: String, duration_ms: u64) -> Self {
        Self {
            command: command.to_string(),
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(command: &str, output: String, error: String, duration_ms: u64) -> Self {
        Self {
            command: command.to_string(),
            output,
            error: Some(error),
            duration_ms,
        }
    }
}

/// A batch stopped at command `index`.
#[derive(Debug, Error)]
pub struct BatchError {
    /// Zero-based position of the failing command.
    pub index: usize,
    /// Results of the commands before it, in order.
    pub completed: Vec<CommandResult>,
    /// The failing command with whatever output it produced.
    pub failed: CommandResult,
    #[source]
    pub source: SshError,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command '{}' failed: {}", self.failed.command, self.source)
    }
}

/// Run `commands` in order on `shell`, stopping at the first failure.
pub async fn execute_multiple<S>(
    shell: &mut S,
    commands: &[String],
) -> Result<Vec<CommandResult>, BatchError>
where
    S: RemoteShell + ?Sized,
{
    let mut results = Vec::with_capacity(commands.len());

    for (index, command) in commands.iter().enumerate() {
        let start = Instant::now();
        let outcome = shell.execute(command).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!("[{index}] {command} ok in {duration_ms}ms");
                results.push(CommandResult::succeeded(command, output, duration_ms));
            }
            Err(source) => {
                debug!("[{index}] {command} failed in {duration_ms}ms: {source}");
                let output = source.output().unwrap_or_default().to_string();
                return Err(BatchError {
                    index,
                    completed: results,
                    failed: CommandResult::failed(command, output, source.to_string(), duration_ms),
                    source,
                });
            }
        }
    }

    Ok(results)
}
