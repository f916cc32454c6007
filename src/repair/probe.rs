//! Run the target program and classify the run

use crate::config::RepairConfig;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

/// Errors that stop the probe from producing a result at all.
///
/// A program that runs and fails is not one of these.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("no interpreter configured")]
    NoInterpreter,

    #[error("failed to spawn `{interpreter}`: {source}")]
    SpawnFailed {
        interpreter: String,
        source: std::io::Error,
    },

    #[error("failed to collect output from `{interpreter}`: {source}")]
    OutputFailed {
        interpreter: String,
        source: std::io::Error,
    },
}

/// Outcome of one run of the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// stdout followed by stderr
    pub combined_output: String,
    /// True iff `combined_output` contains the failure marker
    pub failed: bool,
    /// Informational; never used for classification
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    /// Classify captured output by the presence of `failure_marker`
    pub fn classify(combined_output: String, exit_code: Option<i32>, failure_marker: &str) -> Self {
        let failed = combined_output.contains(failure_marker);
        Self {
            combined_output,
            failed,
            exit_code,
        }
    }
}

/// Runs `<interpreter> <target>` and looks for the failure marker
#[derive(Debug, Clone)]
pub struct ExecutionProbe {
    interpreter: String,
    failure_marker: String,
}

impl ExecutionProbe {
    /// `interpreter` may carry arguments, e.g. `"python3 -X dev"`
    pub fn new(interpreter: impl Into<String>, failure_marker: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            failure_marker: failure_marker.into(),
        }
    }

    pub fn from_config(config: &RepairConfig) -> Self {
        Self::new(config.interpreter.clone(), config.failure_marker.clone())
    }

    /// Run the target to completion and capture both streams.
    ///
    /// A non-zero exit is a normal result.
    pub async fn run(&self, target: &Path) -> Result<ExecutionResult, ProbeError> {
        let mut parts = self.interpreter.split_whitespace();
        let program = parts.next().ok_or(ProbeError::NoInterpreter)?;

        tracing::debug!(
            interpreter = %self.interpreter,
            target = %target.display(),
            "running target"
        );

        let mut child = Command::new(program)
            .args(parts)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::SpawnFailed {
                interpreter: self.interpreter.clone(),
                source: e,
            })?;

        let (stdout, stderr, status) =
            wait_for_child_output(&mut child)
                .await
                .map_err(|e| ProbeError::OutputFailed {
                    interpreter: self.interpreter.clone(),
                    source: e,
                })?;

        let exit_code = exit_status_code(&status);
        let mut combined_output = stdout;
        combined_output.push_str(&stderr);

        let result = ExecutionResult::classify(combined_output, exit_code, &self.failure_marker);
        tracing::debug!(exit_code = ?result.exit_code, failed = result.failed, "target finished");
        Ok(result)
    }
}

/// Read stdout and stderr concurrently so neither pipe can fill and block
/// the child, then wait for it to exit.
async fn wait_for_child_output(
    child: &mut Child,
) -> Result<(String, String, ExitStatus), std::io::Error> {
    async fn drain<R: tokio::io::AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<String> {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (stdout, stderr) = match tokio::try_join!(stdout, stderr) {
        Ok(streams) => streams,
        Err(e) => {
            let _ = child.kill().await;
            return Err(e);
        }
    };

    let status = child.wait().await?;
    Ok((stdout, stderr, status))
}

/// Exit code, or 128 + signal for signal-terminated processes on Unix
fn exit_status_code(status: &ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}
