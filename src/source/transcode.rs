//! External transcoder process
//!
//! The transcoder turns any input the program understands into a stream of
//! JPEG frames on its stdout. Only its stdout is read; stderr goes to the
//! parent's stderr so transcoder diagnostics stay visible.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use super::config::TranscodeConfig;
use crate::error::SourceError;

/// A running transcoder and its output pipe
#[derive(Debug)]
pub struct TranscodeSource {
    process: TranscodeProcess,
    stdout: ChildStdout,
}

impl TranscodeSource {
    /// Start transcoding `descriptor`
    ///
    /// Descriptors containing `://` are passed through as URLs. Anything else
    /// is treated as a local path and must name an existing regular file.
    pub fn spawn(config: &TranscodeConfig, descriptor: &str) -> Result<Self, SourceError> {
        if !is_url(descriptor) {
            check_input_file(Path::new(descriptor))?;
        }

        let mut child = Command::new(&config.program)
            .args(config.args(descriptor))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(SourceError::NoStdout)?;

        tracing::info!(
            program = %config.program,
            input = %descriptor,
            pid = child.id(),
            fps = config.fps,
            width = config.width,
            height = config.height,
            "Transcoder started"
        );

        Ok(Self {
            process: TranscodeProcess {
                child,
                descriptor: descriptor.to_string(),
            },
            stdout,
        })
    }

    /// Process id of the transcoder, if still running
    pub fn pid(&self) -> Option<u32> {
        self.process.child.id()
    }

    /// Split into the output pipe and the process handle
    pub fn into_parts(self) -> (ChildStdout, TranscodeProcess) {
        (self.stdout, self.process)
    }
}

/// Handle on the transcoder process itself
#[derive(Debug)]
pub struct TranscodeProcess {
    child: Child,
    descriptor: String,
}

impl TranscodeProcess {
    /// Wait for the process to exit, killing it if `shutdown` fires first
    ///
    /// Killing the process closes its stdout, which ends the reader side.
    pub async fn supervise(mut self, shutdown: CancellationToken) -> Option<ExitStatus> {
        let exited = tokio::select! {
            status = self.child.wait() => Some(status),
            _ = shutdown.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status,
            None => {
                tracing::debug!(input = %self.descriptor, "Stopping transcoder");
                if let Err(e) = self.child.start_kill() {
                    tracing::debug!(error = %e, "Transcoder already exited");
                }
                self.child.wait().await
            }
        };

        match status {
            Ok(status) if status.success() => {
                tracing::info!(input = %self.descriptor, "Transcoder finished");
                Some(status)
            }
            Ok(status) => {
                if shutdown.is_cancelled() {
                    tracing::info!(input = %self.descriptor, status = %status, "Transcoder stopped");
                } else {
                    tracing::warn!(input = %self.descriptor, status = %status, "Transcoder exited with failure");
                }
                Some(status)
            }
            Err(e) => {
                tracing::error!(input = %self.descriptor, error = %e, "Failed to wait for transcoder");
                None
            }
        }
    }
}

fn is_url(descriptor: &str) -> bool {
    descriptor.contains("://")
}

fn check_input_file(path: &Path) -> Result<(), SourceError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(SourceError::NotAFile(path.to_path_buf())),
        Err(_) => Err(SourceError::NotFound(path.to_path_buf())),
    }
}
