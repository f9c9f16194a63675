use crate::error::{RelayError, Result};
use crate::logs::LogRelay;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

/// Handles to the background readers feeding a relay
pub struct CaptureHandle {
    stdout_task: JoinHandle<u64>,
    stderr_task: JoinHandle<u64>,
}

impl CaptureHandle {
    /// Wait until both pipes reach EOF
    ///
    /// # Returns
    /// * `Ok(n)` - Total number of lines relayed from both pipes
    /// * `Err(RelayError)` - A reader task panicked or was cancelled
    pub async fn wait(self) -> Result<u64> {
        let stdout = self
            .stdout_task
            .await
            .map_err(|e| RelayError::CaptureError(format!("stdout reader failed: {}", e)))?;
        let stderr = self
            .stderr_task
            .await
            .map_err(|e| RelayError::CaptureError(format!("stderr reader failed: {}", e)))?;
        Ok(stdout + stderr)
    }

    /// Stop both readers without waiting for EOF
    pub fn abort(&self) {
        self.stdout_task.abort();
        self.stderr_task.abort();
    }
}

/// Capture stdout and stderr from a child process into `relay`
///
/// Spawns one background task per pipe. Each line read (newline included)
/// becomes one relay record.
///
/// # Arguments
/// * `relay` - Relay receiving the output
/// * `child` - Child spawned with piped stdout and stderr
///
/// # Returns
/// * `Ok(CaptureHandle)` - Readers are running
/// * `Err(RelayError::CaptureError)` - A pipe was not available
pub fn capture_output(relay: Arc<LogRelay>, child: &mut Child) -> Result<CaptureHandle> {
    let pid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RelayError::CaptureError("No stdout pipe available".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RelayError::CaptureError("No stderr pipe available".to_string()))?;

    tracing::debug!(?pid, "Capturing process output");

    let stdout_task = tokio::spawn(relay_lines(
        Arc::clone(&relay),
        BufReader::new(stdout),
        "stdout",
    ));
    let stderr_task = tokio::spawn(relay_lines(relay, BufReader::new(stderr), "stderr"));

    Ok(CaptureHandle {
        stdout_task,
        stderr_task,
    })
}

/// Read lines until EOF, writing each one into the relay
pub async fn relay_lines<R>(relay: Arc<LogRelay>, mut reader: R, stream: &'static str) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut relayed = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            // EOF - process closed the pipe
            Ok(0) => break,
            Ok(_) => {
                if let Err(e) = relay.write(&buf) {
                    tracing::warn!(stream, "Failed to persist captured line: {}", e);
                }
                relayed += 1;
            }
            Err(e) => {
                tracing::debug!(stream, "Stopped reading process output: {}", e);
                break;
            }
        }
    }

    relayed
}
