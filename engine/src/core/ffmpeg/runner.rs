//! FFmpeg Runner Module
//!
//! Executes FFmpeg commands for clip processing.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{FFmpegError, FFmpegInfo, FFmpegResult};
use crate::core::TimeSec;

/// Number of stderr lines kept in execution errors
const STDERR_TAIL_LINES: usize = 12;

/// FFmpeg Runner for executing video processing commands
#[derive(Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from a detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    /// Cut `[start, start + duration)` out of `input` into `output`.
    ///
    /// The child is killed if it outlives `timeout` or if the returned future
    /// is dropped before completion.
    pub async fn trim(
        &self,
        input: &Path,
        output: &Path,
        start: TimeSec,
        duration: TimeSec,
        timeout: Duration,
    ) -> FFmpegResult<()> {
        if !input.is_file() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let args = trim_args(input, output, start, duration);
        debug!("Running {} {}", self.info.ffmpeg_path.display(), args.join(" "));

        let child = tokio::process::Command::new(&self.info.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FFmpegError::ProcessError)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(FFmpegError::ProcessError)?,
            Err(_) => {
                warn!("FFmpeg trim exceeded {:?}, killing process", timeout);
                return Err(FFmpegError::Timeout(timeout));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "Trim failed ({}): {}",
                result.status,
                stderr_tail(&stderr, STDERR_TAIL_LINES)
            )));
        }

        Ok(())
    }
}

/// Build the argument list for a trim.
///
/// `-ss` before `-i` seeks the input; `-t` bounds the output duration. Times
/// are passed unrounded.
fn trim_args(input: &Path, output: &Path, start: TimeSec, duration: TimeSec) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        start.to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-t".to_string(),
        duration.to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let skip = lines.len().saturating_sub(max_lines);
    lines[skip..].join("\n")
}
