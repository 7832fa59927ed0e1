//! Trim Pipeline
//!
//! Produces a sub-clip of in-memory media by handing the codec work to FFmpeg.
//!
//! Each invocation owns two scratch files (`input-<uuid>.<ext>` and
//! `output-<uuid>.<ext>`). They are removed when the invocation ends on every
//! path: success, FFmpeg failure, I/O failure, timeout, or the caller dropping
//! the future.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::core::ffmpeg::{detect_ffmpeg, FFmpegError, FFmpegInfo, FFmpegRunner};
use crate::core::fs::remove_file_best_effort;
use crate::core::settings::EngineSettings;
use crate::core::TimeSec;

// =============================================================================
// Errors
// =============================================================================

/// Step of the pipeline that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimStage {
    WriteInput,
    Transcode,
    ReadOutput,
}

impl fmt::Display for TrimStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrimStage::WriteInput => f.write_str("write input"),
            TrimStage::Transcode => f.write_str("transcode"),
            TrimStage::ReadOutput => f.write_str("read output"),
        }
    }
}

/// Trim pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum TrimError {
    #[error("Invalid time range: {start}~{end} seconds")]
    InvalidRange { start: TimeSec, end: TimeSec },

    #[error("No input media provided")]
    EmptyInput,

    #[error("Transcoder unavailable: {0}")]
    TranscoderUnavailable(#[source] FFmpegError),

    #[error("Failed to process video ({stage}): {reason}")]
    ProcessingFailed { stage: TrimStage, reason: String },
}

impl TrimError {
    /// True for errors caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, TrimError::InvalidRange { .. } | TrimError::EmptyInput)
    }

    fn processing(stage: TrimStage, reason: impl ToString) -> Self {
        TrimError::ProcessingFailed {
            stage,
            reason: reason.to_string(),
        }
    }
}

pub type TrimResult<T> = Result<T, TrimError>;

// =============================================================================
// Time Range
// =============================================================================

/// Validated half-open range `[start, end)` in seconds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimRange {
    start: TimeSec,
    end: TimeSec,
}

impl TrimRange {
    /// Both bounds finite, `start >= 0`, `end > start`.
    pub fn new(start: TimeSec, end: TimeSec) -> TrimResult<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(TrimError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> TimeSec {
        self.start
    }

    pub fn end(&self) -> TimeSec {
        self.end
    }

    pub fn duration(&self) -> TimeSec {
        self.end - self.start
    }
}

// =============================================================================
// Scratch Files
// =============================================================================

/// Uniquely named file path removed on drop
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(dir: &Path, role: &str, extension: &str) -> Self {
        Self {
            path: dir.join(format!("{role}-{}.{extension}", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        remove_file_best_effort(&self.path);
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Stateless trim transform over media bytes
#[derive(Clone)]
pub struct TrimPipeline {
    runner: FFmpegRunner,
    scratch_dir: PathBuf,
    extension: String,
    timeout: Duration,
}

impl TrimPipeline {
    /// Create a pipeline around an already detected FFmpeg
    pub fn new(
        runner: FFmpegRunner,
        scratch_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            scratch_dir: scratch_dir.into(),
            extension: extension.into(),
            timeout,
        }
    }

    /// Detect FFmpeg and build the pipeline from settings.
    ///
    /// Meant to run once at startup; a failure means the trim service is
    /// unavailable, not that a particular request was bad.
    pub fn from_settings(settings: &EngineSettings) -> TrimResult<Self> {
        let info =
            detect_ffmpeg(settings.ffmpeg_path.as_deref()).map_err(TrimError::TranscoderUnavailable)?;
        Ok(Self::new(
            FFmpegRunner::new(info),
            settings.scratch_dir(),
            settings.media_extension.clone(),
            settings.trim_timeout(),
        ))
    }

    /// The FFmpeg installation this pipeline runs
    pub fn ffmpeg(&self) -> &FFmpegInfo {
        self.runner.info()
    }

    /// Directory holding scratch files
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Validate `start`/`end` and trim.
    ///
    /// Invalid ranges are rejected before any file is created.
    pub async fn trim_seconds(
        &self,
        input: &[u8],
        start: TimeSec,
        end: TimeSec,
    ) -> TrimResult<Vec<u8>> {
        let range = TrimRange::new(start, end)?;
        self.trim(input, range).await
    }

    /// Produce the bytes of `range` cut out of `input`.
    pub async fn trim(&self, input: &[u8], range: TrimRange) -> TrimResult<Vec<u8>> {
        if input.is_empty() {
            return Err(TrimError::EmptyInput);
        }

        let started = Instant::now();
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| TrimError::processing(TrimStage::WriteInput, e))?;

        let input_file = ScratchFile::new(&self.scratch_dir, "input", &self.extension);
        let output_file = ScratchFile::new(&self.scratch_dir, "output", &self.extension);

        tokio::fs::write(input_file.path(), input)
            .await
            .map_err(|e| TrimError::processing(TrimStage::WriteInput, e))?;

        if let Err(e) = self
            .runner
            .trim(
                input_file.path(),
                output_file.path(),
                range.start(),
                range.duration(),
                self.timeout,
            )
            .await
        {
            warn!(
                "Trim {:.3}~{:.3}s failed after {:?}: {}",
                range.start(),
                range.end(),
                started.elapsed(),
                e
            );
            return Err(TrimError::processing(TrimStage::Transcode, e));
        }

        let output = tokio::fs::read(output_file.path())
            .await
            .map_err(|e| TrimError::processing(TrimStage::ReadOutput, e))?;

        info!(
            "Trimmed {:.3}~{:.3}s: {} -> {} bytes in {:?}",
            range.start(),
            range.end(),
            input.len(),
            output.len(),
            started.elapsed()
        );
        Ok(output)
    }
}
