//! FFmpeg Integration Module
//!
//! Locates the FFmpeg binary and runs the trim command used by
//! [`crate::core::trim::TrimPipeline`].
//!
//! Supports an explicitly configured binary (`ffmpegPath` /
//! `CLIPSHARE_FFMPEG_PATH`) and system-installed FFmpeg found on `PATH`.

mod detection;
mod runner;

pub use detection::*;
pub use runner::FFmpegRunner;

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Please install FFmpeg or set CLIPSHARE_FFMPEG_PATH.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout: FFmpeg did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ffmpeg_error_display() {
        let err = FFmpegError::NotFound;
        assert!(err.to_string().contains("FFmpeg not found"));

        let err = FFmpegError::ExecutionFailed("exit code 1".to_string());
        assert!(err.to_string().contains("exit code 1"));

        let err = FFmpegError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
