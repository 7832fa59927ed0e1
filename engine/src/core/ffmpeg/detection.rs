//! FFmpeg Detection Module
//!
//! Handles detection and validation of the FFmpeg binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::info;

use super::{FFmpegError, FFmpegResult};

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
    /// Whether the path came from configuration rather than discovery
    pub is_configured: bool,
}

#[cfg(target_os = "windows")]
const FFMPEG_BINARY: &str = "ffmpeg.exe";

#[cfg(not(target_os = "windows"))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Detect FFmpeg, preferring an explicitly configured binary.
///
/// A configured path that does not work is an error; it never silently falls
/// back to a different binary.
pub fn detect_ffmpeg(configured: Option<&Path>) -> FFmpegResult<FFmpegInfo> {
    match configured {
        Some(path) => detect_configured_ffmpeg(path),
        None => detect_system_ffmpeg(),
    }
}

/// Validate an explicitly configured FFmpeg binary
pub fn detect_configured_ffmpeg(path: &Path) -> FFmpegResult<FFmpegInfo> {
    if !path.is_file() {
        return Err(FFmpegError::NotFound);
    }

    let version = get_ffmpeg_version(path)?;
    info!("Using configured FFmpeg {} at {}", version, path.display());
    Ok(FFmpegInfo {
        ffmpeg_path: path.to_path_buf(),
        version,
        is_configured: true,
    })
}

/// Detect FFmpeg from common install locations and the `PATH` variable
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let path_var = std::env::var_os("PATH");
    let ffmpeg_path = find_in_dirs(FFMPEG_BINARY, search_dirs(path_var.as_deref()))
        .ok_or(FFmpegError::NotFound)?;

    let version = get_ffmpeg_version(&ffmpeg_path)?;
    info!("Found system FFmpeg {} at {}", version, ffmpeg_path.display());
    Ok(FFmpegInfo {
        ffmpeg_path,
        version,
        is_configured: false,
    })
}

/// `PATH` entries first, then platform install locations
fn search_dirs(path_var: Option<&OsStr>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = path_var
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();
    dirs.extend(get_common_ffmpeg_paths());
    dirs
}

fn find_in_dirs(binary_name: &str, dirs: Vec<PathBuf>) -> Option<PathBuf> {
    dirs.into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(binary_name))
        .find(|candidate| candidate.is_file())
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));
        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        // Homebrew and MacPorts
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Run `ffmpeg -version` and extract the version token
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(format!(
            "{} -version exited with {}",
            ffmpeg_path.display(),
            output.status
        )));
    }

    parse_version(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the first line of `ffmpeg -version`: "ffmpeg version X.Y.Z ..."
fn parse_version(output: &str) -> FFmpegResult<String> {
    let first_line = output
        .lines()
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| FFmpegError::ParseError("Empty FFmpeg version output".to_string()))?;

    let version = first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line);

    Ok(version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_version() {
        let out = "ffmpeg version 6.1.1-3ubuntu5 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc";
        assert_eq!(parse_version(out).unwrap(), "6.1.1-3ubuntu5");

        assert_eq!(parse_version("custom build\n").unwrap(), "custom build");
        assert!(matches!(parse_version(""), Err(FFmpegError::ParseError(_))));
    }

    #[test]
    fn test_find_in_dirs_prefers_first_match() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(second.path().join(FFMPEG_BINARY), b"").unwrap();

        let found = find_in_dirs(
            FFMPEG_BINARY,
            vec![
                PathBuf::new(),
                first.path().to_path_buf(),
                second.path().to_path_buf(),
            ],
        );
        assert_eq!(found, Some(second.path().join(FFMPEG_BINARY)));

        assert_eq!(find_in_dirs(FFMPEG_BINARY, vec![first.path().to_path_buf()]), None);
    }

    #[test]
    fn test_search_dirs_puts_path_entries_first() {
        let joined = std::env::join_paths(["/custom/bin", "/other/bin"]).unwrap();
        let dirs = search_dirs(Some(joined.as_os_str()));
        assert_eq!(dirs[0], PathBuf::from("/custom/bin"));
        assert_eq!(dirs[1], PathBuf::from("/other/bin"));
    }

    #[test]
    fn test_configured_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = detect_configured_ffmpeg(&dir.path().join("ffmpeg")).unwrap_err();
        assert!(matches!(err, FFmpegError::NotFound));
    }

    #[test]
    fn test_detect_system_ffmpeg() {
        // Passes whether or not FFmpeg is installed on the machine.
        match detect_system_ffmpeg() {
            Ok(info) => {
                assert!(!info.version.is_empty());
                assert!(!info.is_configured);
            }
            Err(FFmpegError::NotFound) => {
                println!("FFmpeg not found on system (expected in CI without FFmpeg)");
            }
            Err(e) => {
                panic!("Unexpected error: {}", e);
            }
        }
    }
}
