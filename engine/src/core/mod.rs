//! Clipshare Core Engine
//!
//! Core module of the clip service.
//! Handles clip metadata persistence, analytics counters, and FFmpeg-backed trimming.

pub mod ffmpeg;
pub mod fs;
pub mod library;
pub mod settings;
pub mod trim;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
