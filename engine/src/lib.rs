//! Clipshare Core Library
//!
//! Clip metadata store and trim pipeline for a screen recording service.
//!
//! - [`core::library::LibraryStore`] persists clip records and analytics
//!   counters in a single JSON document with serialized read-modify-write.
//! - [`core::trim::TrimPipeline`] cuts a time range out of in-memory media by
//!   delegating to FFmpeg, cleaning up its scratch files on every exit path.
//!
//! Request handlers (upload, analytics, trim) are thin callers of these two
//! components; see the `clipshare-cli` crate for one such caller.

pub mod core;

use std::path::Path;
use std::sync::OnceLock;

pub use crate::core::library::{AnalyticsEvent, LibraryStore, VideoRecord};
pub use crate::core::settings::EngineSettings;
pub use crate::core::trim::{TrimError, TrimPipeline, TrimRange};
pub use crate::core::{CoreError, CoreResult};

// =============================================================================
// Logging
// =============================================================================

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// Always logs to stderr, leaving stdout for command output. With `log_dir`,
/// also writes a daily rolling `clipshare.log` there. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_logging(log_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions));

    let file_layer = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(dir, "clipshare.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer);

    // Avoid panics if already initialized (tests, repeated calls).
    let _ = tracing::subscriber::set_global_default(subscriber);
}
