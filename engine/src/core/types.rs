//! Clipshare Core Type Definitions
//!
//! Defines fundamental types shared by the store and the trim pipeline.

// =============================================================================
// ID Types
// =============================================================================

/// Video unique identifier (UUID v4 when assigned by the upload path)
pub type VideoId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;
