//! Library Models
//!
//! Defines the clip record, the persisted library document, and analytics events.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::core::VideoId;

// =============================================================================
// Video Record
// =============================================================================

/// Metadata for one recorded clip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Unique clip identifier (immutable)
    #[serde(default)]
    pub id: VideoId,
    /// Stored media file name (immutable)
    pub filename: String,
    /// Number of times playback started
    #[serde(default)]
    pub views: u64,
    /// Number of times playback reached the end
    #[serde(default)]
    pub completions: u64,
    /// Creation time, persisted as ISO 8601 with millisecond precision
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Creates a fresh record with zeroed counters, stamped now.
    pub fn new(id: impl Into<VideoId>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            views: 0,
            completions: 0,
            // Truncated so the in-memory value equals what is read back.
            created_at: Utc::now().trunc_subsecs(3),
        }
    }

    /// Applies one analytics event to the counters
    pub fn apply(&mut self, event: AnalyticsEvent) {
        match event {
            AnalyticsEvent::View => self.views = self.views.saturating_add(1),
            AnalyticsEvent::Complete => self.completions = self.completions.saturating_add(1),
        }
    }
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Library Document
// =============================================================================

/// The full id-keyed mapping, persisted as one JSON document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDocument {
    /// All tracked clips keyed by id
    #[serde(default)]
    pub videos: BTreeMap<VideoId, VideoRecord>,
}

impl LibraryDocument {
    /// Creates an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked clips
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    /// True if no clips are tracked
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Looks up a clip by id
    pub fn get(&self, id: &str) -> Option<&VideoRecord> {
        self.videos.get(id)
    }
}

// =============================================================================
// Analytics Events
// =============================================================================

/// Playback event reported by the player
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsEvent {
    /// Playback started
    View,
    /// Playback reached the end
    Complete,
}

impl fmt::Display for AnalyticsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsEvent::View => f.write_str("view"),
            AnalyticsEvent::Complete => f.write_str("complete"),
        }
    }
}

impl FromStr for AnalyticsEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(AnalyticsEvent::View),
            "complete" => Ok(AnalyticsEvent::Complete),
            other => Err(format!("Unknown analytics event: {other}")),
        }
    }
}
