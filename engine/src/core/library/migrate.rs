//! Layout detection and migration for the persisted library.
//!
//! Two on-disk layouts exist:
//! - legacy: a bare JSON array of records
//! - current: `{ "videos": { "<id>": record } }`
//!
//! Decoding never touches the filesystem; the store persists a migrated
//! document when [`DecodedLibrary::layout`] is [`StoredLayout::Legacy`].

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use super::{LibraryDocument, VideoRecord};

/// Layout found on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoredLayout {
    /// Flat list of records
    Legacy,
    /// Id-keyed mapping
    Current,
}

/// Result of decoding the persisted payload
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedLibrary {
    pub document: LibraryDocument,
    pub layout: StoredLayout,
    /// Entries dropped (unreadable, missing id, duplicate) or re-keyed
    pub repaired: usize,
}

/// Decode raw database bytes in either layout.
///
/// Fails only when the payload is not valid JSON, is neither an array nor an
/// object, or holds `videos` that is not an object. Individual records that
/// do not deserialize are dropped and counted in [`DecodedLibrary::repaired`].
pub fn decode_library(bytes: &[u8]) -> Result<DecodedLibrary, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<VideoRecord> = items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| decode_record(&format!("#{index}"), item))
                .collect();
            let unreadable = total - records.len();
            let (document, repaired) = migrate_legacy(records);
            Ok(DecodedLibrary {
                document,
                layout: StoredLayout::Legacy,
                repaired: repaired + unreadable,
            })
        }
        Value::Object(mut object) => {
            let entries = match object.remove("videos") {
                None | Some(Value::Null) => serde_json::Map::new(),
                Some(Value::Object(entries)) => entries,
                Some(other) => {
                    return Err(serde::de::Error::custom(format!(
                        "expected `videos` to be an object, found {}",
                        json_kind(&other)
                    )))
                }
            };
            let total = entries.len();
            let videos: BTreeMap<String, VideoRecord> = entries
                .into_iter()
                .filter_map(|(key, item)| {
                    let record = decode_record(&key, item)?;
                    Some((key, record))
                })
                .collect();
            let unreadable = total - videos.len();
            let (document, repaired) = rekey(videos);
            Ok(DecodedLibrary {
                document,
                layout: StoredLayout::Current,
                repaired: repaired + unreadable,
            })
        }
        other => Err(serde::de::Error::custom(format!(
            "expected an array or object at the top level, found {}",
            json_kind(&other)
        ))),
    }
}

/// One stored record, or `None` (logged) when it does not deserialize.
fn decode_record(entry: &str, item: Value) -> Option<VideoRecord> {
    match serde_json::from_value::<VideoRecord>(item) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Dropping unreadable library entry {}: {}", entry, e);
            None
        }
    }
}

/// Keys a legacy record list by id. Later duplicates win.
pub fn migrate_legacy(records: Vec<VideoRecord>) -> (LibraryDocument, usize) {
    let mut document = LibraryDocument::new();
    let mut repaired = 0;

    for record in records {
        if record.id.is_empty() {
            warn!("Dropping legacy record without id (filename {})", record.filename);
            repaired += 1;
            continue;
        }
        if document.videos.insert(record.id.clone(), record).is_some() {
            repaired += 1;
        }
    }

    (document, repaired)
}

fn rekey(videos: BTreeMap<String, VideoRecord>) -> (LibraryDocument, usize) {
    let mut document = LibraryDocument::new();
    let mut repaired = 0;

    for (key, record) in videos {
        if record.id.is_empty() {
            warn!("Dropping record under key {:?} without id", key);
            repaired += 1;
            continue;
        }
        if key != record.id {
            warn!("Re-keying record {:?} stored under {:?}", record.id, key);
            repaired += 1;
        }
        document.videos.insert(record.id.clone(), record);
    }

    (document, repaired)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
