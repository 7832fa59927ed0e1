//! Video Library Module
//!
//! Durable metadata for recorded clips: identity, stored file name, view and
//! completion counters.
//!
//! Storage location: `{data_dir}/db.json`, guarded by `{data_dir}/db.json.lock`.

mod migrate;
mod models;
mod store;

pub use migrate::{decode_library, migrate_legacy, DecodedLibrary, StoredLayout};
pub use models::{AnalyticsEvent, LibraryDocument, VideoRecord};
pub use store::{LibraryStore, LoadOrigin, LoadedLibrary};
