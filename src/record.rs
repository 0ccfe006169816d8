//! Image record model shared between the pipeline and its collaborators.
//!
//! An [`ImageRecord`] describes one stored binary artifact: its display
//! filename, the unique on-disk storage name, the derived storage path, byte
//! size, mime type, and owner. Records are created on upload and again for
//! every transformation result — the pipeline never mutates a source record
//! in place.
//!
//! Storage names are UUID-based so concurrent writes under different records
//! can never collide; the storage path is derived deterministically from the
//! storage name and the creation date (`uploads/<year>/<month>/<name>`).

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Filename extensions accepted at upload time.
const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

/// A persisted image row. The source of a transformation as well as its
/// derived output are both represented by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: i64,
    /// User-facing filename (e.g. `resized_holiday.jpg`).
    pub filename: String,
    /// Unique on-disk name. Never shown to users.
    pub storage_name: String,
    /// Storage path relative to the file store root.
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a not-yet-persisted image row. The repository assigns the id
/// and timestamps on create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub filename: String,
    pub storage_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub owner_id: i64,
}

/// Public metadata for a derived image, returned to the request boundary
/// and round-tripped through the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedImageInfo {
    pub id: i64,
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ImageRecord> for DerivedImageInfo {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            file_size: record.file_size,
            mime_type: record.mime_type.clone(),
            created_at: record.created_at,
        }
    }
}

/// Generate a unique storage name preserving the extension of `filename`.
pub fn generate_storage_name(filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_lowercase()),
        None => Uuid::new_v4().to_string(),
    }
}

/// Derive the storage path for a storage name created at `created_at`.
///
/// The layout is `uploads/<year>/<month>/<storage_name>`, so a record's path
/// is always recomputable from its storage name and creation date.
pub fn derive_file_path(storage_name: &str, created_at: DateTime<Utc>) -> String {
    format!(
        "uploads/{}/{}/{}",
        created_at.year(),
        created_at.month(),
        storage_name
    )
}

/// Whether `filename` carries an extension accepted at upload time.
pub fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}
