pub mod reaper;
pub mod registry;

mod completer;
mod receiver;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use registry::{UploadRegistry, UploadSession};

/// One row of a complete-upload manifest. The etag is carried for protocol
/// fidelity but part identity is the part number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub part_number: i32,
    pub etag: String,
}

impl ManifestEntry {
    pub fn new(part_number: i32) -> Self {
        Self {
            part_number,
            etag: String::new(),
        }
    }
}

/// Session record persisted to the namespace sys area at initiate time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UploadRecord {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub staging_path: String,
    pub initiated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub(crate) struct PartRecord {
    pub size: i64,
    pub storage_path: String,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}
