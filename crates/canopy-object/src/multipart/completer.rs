use std::collections::BTreeMap;

use canopy_common::error::{CanopyError, Result};
use canopy_common::time;
use canopy_common::types::ObjectStat;

use crate::deadline::bounded;
use crate::multipart::registry::UploadRegistry;
use crate::multipart::{ManifestEntry, PartRecord};
use crate::translate;

impl UploadRegistry {
    /// Validates the manifest against the recorded parts and, on success,
    /// commits the concatenation to the final object path and retires the
    /// session. The session lock is held for the whole validate-then-commit
    /// sequence so no part upload can mutate the map in between.
    ///
    /// Any validation failure leaves the session open and staging
    /// untouched; the caller may retry with a corrected manifest or abort.
    pub async fn complete(
        &self,
        upload_id: &str,
        manifest: &[ManifestEntry],
        allow_out_of_order: bool,
    ) -> Result<ObjectStat> {
        let session = self.lookup(upload_id).await?;
        let mut state = session.state.lock().await;
        if !state.open {
            return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
        }

        validate_manifest(
            manifest,
            &state.parts,
            allow_out_of_order,
            self.config.min_part_size,
        )?;

        let mut sources = Vec::with_capacity(manifest.len());
        for entry in manifest {
            let part = state
                .parts
                .get(&entry.part_number)
                .ok_or(CanopyError::InvalidPart(entry.part_number))?;
            sources.push(part.storage_path.clone());
        }

        let final_path = translate::object_path(&session.bucket, &session.key);
        let committed = bounded(
            self.config.io_deadline,
            "commit upload",
            self.ns.concat(&sources, &final_path),
        )
        .await?;

        self.cleanup_locked(&session, &mut state).await?;
        drop(state);
        self.evict(upload_id).await;

        Ok(ObjectStat {
            bucket: session.bucket.clone(),
            key: session.key.clone(),
            size: committed.size,
            etag: committed.etag.unwrap_or_default(),
            last_modified: committed.mod_time.unwrap_or_else(time::now),
        })
    }
}

/// First failing check wins: unknown or negative part numbers, then
/// ordering, then the size floor. The final manifest entry is exempt from
/// the floor whatever its size. An empty manifest is legal and commits an
/// empty object.
fn validate_manifest(
    manifest: &[ManifestEntry],
    parts: &BTreeMap<i32, PartRecord>,
    allow_out_of_order: bool,
    min_part_size: i64,
) -> Result<()> {
    for entry in manifest {
        if entry.part_number < 0 || !parts.contains_key(&entry.part_number) {
            return Err(CanopyError::InvalidPart(entry.part_number));
        }
    }

    if !allow_out_of_order {
        for pair in manifest.windows(2) {
            if pair[1].part_number <= pair[0].part_number {
                return Err(CanopyError::InvalidPartOrder);
            }
        }
    }

    for entry in &manifest[..manifest.len().saturating_sub(1)] {
        let size = parts
            .get(&entry.part_number)
            .map(|part| part.size)
            .unwrap_or_default();
        if size < min_part_size {
            return Err(CanopyError::EntityTooSmall {
                part_number: entry.part_number,
                size,
                min_size: min_part_size,
            });
        }
    }

    Ok(())
}
