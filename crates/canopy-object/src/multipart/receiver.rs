use canopy_common::error::{CanopyError, Result};
use canopy_common::time;
use canopy_common::types::PartStat;
use bytes::Bytes;
use md5::{Digest, Md5};

use crate::deadline::bounded;
use crate::multipart::PartRecord;
use crate::multipart::registry::UploadRegistry;
use crate::translate;

impl UploadRegistry {
    /// Persists one part under the session's staging directory and records
    /// it in the parts map, replacing any prior upload of the same number.
    ///
    /// The byte write runs outside the session lock so distinct part
    /// numbers persist concurrently; only the open-check and the map
    /// update hold it. A racing abort deletes the staging directory, which
    /// surfaces here as `NoSuchUpload` whichever side wins.
    pub async fn put_part(
        &self,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
        checksum: Option<&str>,
    ) -> Result<PartStat> {
        if part_number < 0 {
            return Err(CanopyError::InvalidPart(part_number));
        }
        let session = self.lookup(upload_id).await?;
        {
            let state = session.state.lock().await;
            if !state.open {
                return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
            }
        }

        let computed = format!("{:x}", Md5::digest(&data));
        if self.config.enforce_checksum {
            if let Some(expected) = checksum {
                if !expected.eq_ignore_ascii_case(&computed) {
                    return Err(CanopyError::BadDigest {
                        expected: expected.to_string(),
                        computed,
                    });
                }
            }
        }

        let size = i64::try_from(data.len())
            .map_err(|_| CanopyError::InvalidArgument(format!("part {part_number} is too large")))?;
        let part_path = translate::part_path(&session.staging_path, part_number);
        let written = match bounded(
            self.config.io_deadline,
            "persist part",
            self.ns.create_file(&part_path, data),
        )
        .await
        {
            Ok(stat) => stat,
            Err(CanopyError::PathNotFound(_)) => {
                return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
            }
            Err(err) => return Err(err),
        };

        let mut state = session.state.lock().await;
        if !state.open {
            return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
        }
        let last_modified = written.mod_time.unwrap_or_else(time::now);
        state.parts.insert(
            part_number,
            PartRecord {
                size,
                storage_path: part_path,
                etag: computed.clone(),
                last_modified,
            },
        );
        state.touched = time::now();

        Ok(PartStat {
            part_number,
            size,
            etag: computed,
            last_modified,
        })
    }
}
