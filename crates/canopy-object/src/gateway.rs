use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use canopy_common::error::{CanopyError, Result};
use canopy_common::time;
use canopy_common::types::{BucketInfo, ObjectStat, PartStat, UploadInfo};
use canopy_namespace::{NamespaceStore, NodeStat};
use md5::{Digest, Md5};
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::deadline::bounded;
use crate::multipart::registry::UploadRegistry;
use crate::multipart::{ManifestEntry, reaper};
use crate::translate::{self, CreateKind};

/// Object-storage front over a hierarchical namespace store. Callers
/// arrive with a verified principal; protocol transport and signature
/// checks live outside this crate.
pub struct ObjectGateway {
    ns: Arc<dyn NamespaceStore>,
    config: GatewayConfig,
    uploads: Arc<UploadRegistry>,
}

#[derive(Debug, Clone)]
pub struct ListObjectsPage {
    pub objects: Vec<ObjectStat>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone)]
enum ListEntry {
    Object(ObjectStat),
    Prefix(String),
}

impl ListEntry {
    fn marker(&self) -> &str {
        match self {
            Self::Object(object) => &object.key,
            Self::Prefix(prefix) => prefix,
        }
    }
}

impl ObjectGateway {
    /// Recovers persisted upload sessions before returning, so a restarted
    /// process resumes where the previous one stopped.
    pub async fn new(ns: Arc<dyn NamespaceStore>, config: GatewayConfig) -> Result<Self> {
        let uploads = Arc::new(UploadRegistry::new(Arc::clone(&ns), config.clone()).await?);
        Ok(Self {
            ns,
            config,
            uploads,
        })
    }

    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        reaper::spawn_reaper(Arc::clone(&self.uploads))
    }

    /// One reaper sweep; `spawn_reaper` drives this periodically.
    pub async fn reap_idle_uploads(&self) -> usize {
        self.uploads.reap_idle().await
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        translate::validate_bucket_name(bucket)?;
        if self.ns.stat(bucket).await?.exists {
            return Err(CanopyError::BucketAlreadyExists(bucket.to_string()));
        }
        match self.ns.create_dir(bucket, false).await {
            Ok(()) => Ok(()),
            Err(CanopyError::PathAlreadyExists(_)) => {
                Err(CanopyError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn head_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        translate::validate_bucket_name(bucket)?;
        let stat = self.ns.stat(bucket).await?;
        if !stat.exists {
            return Err(CanopyError::BucketNotFound(bucket.to_string()));
        }
        Ok(BucketInfo {
            name: bucket.to_string(),
            created: stat.mod_time.unwrap_or_else(time::now),
        })
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        for name in self.ns.list("").await? {
            let stat = self.ns.stat(&name).await?;
            if !stat.exists {
                continue;
            }
            buckets.push(BucketInfo {
                name,
                created: stat.mod_time.unwrap_or_else(time::now),
            });
        }
        Ok(buckets)
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.ensure_bucket(bucket).await?;
        if !self.ns.list(bucket).await?.is_empty() {
            return Err(CanopyError::DirectoryNotEmpty(bucket.to_string()));
        }
        self.ns.delete(bucket, false).await
    }

    /// Directory-style keys (trailing `/`) create a namespace directory and
    /// any missing ancestors; a payload on such a key is discarded and the
    /// marker reports length zero. File keys create missing ancestors, then
    /// write the object, replacing any prior object at the path.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        checksum: Option<&str>,
    ) -> Result<ObjectStat> {
        self.ensure_bucket(bucket).await?;
        translate::validate_key(key)?;
        let path = translate::object_path(bucket, key);

        match translate::classify_create(key) {
            CreateKind::Directory => {
                bounded(
                    self.config.io_deadline,
                    "create directory marker",
                    self.ns.create_dir(&path, true),
                )
                .await?;
                Ok(ObjectStat {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size: 0,
                    etag: String::new(),
                    last_modified: time::now(),
                })
            }
            CreateKind::File => {
                if self.config.enforce_checksum {
                    if let Some(expected) = checksum {
                        let computed = format!("{:x}", Md5::digest(&data));
                        if !expected.eq_ignore_ascii_case(&computed) {
                            return Err(CanopyError::BadDigest {
                                expected: expected.to_string(),
                                computed,
                            });
                        }
                    }
                }
                if let Some((parent, _)) = path.rsplit_once('/') {
                    bounded(
                        self.config.io_deadline,
                        "create ancestor directories",
                        self.ns.create_dir(parent, true),
                    )
                    .await?;
                }
                let written = bounded(
                    self.config.io_deadline,
                    "write object",
                    self.ns.create_file(&path, data),
                )
                .await?;
                Ok(object_stat(bucket, key, &written))
            }
        }
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<(ObjectStat, Bytes)> {
        self.ensure_bucket(bucket).await?;
        translate::validate_key(key)?;
        let path = translate::object_path(bucket, key);
        let stat = self.ns.stat(&path).await?;
        if !stat.is_file || key.ends_with('/') {
            return Err(self.object_not_found(bucket, key));
        }
        let data = match bounded(self.config.io_deadline, "read object", self.ns.read(&path)).await
        {
            Ok(data) => data,
            Err(CanopyError::PathNotFound(_)) => return Err(self.object_not_found(bucket, key)),
            Err(err) => return Err(err),
        };
        Ok((object_stat(bucket, key, &stat), data))
    }

    /// A file fact at the path wins over a directory fact; a bare directory
    /// (marker or implied by children) reports length zero.
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        self.ensure_bucket(bucket).await?;
        translate::validate_key(key)?;
        let path = translate::object_path(bucket, key);
        let stat = self.ns.stat(&path).await?;
        if stat.is_file && !key.ends_with('/') {
            return Ok(object_stat(bucket, key, &stat));
        }
        if stat.is_dir {
            return Ok(ObjectStat {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size: 0,
                etag: String::new(),
                last_modified: stat.mod_time.unwrap_or_else(time::now),
            });
        }
        Err(self.object_not_found(bucket, key))
    }

    /// Deleting an absent object succeeds; deleting a directory that still
    /// has children is refused.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_bucket(bucket).await?;
        translate::validate_key(key)?;
        let path = translate::object_path(bucket, key);
        if !self.ns.stat(&path).await?.exists {
            return Ok(());
        }
        match bounded(
            self.config.io_deadline,
            "delete object",
            self.ns.delete(&path, false),
        )
        .await
        {
            Ok(()) | Err(CanopyError::PathNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectStat> {
        self.ensure_bucket(dst_bucket).await?;
        translate::validate_key(dst_key)?;
        if dst_key.ends_with('/') {
            return Err(CanopyError::InvalidObjectName(dst_key.to_string()));
        }
        let (_, data) = self.get_object(src_bucket, src_key).await?;
        self.put_object(dst_bucket, dst_key, data, None).await
    }

    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: i32,
    ) -> Result<ListObjectsPage> {
        self.ensure_bucket(bucket).await?;

        let mut objects = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(rel) = pending.pop() {
            let dir_path = if rel.is_empty() {
                bucket.to_string()
            } else {
                format!("{bucket}/{rel}")
            };
            for child in self.ns.list(&dir_path).await? {
                let child_rel = if rel.is_empty() {
                    child
                } else {
                    format!("{rel}/{child}")
                };
                let child_path = format!("{bucket}/{child_rel}");
                let stat = self.ns.stat(&child_path).await?;
                if stat.is_file {
                    objects.push(object_stat(bucket, &child_rel, &stat));
                }
                pending.push(child_rel);
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        let filtered: Vec<ObjectStat> = objects
            .into_iter()
            .filter(|object| object.key.starts_with(prefix))
            .filter(|object| marker.is_empty() || object.key.as_str() > marker)
            .collect();

        let mut entries = Vec::new();
        if delimiter.is_empty() {
            entries.extend(filtered.into_iter().map(ListEntry::Object));
        } else {
            let mut prefixes = HashSet::new();
            for object in filtered {
                let suffix = &object.key[prefix.len()..];
                if let Some(idx) = suffix.find(delimiter) {
                    let grouped = format!("{}{}", prefix, &suffix[..idx + delimiter.len()]);
                    prefixes.insert(grouped);
                } else {
                    entries.push(ListEntry::Object(object));
                }
            }
            entries.extend(prefixes.into_iter().map(ListEntry::Prefix));
        }

        entries.sort_by(|a, b| a.marker().cmp(b.marker()));

        let limit = if max_keys > 0 {
            usize::try_from(max_keys).unwrap_or(usize::MAX)
        } else {
            entries.len()
        };
        let is_truncated = entries.len() > limit;
        let selected = if is_truncated {
            &entries[..limit]
        } else {
            &entries[..]
        };

        let mut out_objects = Vec::new();
        let mut out_prefixes = Vec::new();
        for entry in selected {
            match entry {
                ListEntry::Object(object) => out_objects.push(object.clone()),
                ListEntry::Prefix(prefix_value) => out_prefixes.push(prefix_value.clone()),
            }
        }

        Ok(ListObjectsPage {
            objects: out_objects,
            common_prefixes: out_prefixes,
            is_truncated,
            next_marker: selected.last().map(|entry| entry.marker().to_string()),
        })
    }

    pub async fn initiate_upload(&self, bucket: &str, key: &str) -> Result<String> {
        self.ensure_bucket(bucket).await?;
        translate::validate_key(key)?;
        if key.ends_with('/') {
            return Err(CanopyError::InvalidObjectName(key.to_string()));
        }
        self.uploads.initiate(bucket, key).await
    }

    pub async fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
        checksum: Option<&str>,
    ) -> Result<PartStat> {
        self.uploads
            .put_part(upload_id, part_number, data, checksum)
            .await
    }

    pub async fn complete_upload(
        &self,
        upload_id: &str,
        manifest: &[ManifestEntry],
        allow_out_of_order: bool,
    ) -> Result<ObjectStat> {
        self.uploads
            .complete(upload_id, manifest, allow_out_of_order)
            .await
    }

    pub async fn abort_upload(&self, upload_id: &str) -> Result<()> {
        self.uploads.abort(upload_id).await
    }

    pub async fn list_parts(&self, upload_id: &str) -> Result<Vec<PartStat>> {
        self.uploads.list_parts(upload_id).await
    }

    pub async fn list_uploads(&self, bucket: &str) -> Result<Vec<UploadInfo>> {
        self.ensure_bucket(bucket).await?;
        Ok(self.uploads.list_uploads(bucket).await)
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        translate::validate_bucket_name(bucket)?;
        if !self.ns.stat(bucket).await?.exists {
            return Err(CanopyError::BucketNotFound(bucket.to_string()));
        }
        Ok(())
    }

    fn object_not_found(&self, bucket: &str, key: &str) -> CanopyError {
        CanopyError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

fn object_stat(bucket: &str, key: &str, node: &NodeStat) -> ObjectStat {
    ObjectStat {
        bucket: bucket.to_string(),
        key: key.to_string(),
        size: node.size,
        etag: node.etag.clone().unwrap_or_default(),
        last_modified: node.mod_time.unwrap_or_else(time::now),
    }
}
