use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use canopy_common::error::{CanopyError, Result};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::traits::{NamespaceStore, NodeStat, SYS_DIR_NAME};

const META_FILE_NAME: &str = "node.meta";

/// Filesystem-backed namespace store.
///
/// Every logical node is a host directory. A file fact at a path is a
/// `node.meta` record plus a `<generation>.data` payload inside that host
/// directory; child nodes are sub-directories. Directory-ness and file-ness
/// are therefore independent facts at the same path. Publishing a file fact
/// renames a fresh meta record into place, which is the atomic commit point.
#[derive(Debug, Clone)]
pub struct LocalNamespace {
    root_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeMeta {
    version: String,
    data_gen: String,
    size: i64,
    etag: String,
    mod_time: DateTime<Utc>,
}

impl LocalNamespace {
    pub async fn new(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir).await?;
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn host_path(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Ok(self.root_dir.clone());
        }
        if path.starts_with('/') || path.contains('\\') {
            return Err(invalid_path(path));
        }
        let mut host = self.root_dir.clone();
        for component in path.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(invalid_path(path));
            }
            host.push(component);
        }
        Ok(host)
    }

    async fn read_meta(&self, host: &Path) -> Result<Option<NodeMeta>> {
        match fs::read(host.join(META_FILE_NAME)).await {
            Ok(bytes) => {
                let meta = serde_json::from_slice(&bytes).map_err(|err| {
                    CanopyError::InternalError(format!("failed to parse node.meta: {err}"))
                })?;
                Ok(Some(meta))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_meta(&self, host: &Path, meta: &NodeMeta) -> Result<()> {
        let bytes = serde_json::to_vec(meta).map_err(|err| {
            CanopyError::InternalError(format!("failed to serialize node.meta: {err}"))
        })?;
        let tmp = host.join(format!("{}.meta.tmp", meta.data_gen));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, host.join(META_FILE_NAME)).await?;
        Ok(())
    }

    async fn has_child_node(&self, host: &Path) -> Result<bool> {
        let mut entries = fs::read_dir(host).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn remove_file_fact(&self, host: &Path, meta: &NodeMeta) -> Result<()> {
        remove_file_if_exists(&host.join(META_FILE_NAME)).await?;
        remove_file_if_exists(&host.join(data_file_name(&meta.data_gen))).await?;
        Ok(())
    }
}

#[async_trait]
impl NamespaceStore for LocalNamespace {
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()> {
        let host = self.host_path(path)?;
        if recursive {
            fs::create_dir_all(&host).await?;
            return Ok(());
        }
        match fs::create_dir(&host).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(CanopyError::PathAlreadyExists(path.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CanopyError::PathNotFound(parent_of(path).to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_file(&self, path: &str, data: Bytes) -> Result<NodeStat> {
        if path.is_empty() {
            return Err(invalid_path(path));
        }
        let host = self.host_path(path)?;
        let parent = host.parent().unwrap_or(&self.root_dir);
        if !is_existing_directory(parent).await? {
            return Err(CanopyError::PathNotFound(parent_of(path).to_string()));
        }

        fs::create_dir_all(&host).await?;
        let prior = self.read_meta(&host).await?;

        let size = i64::try_from(data.len())
            .map_err(|_| CanopyError::InvalidArgument(format!("content too large: {path}")))?;
        let etag = format!("{:x}", Md5::digest(&data));
        let meta = NodeMeta {
            version: "1.0".to_string(),
            data_gen: Uuid::new_v4().to_string(),
            size,
            etag: etag.clone(),
            mod_time: canopy_common::time::now(),
        };

        fs::write(host.join(data_file_name(&meta.data_gen)), &data).await?;
        self.write_meta(&host, &meta).await?;

        if let Some(prior) = prior {
            let _ = fs::remove_file(host.join(data_file_name(&prior.data_gen))).await;
        }

        Ok(NodeStat {
            exists: true,
            is_file: true,
            is_dir: self.has_child_node(&host).await?,
            size,
            etag: Some(etag),
            mod_time: Some(meta.mod_time),
        })
    }

    async fn stat(&self, path: &str) -> Result<NodeStat> {
        let host = self.host_path(path)?;
        let metadata = match fs::metadata(&host).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(NodeStat::absent());
            }
            Err(err) => return Err(err.into()),
        };
        if !metadata.is_dir() {
            return Ok(NodeStat::absent());
        }

        let children = self.has_child_node(&host).await?;
        match self.read_meta(&host).await? {
            Some(meta) => Ok(NodeStat {
                exists: true,
                is_file: true,
                is_dir: children,
                size: meta.size,
                etag: Some(meta.etag),
                mod_time: Some(meta.mod_time),
            }),
            None => Ok(NodeStat {
                exists: true,
                is_file: false,
                is_dir: true,
                size: 0,
                etag: None,
                mod_time: filetime_to_utc(metadata.modified().ok()),
            }),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>> {
        let host = self.host_path(path)?;
        let mut entries = match fs::read_dir(&host).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CanopyError::PathNotFound(path.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_empty() && name == SYS_DIR_NAME {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let host = self.host_path(path)?;
        let meta = self
            .read_meta(&host)
            .await?
            .ok_or_else(|| CanopyError::PathNotFound(path.to_string()))?;
        let data = fs::read(host.join(data_file_name(&meta.data_gen)))
            .await
            .map_err(|_| CanopyError::PathNotFound(path.to_string()))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<()> {
        if path.is_empty() {
            return Err(CanopyError::InvalidArgument(
                "cannot delete the namespace root".to_string(),
            ));
        }
        let host = self.host_path(path)?;
        if !is_existing_directory(&host).await? {
            return Err(CanopyError::PathNotFound(path.to_string()));
        }
        if recursive {
            fs::remove_dir_all(&host).await?;
            return Ok(());
        }

        let meta = self.read_meta(&host).await?;
        let children = self.has_child_node(&host).await?;
        match (meta, children) {
            (Some(meta), true) => self.remove_file_fact(&host, &meta).await,
            (Some(_), false) => Ok(fs::remove_dir_all(&host).await?),
            (None, true) => Err(CanopyError::DirectoryNotEmpty(path.to_string())),
            (None, false) => Ok(fs::remove_dir(&host).await?),
        }
    }

    async fn concat(&self, sources: &[String], dst: &str) -> Result<NodeStat> {
        if dst.is_empty() {
            return Err(invalid_path(dst));
        }
        let mut inputs = Vec::with_capacity(sources.len());
        for src in sources {
            let src_host = self.host_path(src)?;
            let meta = self
                .read_meta(&src_host)
                .await?
                .ok_or_else(|| CanopyError::PathNotFound(src.clone()))?;
            inputs.push(src_host.join(data_file_name(&meta.data_gen)));
        }

        let dst_host = self.host_path(dst)?;
        fs::create_dir_all(&dst_host).await?;
        let prior = self.read_meta(&dst_host).await?;

        let data_gen = Uuid::new_v4().to_string();
        let data_path = dst_host.join(data_file_name(&data_gen));
        let mut out = fs::File::create(&data_path).await?;
        let mut hasher = Md5::new();
        let mut size: i64 = 0;
        for input in &inputs {
            let data = fs::read(input).await?;
            hasher.update(&data);
            out.write_all(&data).await?;
            size += data.len() as i64;
        }
        out.flush().await?;
        drop(out);

        let etag = format!("{:x}", hasher.finalize());
        let meta = NodeMeta {
            version: "1.0".to_string(),
            data_gen,
            size,
            etag: etag.clone(),
            mod_time: canopy_common::time::now(),
        };
        self.write_meta(&dst_host, &meta).await?;

        if let Some(prior) = prior {
            let _ = fs::remove_file(dst_host.join(data_file_name(&prior.data_gen))).await;
        }

        Ok(NodeStat {
            exists: true,
            is_file: true,
            is_dir: self.has_child_node(&dst_host).await?,
            size,
            etag: Some(etag),
            mod_time: Some(meta.mod_time),
        })
    }
}

fn data_file_name(data_gen: &str) -> String {
    format!("{data_gen}.data")
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn invalid_path(path: &str) -> CanopyError {
    CanopyError::InvalidArgument(format!("invalid namespace path: {path}"))
}

async fn is_existing_directory(path: &Path) -> Result<bool> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn filetime_to_utc(filetime: Option<std::time::SystemTime>) -> Option<DateTime<Utc>> {
    filetime.map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::parent_of;

    #[test]
    fn parent_of_splits_on_last_separator() {
        assert_eq!(parent_of("bucket/a/b"), "bucket/a");
        assert_eq!(parent_of("bucket"), "");
    }
}
