use async_trait::async_trait;
use bytes::Bytes;
use canopy_common::error::Result;
use chrono::{DateTime, Utc};

/// Reserved root entry for coordinator metadata. Never reported by `list("")`.
pub const SYS_DIR_NAME: &str = ".canopy.sys";

/// A path may hold a file fact and a directory fact at the same time:
/// `is_file` reports stored content at the path, `is_dir` reports that the
/// path is traversable (children may exist under it). `size` and `etag`
/// describe the file fact only.
#[derive(Debug, Clone, Default)]
pub struct NodeStat {
    pub exists: bool,
    pub is_file: bool,
    pub is_dir: bool,
    pub size: i64,
    pub etag: Option<String>,
    pub mod_time: Option<DateTime<Utc>>,
}

impl NodeStat {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// A hierarchical, path-addressed store. Paths are `/`-separated and
/// relative to the store root; the empty path names the root itself.
/// Every operation is atomic per path.
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn create_dir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Writes content at `path`, replacing any prior file fact there.
    /// Children under `path` are unaffected. The parent must already exist.
    async fn create_file(&self, path: &str, data: Bytes) -> Result<NodeStat>;

    async fn stat(&self, path: &str) -> Result<NodeStat>;

    /// Child names directly under `path`, sorted.
    async fn list(&self, path: &str) -> Result<Vec<String>>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Without `recursive`: a node holding both facts loses only its file
    /// fact; a childless node is removed entirely; a directory with
    /// children is refused with `DirectoryNotEmpty`.
    async fn delete(&self, path: &str, recursive: bool) -> Result<()>;

    /// Concatenates the file facts at `sources`, in order, into a single
    /// file fact at `dst`. The commit is atomic: a reader of `dst` sees
    /// either the prior content or the full concatenation. An empty
    /// source list commits an empty file.
    async fn concat(&self, sources: &[String], dst: &str) -> Result<NodeStat>;
}
