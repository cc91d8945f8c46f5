use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use canopy_common::error::{CanopyError, Result};
use canopy_common::time;
use canopy_common::types::{PartStat, UploadInfo};
use canopy_namespace::NamespaceStore;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::deadline::bounded;
use crate::multipart::{PartRecord, UploadRecord};
use crate::translate;

/// Owns every open multipart session and its staging area.
///
/// Lock discipline: the `sessions` map guards are held only for lookup,
/// insert and evict, never across an acquisition of a session mutex. Each
/// session's mutex is the per-session exclusive region; `complete` and
/// `abort` hold it for their whole validate/cleanup sequence, so a reaper
/// or a racing part upload can never interleave with a commit.
pub struct UploadRegistry {
    pub(crate) ns: Arc<dyn NamespaceStore>,
    pub(crate) config: GatewayConfig,
    pub(crate) sessions: RwLock<HashMap<String, Arc<UploadSession>>>,
}

pub struct UploadSession {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub staging_path: String,
    pub initiated: DateTime<Utc>,
    pub(crate) state: Mutex<SessionState>,
}

pub(crate) struct SessionState {
    pub open: bool,
    pub parts: BTreeMap<i32, PartRecord>,
    pub touched: DateTime<Utc>,
}

impl UploadRegistry {
    pub async fn new(ns: Arc<dyn NamespaceStore>, config: GatewayConfig) -> Result<Self> {
        ns.create_dir(&translate::multipart_meta_dir(), true).await?;
        let registry = Self {
            ns,
            config,
            sessions: RwLock::new(HashMap::new()),
        };
        registry.recover().await?;
        Ok(registry)
    }

    /// Creates the staging directory and the persisted session record
    /// before the upload id is handed out. The caller has already checked
    /// that the bucket exists.
    pub async fn initiate(&self, bucket: &str, key: &str) -> Result<String> {
        let upload_id = Uuid::new_v4().to_string();
        let staging_path = translate::staging_path(bucket, key, &upload_id);
        let initiated = time::now();

        bounded(
            self.config.io_deadline,
            "create staging directory",
            self.ns.create_dir(&staging_path, true),
        )
        .await?;

        let record = UploadRecord {
            upload_id: upload_id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            staging_path: staging_path.clone(),
            initiated,
        };
        let payload = serde_json::to_vec(&record).map_err(|err| {
            CanopyError::InternalError(format!("failed to serialize upload record: {err}"))
        })?;
        bounded(
            self.config.io_deadline,
            "persist upload record",
            self.ns
                .create_file(&translate::upload_meta_path(&upload_id), Bytes::from(payload)),
        )
        .await?;

        let session = Arc::new(UploadSession {
            upload_id: upload_id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            staging_path,
            initiated,
            state: Mutex::new(SessionState {
                open: true,
                parts: BTreeMap::new(),
                touched: initiated,
            }),
        });
        self.sessions
            .write()
            .await
            .insert(upload_id.clone(), session);
        Ok(upload_id)
    }

    pub async fn lookup(&self, upload_id: &str) -> Result<Arc<UploadSession>> {
        let session = self.sessions.read().await.get(upload_id).cloned();
        session.ok_or_else(|| CanopyError::NoSuchUpload(upload_id.to_string()))
    }

    pub async fn abort(&self, upload_id: &str) -> Result<()> {
        let session = self.lookup(upload_id).await?;
        let mut state = session.state.lock().await;
        if !state.open {
            return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
        }
        self.cleanup_locked(&session, &mut state).await?;
        drop(state);
        self.evict(upload_id).await;
        Ok(())
    }

    pub async fn list_parts(&self, upload_id: &str) -> Result<Vec<PartStat>> {
        let session = self.lookup(upload_id).await?;
        let state = session.state.lock().await;
        if !state.open {
            return Err(CanopyError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(state
            .parts
            .iter()
            .map(|(part_number, record)| PartStat {
                part_number: *part_number,
                size: record.size,
                etag: record.etag.clone(),
                last_modified: record.last_modified,
            })
            .collect())
    }

    pub async fn list_uploads(&self, bucket: &str) -> Vec<UploadInfo> {
        let snapshot: Vec<Arc<UploadSession>> =
            self.sessions.read().await.values().cloned().collect();
        let mut uploads = Vec::new();
        for session in snapshot {
            if session.bucket != bucket {
                continue;
            }
            let open = session.state.lock().await.open;
            if !open {
                continue;
            }
            uploads.push(UploadInfo {
                bucket: session.bucket.clone(),
                key: session.key.clone(),
                upload_id: session.upload_id.clone(),
                initiated: session.initiated,
            });
        }
        uploads.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.upload_id.cmp(&b.upload_id)));
        uploads
    }

    /// Aborts every open session idle past the retention window. Runs
    /// under the same per-session locks as interactive callers; a session
    /// being completed concurrently loses or wins atomically.
    pub async fn reap_idle(&self) -> usize {
        let now = time::now();
        let snapshot: Vec<Arc<UploadSession>> =
            self.sessions.read().await.values().cloned().collect();
        let mut reaped = 0;
        for session in snapshot {
            let mut state = session.state.lock().await;
            if !state.open {
                continue;
            }
            let idle = (now - state.touched).to_std().unwrap_or_default();
            if idle < self.config.idle_retention {
                continue;
            }
            match self.cleanup_locked(&session, &mut state).await {
                Ok(()) => {
                    drop(state);
                    self.evict(&session.upload_id).await;
                    reaped += 1;
                }
                Err(err) => {
                    warn!(
                        upload_id = %session.upload_id,
                        error = %err,
                        "failed to reap idle upload session"
                    );
                }
            }
        }
        reaped
    }

    /// Removes staging state and the persisted record, then closes the
    /// session. On an I/O failure the session stays open so the caller can
    /// retry; nothing is retired half-way.
    pub(crate) async fn cleanup_locked(
        &self,
        session: &UploadSession,
        state: &mut SessionState,
    ) -> Result<()> {
        match bounded(
            self.config.io_deadline,
            "remove staging directory",
            self.ns.delete(&session.staging_path, true),
        )
        .await
        {
            Ok(()) | Err(CanopyError::PathNotFound(_)) => {}
            Err(err) => return Err(err),
        }
        match bounded(
            self.config.io_deadline,
            "remove upload record",
            self.ns
                .delete(&translate::upload_meta_path(&session.upload_id), true),
        )
        .await
        {
            Ok(()) | Err(CanopyError::PathNotFound(_)) => {}
            Err(err) => return Err(err),
        }
        state.open = false;
        state.parts.clear();
        Ok(())
    }

    pub(crate) async fn evict(&self, upload_id: &str) {
        self.sessions.write().await.remove(upload_id);
    }

    /// Rebuilds sessions from persisted records after a restart. Records
    /// whose staging directory is gone are dropped as orphans.
    async fn recover(&self) -> Result<()> {
        let meta_dir = translate::multipart_meta_dir();
        let records = match self.ns.list(&meta_dir).await {
            Ok(names) => names,
            Err(CanopyError::PathNotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        for name in records {
            let record_path = format!("{meta_dir}/{name}");
            let bytes = match self.ns.read(&record_path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(record = %record_path, error = %err, "skipping unreadable upload record");
                    continue;
                }
            };
            let record: UploadRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(err) => {
                    warn!(record = %record_path, error = %err, "skipping malformed upload record");
                    continue;
                }
            };

            if !self.ns.stat(&record.staging_path).await?.exists {
                warn!(upload_id = %record.upload_id, "dropping orphaned upload record");
                let _ = self.ns.delete(&record_path, true).await;
                continue;
            }

            let parts = self.recover_parts(&record.staging_path).await?;
            let session = Arc::new(UploadSession {
                upload_id: record.upload_id.clone(),
                bucket: record.bucket,
                key: record.key,
                staging_path: record.staging_path,
                initiated: record.initiated,
                state: Mutex::new(SessionState {
                    open: true,
                    parts,
                    touched: record.initiated,
                }),
            });
            self.sessions
                .write()
                .await
                .insert(record.upload_id, session);
        }
        Ok(())
    }

    async fn recover_parts(&self, staging_path: &str) -> Result<BTreeMap<i32, PartRecord>> {
        let mut parts = BTreeMap::new();
        for name in self.ns.list(staging_path).await? {
            let Ok(part_number) = name.parse::<i32>() else {
                continue;
            };
            let part_path = translate::part_path(staging_path, part_number);
            let stat = self.ns.stat(&part_path).await?;
            if !stat.is_file {
                continue;
            }
            parts.insert(
                part_number,
                PartRecord {
                    size: stat.size,
                    storage_path: part_path,
                    etag: stat.etag.unwrap_or_default(),
                    last_modified: stat.mod_time.unwrap_or_else(time::now),
                },
            );
        }
        Ok(parts)
    }
}
