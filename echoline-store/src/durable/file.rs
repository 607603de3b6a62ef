//! File-backed durable store
//!
//! Layout: `{base_dir}/conversations/{encoded user id}.json`, one
//! [`ConversationRecord`] per file.

use crate::durable::DurableStore;
use crate::error::{Result, StoreError};
use crate::health::HealthStatus;
use crate::schema::{ConversationRecord, Turn};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const CONVERSATIONS_DIR: &str = "conversations";

pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    /// Open a store rooted at `base_dir`, creating the conversations directory
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = base_dir.into().join(CONVERSATIONS_DIR);
        fs::create_dir_all(&dir).await?;
        debug!("Opened file conversation store at {:?}", dir);
        Ok(Self { dir })
    }

    /// Path of the document for a user
    pub fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(user_id)))
    }

    /// Full record for a user, including timestamps
    pub async fn record(&self, user_id: &str) -> Result<Option<ConversationRecord>> {
        read_record(&self.path_for(user_id)).await
    }

    async fn write_record(&self, path: &Path, record: &ConversationRecord) -> Result<()> {
        let content = serde_json::to_vec_pretty(record)?;

        // Write beside the target and rename so readers never see a partial document
        let tmp = path.with_extension(format!("json.tmp-{:016x}", rand::random::<u64>()));
        fs::write(&tmp, content).await?;

        if let Err(e) = fs::rename(&tmp, path).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                warn!("Failed to remove temp file {:?}: {}", tmp, cleanup);
            }
            return Err(e.into());
        }

        Ok(())
    }
}

async fn read_record(path: &Path) -> Result<Option<ConversationRecord>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let record: ConversationRecord = serde_json::from_slice(&content).map_err(|e| {
        StoreError::SerializationError(format!("Failed to parse conversation {:?}: {}", path, e))
    })?;

    Ok(Some(record))
}

/// Map a user id to a file stem that is safe on every platform
///
/// Bytes outside `[A-Za-z0-9_-]` become `%XX`, which keeps the mapping
/// one-to-one.
pub fn encode_file_stem(user_id: &str) -> String {
    let mut stem = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

#[async_trait]
impl DurableStore for FileConversationStore {
    async fn get(&self, user_id: &str) -> Result<Option<Vec<Turn>>> {
        Ok(self.record(user_id).await?.map(|r| r.turns))
    }

    async fn set(&self, user_id: &str, turns: &[Turn]) -> Result<()> {
        let path = self.path_for(user_id);

        let record = match read_record(&path).await {
            Ok(Some(mut existing)) => {
                existing.replace_turns(turns.to_vec());
                existing
            }
            Ok(None) => ConversationRecord::new(user_id, turns.to_vec()),
            Err(StoreError::SerializationError(e)) => {
                // A corrupt document is superseded by the caller's full history
                warn!("Replacing unreadable conversation for {}: {}", user_id, e);
                ConversationRecord::new(user_id, turns.to_vec())
            }
            Err(e) => return Err(e),
        };

        self.write_record(&path, &record).await?;
        debug!("Stored {} turns for user {} at {:?}", turns.len(), user_id, path);
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match fs::metadata(&self.dir).await {
            Ok(meta) if meta.is_dir() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy,
            Err(e) => {
                warn!("Conversation directory {:?} unavailable: {}", self.dir, e);
                HealthStatus::Unhealthy
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
