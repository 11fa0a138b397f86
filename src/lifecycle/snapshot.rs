//! Snapshot persistence for the score cache.
//!
//! A snapshot is a single `rkyv` archive of every stored entry. It is written to
//! a sibling temp file and renamed into place, so a crash mid-write leaves the
//! previous snapshot intact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{LifecycleError, LifecycleResult};
use super::types::{DehydrationResult, HydrationResult};
use crate::cache::{CacheBackend, CacheEntry, CacheKey};

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct ScoreSnapshot {
    pub version: u32,
    /// Unix timestamp (milliseconds) when the snapshot was taken.
    pub created_at: i64,
    pub entries: Vec<CacheEntry>,
}

impl ScoreSnapshot {
    pub fn new(entries: Vec<CacheEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: chrono::Utc::now().timestamp_millis(),
            entries,
        }
    }

    pub fn to_bytes(&self) -> LifecycleResult<AlignedVec> {
        rkyv::to_bytes::<RkyvError>(self).map_err(|e| LifecycleError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> LifecycleResult<Self> {
        // File contents carry no alignment guarantee; validation needs it.
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let snapshot = rkyv::from_bytes::<Self, RkyvError>(&aligned).map_err(|e| {
            LifecycleError::CorruptSnapshot {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LifecycleError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Restores entries from `path` into `backend`.
///
/// Entries outside `namespace`, with malformed keys, or older than `ttl` are
/// skipped. A missing file is not an error.
pub async fn hydrate(
    backend: &dyn CacheBackend,
    path: &Path,
    namespace: &str,
    ttl: Option<Duration>,
) -> LifecycleResult<HydrationResult> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No snapshot to hydrate from");
            return Ok(HydrationResult::NotFound);
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot = ScoreSnapshot::from_bytes(&bytes, path)?;
    let now = chrono::Utc::now().timestamp_millis();
    let prefix = format!("{namespace}:");

    let mut restored = 0;
    let mut skipped = 0;
    for entry in snapshot.entries {
        let in_namespace = entry.key.starts_with(&prefix);
        let well_formed = CacheKey::from_stored(entry.key.as_str()).is_some();
        let expired = ttl.is_some_and(|ttl| entry.age_millis(now) >= ttl.as_millis() as u64);
        let finite = entry.value.is_finite() && entry.value >= 0.0;

        if !(in_namespace && well_formed && finite) || expired {
            skipped += 1;
            continue;
        }

        backend.insert_if_absent(entry).await?;
        restored += 1;
    }

    if skipped > 0 {
        warn!(skipped, "Skipped snapshot entries (expired, foreign or malformed)");
    }
    info!(path = %path.display(), restored, "Hydrated score cache from snapshot");

    Ok(HydrationResult::Success { restored, skipped })
}

/// Writes every entry in `backend` to `path`, replacing any previous snapshot.
pub async fn dehydrate(backend: &dyn CacheBackend, path: &Path) -> LifecycleResult<DehydrationResult> {
    let entries = backend.entries().await?;
    let count = entries.len();
    let bytes = ScoreSnapshot::new(entries).to_bytes()?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes.as_slice()).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!(path = %path.display(), entries = count, bytes = bytes.len(), "Dehydrated score cache to snapshot");

    Ok(DehydrationResult::Success {
        entries: count,
        bytes: bytes.len() as u64,
    })
}
