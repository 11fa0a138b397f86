use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::error::LifecycleError;
use super::scope::BackendScope;
use super::snapshot::{SNAPSHOT_VERSION, ScoreSnapshot, dehydrate, hydrate};
use super::types::{DehydrationResult, HydrationResult};
use crate::cache::{BackendError, CacheBackend, CacheEntry, KeyBuilder, MemoryBackend};

const NS: &str = "grove:test";

async fn populated_backend(inputs: &[(&str, f64)]) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new(None, None));
    let builder = KeyBuilder::new(NS);
    for (text, value) in inputs {
        let entry = CacheEntry::new(&builder.build(text).unwrap(), *value);
        backend.insert_if_absent(entry).await.unwrap();
    }
    backend
}

#[tokio::test]
async fn test_dehydrate_then_hydrate_restores_entries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.rkyv");
    let source = populated_backend(&[("hello", 0.1732), ("world", 0.5)]).await;

    let written = dehydrate(source.as_ref(), &path).await.unwrap();
    assert!(matches!(written, DehydrationResult::Success { entries: 2, .. }));
    assert!(path.exists());

    let target = MemoryBackend::new(None, None);
    let result = hydrate(&target, &path, NS, None).await.unwrap();
    assert_eq!(
        result,
        HydrationResult::Success {
            restored: 2,
            skipped: 0
        }
    );

    let key = KeyBuilder::new(NS).build("hello").unwrap();
    assert_eq!(target.get(&key).await.unwrap().unwrap().value, 0.1732);
}

#[tokio::test]
async fn test_hydrate_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryBackend::new(None, None);

    let result = hydrate(&backend, &dir.path().join("absent.rkyv"), NS, None)
        .await
        .unwrap();

    assert_eq!(result, HydrationResult::NotFound);
}

#[tokio::test]
async fn test_hydrate_rejects_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.rkyv");
    tokio::fs::write(&path, b"definitely not a snapshot")
        .await
        .unwrap();

    let err = hydrate(&MemoryBackend::new(None, None), &path, NS, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::CorruptSnapshot { .. }));
}

#[tokio::test]
async fn test_hydrate_rejects_unknown_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.rkyv");
    let snapshot = ScoreSnapshot {
        version: SNAPSHOT_VERSION + 1,
        created_at: 0,
        entries: vec![],
    };
    tokio::fs::write(&path, snapshot.to_bytes().unwrap().as_slice())
        .await
        .unwrap();

    let err = hydrate(&MemoryBackend::new(None, None), &path, NS, None)
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::UnsupportedVersion { .. }));
}

#[tokio::test]
async fn test_hydrate_skips_expired_foreign_and_malformed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.rkyv");
    let builder = KeyBuilder::new(NS);
    let now = chrono::Utc::now().timestamp_millis();

    let fresh = CacheEntry::new(&builder.build("fresh").unwrap(), 0.2);
    let stale = CacheEntry {
        created_at: now - 3_600_000,
        ..CacheEntry::new(&builder.build("stale").unwrap(), 0.3)
    };
    let foreign = CacheEntry::new(&KeyBuilder::new("other").build("fresh").unwrap(), 0.4);
    let malformed = CacheEntry {
        key: format!("{NS}:extract:not-a-digest"),
        value: 0.5,
        created_at: now,
    };

    let bytes = ScoreSnapshot::new(vec![fresh, stale, foreign, malformed])
        .to_bytes()
        .unwrap();
    tokio::fs::write(&path, bytes.as_slice()).await.unwrap();

    let backend = MemoryBackend::new(None, Some(Duration::from_secs(60)));
    let result = hydrate(&backend, &path, NS, Some(Duration::from_secs(60)))
        .await
        .unwrap();

    assert_eq!(
        result,
        HydrationResult::Success {
            restored: 1,
            skipped: 3
        }
    );
    assert_eq!(backend.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_dehydrate_replaces_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("scores.rkyv");

    dehydrate(populated_backend(&[("a", 0.1)]).await.as_ref(), &path)
        .await
        .unwrap();
    dehydrate(
        populated_backend(&[("b", 0.2), ("c", 0.3)]).await.as_ref(),
        &path,
    )
        .await
        .unwrap();

    let bytes = tokio::fs::read(&path).await.unwrap();
    let snapshot = ScoreSnapshot::from_bytes(&bytes, &path).unwrap();
    assert_eq!(snapshot.entries.len(), 2);

    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    assert!(!std::path::Path::new(&tmp).exists());
}

#[tokio::test]
async fn test_scope_close_is_idempotent_and_dehydrates_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scores.rkyv");
    let backend = populated_backend(&[("hello", 0.1)]).await;
    let scope = BackendScope::new(backend.clone(), Some(path.clone()));

    let first = scope.close().await.unwrap();
    assert!(matches!(first, DehydrationResult::Success { entries: 1, .. }));
    assert!(scope.is_closed());
    assert!(backend.is_closed());

    let second = scope.close().await.unwrap();
    assert!(matches!(second, DehydrationResult::Skipped { .. }));
    assert!(path.exists());
}

#[tokio::test]
async fn test_scope_without_snapshot_only_closes() {
    let backend = Arc::new(MemoryBackend::new(None, None));
    let scope = BackendScope::new(backend.clone(), None);

    let result = scope.close().await.unwrap();

    assert!(matches!(result, DehydrationResult::Skipped { .. }));
    let key = KeyBuilder::new(NS).build("x").unwrap();
    assert!(matches!(backend.get(&key).await, Err(BackendError::Closed)));
}

#[tokio::test]
async fn test_scope_drop_closes_backend() {
    let backend = Arc::new(MemoryBackend::new(None, None));
    {
        let _scope = BackendScope::new(backend.clone(), None);
    }

    tokio::task::yield_now().await;
    for _ in 0..10 {
        if backend.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(backend.is_closed());
}
