//! Integration tests for CatalogService orchestration
//!
//! Covers the listing cache, deadline fallback, alias filtering and the
//! write-then-delete ordering of asset mutations under injected failures.

mod helpers;

use async_trait::async_trait;
use axum::body::Bytes;
use helpers::{file_count, memory_repository, service_with, FlakyFs};
use mlib_catalog::assets::{AssetCategory, AssetStore, UploadReason};
use mlib_catalog::db::{CatalogRepository, SqliteCatalogRepository};
use mlib_catalog::error::CatalogError;
use mlib_catalog::models::{AssetRef, CatalogEntry, EntryMetadata, NewEntry};
use mlib_catalog::query::{ListParams, Predicate, QuerySpec};
use mlib_catalog::service::Upload;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Delegating repository with an optional delay on reads, a call counter and
/// switchable update failures
struct InstrumentedRepository {
    inner: Arc<SqliteCatalogRepository>,
    read_delay: Duration,
    count_calls: AtomicUsize,
    fail_updates: AtomicBool,
}

impl InstrumentedRepository {
    async fn new(read_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: memory_repository().await,
            read_delay,
            count_calls: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CatalogRepository for InstrumentedRepository {
    async fn count(&self, predicates: &[Predicate]) -> mlib_common::Result<i64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.read_delay).await;
        self.inner.count(predicates).await
    }

    async fn find(&self, spec: &QuerySpec) -> mlib_common::Result<Vec<CatalogEntry>> {
        self.inner.find(spec).await
    }

    async fn find_by_id(&self, id: i64) -> mlib_common::Result<Option<CatalogEntry>> {
        self.inner.find_by_id(id).await
    }

    async fn create(&self, entry: &NewEntry) -> mlib_common::Result<CatalogEntry> {
        self.inner.create(entry).await
    }

    async fn update(&self, entry: &CatalogEntry) -> mlib_common::Result<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(mlib_common::Error::Internal("database is locked".into()));
        }
        self.inner.update(entry).await
    }

    async fn increment_views(&self, id: i64) -> mlib_common::Result<Option<CatalogEntry>> {
        self.inner.increment_views(id).await
    }

    async fn destroy(&self, id: i64) -> mlib_common::Result<bool> {
        self.inner.destroy(id).await
    }
}

fn metadata(value: serde_json::Value) -> EntryMetadata {
    serde_json::from_value(value).unwrap()
}

fn upload(category: AssetCategory, name: &str, bytes: &'static [u8]) -> Upload {
    Upload {
        category,
        original_name: name.to_string(),
        bytes: Bytes::from_static(bytes),
    }
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_listing_times_out_with_empty_fallback() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::from_millis(500)).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_millis(50),
    );

    let started = Instant::now();
    let result = service.list(&ListParams::default()).await;
    let elapsed = started.elapsed();

    match result {
        Err(CatalogError::QueryTimeout {
            timeout_ms,
            fallback,
        }) => {
            assert_eq!(timeout_ms, 50);
            assert!(fallback.items.is_empty());
            assert_eq!(fallback.total_items, 0);
            assert_eq!(fallback.current_page, 1);
            assert_eq!(fallback.page_size, 10);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(elapsed < Duration::from_millis(400), "caller released late: {:?}", elapsed);
    assert!(service.cache().is_empty(), "timeouts must not be cached");
}

#[tokio::test]
async fn test_listing_is_cached_until_mutation() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::ZERO).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let first = service.list(&ListParams::default()).await.unwrap();
    let second = service.list(&ListParams::default()).await.unwrap();
    assert_eq!(first.total_items, 0);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(repository.count_calls.load(Ordering::SeqCst), 1);

    service
        .create(metadata(json!({ "title": "New", "tags": ["folk"] })), Vec::new())
        .await
        .unwrap();

    let third = service.list(&ListParams::default()).await.unwrap();
    assert_eq!(third.total_items, 1);
    assert_eq!(repository.count_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_listing_started_before_mutation_is_not_cached() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::from_millis(200)).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let listing = {
        let service = service.clone();
        tokio::spawn(async move { service.list(&ListParams::default()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    service
        .create(metadata(json!({ "title": "Mid-flight", "tags": ["folk"] })), Vec::new())
        .await
        .unwrap();

    let stale = listing.await.unwrap().unwrap();
    assert_eq!(stale.total_items, 0);
    assert!(service.cache().is_empty(), "stale page must not be cached");

    let fresh = service.list(&ListParams::default()).await.unwrap();
    assert_eq!(fresh.total_items, 1);
}

#[tokio::test]
async fn test_uncached_listing_reads_through() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::ZERO).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let cached = service.list(&ListParams::default()).await.unwrap();
    assert_eq!(cached.total_items, 0);

    // Written behind the service's back, so nothing invalidates the cache
    let draft = metadata(json!({ "title": "Direct", "tags": ["folk"] }))
        .into_new_entry()
        .unwrap();
    repository.inner.create(&draft).await.unwrap();

    assert_eq!(service.list(&ListParams::default()).await.unwrap().total_items, 0);

    let fresh = service.list_uncached(&ListParams::default()).await.unwrap();
    assert_eq!(fresh.total_items, 1);
    assert_eq!(fresh.items[0].title, "Direct");
    assert_eq!(service.cache().len(), 1, "uncached listing must not write the cache");
}

#[tokio::test]
async fn test_uncached_listing_ignores_deadline() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::from_millis(150)).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_millis(20),
    );

    assert!(matches!(
        service.list(&ListParams::default()).await,
        Err(CatalogError::QueryTimeout { .. })
    ));

    let page = service.list_uncached(&ListParams::default()).await.unwrap();
    assert_eq!(page.total_items, 0);
    assert_eq!(page.current_page, 1);
}

#[tokio::test]
async fn test_categorical_filter_matches_any_tag_slot() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    for (title, tags) in [
        ("Slot one", json!(["V", "x", "y"])),
        ("Slot two", json!(["x", "V", "y"])),
        ("Slot three", json!(["x", "y", "V"])),
        ("Nowhere", json!(["x", "y", "z"])),
    ] {
        service
            .create(metadata(json!({ "title": title, "tags": tags })), Vec::new())
            .await
            .unwrap();
    }

    let params = ListParams {
        genre: Some("V".into()),
        sort: Some("oldest".into()),
        ..Default::default()
    };
    let page = service.list(&params).await.unwrap();
    let titles: Vec<&str> = page.items.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Slot one", "Slot two", "Slot three"]);
    assert_eq!(page.total_items, 3);
}

// =============================================================================
// Asset mutations
// =============================================================================

#[tokio::test]
async fn test_replace_with_write_failure_keeps_old_asset() {
    let root = TempDir::new().unwrap();
    let fs = Arc::new(FlakyFs::default());
    let service = service_with(
        memory_repository().await,
        AssetStore::with_fs(root.path(), fs.clone()),
        Duration::from_secs(3),
    );

    let entry = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![upload(AssetCategory::CoverImage, "cover.png", b"old cover")],
        )
        .await
        .unwrap();
    let AssetRef::Stored(old_path) = entry.cover_image.clone() else {
        panic!("cover should be stored");
    };

    fs.fail_writes.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let result = service
        .update(
            entry.id,
            EntryMetadata::default(),
            vec![upload(AssetCategory::CoverImage, "new.png", b"new cover")],
        )
        .await;

    assert!(matches!(
        result,
        Err(CatalogError::Upload {
            category: AssetCategory::CoverImage,
            reason: UploadReason::WriteFailed(_),
        })
    ));
    assert!(root.path().join(&old_path).exists());
    assert_eq!(file_count(&root.path().join("images")), 1);

    let reloaded = service.get(entry.id).await.unwrap();
    assert_eq!(reloaded.cover_image, AssetRef::Stored(old_path));
}

#[tokio::test]
async fn test_persistence_failure_discards_new_files() {
    let root = TempDir::new().unwrap();
    let repository = InstrumentedRepository::new(Duration::ZERO).await;
    let service = service_with(
        repository.clone(),
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let entry = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![upload(AssetCategory::ScoreDocument, "score.pdf", b"%PDF old")],
        )
        .await
        .unwrap();
    let AssetRef::Stored(old_path) = entry.score_document.clone() else {
        panic!("score should be stored");
    };

    repository.fail_updates.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let result = service
        .update(
            entry.id,
            metadata(json!({ "title": "Renamed" })),
            vec![upload(AssetCategory::ScoreDocument, "score.pdf", b"%PDF new")],
        )
        .await;

    assert!(matches!(result, Err(CatalogError::Database(_))));
    assert!(root.path().join(&old_path).exists());
    assert_eq!(file_count(&root.path().join("sheet-music")), 1);

    let reloaded = service.get(entry.id).await.unwrap();
    assert_eq!(reloaded.title, "Song");
    assert_eq!(reloaded.score_document, AssetRef::Stored(old_path));
}

#[tokio::test]
async fn test_failed_upload_in_batch_removes_earlier_files() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let result = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![
                upload(AssetCategory::LessonDocument, "lesson.html", b"<html></html>"),
                upload(AssetCategory::ScorePreview, "preview.gif", b"GIF89a"),
            ],
        )
        .await;

    assert!(matches!(
        result,
        Err(CatalogError::Upload {
            category: AssetCategory::ScorePreview,
            ..
        })
    ));
    assert_eq!(file_count(&root.path().join("HTML")), 0);
    assert_eq!(
        service.list(&ListParams::default()).await.unwrap().total_items,
        0
    );
}

#[tokio::test]
async fn test_duplicate_category_upload_is_rejected() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let result = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![
                upload(AssetCategory::CoverImage, "a.png", b"a"),
                upload(AssetCategory::CoverImage, "b.png", b"b"),
            ],
        )
        .await;

    assert!(matches!(result, Err(CatalogError::Validation(_))));
    assert_eq!(file_count(&root.path().join("images")), 0);
}

#[tokio::test]
async fn test_clear_assets_removes_file() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let entry = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![
                upload(AssetCategory::ScorePreview, "preview.png", b"png"),
                upload(AssetCategory::CoverImage, "cover.png", b"png"),
            ],
        )
        .await
        .unwrap();
    let preview_path = entry.score_preview.as_public().unwrap().to_string();
    let cover_path = entry.cover_image.as_public().unwrap().to_string();

    let updated = service
        .update(
            entry.id,
            metadata(json!({ "clearAssets": ["score-preview", "cover-image"] })),
            Vec::new(),
        )
        .await
        .unwrap();

    assert_eq!(updated.score_preview, AssetRef::Absent);
    assert_eq!(updated.cover_image, AssetRef::Placeholder);
    assert!(!root.path().join(&preview_path).exists());
    assert!(!root.path().join(&cover_path).exists());
}

#[tokio::test]
async fn test_switching_to_cover_url_removes_stored_cover() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let entry = service
        .create(
            metadata(json!({ "title": "Song", "tags": ["folk"] })),
            vec![upload(AssetCategory::CoverImage, "cover.jpg", b"jpg")],
        )
        .await
        .unwrap();
    let cover_path = entry.cover_image.as_public().unwrap().to_string();

    let updated = service
        .update(
            entry.id,
            metadata(json!({ "image": "https://cdn.example.com/cover.jpg" })),
            Vec::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        updated.cover_image,
        AssetRef::External("https://cdn.example.com/cover.jpg".into())
    );
    assert!(!root.path().join(&cover_path).exists());
}

#[tokio::test]
async fn test_delete_removes_owned_files_only() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );

    let entry = service
        .create(
            metadata(json!({
                "title": "Song",
                "tags": ["folk"],
                "image": "https://cdn.example.com/cover.jpg",
            })),
            vec![upload(AssetCategory::LessonDocument, "lesson.htm", b"<html/>")],
        )
        .await
        .unwrap();

    service.delete(entry.id).await.unwrap();

    assert_eq!(file_count(&root.path().join("HTML")), 0);
    assert!(matches!(
        service.get(entry.id).await,
        Err(CatalogError::NotFound(_))
    ));
    assert!(matches!(
        service.delete(entry.id).await,
        Err(CatalogError::NotFound(_))
    ));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_reads_count_every_view() {
    let root = TempDir::new().unwrap();
    let service = service_with(
        memory_repository().await,
        AssetStore::new(root.path()),
        Duration::from_secs(3),
    );
    let entry = service
        .create(metadata(json!({ "title": "Song", "tags": ["folk"] })), Vec::new())
        .await
        .unwrap();

    let id = entry.id;
    let reads = (0..20).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.get_and_count_view(id).await })
    });
    for result in futures::future::join_all(reads).await {
        result.unwrap().unwrap();
    }

    assert_eq!(service.get(id).await.unwrap().views, 20);
}
