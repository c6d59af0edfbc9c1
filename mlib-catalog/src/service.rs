//! Catalog service
//!
//! Orchestrates the listing cache, the deadline guard, the query planner, the
//! repository and the asset store. All collaborators are constructed once per
//! process and injected.
//!
//! Mutations follow one ordering: new files are written and confirmed first,
//! the record is persisted second, and superseded files are removed last. A
//! failure before persistence removes the files written for the request and
//! leaves the previous state untouched. Every successful mutation clears the
//! listing cache.

use axum::body::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::assets::{AssetCategory, AssetStore, StoredAsset};
use crate::cache::TtlCache;
use crate::db::CatalogRepository;
use crate::deadline::{DeadlineGuard, GuardError};
use crate::error::{CatalogError, CatalogResult};
use crate::models::{AssetRef, CatalogEntry, EntryMetadata, ListPage};
use crate::query::pagination::calculate_pagination;
use crate::query::{ListParams, QueryPlanner, QuerySpec};

/// Listing cache keyed by [`QuerySpec::cache_key`]
pub type ListingCache = TtlCache<String, Arc<ListPage>>;

/// One file received with a create or update request
#[derive(Debug, Clone)]
pub struct Upload {
    pub category: AssetCategory,
    pub original_name: String,
    pub bytes: Bytes,
}

pub struct CatalogService {
    repository: Arc<dyn CatalogRepository>,
    assets: Arc<AssetStore>,
    cache: Arc<ListingCache>,
    guard: DeadlineGuard,
    planner: QueryPlanner,
    /// Bumped on every invalidation; a listing started before a mutation
    /// must not repopulate the cache after it
    cache_generation: AtomicU64,
}

impl CatalogService {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        assets: Arc<AssetStore>,
        cache: Arc<ListingCache>,
        guard: DeadlineGuard,
        planner: QueryPlanner,
    ) -> Self {
        Self {
            repository,
            assets,
            cache,
            guard,
            planner,
            cache_generation: AtomicU64::new(0),
        }
    }

    pub fn assets(&self) -> &AssetStore {
        &self.assets
    }

    pub fn cache(&self) -> &Arc<ListingCache> {
        &self.cache
    }

    /// Cached, deadline-guarded listing
    pub async fn list(&self, params: &ListParams) -> CatalogResult<Arc<ListPage>> {
        let spec = self.planner.plan(params)?;
        let key = spec.cache_key();

        if let Some(page) = self.cache.get(&key) {
            debug!(key = %key, "Listing cache hit");
            return Ok(page);
        }
        debug!(key = %key, "Listing cache miss");

        let generation = self.cache_generation.load(Ordering::SeqCst);
        let timeout = self.guard.default_timeout();
        let repository = Arc::clone(&self.repository);
        let query = spec.clone();

        let outcome = self
            .guard
            .run(async move { execute_listing(repository, query).await }, timeout)
            .await;

        match outcome {
            Ok(page) => {
                let page = Arc::new(page);
                let stored = self.cache.insert_if(key, Arc::clone(&page), || {
                    self.cache_generation.load(Ordering::SeqCst) == generation
                });
                if !stored {
                    debug!("Listing finished after an invalidation, not cached");
                }
                Ok(page)
            }
            Err(GuardError::Timeout(timeout)) => {
                warn!(
                    key = %key,
                    timeout_ms = timeout.as_millis() as u64,
                    "Listing query timed out, returning empty fallback"
                );
                Err(CatalogError::QueryTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    fallback: ListPage::empty(spec.page.number, spec.page.size),
                })
            }
            Err(GuardError::Operation(e)) => Err(e.into()),
            Err(GuardError::Aborted(msg)) => Err(CatalogError::Internal(msg)),
        }
    }

    /// Fresh listing for admins: bypasses the cache and the deadline
    pub async fn list_uncached(&self, params: &ListParams) -> CatalogResult<ListPage> {
        let spec = self.planner.plan(params)?;
        let page = execute_listing(Arc::clone(&self.repository), spec).await?;
        Ok(page)
    }

    /// Read one entry, counting the view
    pub async fn get_and_count_view(&self, id: i64) -> CatalogResult<CatalogEntry> {
        self.repository
            .increment_views(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    /// Read one entry without touching its view counter
    pub async fn get(&self, id: i64) -> CatalogResult<CatalogEntry> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    pub async fn create(
        &self,
        metadata: EntryMetadata,
        uploads: Vec<Upload>,
    ) -> CatalogResult<CatalogEntry> {
        check_unique_categories(&uploads)?;
        let mut draft = metadata.into_new_entry()?;

        let stored = self.store_uploads(&uploads).await?;
        for asset in &stored {
            *draft.asset_mut(asset.category) = AssetRef::Stored(asset.canonical_path.clone());
        }

        match self.repository.create(&draft).await {
            Ok(entry) => {
                self.invalidate_listings();
                info!(id = entry.id, title = %entry.title, assets = stored.len(), "Created catalog entry");
                Ok(entry)
            }
            Err(e) => {
                self.discard(&stored).await;
                Err(e.into())
            }
        }
    }

    pub async fn update(
        &self,
        id: i64,
        metadata: EntryMetadata,
        uploads: Vec<Upload>,
    ) -> CatalogResult<CatalogEntry> {
        check_unique_categories(&uploads)?;
        let mut entry = self.get(id).await?;
        let mut superseded: Vec<AssetRef> = Vec::new();

        // Validate everything before any file is written
        if let Some(old_cover) = metadata.apply_to(&mut entry)? {
            superseded.push(old_cover);
        }
        for category in &metadata.clear_assets {
            if uploads.iter().any(|u| u.category == *category) {
                continue;
            }
            let cleared = std::mem::replace(
                entry.asset_mut(*category),
                AssetRef::default_for(*category),
            );
            superseded.push(cleared);
        }

        let stored = self.store_uploads(&uploads).await?;
        for asset in &stored {
            let previous = std::mem::replace(
                entry.asset_mut(asset.category),
                AssetRef::Stored(asset.canonical_path.clone()),
            );
            superseded.push(previous);
        }
        entry.updated_at = Utc::now();

        match self.repository.update(&entry).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard(&stored).await;
                return Err(CatalogError::NotFound(id));
            }
            Err(e) => {
                self.discard(&stored).await;
                return Err(e.into());
            }
        }
        self.invalidate_listings();

        for old in superseded {
            if AssetCategory::ALL.iter().any(|c| *entry.asset(*c) == old) {
                // Same name reused, still referenced
                continue;
            }
            self.assets.release(&old).await;
        }

        info!(id, assets = stored.len(), "Updated catalog entry");
        Ok(entry)
    }

    /// Delete an entry and every file it owns
    pub async fn delete(&self, id: i64) -> CatalogResult<()> {
        let entry = self.get(id).await?;

        for path in entry.owned_assets() {
            self.assets.remove(path).await;
        }

        if !self.repository.destroy(id).await? {
            return Err(CatalogError::NotFound(id));
        }
        self.invalidate_listings();

        info!(id, title = %entry.title, "Deleted catalog entry");
        Ok(())
    }

    /// Drop every cached listing page
    pub fn invalidate_listings(&self) {
        self.cache_generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }

    /// Store every upload, removing the ones already written if a later one
    /// fails
    async fn store_uploads(&self, uploads: &[Upload]) -> CatalogResult<Vec<StoredAsset>> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self
                .assets
                .store(upload.category, &upload.bytes, &upload.original_name)
                .await
            {
                Ok(asset) => stored.push(asset),
                Err(e) => {
                    self.discard(&stored).await;
                    return Err(e.into());
                }
            }
        }
        Ok(stored)
    }

    async fn discard(&self, stored: &[StoredAsset]) {
        for asset in stored {
            self.assets.remove(&asset.canonical_path).await;
        }
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("assets", &self.assets)
            .field("guard", &self.guard)
            .field("planner", &self.planner)
            .field("cached_pages", &self.cache.len())
            .finish()
    }
}

/// Count, then fetch the requested page unless it lies past the end
async fn execute_listing(
    repository: Arc<dyn CatalogRepository>,
    spec: QuerySpec,
) -> mlib_common::Result<ListPage> {
    let total_items = repository.count(&spec.filter.predicates()).await?;
    let pagination = calculate_pagination(total_items, spec.page);

    let items = if pagination.is_beyond_end() {
        Vec::new()
    } else {
        repository.find(&spec).await?
    };

    Ok(ListPage {
        items,
        total_items: pagination.total_items,
        total_pages: pagination.total_pages,
        current_page: pagination.page,
        page_size: pagination.page_size,
    })
}

fn check_unique_categories(uploads: &[Upload]) -> CatalogResult<()> {
    for (i, upload) in uploads.iter().enumerate() {
        if uploads[..i].iter().any(|u| u.category == upload.category) {
            return Err(CatalogError::Validation(format!(
                "Only one file may be uploaded for field '{}'",
                upload.category.rules().field_name
            )));
        }
    }
    Ok(())
}
