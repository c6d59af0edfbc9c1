//! Persistence for catalog entries

pub mod entries;

use async_trait::async_trait;
use mlib_common::Result;

use crate::models::{CatalogEntry, NewEntry};
use crate::query::{Predicate, QuerySpec};

pub use entries::SqliteCatalogRepository;

/// Storage backend for catalog entries
///
/// Filters arrive as backend-neutral [`Predicate`]s; implementations compile
/// them into their own query language.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Number of entries matching every predicate
    async fn count(&self, predicates: &[Predicate]) -> Result<i64>;

    /// One page of matching entries in the requested order
    async fn find(&self, spec: &QuerySpec) -> Result<Vec<CatalogEntry>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<CatalogEntry>>;

    async fn create(&self, entry: &NewEntry) -> Result<CatalogEntry>;

    /// Persist every mutable field of `entry`; `false` if the row is gone
    async fn update(&self, entry: &CatalogEntry) -> Result<bool>;

    /// Atomically add one view and return the updated entry
    async fn increment_views(&self, id: i64) -> Result<Option<CatalogEntry>>;

    /// Delete the row; `false` if it did not exist
    async fn destroy(&self, id: i64) -> Result<bool>;
}
