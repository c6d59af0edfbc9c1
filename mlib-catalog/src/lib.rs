//! mlib-catalog library - music score catalog service
//!
//! Serves a paginated, filterable catalog of score entries and owns the
//! lifecycle of the files uploaded with them.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod assets;
pub mod cache;
pub mod config;
pub mod db;
pub mod deadline;
pub mod error;
pub mod models;
pub mod query;
pub mod service;

use assets::{AssetCategory, AssetStore};
use cache::TtlCache;
use config::ServiceConfig;
use db::SqliteCatalogRepository;
use deadline::DeadlineGuard;
use query::QueryPlanner;
use service::CatalogService;

/// Room for multipart framing and the metadata field on top of the files
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CatalogService>,
    /// Bearer token for admin routes; `None` disables admin auth
    pub admin_token: Option<Arc<str>>,
    /// Requests slower than this are logged at warn level
    pub slow_request: Duration,
}

impl AppState {
    pub fn new(
        service: Arc<CatalogService>,
        admin_token: Option<String>,
        slow_request: Duration,
    ) -> Self {
        Self {
            service,
            admin_token: admin_token.map(Arc::from),
            slow_request,
        }
    }
}

/// Wire the catalog service from a database pool and resolved settings
///
/// Assets live under the root folder next to the database.
pub fn build_service(pool: SqlitePool, config: &ServiceConfig) -> Arc<CatalogService> {
    let repository = Arc::new(SqliteCatalogRepository::new(pool));
    let assets = Arc::new(AssetStore::new(config.root_folder.clone()));
    let cache = Arc::new(TtlCache::new(config.cache_ttl));

    Arc::new(CatalogService::new(
        repository,
        assets,
        cache,
        DeadlineGuard::new(config.query_timeout),
        QueryPlanner::new(config.default_page_size, config.max_page_size),
    ))
}

/// Build application router
///
/// Health, listing and single-entry reads are public. Admin routes, including
/// an uncached listing, sit behind the bearer-token middleware. Stored assets
/// are served read-only under their storage root names.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;

    let body_limit = (AssetCategory::total_max_size() + MULTIPART_OVERHEAD) as usize;

    let admin = Router::new()
        .route(
            "/api/admin/songs",
            get(api::admin_list_entries).post(api::create_entry),
        )
        .route(
            "/api/admin/songs/:id",
            get(api::admin_get_entry)
                .put(api::update_entry)
                .delete(api::delete_entry),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/api/songs", get(api::list_entries))
        .route("/api/songs/:id", get(api::get_entry))
        .merge(api::health_routes());

    let mut router = Router::new().merge(admin).merge(public);

    let asset_root = state.service.assets().root().to_path_buf();
    for storage_root in AssetCategory::storage_roots() {
        router = router.nest_service(
            &format!("/{}", storage_root),
            ServeDir::new(asset_root.join(storage_root)),
        );
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::request_timing,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Allow browser front-ends served from localhost
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(|origin| {
                ["http://localhost", "http://127.0.0.1"]
                    .iter()
                    .any(|host| {
                        origin == *host
                            || origin
                                .strip_prefix(host)
                                .is_some_and(|rest| rest.starts_with(':'))
                    })
            })
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
