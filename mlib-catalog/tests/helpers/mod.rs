//! Shared test helpers for mlib-catalog integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use mlib_catalog::assets::{AssetFs, AssetStore, TokioFs};
use mlib_catalog::cache::TtlCache;
use mlib_catalog::db::{CatalogRepository, SqliteCatalogRepository};
use mlib_catalog::deadline::DeadlineGuard;
use mlib_catalog::query::QueryPlanner;
use mlib_catalog::service::CatalogService;
use mlib_catalog::{build_router, AppState};
use serde_json::Value;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Router plus handles on everything behind it
pub struct TestApp {
    pub router: Router,
    pub service: Arc<CatalogService>,
    pub root: TempDir,
}

/// In-memory repository with the schema applied
pub async fn memory_repository() -> Arc<SqliteCatalogRepository> {
    let pool = mlib_common::db::init_in_memory()
        .await
        .expect("Should open in-memory database");
    Arc::new(SqliteCatalogRepository::new(pool))
}

/// Service over `repository` with assets under `root`
pub fn service_with(
    repository: Arc<dyn CatalogRepository>,
    assets: AssetStore,
    query_timeout: Duration,
) -> Arc<CatalogService> {
    Arc::new(CatalogService::new(
        repository,
        Arc::new(assets),
        Arc::new(TtlCache::new(Duration::from_secs(30))),
        DeadlineGuard::new(query_timeout),
        QueryPlanner::new(10, 100),
    ))
}

/// Full application on a temp root folder and in-memory database
pub async fn test_app(admin_token: Option<&str>) -> TestApp {
    let root = TempDir::new().expect("Should create temp dir");
    let assets = AssetStore::new(root.path());
    assets.ensure_roots().await.expect("Should create asset roots");

    let service = service_with(memory_repository().await, assets, Duration::from_secs(3));
    let state = AppState::new(
        service.clone(),
        admin_token.map(str::to_string),
        Duration::from_millis(500),
    );

    TestApp {
        router: build_router(state),
        service,
        root,
    }
}

/// Hand-assembled `multipart/form-data` body
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "mlib-test-boundary-7MA4YWxkTrZu0gW".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn json(self, name: &str, value: &Value) -> Self {
        let text = value.to_string();
        self.text(name, &text)
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                self.boundary, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Finish into a request for `method uri`
    pub fn into_request(mut self, method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(self.body)).unwrap()
    }
}

/// Body-less request
pub fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// [`AssetFs`] with switchable write failures
#[derive(Default)]
pub struct FlakyFs {
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl AssetFs for FlakyFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        TokioFs.create_dir_all(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated disk failure"));
        }
        TokioFs.write(path, bytes).await
    }

    async fn size_of(&self, path: &Path) -> io::Result<Option<u64>> {
        TokioFs.size_of(path).await
    }

    async fn remove(&self, path: &Path) -> io::Result<bool> {
        TokioFs.remove(path).await
    }
}
