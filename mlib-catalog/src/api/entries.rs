//! Catalog entry endpoints
//!
//! Create and update take `multipart/form-data`:
//! - `data`: JSON [`EntryMetadata`]
//! - `image`: cover file, or a plain text cover URL
//! - `htmlFile`, `sheetMusic`, `sheetMusicPreview`: asset files

use axum::{
    body::Bytes,
    extract::multipart::{Field, MultipartRejection},
    extract::rejection::{PathRejection, QueryRejection},
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::auth::Principal;
use crate::assets::{validate_upload, AssetCategory, UploadReason};
use crate::error::{CatalogError, CatalogResult};
use crate::models::EntryMetadata;
use crate::query::ListParams;
use crate::service::Upload;
use crate::AppState;

/// Field carrying the JSON metadata
pub const METADATA_FIELD: &str = "data";

/// Success envelope
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// GET /api/songs
pub async fn list_entries(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> CatalogResult<Response> {
    let Query(params) = params?;
    let page = state.service.list(&params).await?;
    Ok(Json(DataResponse::new(page.as_ref())).into_response())
}

/// GET /api/admin/songs
///
/// Same filters and envelope as the public listing, read straight from the
/// repository.
pub async fn admin_list_entries(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> CatalogResult<Response> {
    let Query(params) = params?;
    let page = state.service.list_uncached(&params).await?;
    Ok(Json(DataResponse::new(page)).into_response())
}

/// GET /api/songs/:id
///
/// Every read counts as a view.
pub async fn get_entry(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> CatalogResult<Response> {
    let Path(id) = id?;
    let entry = state.service.get_and_count_view(id).await?;
    Ok(Json(DataResponse::new(entry)).into_response())
}

/// GET /api/admin/songs/:id
pub async fn admin_get_entry(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> CatalogResult<Response> {
    let Path(id) = id?;
    let entry = state.service.get(id).await?;
    Ok(Json(DataResponse::new(entry)).into_response())
}

/// POST /api/admin/songs
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    multipart: Result<Multipart, MultipartRejection>,
) -> CatalogResult<Response> {
    let form = read_entry_form(multipart?).await?;
    let entry = state.service.create(form.metadata, form.uploads).await?;

    info!(id = entry.id, by = %principal.subject, "Entry created via API");
    Ok((StatusCode::CREATED, Json(DataResponse::new(entry))).into_response())
}

/// PUT /api/admin/songs/:id
pub async fn update_entry(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> CatalogResult<Response> {
    let Path(id) = id?;
    let form = read_entry_form(multipart?).await?;
    let entry = state.service.update(id, form.metadata, form.uploads).await?;

    info!(id, by = %principal.subject, "Entry updated via API");
    Ok(Json(DataResponse::new(entry)).into_response())
}

/// DELETE /api/admin/songs/:id
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    id: Result<Path<i64>, PathRejection>,
) -> CatalogResult<Response> {
    let Path(id) = id?;
    state.service.delete(id).await?;

    info!(id, by = %principal.subject, "Entry deleted via API");
    Ok(Json(json!({
        "success": true,
        "message": format!("Entry {} deleted", id),
    }))
    .into_response())
}

/// Parsed create/update form
#[derive(Debug, Default)]
pub struct EntryForm {
    pub metadata: EntryMetadata,
    pub uploads: Vec<Upload>,
}

/// Split a multipart body into metadata and uploaded files
pub async fn read_entry_form(mut multipart: Multipart) -> CatalogResult<EntryForm> {
    let mut form = EntryForm::default();
    let mut cover_url: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == METADATA_FIELD {
            let text = field.text().await?;
            form.metadata = serde_json::from_str(&text).map_err(|e| {
                CatalogError::Validation(format!("Invalid '{}' field: {}", METADATA_FIELD, e))
            })?;
            continue;
        }

        let Some(category) = AssetCategory::from_field_name(&name) else {
            debug!(field = %name, "Ignoring unknown multipart field");
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(original_name) if !original_name.is_empty() => {
                // Reject a disallowed extension before buffering anything
                validate_upload(category, &original_name, 0)?;
                let bytes = read_capped(field, category).await?;
                form.uploads.push(Upload {
                    category,
                    original_name,
                    bytes,
                });
            }
            _ if category == AssetCategory::CoverImage => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    cover_url = Some(text);
                }
            }
            _ => {
                return Err(CatalogError::Validation(format!(
                    "Field '{}' must be a file upload",
                    name
                )));
            }
        }
    }

    if cover_url.is_some() {
        form.metadata.image = cover_url;
    }
    Ok(form)
}

/// Read a file field, stopping as soon as it exceeds its category's limit
async fn read_capped(mut field: Field<'_>, category: AssetCategory) -> CatalogResult<Bytes> {
    let max_size = category.rules().max_size;
    let mut buffer = Vec::new();

    while let Some(chunk) = field.chunk().await? {
        let size = (buffer.len() + chunk.len()) as u64;
        if size > max_size {
            return Err(CatalogError::Upload {
                category,
                reason: UploadReason::TooLarge { size, max_size },
            });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buffer))
}
