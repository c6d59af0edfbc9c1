//! Asset store for uploaded catalog files
//!
//! Every upload category is described by one row of a static table
//! ([`AssetCategory::rules`]): allowed extensions, maximum size, storage root
//! and generated-name prefix. Validation happens before anything touches the
//! disk. Writes are fail-closed (a partial file is removed and the upload
//! fails); deletes during replace or removal are fail-open (logged, orphan
//! left behind).
//!
//! Canonical asset paths are relative to the asset root, e.g.
//! `images/image_1718000000000.png`, and double as URL paths under which the
//! HTTP layer serves the file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::models::AssetRef;

/// Upload category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetCategory {
    LessonDocument,
    CoverImage,
    ScoreDocument,
    ScorePreview,
}

/// Fixed validation and placement rules for one category
#[derive(Debug, Clone, Copy)]
pub struct CategoryRules {
    pub field_name: &'static str,
    pub extensions: &'static [&'static str],
    pub max_size: u64,
    pub storage_root: &'static str,
    pub name_prefix: &'static str,
}

const MIB: u64 = 1024 * 1024;

const LESSON_DOCUMENT_RULES: CategoryRules = CategoryRules {
    field_name: "htmlFile",
    extensions: &["html", "htm"],
    max_size: 10 * MIB,
    storage_root: "HTML",
    name_prefix: "html",
};

const COVER_IMAGE_RULES: CategoryRules = CategoryRules {
    field_name: "image",
    extensions: &["jpg", "jpeg", "png", "gif"],
    max_size: 50 * MIB,
    storage_root: "images",
    name_prefix: "image",
};

const SCORE_DOCUMENT_RULES: CategoryRules = CategoryRules {
    field_name: "sheetMusic",
    extensions: &["pdf", "jpg", "jpeg", "png"],
    max_size: 50 * MIB,
    storage_root: "sheet-music",
    name_prefix: "sheet_music",
};

const SCORE_PREVIEW_RULES: CategoryRules = CategoryRules {
    field_name: "sheetMusicPreview",
    extensions: &["jpg", "jpeg", "png"],
    max_size: 50 * MIB,
    storage_root: "sheet-music",
    name_prefix: "sheet_music_preview",
};

impl AssetCategory {
    pub const ALL: [AssetCategory; 4] = [
        AssetCategory::LessonDocument,
        AssetCategory::CoverImage,
        AssetCategory::ScoreDocument,
        AssetCategory::ScorePreview,
    ];

    pub fn rules(self) -> &'static CategoryRules {
        match self {
            AssetCategory::LessonDocument => &LESSON_DOCUMENT_RULES,
            AssetCategory::CoverImage => &COVER_IMAGE_RULES,
            AssetCategory::ScoreDocument => &SCORE_DOCUMENT_RULES,
            AssetCategory::ScorePreview => &SCORE_PREVIEW_RULES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetCategory::LessonDocument => "lesson-document",
            AssetCategory::CoverImage => "cover-image",
            AssetCategory::ScoreDocument => "score-document",
            AssetCategory::ScorePreview => "score-preview",
        }
    }

    /// Category for a multipart field name
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.rules().field_name == name)
    }

    /// Distinct storage root directories across all categories
    pub fn storage_roots() -> Vec<&'static str> {
        let mut roots: Vec<&'static str> =
            Self::ALL.iter().map(|c| c.rules().storage_root).collect();
        roots.sort_unstable();
        roots.dedup();
        roots
    }

    /// Largest per-file limit across categories
    pub fn largest_max_size() -> u64 {
        Self::ALL
            .iter()
            .map(|c| c.rules().max_size)
            .max()
            .unwrap_or(0)
    }

    /// Sum of per-file limits, an upper bound for one request body
    pub fn total_max_size() -> u64 {
        Self::ALL.iter().map(|c| c.rules().max_size).sum()
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an upload failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadReason {
    DisallowedExtension { extension: String },
    TooLarge { size: u64, max_size: u64 },
    WriteFailed(String),
    /// Read-back after the write did not find the expected file
    NotDurable { expected: u64, found: Option<u64> },
}

impl UploadReason {
    /// Rejections the client can fix by sending a different file
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            UploadReason::DisallowedExtension { .. } | UploadReason::TooLarge { .. }
        )
    }
}

impl fmt::Display for UploadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadReason::DisallowedExtension { extension } if extension.is_empty() => {
                write!(f, "file has no extension")
            }
            UploadReason::DisallowedExtension { extension } => {
                write!(f, "extension '.{}' is not allowed", extension)
            }
            UploadReason::TooLarge { size, max_size } => {
                write!(f, "file size {} bytes exceeds the {} byte limit", size, max_size)
            }
            UploadReason::WriteFailed(msg) => write!(f, "write failed: {}", msg),
            UploadReason::NotDurable { expected, found } => match found {
                Some(found) => write!(
                    f,
                    "stored file has {} bytes, expected {}",
                    found, expected
                ),
                None => write!(f, "stored file is missing after write"),
            },
        }
    }
}

/// Asset store errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{category} upload failed: {reason}")]
    Upload {
        category: AssetCategory,
        reason: UploadReason,
    },

    #[error("failed to prepare {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A validated upload that is confirmed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub category: AssetCategory,
    pub generated_name: String,
    /// Path relative to the asset root, `/`-separated
    pub canonical_path: String,
    pub size: u64,
}

/// Filesystem operations used by [`AssetStore`]
///
/// Abstracted so storage failures can be injected in tests.
#[async_trait]
pub trait AssetFs: Send + Sync {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Write `bytes` to a new file at `path` and flush it to disk
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// File size, or `None` if nothing exists at `path`
    async fn size_of(&self, path: &Path) -> io::Result<Option<u64>>;

    /// Delete `path`, returning `false` if it did not exist
    async fn remove(&self, path: &Path) -> io::Result<bool>;
}

/// [`AssetFs`] backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl AssetFs for TokioFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }

    async fn size_of(&self, path: &Path) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn remove(&self, path: &Path) -> io::Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Lowercased extension of an uploaded file name, empty if it has none
pub fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Check extension and size against the category table
///
/// Returns the normalized extension on success.
pub fn validate_upload(
    category: AssetCategory,
    original_name: &str,
    size: u64,
) -> Result<String, AssetError> {
    let rules = category.rules();
    let extension = extension_of(original_name);

    if !rules.extensions.contains(&extension.as_str()) {
        return Err(AssetError::Upload {
            category,
            reason: UploadReason::DisallowedExtension { extension },
        });
    }

    if size > rules.max_size {
        return Err(AssetError::Upload {
            category,
            reason: UploadReason::TooLarge {
                size,
                max_size: rules.max_size,
            },
        });
    }

    Ok(extension)
}

/// Owns the on-disk lifecycle of uploaded assets
pub struct AssetStore {
    root: PathBuf,
    fs: Arc<dyn AssetFs>,
}

impl fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetStore").field("root", &self.root).finish()
    }
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, Arc::new(TokioFs))
    }

    pub fn with_fs(root: impl Into<PathBuf>, fs: Arc<dyn AssetFs>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every storage root directory
    pub async fn ensure_roots(&self) -> Result<(), AssetError> {
        for storage_root in AssetCategory::storage_roots() {
            let dir = self.root.join(storage_root);
            self.fs
                .create_dir_all(&dir)
                .await
                .map_err(|source| AssetError::Storage {
                    path: dir.display().to_string(),
                    source,
                })?;
            debug!(path = %dir.display(), "Asset storage root ready");
        }
        Ok(())
    }

    /// Validate, write and confirm one upload
    pub async fn store(
        &self,
        category: AssetCategory,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<StoredAsset, AssetError> {
        let size = bytes.len() as u64;
        let extension = validate_upload(category, original_name, size)?;
        let rules = category.rules();

        let generated_name = format!(
            "{}_{}.{}",
            rules.name_prefix,
            chrono::Utc::now().timestamp_millis(),
            extension
        );
        let canonical_path = format!("{}/{}", rules.storage_root, generated_name);
        let dir = self.root.join(rules.storage_root);
        let target = dir.join(&generated_name);

        let upload_failed = |reason: UploadReason| AssetError::Upload { category, reason };

        self.fs
            .create_dir_all(&dir)
            .await
            .map_err(|e| upload_failed(UploadReason::WriteFailed(e.to_string())))?;

        if let Err(e) = self.fs.write(&target, bytes).await {
            self.discard_partial(category, &target).await;
            return Err(upload_failed(UploadReason::WriteFailed(e.to_string())));
        }

        let found = match self.fs.size_of(&target).await {
            Ok(found) => found,
            Err(e) => {
                self.discard_partial(category, &target).await;
                return Err(upload_failed(UploadReason::WriteFailed(e.to_string())));
            }
        };
        if found != Some(size) {
            self.discard_partial(category, &target).await;
            return Err(upload_failed(UploadReason::NotDurable {
                expected: size,
                found,
            }));
        }

        info!(
            category = %category,
            original_name,
            path = %canonical_path,
            size,
            "Stored asset"
        );

        Ok(StoredAsset {
            category,
            generated_name,
            canonical_path,
            size,
        })
    }

    /// Store a new asset, then delete `old` once the new file is confirmed
    ///
    /// A failed write leaves `old` untouched. A failed delete of `old` is
    /// logged and the replacement still succeeds.
    pub async fn replace(
        &self,
        category: AssetCategory,
        bytes: &[u8],
        original_name: &str,
        old: &AssetRef,
    ) -> Result<StoredAsset, AssetError> {
        let stored = self.store(category, bytes, original_name).await?;

        match old {
            AssetRef::Stored(old_path) if *old_path != stored.canonical_path => {
                self.remove(old_path).await;
            }
            AssetRef::Stored(old_path) => {
                warn!(
                    category = %category,
                    path = %old_path,
                    "Replacement reused the previous asset name, keeping file"
                );
            }
            _ => {}
        }

        Ok(stored)
    }

    /// Delete an asset by canonical path
    ///
    /// Missing files, placeholder or external references and paths outside
    /// the storage roots are no-ops. Returns whether a file was deleted.
    pub async fn remove(&self, canonical_path: &str) -> bool {
        let Some(target) = self.resolve(canonical_path) else {
            warn!(
                path = canonical_path,
                "Refusing to remove path outside asset storage roots"
            );
            return false;
        };

        match self.fs.remove(&target).await {
            Ok(true) => {
                info!(path = canonical_path, "Removed asset");
                true
            }
            Ok(false) => {
                debug!(path = canonical_path, "Asset already absent");
                false
            }
            Err(e) => {
                warn!(path = canonical_path, error = %e, "Failed to remove asset, leaving orphan");
                false
            }
        }
    }

    /// Remove the file behind `asset` if the reference owns one
    pub async fn release(&self, asset: &AssetRef) -> bool {
        match asset {
            AssetRef::Stored(path) => self.remove(path).await,
            _ => false,
        }
    }

    /// Absolute path for a canonical asset path
    ///
    /// `None` unless the path is relative, free of `..` and inside one of the
    /// storage roots.
    pub fn resolve(&self, canonical_path: &str) -> Option<PathBuf> {
        let relative = Path::new(canonical_path);
        let mut components = relative.components();

        let first = match components.next() {
            Some(Component::Normal(first)) => first.to_str()?,
            _ => return None,
        };
        if !AssetCategory::storage_roots().contains(&first) {
            return None;
        }

        let mut has_file = false;
        for component in components {
            match component {
                Component::Normal(_) => has_file = true,
                _ => return None,
            }
        }
        if !has_file {
            return None;
        }

        Some(self.root.join(relative))
    }

    async fn discard_partial(&self, category: AssetCategory, target: &Path) {
        if let Err(e) = self.fs.remove(target).await {
            warn!(
                category = %category,
                path = %target.display(),
                error = %e,
                "Failed to remove partial upload"
            );
        }
    }
}
