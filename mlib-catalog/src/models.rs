//! Catalog data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::assets::AssetCategory;
use crate::error::{CatalogError, CatalogResult};

/// Cover image shown for entries without an uploaded or linked cover
pub const DEFAULT_COVER_IMAGE: &str = "https://via.placeholder.com/300x300?text=音乐";

/// Composer recorded when none is supplied
pub const DEFAULT_COMPOSER: &str = "Unknown composer";

/// Tag slots per entry
pub const MAX_TAGS: usize = 3;

/// Reference from an entry to one of its assets
///
/// Only [`AssetRef::Stored`] is owned by the entry; the other variants never
/// cause a file deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetRef {
    #[default]
    Absent,
    /// The shared default cover image
    Placeholder,
    /// Cover image given as an http(s) URL
    External(String),
    /// Canonical path of a file in the asset store
    Stored(String),
}

impl AssetRef {
    /// Reference used when the field has nothing set
    pub fn default_for(category: AssetCategory) -> Self {
        match category {
            AssetCategory::CoverImage => AssetRef::Placeholder,
            _ => AssetRef::Absent,
        }
    }

    /// Decode a database column
    pub fn from_column(category: AssetCategory, value: Option<String>) -> Self {
        match value {
            None => Self::default_for(category),
            Some(v) if v.trim().is_empty() => Self::default_for(category),
            Some(v) if v == DEFAULT_COVER_IMAGE => AssetRef::Placeholder,
            Some(v) if is_http_url(&v) => AssetRef::External(v),
            Some(v) => AssetRef::Stored(v),
        }
    }

    /// Encode for a database column; `None` for placeholder and absent
    pub fn to_column(&self) -> Option<String> {
        match self {
            AssetRef::Absent | AssetRef::Placeholder => None,
            AssetRef::External(url) => Some(url.clone()),
            AssetRef::Stored(path) => Some(path.clone()),
        }
    }

    /// Value exposed to clients: a URL, a canonical path or `null`
    pub fn as_public(&self) -> Option<&str> {
        match self {
            AssetRef::Absent => None,
            AssetRef::Placeholder => Some(DEFAULT_COVER_IMAGE),
            AssetRef::External(url) => Some(url),
            AssetRef::Stored(path) => Some(path),
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, AssetRef::Stored(_))
    }
}

impl Serialize for AssetRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_public() {
            Some(value) => serializer.serialize_str(value),
            None => serializer.serialize_none(),
        }
    }
}

fn is_http_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Difficulty rating, 1 (easiest) to 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> CatalogResult<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(CatalogError::Validation(format!(
                "Difficulty must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

/// A catalog entry as stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    pub composer: String,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub description: String,
    pub views: i64,
    pub cover_image: AssetRef,
    pub lesson_document: AssetRef,
    pub score_document: AssetRef,
    pub score_preview: AssetRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn asset(&self, category: AssetCategory) -> &AssetRef {
        match category {
            AssetCategory::CoverImage => &self.cover_image,
            AssetCategory::LessonDocument => &self.lesson_document,
            AssetCategory::ScoreDocument => &self.score_document,
            AssetCategory::ScorePreview => &self.score_preview,
        }
    }

    pub fn asset_mut(&mut self, category: AssetCategory) -> &mut AssetRef {
        match category {
            AssetCategory::CoverImage => &mut self.cover_image,
            AssetCategory::LessonDocument => &mut self.lesson_document,
            AssetCategory::ScoreDocument => &mut self.score_document,
            AssetCategory::ScorePreview => &mut self.score_preview,
        }
    }

    /// Canonical paths of every file this entry owns
    pub fn owned_assets(&self) -> Vec<&str> {
        AssetCategory::ALL
            .iter()
            .filter_map(|category| match self.asset(*category) {
                AssetRef::Stored(path) => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Fields for a new catalog entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub title: String,
    pub composer: String,
    pub tags: Vec<String>,
    pub difficulty: Difficulty,
    pub description: String,
    pub cover_image: AssetRef,
    pub lesson_document: AssetRef,
    pub score_document: AssetRef,
    pub score_preview: AssetRef,
}

impl NewEntry {
    pub fn asset_mut(&mut self, category: AssetCategory) -> &mut AssetRef {
        match category {
            AssetCategory::CoverImage => &mut self.cover_image,
            AssetCategory::LessonDocument => &mut self.lesson_document,
            AssetCategory::ScoreDocument => &mut self.score_document,
            AssetCategory::ScorePreview => &mut self.score_preview,
        }
    }
}

/// Metadata carried in the `data` field of a create or update request
///
/// Every field is optional so the same shape serves partial updates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub tags: Option<Vec<String>>,
    pub difficulty: Option<i64>,
    pub description: Option<String>,
    /// Cover image URL, used when no cover file is uploaded
    #[serde(alias = "imageUrl")]
    pub image: Option<String>,
    /// Asset fields to reset to their default
    #[serde(default)]
    pub clear_assets: Vec<AssetCategory>,
}

impl EntryMetadata {
    /// Validate as a complete new entry
    pub fn into_new_entry(self) -> CatalogResult<NewEntry> {
        let title = required_title(self.title.as_deref())?;
        let tags = normalize_tags(self.tags.unwrap_or_default())?;
        let difficulty = match self.difficulty {
            Some(value) => Difficulty::new(value)?,
            None => Difficulty::default(),
        };
        let cover_image = match self.image.as_deref() {
            Some(url) => parse_cover_url(url)?,
            None => AssetRef::Placeholder,
        };

        Ok(NewEntry {
            title,
            composer: composer_or_default(self.composer.as_deref()),
            tags,
            difficulty,
            description: self.description.unwrap_or_default().trim().to_string(),
            cover_image,
            lesson_document: AssetRef::Absent,
            score_document: AssetRef::Absent,
            score_preview: AssetRef::Absent,
        })
    }

    /// Merge supplied fields into `entry`
    ///
    /// Asset fields are left alone except for a cover URL; the caller handles
    /// uploads and `clear_assets`. Returns the cover reference the URL
    /// superseded, if any.
    pub fn apply_to(&self, entry: &mut CatalogEntry) -> CatalogResult<Option<AssetRef>> {
        if let Some(title) = self.title.as_deref() {
            entry.title = required_title(Some(title))?;
        }
        if let Some(composer) = self.composer.as_deref() {
            entry.composer = composer_or_default(Some(composer));
        }
        if let Some(tags) = &self.tags {
            entry.tags = normalize_tags(tags.clone())?;
        }
        if let Some(difficulty) = self.difficulty {
            entry.difficulty = Difficulty::new(difficulty)?;
        }
        if let Some(description) = self.description.as_deref() {
            entry.description = description.trim().to_string();
        }

        match self.image.as_deref() {
            Some(url) => {
                let cover = parse_cover_url(url)?;
                if cover != entry.cover_image {
                    return Ok(Some(std::mem::replace(&mut entry.cover_image, cover)));
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

fn required_title(title: Option<&str>) -> CatalogResult<String> {
    match title.map(str::trim) {
        Some(title) if !title.is_empty() => Ok(title.to_string()),
        _ => Err(CatalogError::Validation("Title is required".to_string())),
    }
}

fn composer_or_default(composer: Option<&str>) -> String {
    match composer.map(str::trim) {
        Some(composer) if !composer.is_empty() => composer.to_string(),
        _ => DEFAULT_COMPOSER.to_string(),
    }
}

/// Trim, drop blanks and duplicates, then require 1 to 3 tags
pub fn normalize_tags(tags: Vec<String>) -> CatalogResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_string());
        }
    }

    if normalized.is_empty() {
        return Err(CatalogError::Validation(
            "At least one tag is required".to_string(),
        ));
    }
    if normalized.len() > MAX_TAGS {
        return Err(CatalogError::Validation(format!(
            "At most {} tags are allowed, got {}",
            MAX_TAGS,
            normalized.len()
        )));
    }
    Ok(normalized)
}

/// Interpret a cover image URL supplied as text
fn parse_cover_url(url: &str) -> CatalogResult<AssetRef> {
    let url = url.trim();
    if url.is_empty() || url == DEFAULT_COVER_IMAGE {
        return Ok(AssetRef::Placeholder);
    }
    if is_http_url(url) {
        return Ok(AssetRef::External(url.to_string()));
    }
    Err(CatalogError::Validation(format!(
        "Cover image must be an uploaded file or an http(s) URL, got '{}'",
        url
    )))
}

/// One page of listing results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<CatalogEntry>,
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub page_size: u32,
}

impl ListPage {
    pub fn empty(current_page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            total_pages: 0,
            current_page,
            page_size,
        }
    }
}
