//! Listing query planning
//!
//! Raw query-string parameters are normalized into a [`QuerySpec`]: a typed
//! filter, a sort order and a page request. A `QuerySpec` is what the repository
//! executes and, serialized, what the listing cache is keyed by. Two requests
//! that ask for the same thing produce byte-identical keys.

pub mod pagination;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{CatalogError, CatalogResult};
use crate::models::Difficulty;
use pagination::PageRequest;

/// Categorical filter value meaning "no restriction"
pub const ALL_SENTINEL: &str = "all";

/// Query-string parameters of the listing endpoint, as received
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub search: Option<String>,
    pub voice_part: Option<String>,
    pub language: Option<String>,
    pub genre: Option<String>,
    pub difficulty: Option<String>,
    pub sort: Option<String>,
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    TitleAsc,
    TitleDesc,
}

impl SortOrder {
    /// Parse a sort token; unknown or missing tokens mean newest-first
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("oldest") => SortOrder::OldestFirst,
            Some("title_asc") => SortOrder::TitleAsc,
            Some("title_desc") => SortOrder::TitleDesc,
            _ => SortOrder::NewestFirst,
        }
    }

    /// ORDER BY clause, id as the final tie-break
    pub fn order_by(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "created_at DESC, id DESC",
            SortOrder::OldestFirst => "created_at ASC, id ASC",
            SortOrder::TitleAsc => "title ASC, id ASC",
            SortOrder::TitleDesc => "title DESC, id ASC",
        }
    }
}

/// Filterable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Lowercased title and composer
    SearchText,
    Tag1,
    Tag2,
    Tag3,
    Difficulty,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::SearchText => "search_text",
            Field::Tag1 => "tag1",
            Field::Tag2 => "tag2",
            Field::Tag3 => "tag3",
            Field::Difficulty => "difficulty",
        }
    }
}

/// Fields searched by free text; title and composer, folded together
pub const SEARCH_FIELDS: &[Field] = &[Field::SearchText];

/// Aliased classification slots every categorical filter matches against
pub const TAG_FIELDS: &[Field] = &[Field::Tag1, Field::Tag2, Field::Tag3];

/// Backend-neutral filter predicate; a list of predicates is AND-ed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Substring match in any of the fields; `needle` and the fields are
    /// both folded with [`str::to_lowercase`]
    Contains {
        fields: &'static [Field],
        needle: String,
    },
    /// Exact match in any of the fields
    AnyOf {
        fields: &'static [Field],
        value: String,
    },
    Equals {
        field: Field,
        value: i64,
    },
}

/// Normalized listing filter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EntryFilter {
    /// Trimmed, lowercased search text
    pub search: Option<String>,
    /// Tags that must each appear in one of the tag slots
    pub tags: BTreeSet<String>,
    pub difficulty: Option<Difficulty>,
}

impl EntryFilter {
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();

        if let Some(needle) = &self.search {
            predicates.push(Predicate::Contains {
                fields: SEARCH_FIELDS,
                needle: needle.clone(),
            });
        }

        for tag in &self.tags {
            predicates.push(Predicate::AnyOf {
                fields: TAG_FIELDS,
                value: tag.clone(),
            });
        }

        if let Some(difficulty) = self.difficulty {
            predicates.push(Predicate::Equals {
                field: Field::Difficulty,
                value: i64::from(difficulty.value()),
            });
        }

        predicates
    }
}

/// Fully normalized listing query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySpec {
    pub filter: EntryFilter,
    pub sort: SortOrder,
    pub page: PageRequest,
}

impl QuerySpec {
    /// Deterministic cache key
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    pub fn offset(&self) -> i64 {
        self.page.offset()
    }
}

/// Turns raw listing parameters into a [`QuerySpec`]
#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner {
    default_page_size: u32,
    max_page_size: u32,
}

impl QueryPlanner {
    pub fn new(default_page_size: u32, max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    pub fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    /// Normalize `params`
    ///
    /// Only an out-of-range or unparseable difficulty is rejected; every other
    /// malformed value falls back to its default.
    pub fn plan(&self, params: &ListParams) -> CatalogResult<QuerySpec> {
        let number = parse_positive(params.page.as_deref()).unwrap_or(1);
        let size = parse_positive(params.page_size.as_deref())
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size);

        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let tags = [&params.voice_part, &params.language, &params.genre]
            .into_iter()
            .filter_map(|value| categorical(value.as_deref()))
            .collect();

        let difficulty = match params.difficulty.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let value = raw.parse::<i64>().map_err(|_| {
                    CatalogError::Validation(format!("Difficulty must be a number, got '{}'", raw))
                })?;
                Some(Difficulty::new(value)?)
            }
        };

        Ok(QuerySpec {
            filter: EntryFilter {
                search,
                tags,
                difficulty,
            },
            sort: SortOrder::from_token(params.sort.as_deref()),
            page: PageRequest::new(number, size),
        })
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n >= 1)
}

fn categorical(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(ALL_SENTINEL) {
        None
    } else {
        Some(value.to_string())
    }
}
