//! SQLite catalog repository

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mlib_common::db::search_text;
use mlib_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::CatalogRepository;
use crate::assets::AssetCategory;
use crate::models::{AssetRef, CatalogEntry, Difficulty, NewEntry};
use crate::query::{Predicate, QuerySpec};

const SELECT_COLUMNS: &str = "SELECT id, title, composer, tag1, tag2, tag3, difficulty, \
     description, views, cover_image, lesson_document, score_document, score_preview, \
     created_at, updated_at FROM catalog_entries";

/// [`CatalogRepository`] over the `catalog_entries` table
#[derive(Debug, Clone)]
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Timestamp format stored in TEXT columns
///
/// Fixed width with millisecond precision so lexical order is chronological.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid {} timestamp '{}': {}", column, value, e)))
}

/// Escape LIKE wildcards so the needle matches literally
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Append a WHERE clause for `predicates` (AND-ed), binding every value
fn push_where(builder: &mut QueryBuilder<'_, Sqlite>, predicates: &[Predicate]) {
    for (i, predicate) in predicates.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });

        match predicate {
            Predicate::Contains { fields, needle } => {
                let pattern = format!("%{}%", escape_like(needle));
                builder.push("(");
                for (j, field) in fields.iter().enumerate() {
                    if j > 0 {
                        builder.push(" OR ");
                    }
                    builder.push(field.column());
                    builder.push(" LIKE ");
                    builder.push_bind(pattern.clone());
                    builder.push(" ESCAPE '\\'");
                }
                builder.push(")");
            }
            Predicate::AnyOf { fields, value } => {
                builder.push("(");
                for (j, field) in fields.iter().enumerate() {
                    if j > 0 {
                        builder.push(" OR ");
                    }
                    builder.push(field.column());
                    builder.push(" = ");
                    builder.push_bind(value.clone());
                }
                builder.push(")");
            }
            Predicate::Equals { field, value } => {
                builder.push(field.column());
                builder.push(" = ");
                builder.push_bind(*value);
            }
        }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<CatalogEntry> {
    let tags = ["tag1", "tag2", "tag3"]
        .iter()
        .filter_map(|column| row.get::<Option<String>, _>(*column))
        .filter(|tag| !tag.trim().is_empty())
        .collect();

    let difficulty: i64 = row.get("difficulty");
    let difficulty = Difficulty::new(difficulty)
        .map_err(|e| Error::Internal(format!("Stored entry has invalid difficulty: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(CatalogEntry {
        id: row.get("id"),
        title: row.get("title"),
        composer: row.get("composer"),
        tags,
        difficulty,
        description: row.get("description"),
        views: row.get("views"),
        cover_image: AssetRef::from_column(AssetCategory::CoverImage, row.get("cover_image")),
        lesson_document: AssetRef::from_column(
            AssetCategory::LessonDocument,
            row.get("lesson_document"),
        ),
        score_document: AssetRef::from_column(
            AssetCategory::ScoreDocument,
            row.get("score_document"),
        ),
        score_preview: AssetRef::from_column(AssetCategory::ScorePreview, row.get("score_preview")),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn tag_slot(tags: &[String], slot: usize) -> Option<&str> {
    tags.get(slot).map(String::as_str)
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn count(&self, predicates: &[Predicate]) -> Result<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM catalog_entries");
        push_where(&mut builder, predicates);

        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    async fn find(&self, spec: &QuerySpec) -> Result<Vec<CatalogEntry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        push_where(&mut builder, &spec.filter.predicates());
        builder.push(" ORDER BY ");
        builder.push(spec.sort.order_by());
        builder.push(" LIMIT ");
        builder.push_bind(spec.page.limit());
        builder.push(" OFFSET ");
        builder.push_bind(spec.offset());

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn create(&self, entry: &NewEntry) -> Result<CatalogEntry> {
        let now = format_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO catalog_entries (
                title, composer, tag1, tag2, tag3, difficulty, description, views,
                cover_image, lesson_document, score_document, score_preview,
                search_text, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.composer)
        .bind(tag_slot(&entry.tags, 0))
        .bind(tag_slot(&entry.tags, 1))
        .bind(tag_slot(&entry.tags, 2))
        .bind(i64::from(entry.difficulty.value()))
        .bind(&entry.description)
        .bind(entry.cover_image.to_column())
        .bind(entry.lesson_document.to_column())
        .bind(entry.score_document.to_column())
        .bind(entry.score_preview.to_column())
        .bind(search_text(&entry.title, &entry.composer))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Entry {} vanished after insert", id)))
    }

    async fn update(&self, entry: &CatalogEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_entries SET
                title = ?, composer = ?, tag1 = ?, tag2 = ?, tag3 = ?,
                difficulty = ?, description = ?,
                cover_image = ?, lesson_document = ?, score_document = ?, score_preview = ?,
                search_text = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.composer)
        .bind(tag_slot(&entry.tags, 0))
        .bind(tag_slot(&entry.tags, 1))
        .bind(tag_slot(&entry.tags, 2))
        .bind(i64::from(entry.difficulty.value()))
        .bind(&entry.description)
        .bind(entry.cover_image.to_column())
        .bind(entry.lesson_document.to_column())
        .bind(entry.score_document.to_column())
        .bind(entry.score_preview.to_column())
        .bind(search_text(&entry.title, &entry.composer))
        .bind(format_timestamp(entry.updated_at))
        .bind(entry.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<Option<CatalogEntry>> {
        let result = sqlx::query("UPDATE catalog_entries SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn destroy(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
