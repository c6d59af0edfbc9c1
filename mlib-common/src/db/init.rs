//! Database initialization
//!
//! Opens (or creates) the SQLite database under the root folder and makes sure
//! the catalog schema exists. Every statement is idempotent, so startup can run
//! it against an existing database.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Folded `title` and `composer` used by free-text search
///
/// Both the stored column and the search needle go through
/// [`str::to_lowercase`]; SQLite's own `LOWER()` only folds ASCII.
pub fn search_text(title: &str, composer: &str) -> String {
    format!("{}\n{}", title.to_lowercase(), composer.to_lowercase())
}

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL lets listing reads proceed while an admin write is in flight
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_catalog_entries_table(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the catalog schema applied
///
/// Limited to one connection: every SQLite `:memory:` connection is its own
/// database.
pub async fn init_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_catalog_entries_table(&pool).await?;

    Ok(pool)
}

/// Create the catalog_entries table
///
/// `tag1..tag3` are the three aliased classification slots; a tag filter
/// matches a value held in any of them. Asset columns are NULL when absent.
/// `search_text` holds [`search_text`] of the row and is written by the
/// application on every insert and update.
pub async fn create_catalog_entries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            composer TEXT NOT NULL DEFAULT 'Unknown composer',
            tag1 TEXT,
            tag2 TEXT,
            tag3 TEXT,
            difficulty INTEGER NOT NULL DEFAULT 1 CHECK (difficulty BETWEEN 1 AND 5),
            description TEXT NOT NULL DEFAULT '',
            views INTEGER NOT NULL DEFAULT 0,
            cover_image TEXT,
            lesson_document TEXT,
            score_document TEXT,
            score_preview TEXT,
            search_text TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_entries_created_at ON catalog_entries(created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_entries_title ON catalog_entries(title)")
        .execute(pool)
        .await?;

    add_search_text_column(pool).await?;
    backfill_search_text(pool).await?;

    Ok(())
}

/// Add `search_text` to tables created before it existed
async fn add_search_text_column(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('catalog_entries') WHERE name = 'search_text'",
    )
    .fetch_one(pool)
    .await?;

    if has_column == 0 {
        sqlx::query("ALTER TABLE catalog_entries ADD COLUMN search_text TEXT NOT NULL DEFAULT ''")
            .execute(pool)
            .await?;
        info!("Added search_text column to catalog_entries");
    }
    Ok(())
}

/// Fill `search_text` for rows that never had it written
///
/// A stored row always has a non-empty title, so an empty `search_text` means
/// the row predates the column.
async fn backfill_search_text(pool: &SqlitePool) -> Result<()> {
    let rows: Vec<(i64, String, String)> = sqlx::query_as(
        "SELECT id, title, composer FROM catalog_entries WHERE search_text = ''",
    )
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(());
    }

    for (id, title, composer) in &rows {
        sqlx::query("UPDATE catalog_entries SET search_text = ? WHERE id = ?")
            .bind(search_text(title, composer))
            .bind(id)
            .execute(pool)
            .await?;
    }
    info!("Backfilled search_text for {} catalog entries", rows.len());
    Ok(())
}
