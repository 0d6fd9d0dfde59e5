use chrono::NaiveDateTime;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    // mode=rwc so a first run creates the database file.
    connect(&format!("sqlite:{}?mode=rwc", path.display())).await
}

/// Open a pool on the given sqlx URL (`sqlite:path` or `sqlite::memory:`),
/// apply the pragmas and run migrations. A single connection keeps writer
/// ordering trivial under SQLite.
pub async fn connect(url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipt_checks (
            id TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            source_url TEXT NOT NULL DEFAULT '',
            founded INTEGER NOT NULL DEFAULT 0,
            saved INTEGER NOT NULL DEFAULT 0,
            finding INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            xml_text TEXT,
            summary_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            parent_id INTEGER,
            FOREIGN KEY (parent_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_category_map (
            key TEXT PRIMARY KEY,
            category_id INTEGER NOT NULL,
            confidence REAL NOT NULL,
            method TEXT NOT NULL,
            example_name TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            name TEXT,
            amount TEXT NOT NULL,
            category TEXT,
            note TEXT,
            payment_method TEXT,
            merchant TEXT,
            is_income INTEGER NOT NULL DEFAULT 0,
            period TEXT NOT NULL,
            anchor_day INTEGER NOT NULL,
            anchor_month INTEGER NOT NULL DEFAULT 1,
            next_run_date TEXT,
            last_run_date TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            subscription_id INTEGER,
            check_id TEXT,
            amount TEXT NOT NULL,
            receipt_date TEXT,
            merchant TEXT,
            kind TEXT NOT NULL,
            is_income INTEGER NOT NULL DEFAULT 0,
            category TEXT,
            note TEXT,
            payment_method TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (subscription_id) REFERENCES subscriptions(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Timestamps come back as `datetime('now')` text.
pub(crate) fn parse_dt(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap_or(NaiveDateTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_db_makes_the_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cheq.db");
        let pool = create_db(&path).await.unwrap();
        assert!(path.exists());

        // Migrations ran; the checks table is queryable.
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM receipt_checks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[test]
    fn timestamps_parse_sqlite_format() {
        assert_eq!(parse_dt("2024-01-15 12:30:45").to_string(), "2024-01-15 12:30:45");
        assert_eq!(parse_dt("garbage"), NaiveDateTime::MIN);
    }
}
