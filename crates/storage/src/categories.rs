//! Taxonomy nodes and the persistent classification memo.

use std::collections::HashMap;
use std::str::FromStr;

use cheq_categorize::{CategoryNode, MemoEntry, Method, CATEGORY_PATHS};

use crate::db::DbPool;

pub async fn load_nodes(pool: &DbPool) -> Result<Vec<CategoryNode>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i64, Option<i64>, String)>(
        "SELECT id, parent_id, name FROM categories ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, parent_id, name)| CategoryNode { id, parent_id, name })
        .collect())
}

/// Insert the seeded taxonomy, one node per distinct (name, parent) pair.
/// Idempotent: re-running against a seeded database inserts nothing.
pub async fn seed_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for path in CATEGORY_PATHS {
        let mut parent_id: Option<i64> = None;
        for name in *path {
            let existing = sqlx::query_as::<_, (i64,)>(
                "SELECT id FROM categories WHERE name = ? AND parent_id IS ?",
            )
            .bind(name)
            .bind(parent_id)
            .fetch_optional(pool)
            .await?;

            let id = match existing {
                Some((id,)) => id,
                None => {
                    let result =
                        sqlx::query("INSERT INTO categories (name, parent_id) VALUES (?, ?)")
                            .bind(name)
                            .bind(parent_id)
                            .execute(pool)
                            .await?;
                    result.last_insert_rowid()
                }
            };
            parent_id = Some(id);
        }
    }
    Ok(())
}

pub async fn load_memo(pool: &DbPool) -> Result<HashMap<String, MemoEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, i64, f64, String, Option<String>)>(
        "SELECT key, category_id, confidence, method, example_name FROM item_category_map",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(key, category_id, confidence, method, example_name)| {
            let method = Method::from_str(&method).ok()?;
            Some((key, MemoEntry { category_id, confidence, method, example_name }))
        })
        .collect())
}

/// Persist dirty memo entries. The conflict guard repeats the in-memory
/// no-downgrade rule so concurrent writers cannot lower a stored confidence.
pub async fn save_memo_entries(
    pool: &DbPool,
    entries: &[(String, MemoEntry)],
) -> Result<(), sqlx::Error> {
    for (key, entry) in entries {
        sqlx::query(
            r#"
            INSERT INTO item_category_map (key, category_id, confidence, method, example_name)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                category_id = excluded.category_id,
                confidence = excluded.confidence,
                method = excluded.method,
                example_name = excluded.example_name,
                updated_at = datetime('now')
            WHERE excluded.confidence > item_category_map.confidence
            "#,
        )
        .bind(key)
        .bind(entry.category_id)
        .bind(entry.confidence)
        .bind(entry.method.as_str())
        .bind(entry.example_name.as_deref())
        .execute(pool)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use cheq_categorize::PathMaps;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = connect("sqlite::memory:").await.unwrap();
        seed_categories(&pool).await.unwrap();
        let first = load_nodes(&pool).await.unwrap().len();
        seed_categories(&pool).await.unwrap();
        let second = load_nodes(&pool).await.unwrap().len();
        assert_eq!(first, second);
        // Every distinct prefix of every seeded path is one node.
        assert!(first > 20);
    }

    #[tokio::test]
    async fn seeded_paths_resolve() {
        let pool = connect("sqlite::memory:").await.unwrap();
        seed_categories(&pool).await.unwrap();
        let maps = PathMaps::build(&load_nodes(&pool).await.unwrap());
        assert!(maps.id_for(&["покупки", "алкоголь", "пиво"]).is_some());
        assert!(maps.id_for(&["покупки", "інші", "інші"]).is_some());
    }

    #[tokio::test]
    async fn memo_upsert_never_downgrades() {
        let pool = connect("sqlite::memory:").await.unwrap();
        seed_categories(&pool).await.unwrap();
        let maps = PathMaps::build(&load_nodes(&pool).await.unwrap());
        let beer = maps.id_for(&["покупки", "алкоголь", "пиво"]).unwrap();
        let other = maps.id_for(&["покупки", "інші", "інші"]).unwrap();

        save_memo_entries(
            &pool,
            &[(
                "пиво".to_string(),
                MemoEntry {
                    category_id: beer,
                    confidence: 1.0,
                    method: Method::Rule,
                    example_name: Some("Пиво".to_string()),
                },
            )],
        )
        .await
        .unwrap();

        save_memo_entries(
            &pool,
            &[(
                "пиво".to_string(),
                MemoEntry {
                    category_id: other,
                    confidence: 0.9,
                    method: Method::Fuzzy,
                    example_name: None,
                },
            )],
        )
        .await
        .unwrap();

        let memo = load_memo(&pool).await.unwrap();
        let entry = memo.get("пиво").unwrap();
        assert_eq!(entry.category_id, beer);
        assert_eq!(entry.confidence, 1.0);
        assert_eq!(entry.method, Method::Rule);
    }
}
