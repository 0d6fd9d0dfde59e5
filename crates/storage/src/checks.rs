//! Receipt check rows and their lifecycle flag transitions. All flag writes
//! are single guarded UPDATEs so concurrent callers cannot double-start work.

use cheq_core::ReceiptCheck;

use crate::db::{parse_dt, DbPool};

type CheckRow = (
    String,
    i64,
    String,
    i64,
    i64,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

const CHECK_COLUMNS: &str = "id, owner_id, source_url, founded, saved, finding, \
     error, xml_text, summary_json, created_at, updated_at";

fn row_to_check(r: CheckRow) -> ReceiptCheck {
    ReceiptCheck {
        id: r.0,
        owner_id: r.1,
        source_url: r.2,
        founded: r.3 != 0,
        saved: r.4 != 0,
        finding: r.5 != 0,
        error: r.6,
        xml_text: r.7,
        summary_json: r.8,
        created_at: parse_dt(&r.9),
        updated_at: parse_dt(&r.10),
    }
}

pub async fn get_check(pool: &DbPool, id: &str) -> Result<Option<ReceiptCheck>, sqlx::Error> {
    let row = sqlx::query_as::<_, CheckRow>(&format!(
        "SELECT {CHECK_COLUMNS} FROM receipt_checks WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_check))
}

/// Look up a check by id, creating it if absent. Registry ids are global,
/// so a second owner submitting the same receipt claims the existing row;
/// the reassignment is explicit here, never a silent side effect of writes.
pub async fn create_or_claim(
    pool: &DbPool,
    id: &str,
    owner_id: i64,
    source_url: &str,
) -> Result<ReceiptCheck, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO receipt_checks (id, owner_id, source_url)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            owner_id = excluded.owner_id,
            source_url = excluded.source_url,
            updated_at = datetime('now')
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(source_url)
    .execute(pool)
    .await?;

    // The row is guaranteed present after the upsert.
    get_check(pool, id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

/// Claim the finding flag. Returns false when the check is already being
/// fetched or already founded, in which case the caller must not start
/// another fetch.
pub async fn try_begin_finding(pool: &DbPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE receipt_checks
        SET finding = 1, error = NULL, updated_at = datetime('now')
        WHERE id = ? AND finding = 0 AND founded = 0
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Retrieval succeeded: store the raw text, clear the transient state.
pub async fn set_founded(pool: &DbPool, id: &str, xml_text: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE receipt_checks
        SET founded = 1, finding = 0, error = NULL, xml_text = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(xml_text)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Decoding succeeded: store the normalized summary.
pub async fn set_saved(pool: &DbPool, id: &str, summary_json: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE receipt_checks
        SET saved = 1, summary_json = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(summary_json)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// A fetch or parse attempt failed. `founded` is left as it was: a failed
/// parse of retrieved text keeps the text for a later retry.
pub async fn set_error(pool: &DbPool, id: &str, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE receipt_checks
        SET error = ?, finding = 0, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Client pasted the receipt text directly: upsert as founded, skipping the
/// fetch path entirely.
pub async fn upsert_from_client(
    pool: &DbPool,
    id: &str,
    owner_id: i64,
    source_url: &str,
    xml_text: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO receipt_checks (id, owner_id, source_url, founded, finding, xml_text)
        VALUES (?, ?, ?, 1, 0, ?)
        ON CONFLICT(id) DO UPDATE SET
            owner_id = excluded.owner_id,
            source_url = excluded.source_url,
            founded = 1,
            finding = 0,
            error = NULL,
            xml_text = excluded.xml_text,
            updated_at = datetime('now')
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(source_url)
    .bind(xml_text)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn checks_for_owner(
    pool: &DbPool,
    owner_id: i64,
) -> Result<Vec<ReceiptCheck>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CheckRow>(&format!(
        "SELECT {CHECK_COLUMNS} FROM receipt_checks WHERE owner_id = ? ORDER BY created_at"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_check).collect())
}

/// Saved summaries for one owner, as (check id, summary JSON) pairs.
pub async fn saved_summaries(
    pool: &DbPool,
    owner_id: i64,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT id, summary_json FROM receipt_checks
        WHERE owner_id = ? AND saved = 1 AND summary_json IS NOT NULL
        ORDER BY created_at
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}
