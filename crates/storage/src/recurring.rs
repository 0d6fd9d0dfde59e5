//! Subscriptions and the transactions they materialize.
//!
//! Catch-up advances are guarded by the subscription's version counter:
//! two racing invocations both compute the same advance, but only the one
//! whose UPDATE still sees the expected version inserts transactions.

use std::str::FromStr;

use chrono::NaiveDate;
use cheq_core::{money_str, RecurrencePeriod, Subscription, Transaction};
use rust_decimal::Decimal;

use crate::db::{parse_dt, DbPool};

// Too many columns for sqlx's tuple rows, so this one is a derived struct.
#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    owner_id: i64,
    name: Option<String>,
    amount: String,
    category: Option<String>,
    note: Option<String>,
    payment_method: Option<String>,
    merchant: Option<String>,
    is_income: i64,
    period: String,
    anchor_day: i64,
    anchor_month: i64,
    next_run_date: Option<String>,
    last_run_date: Option<String>,
    is_active: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

const SUBSCRIPTION_COLUMNS: &str = "id, owner_id, name, amount, category, note, \
     payment_method, merchant, is_income, period, anchor_day, anchor_month, \
     next_run_date, last_run_date, is_active, version, created_at, updated_at";

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn row_to_subscription(r: SubscriptionRow) -> Subscription {
    Subscription {
        id: r.id,
        owner_id: r.owner_id,
        name: r.name,
        amount: Decimal::from_str(&r.amount).unwrap_or(Decimal::ZERO),
        category: r.category,
        note: r.note,
        payment_method: r.payment_method,
        merchant: r.merchant,
        is_income: r.is_income != 0,
        period: RecurrencePeriod::from_str(&r.period).unwrap_or(RecurrencePeriod::Monthly),
        anchor_day: r.anchor_day as u32,
        anchor_month: r.anchor_month as u32,
        next_run_date: parse_date(r.next_run_date),
        last_run_date: parse_date(r.last_run_date),
        is_active: r.is_active != 0,
        version: r.version,
        created_at: parse_dt(&r.created_at),
        updated_at: parse_dt(&r.updated_at),
    }
}

pub async fn insert_subscription(
    pool: &DbPool,
    sub: &Subscription,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO subscriptions
            (owner_id, name, amount, category, note, payment_method, merchant,
             is_income, period, anchor_day, anchor_month,
             next_run_date, last_run_date, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sub.owner_id)
    .bind(sub.name.as_deref())
    .bind(money_str(sub.amount))
    .bind(sub.category.as_deref())
    .bind(sub.note.as_deref())
    .bind(sub.payment_method.as_deref())
    .bind(sub.merchant.as_deref())
    .bind(sub.is_income as i64)
    .bind(sub.period.to_string())
    .bind(sub.anchor_day as i64)
    .bind(sub.anchor_month as i64)
    .bind(sub.next_run_date.map(|d| d.to_string()))
    .bind(sub.last_run_date.map(|d| d.to_string()))
    .bind(sub.is_active as i64)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_subscription(
    pool: &DbPool,
    id: i64,
) -> Result<Option<Subscription>, sqlx::Error> {
    let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_subscription))
}

/// Active subscriptions for one owner whose next run date is at or before
/// `today`. ISO date text compares correctly as text.
pub async fn due_subscriptions(
    pool: &DbPool,
    owner_id: i64,
    today: NaiveDate,
) -> Result<Vec<Subscription>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
        r#"
        SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
        WHERE owner_id = ? AND is_active = 1
          AND next_run_date IS NOT NULL AND next_run_date <= ?
        ORDER BY id
        "#
    ))
    .bind(owner_id)
    .bind(today.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_subscription).collect())
}

/// Move a subscription forward and insert the transactions materialized for
/// the periods it covered, atomically. Returns false without writing
/// anything when the stored version no longer matches `expected_version`,
/// meaning another invocation already performed this advance.
pub async fn advance_subscription(
    pool: &DbPool,
    subscription_id: i64,
    expected_version: i64,
    new_next: Option<NaiveDate>,
    new_last: Option<NaiveDate>,
    transactions: &[Transaction],
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE subscriptions
        SET next_run_date = ?, last_run_date = ?, version = version + 1,
            updated_at = datetime('now')
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(new_next.map(|d| d.to_string()))
    .bind(new_last.map(|d| d.to_string()))
    .bind(subscription_id)
    .bind(expected_version)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    for t in transactions {
        sqlx::query(
            r#"
            INSERT INTO transactions
                (owner_id, subscription_id, check_id, amount, receipt_date,
                 merchant, kind, is_income, category, note, payment_method)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(t.owner_id)
        .bind(t.subscription_id)
        .bind(t.check_id.as_deref())
        .bind(money_str(t.amount))
        .bind(t.receipt_date.as_deref())
        .bind(t.merchant.as_deref())
        .bind(&t.kind)
        .bind(t.is_income as i64)
        .bind(t.category.as_deref())
        .bind(t.note.as_deref())
        .bind(t.payment_method.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

type TransactionRow = (
    i64,
    i64,
    Option<i64>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

pub async fn transactions_for_owner(
    pool: &DbPool,
    owner_id: i64,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT id, owner_id, subscription_id, check_id, amount, receipt_date,
               merchant, kind, is_income, category, note, payment_method,
               created_at, updated_at
        FROM transactions WHERE owner_id = ? ORDER BY id
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Transaction {
            id: r.0,
            owner_id: r.1,
            subscription_id: r.2,
            check_id: r.3,
            amount: Decimal::from_str(&r.4).unwrap_or(Decimal::ZERO),
            receipt_date: r.5,
            merchant: r.6,
            kind: r.7,
            is_income: r.8 != 0,
            category: r.9,
            note: r.10,
            payment_method: r.11,
            created_at: parse_dt(&r.12),
            updated_at: parse_dt(&r.13),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn sample_subscription() -> Subscription {
        Subscription {
            id: 0,
            owner_id: 1,
            name: Some("Оренда".into()),
            amount: dec!(8500.00),
            category: Some("житло".into()),
            note: None,
            payment_method: Some("картка".into()),
            merchant: None,
            is_income: false,
            period: RecurrencePeriod::Monthly,
            anchor_day: 31,
            anchor_month: 1,
            next_run_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            last_run_date: None,
            is_active: true,
            version: 0,
            created_at: NaiveDateTime::MIN,
            updated_at: NaiveDateTime::MIN,
        }
    }

    fn materialized(owner_id: i64, subscription_id: i64, date: NaiveDate) -> Transaction {
        Transaction {
            id: 0,
            owner_id,
            subscription_id: Some(subscription_id),
            check_id: None,
            amount: dec!(8500.00),
            receipt_date: Some(date.to_string()),
            merchant: None,
            kind: "subscription".into(),
            is_income: false,
            category: Some("житло".into()),
            note: None,
            payment_method: Some("картка".into()),
            created_at: NaiveDateTime::MIN,
            updated_at: NaiveDateTime::MIN,
        }
    }

    #[tokio::test]
    async fn roundtrips_subscription_fields() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let id = insert_subscription(&pool, &sample_subscription()).await.unwrap();

        let sub = get_subscription(&pool, id).await.unwrap().unwrap();
        assert_eq!(sub.amount, dec!(8500.00));
        assert_eq!(sub.period, RecurrencePeriod::Monthly);
        assert_eq!(sub.anchor_day, 31);
        assert_eq!(sub.next_run_date, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(sub.version, 0);
    }

    #[tokio::test]
    async fn due_filter_is_inclusive_of_today() {
        let pool = connect("sqlite::memory:").await.unwrap();
        insert_subscription(&pool, &sample_subscription()).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(due_subscriptions(&pool, 1, today).await.unwrap().len(), 1);

        let before = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        assert!(due_subscriptions(&pool, 1, before).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_version_advance_writes_nothing() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let id = insert_subscription(&pool, &sample_subscription()).await.unwrap();
        let next = NaiveDate::from_ymd_opt(2024, 2, 29);
        let run_date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        let won = advance_subscription(
            &pool,
            id,
            0,
            next,
            Some(run_date),
            &[materialized(1, id, run_date)],
        )
        .await
        .unwrap();
        assert!(won);

        // A second caller that computed the same advance loses the race.
        let lost = advance_subscription(
            &pool,
            id,
            0,
            next,
            Some(run_date),
            &[materialized(1, id, run_date)],
        )
        .await
        .unwrap();
        assert!(!lost);

        let txs = transactions_for_owner(&pool, 1).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].receipt_date.as_deref(), Some("2024-01-31"));

        let sub = get_subscription(&pool, id).await.unwrap().unwrap();
        assert_eq!(sub.version, 1);
        assert_eq!(sub.next_run_date, next);
    }
}
