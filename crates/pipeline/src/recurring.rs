//! Catch-up materialization for recurring subscriptions.

use chrono::{NaiveDate, NaiveDateTime};
use cheq_core::{next_occurrence, Subscription, Transaction, MAX_CATCHUP_RUNS};
use cheq_storage::{recurring, DbPool};
use tracing::{debug, info};

fn materialize(sub: &Subscription, run_date: NaiveDate) -> Transaction {
    Transaction {
        id: 0,
        owner_id: sub.owner_id,
        subscription_id: Some(sub.id),
        check_id: None,
        amount: sub.amount,
        receipt_date: Some(run_date.to_string()),
        merchant: sub.merchant.clone(),
        kind: if sub.is_income { "income".to_string() } else { "subscription".to_string() },
        is_income: sub.is_income,
        category: sub.category.clone(),
        note: sub.note.clone(),
        payment_method: sub.payment_method.clone(),
        created_at: NaiveDateTime::MIN,
        updated_at: NaiveDateTime::MIN,
    }
}

/// Bring every overdue subscription of one owner up to date: one transaction
/// per missed period, dated at that period's run date, at most
/// [`MAX_CATCHUP_RUNS`] periods per invocation. A subscription left overdue
/// by the cap is picked up again on the next invocation.
///
/// Each subscription's advance is version-guarded, so two concurrent
/// invocations never materialize the same period twice; the loser simply
/// skips the subscription. Returns the number of transactions written.
pub async fn apply_due_subscriptions(
    pool: &DbPool,
    owner_id: i64,
    today: NaiveDate,
) -> Result<u32, sqlx::Error> {
    let due = recurring::due_subscriptions(pool, owner_id, today).await?;

    let mut written = 0u32;
    for sub in due {
        let Some(first_run) = sub.next_run_date else {
            continue;
        };

        let mut next = first_run;
        let mut last = sub.last_run_date;
        let mut batch = Vec::new();
        while next <= today && (batch.len() as u32) < MAX_CATCHUP_RUNS {
            batch.push(materialize(&sub, next));
            last = Some(next);
            next = next_occurrence(next, sub.anchor_day, sub.anchor_month, sub.period);
        }
        if batch.is_empty() {
            continue;
        }

        let advanced = recurring::advance_subscription(
            pool,
            sub.id,
            sub.version,
            Some(next),
            last,
            &batch,
        )
        .await?;

        if advanced {
            info!(subscription_id = sub.id, periods = batch.len(), "caught up subscription");
            written += batch.len() as u32;
        } else {
            debug!(subscription_id = sub.id, "catch-up lost version race, skipping");
        }
    }

    Ok(written)
}
