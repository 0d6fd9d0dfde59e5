//! Spend-by-category aggregation over an owner's parsed receipts.

use std::collections::HashMap;

use cheq_categorize::{
    display_label, CategoryEngine, MemoCache, PathMaps, TaxonomyCache,
};
use cheq_core::parse_amount;
use cheq_decoder::ReceiptSummary;
use cheq_storage::{categories, checks, DbPool};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySpend {
    pub label: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendReport {
    pub currency: String,
    pub total: Decimal,
    pub categories: Vec<CategorySpend>,
}

async fn taxonomy_maps(
    pool: &DbPool,
    taxonomy: &TaxonomyCache,
) -> Result<Arc<PathMaps>, sqlx::Error> {
    if let Some(maps) = taxonomy.get() {
        return Ok(maps);
    }
    let nodes = categories::load_nodes(pool).await?;
    Ok(taxonomy.store(PathMaps::build(&nodes)))
}

/// Aggregate item spend across every saved receipt of one owner, grouped by
/// the classified category's display label. Item sums are preferred; price
/// times quantity is the fallback. Classifications memoized along the way
/// are flushed to storage once, at the end.
pub async fn spend_by_category(
    pool: &DbPool,
    engine: &CategoryEngine,
    taxonomy: &TaxonomyCache,
    owner_id: i64,
) -> Result<SpendReport, ReportError> {
    let maps = taxonomy_maps(pool, taxonomy).await?;
    let mut memo = MemoCache::from_entries(categories::load_memo(pool).await?);

    let mut totals: HashMap<String, Decimal> = HashMap::new();
    let mut currency = "UAH".to_string();

    for (_check_id, summary_json) in checks::saved_summaries(pool, owner_id).await? {
        let Ok(summary) = serde_json::from_str::<ReceiptSummary>(&summary_json) else {
            continue;
        };
        currency = summary.currency.clone();

        for item in &summary.items {
            let Some(name) = item.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
            else {
                continue;
            };
            let Some(amount) = item_amount(item) else {
                continue;
            };

            let classified = engine.classify(&mut memo, &maps, name);
            let label = classified
                .category_id
                .and_then(|id| maps.path_for(id))
                .map(display_label)
                .unwrap_or_else(|| display_label(&[]));

            *totals.entry(label).or_insert(Decimal::ZERO) += amount;
        }
    }

    let dirty = memo.drain_dirty();
    if !dirty.is_empty() {
        categories::save_memo_entries(pool, &dirty).await?;
    }

    let total: Decimal = totals.values().copied().sum();
    let mut categories: Vec<CategorySpend> = totals
        .into_iter()
        .map(|(label, total)| CategorySpend { label, total })
        .collect();
    categories.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.label.cmp(&b.label)));

    Ok(SpendReport { currency, total, categories })
}

fn item_amount(item: &cheq_decoder::SummaryItem) -> Option<Decimal> {
    if let Some(sum) = item.sum.as_deref().and_then(parse_amount) {
        return Some(sum);
    }
    let price = item.price.as_deref().and_then(parse_amount)?;
    // Quantities keep their full precision; only the product is money.
    let qty: Decimal = item.qty.as_deref()?.trim().replace(',', ".").parse().ok()?;
    Some((price * qty).round_dp(2))
}
