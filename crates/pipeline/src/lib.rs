//! Orchestration over the leaf crates: the receipt check lifecycle state
//! machine, subscription catch-up, and the spend-by-category report.

pub mod fetcher;
pub mod lifecycle;
pub mod recurring;
pub mod reports;

pub use fetcher::{FetchError, Fetcher, MockFetcher};
pub use lifecycle::{extract_check_id, validate_check_url, CheckLifecycle, LifecycleError};
pub use recurring::apply_due_subscriptions;
pub use reports::{spend_by_category, CategorySpend, SpendReport};
