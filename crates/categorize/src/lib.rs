//! Product-name categorization: normalization, rule and fuzzy matching
//! against a seeded category taxonomy, with a persistent classification memo.

pub mod engine;
pub mod fuzzy;
pub mod normalize;
pub mod taxonomy;

pub use engine::{
    CategoryEngine, Classification, MemoCache, MemoEntry, Method, display_label,
    AUTO_THRESHOLD, OTHER_PATH, SUGGEST_THRESHOLD,
};
pub use fuzzy::token_set_ratio;
pub use normalize::normalize_key;
pub use taxonomy::{
    CategoryNode, Clock, PathMaps, SystemClock, TaxonomyCache, CATEGORY_PATHS,
};
