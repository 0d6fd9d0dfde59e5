//! The classification engine: memo lookup, then keyword rules, then fuzzy
//! matching against exemplar terms.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::fuzzy::token_set_ratio;
use crate::normalize::normalize_key;
use crate::taxonomy::PathMaps;

/// Fuzzy score at or above which a classification is trusted and memoized.
pub const AUTO_THRESHOLD: f64 = 90.0;
/// Fuzzy score at or above which a category is suggested for this call only.
pub const SUGGEST_THRESHOLD: f64 = 75.0;

/// Fallback bucket for keys nothing else matches.
pub const OTHER_PATH: &[&str] = &["покупки", "інші", "інші"];

/// Ordered keyword rules: the first rule with any keyword contained in the
/// normalized key wins. Earlier rules shadow later ones.
const RULES: &[(&[&str], &[&str])] = &[
    (&["пиво"], &["покупки", "алкоголь", "пиво"]),
    (&["вино"], &["покупки", "алкоголь", "вино"]),
    (&["вода"], &["покупки", "напої", "вода"]),
    (&["сік", "нектар", "напій"], &["покупки", "напої", "сік"]),
    (&["йогурт", "молоко", "смет", "сир", "сирок"], &["покупки", "продукти", "молочні"]),
    (&["огірк", "томат", "помідор", "капуст", "моркв"], &["покупки", "продукти", "овочі"]),
    (&["виноград", "нектарин", "банан"], &["покупки", "продукти", "фрукти"]),
    (&["мариновані", "конс", "горошок конс"], &["покупки", "продукти", "консерви"]),
    (&["хліб", "лаваш", "хлібці"], &["покупки", "продукти", "хліб"]),
    (&["ковбас", "балик", "кур", "скумбр", "осел"], &["покупки", "продукти", "м'ясо та риба"]),
    (&["пакет"], &["покупки", "побут", "пакети"]),
    (&["серветк"], &["покупки", "побут", "серветки"]),
    (&["чіпси"], &["покупки", "снеки", "чіпси"]),
    (&["шоколад"], &["покупки", "продукти", "солодощі", "шоколад"]),
    (&["драже"], &["покупки", "продукти", "солодощі", "цукерки"]),
    (&["бісквіт"], &["покупки", "продукти", "солодощі", "печиво"]),
];

/// Exemplar terms for fuzzy matching, each carrying its category path.
const ETALONS: &[(&str, &[&str])] = &[
    ("пиво", &["покупки", "алкоголь", "пиво"]),
    ("вино", &["покупки", "алкоголь", "вино"]),
    ("вода", &["покупки", "напої", "вода"]),
    ("сік", &["покупки", "напої", "сік"]),
    ("йогурт", &["покупки", "продукти", "молочні"]),
    ("молоко", &["покупки", "продукти", "молочні"]),
    ("сир", &["покупки", "продукти", "молочні"]),
    ("огірок", &["покупки", "продукти", "овочі"]),
    ("помідор", &["покупки", "продукти", "овочі"]),
    ("капуста", &["покупки", "продукти", "овочі"]),
    ("морква", &["покупки", "продукти", "овочі"]),
    ("виноград", &["покупки", "продукти", "фрукти"]),
    ("нектарин", &["покупки", "продукти", "фрукти"]),
    ("пакет", &["покупки", "побут", "пакети"]),
    ("серветки", &["покупки", "побут", "серветки"]),
    ("чіпси", &["покупки", "снеки", "чіпси"]),
    ("шоколад", &["покупки", "продукти", "солодощі", "шоколад"]),
    ("лаваш", &["покупки", "продукти", "хліб"]),
    ("ковбаса", &["покупки", "продукти", "м'ясо та риба"]),
    ("мариновані огірки", &["покупки", "продукти", "консерви"]),
];

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Rule,
    Fuzzy,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Rule => "rule",
            Method::Fuzzy => "fuzzy",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(Method::Rule),
            "fuzzy" => Ok(Method::Fuzzy),
            other => Err(format!("unknown classification method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub key: String,
    pub category_id: Option<i64>,
    pub confidence: f64,
    pub method: Method,
}

// ── Memo cache ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MemoEntry {
    pub category_id: i64,
    pub confidence: f64,
    pub method: Method,
    pub example_name: Option<String>,
}

/// In-memory view of the persistent key→category memo. Newly written keys
/// accumulate as dirty until a caller drains them into storage.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<String, MemoEntry>,
    dirty: Vec<String>,
}

impl MemoCache {
    pub fn new() -> MemoCache {
        MemoCache::default()
    }

    pub fn from_entries(entries: HashMap<String, MemoEntry>) -> MemoCache {
        MemoCache { entries, dirty: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&MemoEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a classification. An existing entry with equal or higher
    /// confidence is kept; a memoized key is never downgraded.
    pub fn record(&mut self, key: &str, entry: MemoEntry) {
        if let Some(existing) = self.entries.get(key) {
            if existing.confidence >= entry.confidence {
                return;
            }
        }
        self.entries.insert(key.to_string(), entry);
        if !self.dirty.iter().any(|k| k == key) {
            self.dirty.push(key.to_string());
        }
    }

    /// Drain the keys written since the last drain, with their entries.
    pub fn drain_dirty(&mut self) -> Vec<(String, MemoEntry)> {
        let keys = std::mem::take(&mut self.dirty);
        keys.into_iter()
            .filter_map(|k| self.entries.get(&k).cloned().map(|e| (k, e)))
            .collect()
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Stateless classifier over the static rule and exemplar tables. The only
/// state is a counter of fuzzy evaluations, used to observe memo hits.
#[derive(Debug, Default)]
pub struct CategoryEngine {
    fuzzy_calls: AtomicU64,
}

impl CategoryEngine {
    pub fn new() -> CategoryEngine {
        CategoryEngine::default()
    }

    /// How many times the fuzzy matcher has run since construction.
    pub fn fuzzy_call_count(&self) -> u64 {
        self.fuzzy_calls.load(Ordering::SeqCst)
    }

    /// Classify one raw product name. Tiers, in order: memo hit, keyword
    /// rule (confidence 1.0, always memoized), fuzzy exemplar match
    /// (memoized only at or above [`AUTO_THRESHOLD`]).
    pub fn classify(
        &self,
        memo: &mut MemoCache,
        paths: &PathMaps,
        raw_name: &str,
    ) -> Classification {
        let key = normalize_key(raw_name);
        if key.is_empty() {
            return Classification {
                key,
                category_id: None,
                confidence: 0.0,
                method: Method::Rule,
            };
        }

        if let Some(hit) = memo.get(&key) {
            return Classification {
                key,
                category_id: Some(hit.category_id),
                confidence: hit.confidence,
                method: hit.method,
            };
        }

        if let Some(path) = rule_category(&key) {
            let category_id = paths.id_for(path);
            if let Some(id) = category_id {
                memo.record(
                    &key,
                    MemoEntry {
                        category_id: id,
                        confidence: 1.0,
                        method: Method::Rule,
                        example_name: Some(raw_name.to_string()),
                    },
                );
            }
            return Classification {
                key,
                category_id,
                confidence: 1.0,
                method: Method::Rule,
            };
        }

        self.fuzzy_calls.fetch_add(1, Ordering::SeqCst);
        let (fuzzy_path, score) = fuzzy_category(&key);
        let confidence = score.round() / 100.0;

        let category_id = match fuzzy_path {
            Some(path) if score >= SUGGEST_THRESHOLD => paths.id_for(path),
            _ => paths.id_for(OTHER_PATH),
        };

        if score >= AUTO_THRESHOLD {
            if let Some(id) = category_id {
                debug!(key = %key, score, "memoizing fuzzy classification");
                memo.record(
                    &key,
                    MemoEntry {
                        category_id: id,
                        confidence,
                        method: Method::Fuzzy,
                        example_name: Some(raw_name.to_string()),
                    },
                );
            }
        }

        Classification {
            key,
            category_id,
            confidence,
            method: Method::Fuzzy,
        }
    }
}

fn rule_category(normalized: &str) -> Option<&'static [&'static str]> {
    for (keywords, path) in RULES {
        for kw in *keywords {
            if normalized.contains(kw) {
                return Some(path);
            }
        }
    }
    None
}

fn fuzzy_category(normalized: &str) -> (Option<&'static [&'static str]>, f64) {
    let mut best: (Option<&'static [&'static str]>, f64) = (None, 0.0);
    for (term, path) in ETALONS {
        let score = token_set_ratio(normalized, term);
        if score > best.1 {
            best = (Some(path), score);
        }
    }
    best
}

/// Human-facing label for a category path: its first two segments.
pub fn display_label(path: &[String]) -> String {
    if path.is_empty() {
        return OTHER_PATH[..2].join(" / ");
    }
    path.iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" / ")
}
