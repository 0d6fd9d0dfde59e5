//! Product-name canonicalization.
//!
//! Registry item names arrive as cashier shorthand: lot prefixes, packaging
//! codes, weights and volumes glued to words. Normalization lowercases,
//! splits digits from letters, expands the common abbreviations and drops
//! unit tokens, so that "1234#Пиво Оболонь 0,5л ж/б" and "Пиво Оболонь"
//! produce the same key.

use regex::Regex;
use std::sync::OnceLock;

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_lot_prefix, r"^\d+#");
re!(re_glass_jar, r"\bж/б\b");
re!(re_glass_bottle, r"\bс/б\b");
re!(re_tetra_pack, r"\bт/п\b");
re!(re_alias_kovbasa, r"\bк[-–—]?са\b");
re!(re_alias_lavash, r"\bлав\b");
re!(re_alias_napii, r"\bнап\b");
re!(re_alias_marynovani, r"\bмар\.?\b");
re!(re_punct, r"[\./,_\-+%()\[\]{}:;|\\]");
re!(re_bare_number, r"\b\d+[.,]?\d*\b");

const STOP_TOKENS: [&str; 11] = [
    "кг", "г", "гр", "л", "мл", "шт", "ваг", "пет", "жб", "сб", "тп",
];

/// Insert a space at every digit/non-digit boundary: "0,5л" -> "0,5 л".
fn split_digit_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if let Some(p) = prev {
            if p.is_ascii_digit() != c.is_ascii_digit() {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}

/// Canonicalize a raw product name into its classification key.
/// Idempotent; an empty or all-noise input yields an empty key.
pub fn normalize_key(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let text = value.to_lowercase();
    let text = re_lot_prefix().replace(text.trim(), "");
    let text = split_digit_runs(&text);
    let text = re_glass_jar().replace_all(&text, "жб");
    let text = re_glass_bottle().replace_all(&text, "сб");
    let text = re_tetra_pack().replace_all(&text, "тп");
    let text = re_alias_kovbasa().replace_all(&text, "ковбаса");
    let text = re_alias_lavash().replace_all(&text, "лаваш");
    let text = re_alias_napii().replace_all(&text, "напій");
    let text = re_alias_marynovani().replace_all(&text, "мариновані");
    let text = re_punct().replace_all(&text, " ");
    let text = re_bare_number().replace_all(&text, " ");

    text.split_whitespace()
        .filter(|t| !STOP_TOKENS.contains(t))
        .collect::<Vec<_>>()
        .join(" ")
}
