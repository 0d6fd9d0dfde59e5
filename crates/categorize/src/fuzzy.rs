//! Token-set similarity scoring on a 0..=100 scale.

/// Levenshtein edit distance over chars, two-row O(min(m,n)) space.
/// Char-wise rather than byte-wise so Cyrillic input scores sensibly.
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Plain similarity ratio: 100 * (1 - distance / longer length).
fn ratio(a: &str, b: &str) -> f64 {
    let len = a.chars().count().max(b.chars().count());
    if len == 0 {
        return 0.0;
    }
    let dist = levenshtein_distance(a, b);
    (1.0 - dist as f64 / len as f64) * 100.0
}

/// Token-set similarity: tokenize both sides, split into the shared
/// intersection and each side's leftover tokens, and score the best of the
/// three pairwise comparisons. A key whose tokens are a superset of the
/// exemplar's scores 100 regardless of the extra tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let mut ta: Vec<&str> = a.split_whitespace().collect();
    let mut tb: Vec<&str> = b.split_whitespace().collect();
    ta.sort_unstable();
    ta.dedup();
    tb.sort_unstable();
    tb.dedup();

    let inter: Vec<&str> = ta.iter().filter(|t| tb.contains(t)).copied().collect();
    let only_a: Vec<&str> = ta.iter().filter(|t| !tb.contains(t)).copied().collect();
    let only_b: Vec<&str> = tb.iter().filter(|t| !ta.contains(t)).copied().collect();

    let sect = inter.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}
