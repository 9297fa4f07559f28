//! Fuzzy string primitives over normalized Arabic text.
//!
//! Three functions in the classic fuzzy-matching shape: a whole-string indel
//! ratio, an infix (partial) ratio that lets the shorter string float inside
//! the longer one, and a token-set ratio that ignores word order and
//! duplication. All return similarity in `[0.0, 100.0]`.

use std::collections::BTreeSet;

/// Whole-string similarity: `100 * 2*LCS / (|a| + |b|)`.
///
/// Both strings empty compares as identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs = lcs_len(&a, &b);
    100.0 * (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}

/// Infix similarity: the shorter string aligned against the best-matching
/// substring of the longer one (leading and trailing characters of the longer
/// string are free). `100` when the shorter string occurs verbatim.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let distance = infix_indel_distance(short, long);
    let denom = (2 * short.len()) as f64;
    (100.0 * (1.0 - distance as f64 / denom)).clamp(0.0, 100.0)
}

/// Order- and duplication-insensitive similarity over whitespace tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 100.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let base = common.join(" ");
    let joined_a = join_with_base(&base, &only_a);
    let joined_b = join_with_base(&base, &only_b);

    ratio(&base, &joined_a)
        .max(ratio(&base, &joined_b))
        .max(ratio(&joined_a, &joined_b))
}

fn join_with_base(base: &str, rest: &[&str]) -> String {
    if rest.is_empty() {
        return base.to_string();
    }
    if base.is_empty() {
        return rest.join(" ");
    }
    let mut out = String::with_capacity(base.len() + rest.iter().map(|t| t.len() + 1).sum::<usize>());
    out.push_str(base);
    for token in rest {
        out.push(' ');
        out.push_str(token);
    }
    out
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Minimal indel distance between `short` and any substring of `long`
/// (Sellers-style infix alignment; a mismatch costs one delete plus one
/// insert).
fn infix_indel_distance(short: &[char], long: &[char]) -> usize {
    let mut prev: Vec<usize> = vec![0; long.len() + 1];
    let mut current: Vec<usize> = vec![0; long.len() + 1];
    for (i, &cs) in short.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cl) in long.iter().enumerate() {
            let diag = prev[j] + if cs == cl { 0 } else { 2 };
            current[j + 1] = diag.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev.into_iter().min().unwrap_or(0)
}
