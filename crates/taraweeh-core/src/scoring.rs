//! Composite similarity scoring between transcript evidence and ayah entries.
//!
//! The composite blends a token-set ratio (word-bag agreement) with a partial
//! ratio (best infix run) across every match form of an entry; the overlap is
//! the fraction of the form's content words present in the query. Content
//! words exclude a small set of Arabic function words that would otherwise
//! inflate every comparison.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::domain::AyahEntry;
use crate::fuzz;

const TOKEN_SET_WEIGHT: f64 = 0.75;
const PARTIAL_WEIGHT: f64 = 0.25;

/// Single-token similarity floor for an anchor hit.
const ANCHOR_HIT_MIN: f64 = 85.0;
/// Short anchors (<= 3 letters) are too easy to hit; demand more.
const SHORT_ANCHOR_HIT_MIN: f64 = 89.0;

// Spelled the way they appear after normalization (الى/إلى fold to الي,
// على to علي).
static ARABIC_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "و", "ف", "ثم", "لا", "ما", "من", "في", "علي", "الي", "ب", "ل", "ان", "قد",
        "او", "الذي", "الذين", "هذا", "ذلك",
    ]
    .into_iter()
    .collect()
});

/// Tokens that carry matching signal: everything but the stopword set.
pub fn content_tokens(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .filter(|token| !ARABIC_STOPWORDS.contains(token))
        .collect()
}

/// Similarity between two short tokens, in `[0, 100]`.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Composite score and content-token overlap of `query` against the best
/// match form of `entry`.
pub fn score_against_entry(query: &str, entry: &AyahEntry) -> (f64, f64) {
    let mut top_score = -1.0;
    let mut top_overlap = 0.0;

    for form in &entry.match_forms {
        let token_set = fuzz::token_set_ratio(query, form);
        let partial = fuzz::partial_ratio(query, form);
        let composite = TOKEN_SET_WEIGHT * token_set + PARTIAL_WEIGHT * partial;
        if composite > top_score {
            top_score = composite;
            top_overlap = content_overlap(query, form);
        }
    }

    (top_score.max(0.0), top_overlap)
}

/// `|query_content ∩ form_content| / |form_content|`.
fn content_overlap(query: &str, form: &str) -> f64 {
    let query_tokens: HashSet<&str> = content_tokens(query).into_iter().collect();
    let form_tokens: HashSet<&str> = content_tokens(form).into_iter().collect();
    if query_tokens.is_empty() || form_tokens.is_empty() {
        return 0.0;
    }
    let shared = query_tokens.intersection(&form_tokens).count();
    shared as f64 / form_tokens.len() as f64
}

/// Distinctive tokens of a match form, used for onset anchoring. Prefers
/// long non-stopword tokens, falls back to 3-letter tokens, then everything.
pub fn anchor_tokens_for_form(form: &str) -> Vec<&str> {
    let tokens: Vec<&str> = form.split_whitespace().collect();
    if tokens.is_empty() {
        return tokens;
    }

    let strong: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|token| token.chars().count() >= 4 && !ARABIC_STOPWORDS.contains(token))
        .collect();
    if !strong.is_empty() {
        return strong;
    }

    let medium: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|token| token.chars().count() >= 3)
        .collect();
    if !medium.is_empty() {
        return medium;
    }

    tokens
}

/// True when some content token of `query` lands close to a content token of
/// any form of `entry`. Gates very short queries and earns a small bonus on
/// candidate scores.
pub fn has_anchor_hit(query: &str, entry: &AyahEntry) -> bool {
    let query_tokens = content_tokens(query);
    if query_tokens.is_empty() {
        return false;
    }

    for form in &entry.match_forms {
        for form_token in content_tokens(form) {
            let floor = if form_token.chars().count() <= 3 {
                SHORT_ANCHOR_HIT_MIN
            } else {
                ANCHOR_HIT_MIN
            };
            for query_token in &query_tokens {
                if token_similarity(query_token, form_token) >= floor {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(normalized: &str) -> AyahEntry {
        AyahEntry {
            surah_number: 2,
            surah: "Al-Baqara".to_string(),
            ayah: 2,
            text: normalized.to_string(),
            normalized: normalized.to_string(),
            match_forms: vec![normalized.to_string()],
        }
    }

    #[test]
    fn test_self_score_is_near_perfect() {
        let entry = entry("ذلك الكتاب لا ريب فيه هدي للمتقين");
        let (score, overlap) = score_against_entry(&entry.normalized, &entry);
        assert!(score >= 99.0, "score = {score}");
        assert!((overlap - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        let entry = entry("ذلك الكتاب لا ريب فيه هدي للمتقين");
        let (score, overlap) = score_against_entry("قل هو الله احد", &entry);
        assert!(score < 60.0, "score = {score}");
        assert!(overlap < 0.3);
    }

    #[test]
    fn test_overlap_counts_content_words_only() {
        let entry = entry("ذلك الكتاب لا ريب فيه");
        // Content words of the form: الكتاب, ريب, فيه (stopwords ذلك and لا drop).
        let (_, overlap) = score_against_entry("الكتاب فيه شيء", &entry);
        assert!((overlap - 2.0 / 3.0).abs() < 1e-9, "overlap = {overlap}");
    }

    #[test]
    fn test_anchor_tokens_prefer_strong_words() {
        let anchors = anchor_tokens_for_form("ذلك الكتاب لا ريب فيه");
        assert!(anchors.contains(&"الكتاب"));
        assert!(!anchors.contains(&"لا"));
    }

    #[test]
    fn test_anchor_tokens_fall_back_for_short_forms() {
        assert_eq!(anchor_tokens_for_form("يس"), vec!["يس"]);
    }

    #[test]
    fn test_anchor_hit_on_close_token() {
        let entry = entry("الرحمن علم القران");
        assert!(has_anchor_hit("علم القران شيء", &entry));
        assert!(!has_anchor_hit("ذهب الولد الي", &entry));
    }

    #[test]
    fn test_muqattaat_spoken_form_scores_high() {
        let mut opener = entry("الم");
        opener.ayah = 1;
        opener.match_forms = vec!["الم".to_string(), "الف لام ميم".to_string()];
        let (score, _) = score_against_entry("الف لام ميم", &opener);
        assert!(score >= 99.0);
    }
}
