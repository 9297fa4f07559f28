//! Marker onset refinement.
//!
//! The primary path aligns the transcript words behind an accepted candidate
//! against the canonical tokens of the matched form (gap-penalized global
//! alignment) and takes the matched words' time extent. When the alignment
//! is too thin to trust, the earliest word resembling an anchor token wins;
//! failing that, the evidence window itself.

use crate::domain::AyahEntry;
use crate::fuzz;
use crate::scoring;
use crate::transcript::PreparedWord;

use super::candidates::CandidateEvidence;

const GAP_PENALTY: f64 = -0.45;
const MISMATCH_SCORE: f64 = -0.55;
const MATCH_THRESHOLD: f64 = 0.62;
const MIN_AVG_SIMILARITY: f64 = 0.6;
const MIN_COVERAGE: f64 = 0.2;
const ANCHOR_FALLBACK_MIN: f64 = 80.0;

/// The refined time window for a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct OnsetResolution {
    pub start_time: i64,
    pub end_time: i64,
    pub matched_token_indices: Option<Vec<(u32, u32)>>,
}

/// Refine the onset of `evidence` against `entry` using the words of the
/// evidence's segment range.
pub fn resolve_onset(
    words: &[PreparedWord],
    entry: &AyahEntry,
    evidence: &CandidateEvidence,
) -> OnsetResolution {
    let form = best_form(&evidence.text, entry);
    let canonical: Vec<&str> = form.split_whitespace().collect();

    if let Some(resolution) = align_tokens(words, &canonical) {
        return resolution;
    }

    if let Some(start_time) = earliest_anchor_word(words, entry) {
        return OnsetResolution {
            start_time,
            end_time: (evidence.end.round() as i64).max(start_time),
            matched_token_indices: None,
        };
    }

    let start_time = evidence.start.round() as i64;
    OnsetResolution {
        start_time,
        end_time: (evidence.end.round() as i64).max(start_time),
        matched_token_indices: None,
    }
}

/// The match form of `entry` that best explains `query`.
fn best_form<'a>(query: &str, entry: &'a AyahEntry) -> &'a str {
    entry
        .match_forms
        .iter()
        .map(|form| {
            let composite = 0.75 * fuzz::token_set_ratio(query, form)
                + 0.25 * fuzz::partial_ratio(query, form);
            (form, composite)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(form, _)| form.as_str())
        .unwrap_or(entry.normalized.as_str())
}

/// Needleman-Wunsch-style global alignment of transcript words against
/// canonical tokens. Returns `None` when the alignment is too sparse or too
/// dissimilar to trust.
fn align_tokens(words: &[PreparedWord], canonical: &[&str]) -> Option<OnsetResolution> {
    if words.is_empty() || canonical.is_empty() {
        return None;
    }

    let m = words.len();
    let n = canonical.len();

    let mut similarity = vec![vec![0.0f64; n]; m];
    for (i, word) in words.iter().enumerate() {
        for (j, token) in canonical.iter().enumerate() {
            similarity[i][j] = fuzz::partial_ratio(&word.normalized, token) / 100.0;
        }
    }

    let mut dp = vec![vec![0.0f64; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i as f64 * GAP_PENALTY;
    }
    for j in 0..=n {
        dp[0][j] = j as f64 * GAP_PENALTY;
    }
    for i in 1..=m {
        for j in 1..=n {
            let sim = similarity[i - 1][j - 1];
            let pair = if sim >= MATCH_THRESHOLD {
                sim
            } else {
                MISMATCH_SCORE
            };
            dp[i][j] = (dp[i - 1][j - 1] + pair)
                .max(dp[i - 1][j] + GAP_PENALTY)
                .max(dp[i][j - 1] + GAP_PENALTY);
        }
    }

    // Traceback, collecting diagonal steps that were real matches.
    let mut pairs: Vec<(u32, u32)> = Vec::new();
    let mut similarity_sum = 0.0;
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        let sim = similarity[i - 1][j - 1];
        let pair = if sim >= MATCH_THRESHOLD {
            sim
        } else {
            MISMATCH_SCORE
        };
        if (dp[i][j] - (dp[i - 1][j - 1] + pair)).abs() < 1e-9 {
            if sim >= MATCH_THRESHOLD {
                pairs.push(((i - 1) as u32, (j - 1) as u32));
                similarity_sum += sim;
            }
            i -= 1;
            j -= 1;
        } else if (dp[i][j] - (dp[i - 1][j] + GAP_PENALTY)).abs() < 1e-9 {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    pairs.reverse();

    if pairs.is_empty() {
        return None;
    }
    let average = similarity_sum / pairs.len() as f64;
    let coverage = pairs.len() as f64 / m.min(n) as f64;
    if average < MIN_AVG_SIMILARITY || coverage < MIN_COVERAGE {
        return None;
    }

    let first_word = pairs.first().map(|(w, _)| *w as usize)?;
    let last_word = pairs.last().map(|(w, _)| *w as usize)?;
    let start_time = words[first_word].start.round() as i64;
    let end_time = (words[last_word].end.round() as i64).max(start_time);

    Some(OnsetResolution {
        start_time,
        end_time,
        matched_token_indices: Some(pairs),
    })
}

/// Earliest transcript word resembling an anchor token of any form. Also
/// used by the gap filler to place local-search hits on a word boundary.
pub fn earliest_anchor_word(words: &[PreparedWord], entry: &AyahEntry) -> Option<i64> {
    let mut best_time: Option<f64> = None;

    for form in &entry.match_forms {
        let anchors = scoring::anchor_tokens_for_form(form);
        if anchors.is_empty() {
            continue;
        }
        for word in words {
            let hit = anchors.iter().any(|anchor| {
                scoring::token_similarity(&word.normalized, anchor)
                    .max(fuzz::partial_ratio(&word.normalized, anchor))
                    >= ANCHOR_FALLBACK_MIN
            });
            if hit && best_time.map_or(true, |current| word.start < current) {
                best_time = Some(word.start);
            }
        }
    }

    best_time.map(|time| time.round() as i64)
}
