//! Reset-phrase detection.
//!
//! Two phrase families pause the matcher's progression: Fatiha key phrases
//! (recited between cycles) and non-recitation phrases (takbir, tasbih,
//! taslim). Both tables are normalized once on first use.

use once_cell::sync::Lazy;

use crate::fuzz;
use crate::normalize::normalize_arabic;

const FATIHA_HINTS: [&str; 6] = [
    "الحمد لله رب العالمين",
    "الرحمن الرحيم",
    "مالك يوم الدين",
    "اياك نعبد واياك نستعين",
    "اهدنا الصراط المستقيم",
    "صراط الذين انعمت عليهم غير المغضوب عليهم ولا الضالين",
];

const NON_RECITATION_PHRASES: [&str; 6] = [
    "الله أكبر",
    "سبحان ربي العظيم",
    "سبحان ربي الأعلى",
    "سمع الله لمن حمده",
    "ربنا ولك الحمد",
    "السلام عليكم ورحمة الله",
];

static FATIHA_HINTS_NORM: Lazy<Vec<String>> = Lazy::new(|| {
    FATIHA_HINTS
        .iter()
        .map(|phrase| normalize_arabic(phrase))
        .collect()
});

static NON_RECITATION_NORM: Lazy<Vec<String>> = Lazy::new(|| {
    NON_RECITATION_PHRASES
        .iter()
        .map(|phrase| normalize_arabic(phrase))
        .collect()
});

/// True when a normalized segment reads like Fatiha rather than progression.
///
/// Very short fragments and long segments are skipped outright: a single
/// shared word is not evidence, and a full ayah that merely embeds a Fatiha
/// phrase must keep matching normally.
pub fn is_fatiha_like(normalized_segment: &str, min_score: f64) -> bool {
    let length = normalized_segment.chars().count();
    if !(10..=80).contains(&length) {
        return false;
    }

    let scores: Vec<(usize, f64)> = FATIHA_HINTS_NORM
        .iter()
        .enumerate()
        .map(|(index, phrase)| (index, fuzz::partial_ratio(normalized_segment, phrase)))
        .collect();

    let medium_hits = scores
        .iter()
        .filter(|(_, score)| *score >= min_score - 6.0)
        .count();
    let long_hit = scores.iter().any(|(index, score)| {
        FATIHA_HINTS_NORM[*index].chars().count() >= 18 && *score >= min_score - 2.0
    });

    long_hit || medium_hits >= 2
}

/// True when a normalized segment is one of the non-recitation phrases
/// (takbir and friends). These hold the matcher rather than advance it.
pub fn is_non_recitation(normalized_segment: &str) -> bool {
    let length = normalized_segment.chars().count();
    if !(4..=40).contains(&length) {
        return false;
    }
    NON_RECITATION_NORM.iter().any(|phrase| {
        fuzz::ratio(normalized_segment, phrase) >= 88.0
            || (normalized_segment.chars().count() <= phrase.chars().count() + 4
                && fuzz::partial_ratio(normalized_segment, phrase) >= 92.0)
    })
}
