//! Synthesis of markers for ayat the matcher skipped.
//!
//! Between two confident anchors on the same surah the filler tries, per
//! missing ayah: a local forward search around the expected position, a
//! strong-bridge search across the whole span when both anchors are solid, a
//! wide re-search with aggressive relaxation, and finally interpolation with
//! pacing checks. It also backfills leading ayat before the first anchor and
//! bridges surah tails for the matcher's cross-surah transitions.

use tracing::debug;

use crate::corpus::{juz_for_ayah, CorpusIndex};
use crate::domain::{AyahEntry, Marker, Quality};
use crate::transcript::PreparedTranscript;

use super::config::AlignConfig;
use super::onset;

/// Word density below which a gap is considered data-starved.
const LOW_DATA_DENSITY: f64 = 0.07;
/// Longest tolerated silence inside a gap, seconds.
const LOW_DATA_SILENCE_SECONDS: f64 = 20.0;
/// Inferred placements are pushed this far past a reset timestamp.
const RESET_DEFER_SECONDS: i64 = 26;
/// Fraction of the previous ayah's estimated duration that must elapse
/// before the next inferred marker may start.
const PREVIOUS_DURATION_FLOOR: f64 = 0.72;
/// Seconds per canonical token when estimating an ayah's spoken duration.
const SECONDS_PER_TOKEN: f64 = 0.48;
const MIN_AYAH_DURATION_SECONDS: f64 = 6.0;
const MAX_AYAH_DURATION_SECONDS: f64 = 95.0;
/// Most tail markers a cross-surah transition may synthesize.
const MAX_TRANSITION_TAIL_AYAT: usize = 12;
/// Anchors at or above this confidence allow the full-span bridge search.
const STRONG_ANCHOR_CONFIDENCE: f64 = 0.70;

/// Threshold relaxation applied during gap searches.
#[derive(Debug, Clone, Copy)]
struct Relax {
    score: f64,
    overlap: f64,
    confidence: f64,
}

const LOCAL_RELAX: Relax = Relax {
    score: 4.0,
    overlap: 0.06,
    confidence: 0.08,
};

const WIDE_RELAX: Relax = Relax {
    score: 10.0,
    overlap: 0.12,
    confidence: 0.14,
};

/// Shared inputs for all gap-fill entry points.
pub struct GapFillContext<'a> {
    pub corpus: &'a CorpusIndex,
    pub transcript: &'a PreparedTranscript,
    pub config: &'a AlignConfig,
    pub reset_times: &'a [f64],
}

impl<'a> GapFillContext<'a> {
    /// Too little recognized speech to trust inferred placement.
    fn has_low_data_gap(&self, from: i64, to: i64) -> bool {
        let from = from as f64;
        let to = to as f64;
        if to <= from {
            return false;
        }
        self.transcript.word_density_between(from, to) < LOW_DATA_DENSITY
            || self.transcript.max_silence_between(from, to) > LOW_DATA_SILENCE_SECONDS
    }

    fn reset_in_span(&self, from: i64, to: i64) -> bool {
        self.reset_times
            .iter()
            .any(|reset| *reset > from as f64 && *reset < to as f64)
    }
}

/// Markers synthesized for every fillable gap between same-surah anchors.
///
/// The returned additions do not duplicate any `(surah, ayah)` already
/// present in `markers`.
pub fn fill_between_anchors(markers: &[Marker], ctx: &GapFillContext<'_>) -> Vec<Marker> {
    let mut anchors: Vec<&Marker> = markers
        .iter()
        .filter(|marker| marker.quality.is_anchor())
        .collect();
    anchors.sort_by_key(|marker| marker.order_key());

    let mut present: std::collections::HashSet<(u16, u32)> =
        markers.iter().map(Marker::key).collect();
    let mut additions: Vec<Marker> = Vec::new();

    for pair in anchors.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if left.surah_number != right.surah_number || right.ayah <= left.ayah + 1 {
            continue;
        }
        additions.extend(fill_gap(left, right, &mut present, ctx, false));
    }

    additions
}

/// Fill one anchor gap. `coverage_pass` forces the weak-support gate on
/// regardless of configuration (the repair-chain coverage pass uses weaker
/// pivots and must not invent markers freely).
fn fill_gap(
    left: &Marker,
    right: &Marker,
    present: &mut std::collections::HashSet<(u16, u32)>,
    ctx: &GapFillContext<'_>,
    coverage_pass: bool,
) -> Vec<Marker> {
    let config = ctx.config;
    let missing_count = (right.ayah - left.ayah - 1) as usize;
    let gap_seconds = right.start_time - left.start_time;

    if gap_seconds <= config.min_gap_seconds || gap_seconds > config.max_infer_gap_seconds {
        return Vec::new();
    }

    let has_reset = ctx.reset_in_span(left.start_time, right.start_time);
    let search_only = missing_count > config.max_infer_gap_ayat;
    if search_only && !has_reset {
        return Vec::new();
    }

    let strong_pair = left.quality.is_anchor()
        && right.quality.is_anchor()
        && left.confidence >= STRONG_ANCHOR_CONFIDENCE
        && right.confidence >= STRONG_ANCHOR_CONFIDENCE;

    let low_data = ctx.has_low_data_gap(left.start_time, right.start_time);
    if low_data && !strong_pair {
        debug!(
            surah = left.surah_number,
            from = left.ayah,
            to = right.ayah,
            "gap has too little recognized speech, skipping inference"
        );
        return Vec::new();
    }

    let step_seconds = gap_seconds as f64 / (missing_count + 1) as f64;
    let mut additions: Vec<Marker> = Vec::new();
    let mut previous_time = left.start_time;
    let mut previous_entry = ctx.corpus.entry_by_id(left.surah_number, left.ayah);

    for offset in 1..=missing_count {
        let ayah = left.ayah + offset as u32;
        let key = (left.surah_number, ayah);
        if present.contains(&key) {
            if let Some(entry) = ctx.corpus.entry_by_id(key.0, key.1) {
                previous_entry = Some(entry);
            }
            continue;
        }
        let Some(entry) = ctx.corpus.entry_by_id(left.surah_number, ayah) else {
            continue;
        };

        let expected = left.start_time + (step_seconds * offset as f64).round() as i64;
        let window_half = (step_seconds * 0.8).round().max(10.0) as i64;
        let window_start = (expected - window_half).max(left.start_time + config.min_gap_seconds);
        let window_end = (expected + window_half).min(right.start_time - config.min_gap_seconds);

        // (a) local search, (c) strong bridge, (b) wide re-search.
        let mut found = find_best_ayah_timestamp(
            ctx,
            entry,
            window_start,
            window_end,
            expected,
            LOCAL_RELAX,
        );
        if found.is_none() && strong_pair {
            found = find_best_ayah_timestamp(
                ctx,
                entry,
                previous_time + config.min_gap_seconds,
                right.start_time - config.min_gap_seconds,
                expected,
                LOCAL_RELAX,
            );
        }
        if found.is_none() {
            found = find_best_ayah_timestamp(
                ctx,
                entry,
                previous_time + config.min_gap_seconds,
                right.start_time - config.min_gap_seconds,
                expected,
                WIDE_RELAX,
            );
        }

        let marker = match found {
            Some((time, quality, confidence)) => {
                let bounded = time.clamp(left.start_time + 1, right.start_time - 1);
                let mut marker = Marker::point(
                    bounded,
                    entry.surah.clone(),
                    entry.surah_number,
                    ayah,
                    juz_for_ayah(entry.surah_number, ayah),
                    quality,
                    confidence,
                );
                marker.end_time = bounded;
                Some(marker)
            }
            None if search_only => None,
            None => interpolate_marker(
                left,
                right,
                entry,
                expected,
                previous_time,
                previous_entry,
                window_start,
                window_end,
                ctx,
                coverage_pass,
            ),
        };

        if let Some(marker) = marker {
            previous_time = marker.start_time;
            present.insert(key);
            additions.push(marker);
        }
        previous_entry = Some(entry);
    }

    additions
}

/// (d) interpolated placement with reset deferral, pacing floor, and the
/// weak-local-support gate.
#[allow(clippy::too_many_arguments)]
fn interpolate_marker(
    left: &Marker,
    right: &Marker,
    entry: &AyahEntry,
    expected: i64,
    previous_time: i64,
    previous_entry: Option<&AyahEntry>,
    window_start: i64,
    window_end: i64,
    ctx: &GapFillContext<'_>,
    coverage_pass: bool,
) -> Option<Marker> {
    let config = ctx.config;
    let mut inferred = expected;

    // Defer past any reset the placement would land on.
    for reset in ctx.reset_times {
        let reset = reset.round() as i64;
        if inferred > reset && inferred < reset + RESET_DEFER_SECONDS {
            inferred = reset + RESET_DEFER_SECONDS;
        }
    }

    // The previous ayah needs time to be recited before this one can start.
    if let Some(previous) = previous_entry {
        let tokens = previous.normalized.split_whitespace().count();
        let duration = (tokens as f64 * SECONDS_PER_TOKEN)
            .clamp(MIN_AYAH_DURATION_SECONDS, MAX_AYAH_DURATION_SECONDS);
        let floor = previous_time + (duration * PREVIOUS_DURATION_FLOOR).round() as i64;
        inferred = inferred.max(floor);
    }

    inferred = inferred.min(right.start_time - 1).max(left.start_time + 1);

    let require_support = config.require_weak_support_for_inferred || coverage_pass;
    if require_support
        && !has_weak_local_support(ctx, entry, window_start.min(inferred), window_end.max(inferred))
    {
        return None;
    }

    let confidence = left
        .confidence
        .min(right.confidence)
        .min(0.60)
        .max(0.56);
    let mut marker = Marker::point(
        inferred,
        entry.surah.clone(),
        entry.surah_number,
        entry.ayah,
        juz_for_ayah(entry.surah_number, entry.ayah),
        Quality::Inferred,
        (confidence * 1000.0).round() / 1000.0,
    );
    marker.end_time = inferred;
    Some(marker)
}

/// True when nothing in the window contradicts placing the entry there:
/// either some scoreable segment faintly resembles it, or the window holds
/// no scoreable speech at all (the low-data check already vetoes genuinely
/// empty gaps).
fn has_weak_local_support(
    ctx: &GapFillContext<'_>,
    entry: &AyahEntry,
    window_start: i64,
    window_end: i64,
) -> bool {
    let config = ctx.config;
    let min_score = config.ambiguous_min_score - 8.0;
    let min_overlap = (config.min_overlap - 0.05).max(0.0);

    let mut saw_scoreable = false;
    for segment in ctx.transcript.segments.iter().filter(|segment| {
        segment.end >= window_start as f64 && segment.start <= window_end as f64
    }) {
        if segment.normalized.chars().count() < 10 {
            continue;
        }
        saw_scoreable = true;
        let (score, overlap) = crate::scoring::score_against_entry(&segment.normalized, entry);
        if score >= min_score && overlap >= min_overlap {
            return true;
        }
    }
    !saw_scoreable
}

/// Window search with gap-fill thresholds, for the repair passes that
/// re-place weak markers. `aggressive` uses the wide relaxation tier.
pub fn search_window(
    ctx: &GapFillContext<'_>,
    entry: &AyahEntry,
    window_start: i64,
    window_end: i64,
    expected: i64,
    aggressive: bool,
) -> Option<(i64, Quality, f64)> {
    let relax = if aggressive { WIDE_RELAX } else { LOCAL_RELAX };
    find_best_ayah_timestamp(ctx, entry, window_start, window_end, expected, relax)
}

/// Best-scoring placement of `entry` inside a time window, with confidence
/// blending score, margin, overlap, and proximity to the expected position.
fn find_best_ayah_timestamp(
    ctx: &GapFillContext<'_>,
    entry: &AyahEntry,
    window_start: i64,
    window_end: i64,
    expected: i64,
    relax: Relax,
) -> Option<(i64, Quality, f64)> {
    if window_end <= window_start {
        return None;
    }
    let config = ctx.config;

    let mut top: Option<(usize, f64, f64)> = None;
    let mut second_score = -1.0f64;

    for (index, segment) in ctx.transcript.segments.iter().enumerate() {
        if segment.end < window_start as f64 || segment.start > window_end as f64 {
            continue;
        }
        if segment.normalized.chars().count() < 10 {
            continue;
        }
        let (score, overlap) = crate::scoring::score_against_entry(&segment.normalized, entry);
        match top {
            Some((_, top_score, _)) if score > top_score => {
                second_score = top_score;
                top = Some((index, score, overlap));
            }
            Some((_, top_score, _)) => {
                if score > second_score && score < top_score {
                    second_score = score;
                }
            }
            None => top = Some((index, score, overlap)),
        }
    }

    let (segment_index, score, overlap) = top?;
    if score < config.ambiguous_min_score - relax.score {
        return None;
    }

    let segment = &ctx.transcript.segments[segment_index];
    let time = onset::earliest_anchor_word(&segment.words, entry)
        .unwrap_or_else(|| segment.start.round() as i64);

    let margin = (score - second_score.max(0.0)).max(0.0);
    let span = (window_end - window_start).max(1) as f64;
    let proximity = 1.0 - ((time - expected).abs() as f64 / span).min(1.0);
    let confidence = 0.5 * (score / 100.0)
        + 0.2 * (margin / 20.0).min(1.0)
        + 0.2 * overlap
        + 0.1 * proximity;

    let is_high = score >= config.min_score - relax.score
        && overlap >= config.min_overlap - relax.overlap
        && confidence >= config.min_confidence - relax.confidence;
    let is_ambiguous = score >= config.ambiguous_min_score - relax.score
        && confidence >= config.ambiguous_min_confidence - relax.confidence;
    if !is_high && !is_ambiguous {
        return None;
    }

    let quality = if is_high {
        Quality::High
    } else {
        Quality::Ambiguous
    };
    Some((time, quality, (confidence * 1000.0).round() / 1000.0))
}

/// Coverage fill over every adjacent pair of known ayat, any quality, with
/// the weak-local-support gate always on. Run as the first repair pass so
/// later passes see a contiguous timeline.
pub fn coverage_fill(markers: &[Marker], ctx: &GapFillContext<'_>) -> Vec<Marker> {
    let mut best_by_key: std::collections::HashMap<(u16, u32), &Marker> =
        std::collections::HashMap::new();
    for marker in markers {
        best_by_key
            .entry(marker.key())
            .and_modify(|current| {
                let better = marker.quality.rank() > current.quality.rank()
                    || (marker.quality.rank() == current.quality.rank()
                        && marker.start_time < current.start_time);
                if better {
                    *current = marker;
                }
            })
            .or_insert(marker);
    }

    let mut pivots: Vec<&Marker> = best_by_key.into_values().collect();
    pivots.sort_by_key(|marker| (marker.surah_number, marker.ayah));

    let mut present: std::collections::HashSet<(u16, u32)> =
        markers.iter().map(Marker::key).collect();
    let mut additions = Vec::new();

    for pair in pivots.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if left.surah_number != right.surah_number
            || right.ayah <= left.ayah + 1
            || right.start_time <= left.start_time
        {
            continue;
        }
        additions.extend(fill_gap(left, right, &mut present, ctx, true));
    }

    additions
}

/// Backfill ayat `1..first.ayah` when the first anchor starts mid-surah.
pub fn backfill_leading(markers: &[Marker], ctx: &GapFillContext<'_>) -> Vec<Marker> {
    let config = ctx.config;
    let first = markers
        .iter()
        .filter(|marker| marker.quality.is_anchor())
        .min_by_key(|marker| marker.order_key());
    let Some(first) = first else {
        return Vec::new();
    };
    if first.ayah <= 1 || (first.ayah - 1) as usize > config.max_leading_infer_ayat {
        return Vec::new();
    }

    let present: std::collections::HashSet<(u16, u32)> = markers.iter().map(Marker::key).collect();
    let time_step = ((first.start_time as f64 / first.ayah.max(1) as f64).round() as i64).max(4);
    let leading_step = time_step.clamp(4, 8);
    let mut additions = Vec::new();

    for ayah in (1..first.ayah).rev() {
        let key = (first.surah_number, ayah);
        if present.contains(&key) {
            continue;
        }
        let Some(entry) = ctx.corpus.entry_by_id(first.surah_number, ayah) else {
            continue;
        };

        let offset = (first.ayah - ayah) as i64;
        let expected = (first.start_time - leading_step * offset).max(0);
        let window_half = time_step.max(8);
        let window_start = (expected - window_half).max(0);
        let window_end =
            (expected + window_half).min((first.start_time - config.min_gap_seconds).max(0));

        let found = find_best_ayah_timestamp(ctx, entry, window_start, window_end, expected, {
            // Leading audio is noisy; keep the overlap requirement honest.
            Relax {
                overlap: 0.0,
                ..LOCAL_RELAX
            }
        });

        let marker = match found {
            Some((time, quality, confidence)) => {
                let bounded = time.clamp(window_start, window_end.max(window_start));
                Marker::point(
                    bounded,
                    entry.surah.clone(),
                    entry.surah_number,
                    ayah,
                    juz_for_ayah(entry.surah_number, ayah),
                    quality,
                    confidence,
                )
            }
            None => {
                // Unverified leading inference only when there is actual
                // speech faintly supporting it; silence before the first
                // anchor stays unmarked.
                if config.require_weak_support_for_inferred
                    && !has_weak_leading_support(ctx, entry, window_start, window_end)
                {
                    continue;
                }
                let confidence = first.confidence.min(0.58);
                Marker::point(
                    expected,
                    entry.surah.clone(),
                    entry.surah_number,
                    ayah,
                    juz_for_ayah(entry.surah_number, ayah),
                    Quality::Inferred,
                    (confidence * 1000.0).round() / 1000.0,
                )
            }
        };
        additions.push(marker);
    }

    additions
}

/// Stricter support check for leading backfill: some scoreable speech in the
/// window must resemble the entry. An empty window is no support here; there
/// is no anchor on the far side to vouch for it.
fn has_weak_leading_support(
    ctx: &GapFillContext<'_>,
    entry: &AyahEntry,
    window_start: i64,
    window_end: i64,
) -> bool {
    let config = ctx.config;
    let min_score = config.ambiguous_min_score - 8.0;
    let min_overlap = (config.min_overlap - 0.05).max(0.0);

    ctx.transcript
        .segments
        .iter()
        .filter(|segment| {
            segment.end >= window_start as f64 && segment.start <= window_end as f64
        })
        .any(|segment| {
            if segment.normalized.chars().count() < 10 {
                return false;
            }
            let (score, overlap) = crate::scoring::score_against_entry(&segment.normalized, entry);
            score >= min_score && overlap >= min_overlap
        })
}

/// Bridge the tail of a surah ahead of a cross-surah transition.
///
/// Returns `None` when the terminal ayah cannot plausibly fit before
/// `until_time`; the matcher then rejects the transition.
pub fn fill_surah_tail(
    previous: &Marker,
    until_time: i64,
    ctx: &GapFillContext<'_>,
) -> Option<Vec<Marker>> {
    let config = ctx.config;
    let total = ctx.corpus.surah_total(previous.surah_number)?;
    if previous.ayah >= total {
        return Some(Vec::new());
    }

    let tail_count = (total - previous.ayah) as usize;
    if tail_count > MAX_TRANSITION_TAIL_AYAT {
        return None;
    }

    let from_time = previous.end_time.max(previous.start_time);
    let available = until_time - from_time;
    if (available as f64) < tail_count as f64 * config.min_infer_step_seconds {
        return None;
    }

    let step = config.clamp_step(available as f64 / (tail_count + 1) as f64);
    let mut additions = Vec::new();
    let mut previous_time = from_time;

    for offset in 1..=tail_count {
        let ayah = previous.ayah + offset as u32;
        let entry = ctx.corpus.entry_by_id(previous.surah_number, ayah)?;
        let expected = from_time + (step * offset as f64).round() as i64;
        let window_half = (step * 0.8).round().max(10.0) as i64;
        let window_start = (expected - window_half).max(previous_time + 1);
        let window_end = (expected + window_half).min(until_time - 1);

        let marker = match find_best_ayah_timestamp(
            ctx,
            entry,
            window_start,
            window_end,
            expected,
            LOCAL_RELAX,
        ) {
            Some((time, quality, confidence)) => {
                let bounded = time.clamp(window_start.min(window_end), window_end.max(window_start));
                Marker::point(
                    bounded,
                    entry.surah.clone(),
                    entry.surah_number,
                    ayah,
                    juz_for_ayah(entry.surah_number, ayah),
                    quality,
                    confidence,
                )
            }
            None => {
                let placed = expected.min(until_time - 1).max(previous_time + 1);
                Marker::point(
                    placed,
                    entry.surah.clone(),
                    entry.surah_number,
                    ayah,
                    juz_for_ayah(entry.surah_number, ayah),
                    Quality::Inferred,
                    0.56,
                )
            }
        };
        previous_time = marker.start_time;
        additions.push(marker);
    }

    // The tail must actually reach the terminal ayah in order.
    match additions.last() {
        Some(last) if last.ayah == total && last.start_time < until_time => Some(additions),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn anchor(surah: u16, ayah: u32, time: i64, confidence: f64) -> Marker {
        let mut marker = Marker::point(
            time,
            fixtures::surah_name(surah),
            surah,
            ayah,
            juz_for_ayah(surah, ayah),
            Quality::High,
            confidence,
        );
        marker.end_time = time + 5;
        marker
    }

    #[test]
    fn test_fill_interpolates_missing_ayat() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 140.0);
        let config = AlignConfig {
            require_weak_support_for_inferred: false,
            ..AlignConfig::default()
        };
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };

        let markers = vec![anchor(2, 2, 10, 0.8), anchor(2, 6, 120, 0.8)];
        let additions = fill_between_anchors(&markers, &ctx);
        assert_eq!(additions.len(), 3);
        let ayat: Vec<u32> = additions.iter().map(|m| m.ayah).collect();
        assert_eq!(ayat, vec![3, 4, 5]);
        let mut last = 10;
        for marker in &additions {
            assert!(marker.start_time > last && marker.start_time < 120);
            last = marker.start_time;
        }
    }

    #[test]
    fn test_fill_rejects_oversized_gap() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 1000.0);
        let config = AlignConfig::default();
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };

        let markers = vec![anchor(2, 2, 10, 0.8), anchor(2, 6, 900, 0.8)];
        let additions = fill_between_anchors(&markers, &ctx);
        assert!(additions.is_empty());
    }

    #[test]
    fn test_interpolation_defers_past_reset() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 140.0);
        let config = AlignConfig {
            require_weak_support_for_inferred: false,
            ..AlignConfig::default()
        };
        let reset_times = [60.0];
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &reset_times,
        };

        let markers = vec![anchor(2, 2, 10, 0.8), anchor(2, 4, 120, 0.8)];
        let additions = fill_between_anchors(&markers, &ctx);
        assert_eq!(additions.len(), 1);
        let placed = additions[0].start_time;
        assert!(
            !(60 < placed && placed < 86),
            "marker at {placed} sits inside the reset hold"
        );
    }

    #[test]
    fn test_tail_fill_reaches_terminal_ayah() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 400.0);
        let config = AlignConfig::default();
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };

        // Fixture corpus ends Al-Baqara at ayah 286.
        let previous = anchor(2, 283, 100, 0.8);
        let tail = fill_surah_tail(&previous, 200, &ctx).expect("tail should fit");
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.last().unwrap().ayah, 286);
        assert!(tail.last().unwrap().start_time < 200);
    }

    #[test]
    fn test_tail_fill_rejects_impossible_pacing() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 400.0);
        let config = AlignConfig::default();
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };

        let previous = anchor(2, 283, 100, 0.8);
        assert!(fill_surah_tail(&previous, 108, &ctx).is_none());
    }

    #[test]
    fn test_backfill_leading_ayat() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 140.0);
        let config = AlignConfig {
            require_weak_support_for_inferred: false,
            ..AlignConfig::default()
        };
        let ctx = GapFillContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };

        let markers = vec![anchor(2, 3, 40, 0.8)];
        let additions = backfill_leading(&markers, &ctx);
        assert_eq!(additions.len(), 2);
        assert!(additions.iter().all(|m| m.start_time < 40));
        assert!(additions.iter().any(|m| m.ayah == 1));
        assert!(additions.iter().any(|m| m.ayah == 2));
    }
}
