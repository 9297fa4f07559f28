//! The repair chain: a fixed sequence of total, idempotent passes that takes
//! the merged marker list (matcher output, gap fill, overrides) to a list
//! satisfying the output invariants: ordered, deduped, non-overlapping,
//! plausibly paced, and strictly ayah-monotonic within each surah.

use std::collections::HashMap;

use tracing::warn;

use crate::corpus::CorpusIndex;
use crate::domain::{Marker, Quality};
use crate::transcript::PreparedTranscript;

use super::config::AlignConfig;
use super::gapfill::GapFillContext;
use super::repair;

/// Window for collapsing duplicate same-ayah markers.
const DEDUPE_WINDOW_SECONDS: i64 = 90;
/// Weak markers inside a reset hold are pushed this far past the reset.
const RESET_HOLD_SECONDS: i64 = 34;
/// Runs of at least this many adjacent weak markers get redistributed.
const DENSE_RUN_MIN_COUNT: usize = 4;
/// Fraction of the local step a weak marker's duration should occupy.
const WEAK_DURATION_FRACTION: f64 = 0.70;
/// Minimum spread between consecutive weak markers when room exists.
const WEAK_PAIR_MIN_GAP_SECONDS: i64 = 12;
/// Hard cap on extending a point marker.
const POINT_EXTENSION_CAP_SECONDS: i64 = 90;
/// Long previous ayah threshold, canonical tokens.
const LONG_AYAH_TOKENS: usize = 45;
/// Early next-surah ayat that the transition-order pass may shift.
const TRANSITION_SHIFT_MAX_AYAT: usize = 6;

/// Read-only context shared by every pass.
pub struct PostContext<'a> {
    pub corpus: &'a CorpusIndex,
    pub transcript: &'a PreparedTranscript,
    pub config: &'a AlignConfig,
    pub reset_times: &'a [f64],
}

impl<'a> PostContext<'a> {
    pub fn gap_ctx(&self) -> GapFillContext<'a> {
        GapFillContext {
            corpus: self.corpus,
            transcript: self.transcript,
            config: self.config,
            reset_times: self.reset_times,
        }
    }
}

pub(super) fn sort_markers(markers: &mut [Marker]) {
    markers.sort_by_key(Marker::order_key);
}

/// Run the full chain in its fixed order.
pub fn run_postprocessors(markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    let markers = repair::coverage_fill_between_anchors(markers, ctx);
    let markers = dedupe_local_time_window(markers);
    let markers = resolve_overlap_conflicts(markers);
    let markers = repair::refine_weak_boundaries(markers, ctx);
    let markers = repair::research_inferred_locally(markers, ctx);
    let markers = defer_post_reset(markers, ctx);
    let markers = repair::refine_weak_between_anchors(markers, ctx);
    let markers = redistribute_dense_weak_runs(markers);
    let markers = stabilize_weak_durations(markers, ctx);
    let markers = extend_point_markers(markers);
    let markers = prune_unrealistic_progression(markers);
    let markers = enforce_surah_transition_order(markers, ctx);
    let markers = enforce_long_ayah_floor(markers, ctx);
    let markers = enforce_sequential_ayah_order(markers);
    finalize(markers, ctx)
}

fn better_than(candidate: &Marker, existing: &Marker) -> bool {
    candidate.quality.rank() > existing.quality.rank()
        || (candidate.quality.rank() == existing.quality.rank()
            && (candidate.confidence > existing.confidence
                || (candidate.confidence == existing.confidence
                    && candidate.start_time < existing.start_time)))
}

/// Pass 2: collapse same-ayah markers inside a local time window, keeping
/// the highest quality rank, then confidence, then the earlier time.
pub fn dedupe_local_time_window(markers: Vec<Marker>) -> Vec<Marker> {
    let mut sorted = markers;
    sort_markers(&mut sorted);

    let mut deduped: Vec<Marker> = Vec::with_capacity(sorted.len());
    'outer: for marker in sorted {
        for index in (0..deduped.len()).rev() {
            if marker.start_time - deduped[index].start_time > DEDUPE_WINDOW_SECONDS {
                break;
            }
            if deduped[index].key() == marker.key() {
                if better_than(&marker, &deduped[index]) {
                    deduped[index] = marker;
                }
                continue 'outer;
            }
        }
        deduped.push(marker);
    }
    deduped
}

/// Pass 3: adjacent forward ayat must not overlap. The later marker is
/// delayed unless it is strictly more confident, in which case the earlier
/// marker's tail is trimmed instead. Manual markers are never moved.
pub fn resolve_overlap_conflicts(mut markers: Vec<Marker>) -> Vec<Marker> {
    sort_markers(&mut markers);

    for index in 1..markers.len() {
        let (before, rest) = markers.split_at_mut(index);
        let previous = &mut before[index - 1];
        let current = &mut rest[0];

        if previous.surah_number != current.surah_number
            || current.ayah != previous.ayah + 1
            || current.start_time >= previous.end_time
        {
            continue;
        }

        if current.quality == Quality::Manual {
            previous.end_time = (current.start_time - 1).max(previous.start_time);
        } else if current.confidence > previous.confidence {
            // Stronger later marker keeps its onset; cap the overlap at 1 s.
            previous.end_time = previous.end_time.min(current.start_time + 1);
        } else {
            current.set_start(previous.end_time + 1);
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 6: weak markers inside a reset hold window are deferred past it,
/// bounded by the next same-surah marker.
pub fn defer_post_reset(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    if ctx.reset_times.is_empty() {
        return markers;
    }
    sort_markers(&mut markers);

    for index in 0..markers.len() {
        if !markers[index].quality.is_weak() {
            continue;
        }
        let start = markers[index].start_time;
        let Some(reset) = ctx
            .reset_times
            .iter()
            .map(|reset| reset.round() as i64)
            .find(|reset| start > *reset && start <= reset + RESET_HOLD_SECONDS)
        else {
            continue;
        };

        let mut target = reset + RESET_HOLD_SECONDS;
        let next_same_surah = markers[index + 1..]
            .iter()
            .find(|other| other.surah_number == markers[index].surah_number)
            .map(|other| other.start_time - 1);
        if let Some(bound) = next_same_surah {
            target = target.min(bound);
        }
        if target > start {
            markers[index].set_start(target);
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 8: a pile of weak markers crammed into a few seconds is a pacing
/// artifact; spread them evenly between the surrounding markers when the
/// span allows it.
pub fn redistribute_dense_weak_runs(mut markers: Vec<Marker>) -> Vec<Marker> {
    sort_markers(&mut markers);

    let mut index = 1;
    while index < markers.len() {
        // Find a maximal run of weak markers starting here.
        let run_start = index;
        let mut run_end = index;
        while run_end < markers.len() && markers[run_end].quality.is_weak() {
            run_end += 1;
        }
        let count = run_end - run_start;
        if count < DENSE_RUN_MIN_COUNT || run_end >= markers.len() {
            index = run_end.max(index + 1);
            continue;
        }

        let span = markers[run_end - 1].start_time - markers[run_start].start_time;
        if span > (count as i64).max(8) {
            index = run_end;
            continue;
        }

        let left = markers[run_start - 1].start_time;
        let right = markers[run_end].start_time;
        let available = right - left;
        if available < 3 * count as i64 {
            index = run_end;
            continue;
        }

        let step = available as f64 / (count + 1) as f64;
        for (offset, marker_index) in (run_start..run_end).enumerate() {
            let new_start = left + (step * (offset + 1) as f64).round() as i64;
            markers[marker_index].set_start(new_start);
        }
        index = run_end;
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 9: give weak markers a plausible duration (a fraction of the local
/// pacing step) and spread back-to-back weak pairs apart when room exists.
pub fn stabilize_weak_durations(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    sort_markers(&mut markers);

    for index in 0..markers.len() {
        if !markers[index].quality.is_weak() {
            continue;
        }
        let next_start = markers.get(index + 1).map(|next| next.start_time);
        let step = next_start
            .map(|next| (next - markers[index].start_time).max(1) as f64)
            .unwrap_or(ctx.config.max_infer_step_seconds);
        let step = ctx.config.clamp_step(step);

        let marker = &mut markers[index];
        let duration = (step * WEAK_DURATION_FRACTION).round() as i64;
        let mut end = marker.start_time + duration.max(1);
        if let Some(next_start) = next_start {
            end = end.min(next_start - 1);
        }
        if end > marker.end_time {
            marker.end_time = end;
        }
    }

    // Spread weak -> weak pairs that sit closer than the minimum gap.
    for index in 0..markers.len().saturating_sub(1) {
        if !(markers[index].quality.is_weak() && markers[index + 1].quality.is_weak()) {
            continue;
        }
        let gap = markers[index + 1].start_time - markers[index].start_time;
        if gap >= WEAK_PAIR_MIN_GAP_SECONDS {
            continue;
        }
        let room = markers
            .get(index + 2)
            .map(|after| after.start_time - 1)
            .unwrap_or(i64::MAX);
        let target = (markers[index].start_time + WEAK_PAIR_MIN_GAP_SECONDS).min(room);
        if target > markers[index + 1].start_time {
            markers[index + 1].set_start(target);
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 10: point markers (`end == start`) get extended toward the next
/// same-surah marker, capped.
pub fn extend_point_markers(mut markers: Vec<Marker>) -> Vec<Marker> {
    sort_markers(&mut markers);

    for index in 0..markers.len() {
        if markers[index].end_time != markers[index].start_time {
            continue;
        }
        let start = markers[index].start_time;
        let surah = markers[index].surah_number;
        let bound = markers[index + 1..]
            .iter()
            .find(|other| other.surah_number == surah)
            .or_else(|| markers.get(index + 1))
            .map(|other| other.start_time - 1)
            .unwrap_or(start + POINT_EXTENSION_CAP_SECONDS);
        let end = bound.min(start + POINT_EXTENSION_CAP_SECONDS).max(start);
        markers[index].end_time = end;
    }

    markers
}

/// Pass 11: inside a surah, a marker requiring an implausible number of
/// ayah-advances for the elapsed time is dropped. Manual markers survive.
pub fn prune_unrealistic_progression(mut markers: Vec<Marker>) -> Vec<Marker> {
    sort_markers(&mut markers);

    let mut last_kept: HashMap<u16, (u32, i64)> = HashMap::new();
    let mut kept: Vec<Marker> = Vec::with_capacity(markers.len());

    for marker in markers.drain(..) {
        if marker.quality == Quality::Manual {
            last_kept.insert(marker.surah_number, (marker.ayah, marker.start_time));
            kept.push(marker);
            continue;
        }
        if let Some(&(last_ayah, last_time)) = last_kept.get(&marker.surah_number) {
            let dt = (marker.start_time - last_time).max(0);
            let advances = marker.ayah as i64 - last_ayah as i64;
            let allowed = (dt + 2) / 3 + 2;
            if advances > allowed {
                warn!(
                    surah = marker.surah_number,
                    ayah = marker.ayah,
                    advances,
                    allowed,
                    "dropping marker with implausible progression"
                );
                continue;
            }
        }
        last_kept.insert(marker.surah_number, (marker.ayah, marker.start_time));
        kept.push(marker);
    }

    kept
}

/// Pass 12: early ayat of surah N+1 must not precede the terminal ayah of
/// surah N when both are present.
pub fn enforce_surah_transition_order(
    mut markers: Vec<Marker>,
    ctx: &PostContext<'_>,
) -> Vec<Marker> {
    sort_markers(&mut markers);

    let surahs: Vec<u16> = {
        let mut seen: Vec<u16> = markers.iter().map(|m| m.surah_number).collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    };

    for surah in surahs {
        let Some(total) = ctx.corpus.surah_total(surah) else {
            continue;
        };
        let Some(terminal_start) = markers
            .iter()
            .filter(|m| m.surah_number == surah && m.ayah == total)
            .map(|m| m.start_time)
            .max()
        else {
            continue;
        };

        let floor = terminal_start + ctx.config.min_gap_seconds;
        let mut shifted = 0usize;
        for marker in markers.iter_mut() {
            if marker.surah_number != surah + 1
                || marker.quality == Quality::Manual
                || marker.start_time >= floor
            {
                continue;
            }
            if shifted >= TRANSITION_SHIFT_MAX_AYAT {
                break;
            }
            let target = floor + (marker.ayah.saturating_sub(1)) as i64;
            marker.set_start(target);
            shifted += 1;
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 13: an Inferred marker after a very long ayah cannot start until a
/// sizable fraction of that ayah has been recited.
pub fn enforce_long_ayah_floor(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    sort_markers(&mut markers);

    for index in 0..markers.len() {
        if markers[index].quality != Quality::Inferred {
            continue;
        }
        let marker_key = (markers[index].surah_number, markers[index].ayah);

        let previous = markers[..index]
            .iter()
            .rev()
            .find(|other| other.surah_number == marker_key.0 && other.ayah < marker_key.1)
            .map(|other| (other.ayah, other.start_time));
        let Some((previous_ayah, previous_start)) = previous else {
            continue;
        };
        let Some(entry) = ctx.corpus.entry_by_id(marker_key.0, previous_ayah) else {
            continue;
        };
        let tokens = entry.normalized.split_whitespace().count();
        if tokens < LONG_AYAH_TOKENS {
            continue;
        }

        let floor = previous_start + ((tokens as f64 * 0.80).round() as i64).clamp(18, 180);
        if markers[index].start_time >= floor {
            continue;
        }
        let bound = markers[index + 1..]
            .iter()
            .find(|other| other.surah_number == marker_key.0)
            .map(|other| other.start_time - 1)
            .unwrap_or(i64::MAX);
        let new_start = floor.min(bound).max(markers[index].start_time);
        markers[index].set_start(new_start);
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 14: strict start-time monotonicity by ayah within each surah,
/// shifting violators forward a second or two. Manual markers stay put.
pub fn enforce_sequential_ayah_order(mut markers: Vec<Marker>) -> Vec<Marker> {
    let mut by_surah: HashMap<u16, Vec<usize>> = HashMap::new();
    for (index, marker) in markers.iter().enumerate() {
        by_surah.entry(marker.surah_number).or_default().push(index);
    }

    for indices in by_surah.values() {
        let mut ordered = indices.clone();
        ordered.sort_by_key(|&i| (markers[i].ayah, markers[i].start_time));

        let mut last_start: Option<i64> = None;
        for &i in &ordered {
            if let Some(last) = last_start {
                if markers[i].start_time <= last && markers[i].quality != Quality::Manual {
                    let nudge = if markers[i].quality.is_weak() { 2 } else { 1 };
                    markers[i].set_start(last + nudge);
                }
            }
            last_start = Some(markers[i].start_time);
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 15: global dedupe by identity, final sort, mirror sync, and an
/// invariant sweep that logs (rather than fails) anything residual.
pub fn finalize(markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    let mut best: HashMap<(u16, u32), Marker> = HashMap::new();
    for marker in markers {
        match best.get(&marker.key()) {
            Some(existing) if !better_than(&marker, existing) => {}
            _ => {
                best.insert(marker.key(), marker);
            }
        }
    }

    let mut out: Vec<Marker> = best.into_values().collect();
    for marker in &mut out {
        marker.time = marker.start_time;
        if marker.end_time < marker.start_time {
            marker.end_time = marker.start_time;
        }
    }
    sort_markers(&mut out);

    for pair in out.windows(2) {
        if pair[0].surah_number == pair[1].surah_number && pair[0].ayah >= pair[1].ayah {
            warn!(
                surah = pair[0].surah_number,
                left = pair[0].ayah,
                right = pair[1].ayah,
                "ayah order residue after repair chain"
            );
        }
    }
    for marker in &out {
        if ctx
            .corpus
            .entry_by_id(marker.surah_number, marker.ayah)
            .is_none()
        {
            warn!(
                surah = marker.surah_number,
                ayah = marker.ayah,
                "marker identity missing from corpus"
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::juz_for_ayah;
    use crate::testing::fixtures;

    fn marker(surah: u16, ayah: u32, time: i64, quality: Quality, confidence: f64) -> Marker {
        Marker::point(
            time,
            fixtures::surah_name(surah),
            surah,
            ayah,
            juz_for_ayah(surah, ayah),
            quality,
            confidence,
        )
    }

    #[test]
    fn test_dedupe_prefers_quality_then_confidence() {
        let markers = vec![
            marker(2, 5, 100, Quality::Inferred, 0.56),
            marker(2, 5, 120, Quality::High, 0.9),
            marker(2, 5, 110, Quality::High, 0.8),
        ];
        let deduped = dedupe_local_time_window(markers);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].quality, Quality::High);
        assert_eq!(deduped[0].confidence, 0.9);
    }

    #[test]
    fn test_dedupe_keeps_far_apart_duplicates_for_finalize() {
        let markers = vec![
            marker(2, 5, 100, Quality::High, 0.9),
            marker(2, 5, 400, Quality::Ambiguous, 0.6),
        ];
        let deduped = dedupe_local_time_window(markers);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_overlap_delays_weaker_later_marker() {
        let mut first = marker(2, 5, 100, Quality::High, 0.9);
        first.end_time = 120;
        let second = marker(2, 6, 110, Quality::Ambiguous, 0.6);
        let resolved = resolve_overlap_conflicts(vec![first, second]);
        assert_eq!(resolved[1].start_time, 121);
    }

    #[test]
    fn test_overlap_never_moves_manual() {
        let mut first = marker(2, 5, 100, Quality::High, 0.9);
        first.end_time = 120;
        let second = marker(2, 6, 110, Quality::Manual, 1.0);
        let resolved = resolve_overlap_conflicts(vec![first, second]);
        assert_eq!(resolved[1].start_time, 110);
        assert!(resolved[0].end_time < 110);
    }

    #[test]
    fn test_defer_post_reset_shifts_weak_markers() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 200.0);
        let config = AlignConfig::default();
        let reset_times = [50.0];
        let ctx = PostContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &reset_times,
        };
        let markers = vec![
            marker(2, 2, 40, Quality::High, 0.9),
            marker(2, 3, 60, Quality::Inferred, 0.56),
            marker(2, 4, 150, Quality::High, 0.9),
        ];
        let deferred = defer_post_reset(markers, &ctx);
        let shifted = deferred.iter().find(|m| m.ayah == 3).unwrap();
        assert_eq!(shifted.start_time, 84);
    }

    #[test]
    fn test_redistribute_dense_weak_run() {
        let markers = vec![
            marker(2, 2, 100, Quality::High, 0.9),
            marker(2, 3, 101, Quality::Inferred, 0.56),
            marker(2, 4, 102, Quality::Inferred, 0.56),
            marker(2, 5, 103, Quality::Inferred, 0.56),
            marker(2, 6, 104, Quality::Inferred, 0.56),
            marker(2, 7, 200, Quality::High, 0.9),
        ];
        let spread = redistribute_dense_weak_runs(markers);
        let starts: Vec<i64> = spread.iter().map(|m| m.start_time).collect();
        assert_eq!(starts[0], 100);
        assert_eq!(starts[5], 200);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= 10, "starts = {starts:?}");
        }
    }

    #[test]
    fn test_extend_point_markers_respects_next_marker() {
        let markers = vec![
            marker(2, 5, 100, Quality::Inferred, 0.56),
            marker(2, 6, 130, Quality::High, 0.9),
        ];
        let extended = extend_point_markers(markers);
        assert_eq!(extended[0].end_time, 129);
        // Trailing marker caps at the fixed extension limit.
        assert!(extended[1].end_time <= extended[1].start_time + 90);
    }

    #[test]
    fn test_prune_drops_implausible_advance() {
        let markers = vec![
            marker(2, 2, 100, Quality::High, 0.9),
            marker(2, 50, 106, Quality::Ambiguous, 0.6),
        ];
        let pruned = prune_unrealistic_progression(markers);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].ayah, 2);
    }

    #[test]
    fn test_prune_never_drops_manual() {
        let markers = vec![
            marker(2, 2, 100, Quality::High, 0.9),
            marker(2, 50, 106, Quality::Manual, 1.0),
        ];
        let pruned = prune_unrealistic_progression(markers);
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn test_sequential_order_nudges_ties() {
        let markers = vec![
            marker(2, 2, 100, Quality::High, 0.9),
            marker(2, 3, 100, Quality::Ambiguous, 0.6),
        ];
        let ordered = enforce_sequential_ayah_order(markers);
        assert_eq!(ordered[0].ayah, 2);
        assert!(ordered[1].start_time > ordered[0].start_time);
    }

    #[test]
    fn test_finalize_unique_identity_and_sorted() {
        let corpus = fixtures::baqara_corpus();
        let transcript = fixtures::dense_transcript(0.0, 100.0);
        let config = AlignConfig::default();
        let ctx = PostContext {
            corpus: &corpus,
            transcript: &transcript,
            config: &config,
            reset_times: &[],
        };
        let markers = vec![
            marker(2, 5, 400, Quality::Ambiguous, 0.6),
            marker(2, 5, 100, Quality::High, 0.9),
            marker(2, 4, 90, Quality::High, 0.9),
        ];
        let final_markers = finalize(markers, &ctx);
        assert_eq!(final_markers.len(), 2);
        assert_eq!(final_markers[0].ayah, 4);
        assert_eq!(final_markers[1].ayah, 5);
        assert_eq!(final_markers[1].start_time, 100);
        assert!(final_markers.iter().all(|m| m.time == m.start_time));
    }
}
