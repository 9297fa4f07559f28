//! Repair passes that re-search the transcript: coverage fill, weak-boundary
//! refinement, inferred local re-search, and the bounded weak refine.
//!
//! Each pass is `Vec<Marker> -> Vec<Marker>`, total, and idempotent on input
//! that already satisfies the output invariants.

use crate::domain::{Marker, Quality};

use super::gapfill;
use super::postprocess::{sort_markers, PostContext};

/// Weak marker sitting this close to the previous marker's end is suspect.
const CROWDED_BOUNDARY_SECONDS: i64 = 3;
/// Only refine when the next marker leaves this much interior room.
const REFINE_MIN_ROOM_SECONDS: i64 = 25;
/// Required confidence improvement to move a weak boundary.
const REFINE_MIN_CONFIDENCE_GAIN: f64 = 0.08;
/// Half-width of the inferred re-search window.
const INFERRED_RESEARCH_HALF_SECONDS: i64 = 120;

/// Pass 1: coverage fill between every adjacent pair of known ayat, weak
/// support gate enforced.
pub fn coverage_fill_between_anchors(
    mut markers: Vec<Marker>,
    ctx: &PostContext<'_>,
) -> Vec<Marker> {
    let additions = gapfill::coverage_fill(&markers, &ctx.gap_ctx());
    if !additions.is_empty() {
        markers.extend(additions);
        sort_markers(&mut markers);
    }
    markers
}

/// Pass 4: where an Ambiguous/Inferred marker crowds the previous marker's
/// end while the next marker is far away, re-search the interior and accept
/// only a later, clearly stronger placement.
pub fn refine_weak_boundaries(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    sort_markers(&mut markers);
    let gap_ctx = ctx.gap_ctx();

    for index in 1..markers.len() {
        let (before, rest) = markers.split_at_mut(index);
        let previous = &before[index - 1];
        let next_start = rest.get(1).map(|next| next.start_time);
        let marker = &mut rest[0];

        if !marker.quality.is_weak() {
            continue;
        }
        if marker.start_time - previous.end_time > CROWDED_BOUNDARY_SECONDS {
            continue;
        }
        if let Some(next_start) = next_start {
            if next_start - marker.start_time <= REFINE_MIN_ROOM_SECONDS {
                continue;
            }
        }

        let Some(entry) = ctx.corpus.entry_by_id(marker.surah_number, marker.ayah) else {
            continue;
        };
        let window_start = previous.end_time + ctx.config.min_gap_seconds;
        let window_end = next_start
            .map(|next| next - ctx.config.min_gap_seconds)
            .unwrap_or(marker.start_time + INFERRED_RESEARCH_HALF_SECONDS);
        let Some((time, quality, confidence)) = gapfill::search_window(
            &gap_ctx,
            entry,
            window_start,
            window_end,
            marker.start_time,
            false,
        ) else {
            continue;
        };

        if time > marker.start_time && confidence >= marker.confidence + REFINE_MIN_CONFIDENCE_GAIN
        {
            marker.set_start(time);
            marker.quality = quality;
            marker.confidence = confidence;
        }
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 5: widen the search around each Inferred marker and upgrade it when
/// real evidence turns up nearby.
pub fn research_inferred_locally(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    sort_markers(&mut markers);
    let gap_ctx = ctx.gap_ctx();

    for index in 0..markers.len() {
        if markers[index].quality != Quality::Inferred {
            continue;
        }
        let current = markers[index].start_time;
        let lower = if index > 0 {
            markers[index - 1].start_time + 1
        } else {
            0
        };
        let upper = markers
            .get(index + 1)
            .map(|next| next.start_time - 1)
            .unwrap_or(current + INFERRED_RESEARCH_HALF_SECONDS);
        if upper <= lower {
            continue;
        }

        let marker = &markers[index];
        let Some(entry) = ctx.corpus.entry_by_id(marker.surah_number, marker.ayah) else {
            continue;
        };
        let window_start = (current - INFERRED_RESEARCH_HALF_SECONDS).max(lower);
        let window_end = (current + INFERRED_RESEARCH_HALF_SECONDS).min(upper);
        let Some((time, quality, confidence)) =
            gapfill::search_window(&gap_ctx, entry, window_start, window_end, current, false)
        else {
            continue;
        };

        let marker = &mut markers[index];
        marker.set_start(time.clamp(lower, upper));
        marker.quality = quality;
        marker.confidence = confidence;
    }

    sort_markers(&mut markers);
    markers
}

/// Pass 7: one more weak refine, bounded by the nearest same-surah anchors on
/// either side, with the aggressive relaxation tier.
pub fn refine_weak_between_anchors(mut markers: Vec<Marker>, ctx: &PostContext<'_>) -> Vec<Marker> {
    sort_markers(&mut markers);
    let gap_ctx = ctx.gap_ctx();

    for index in 0..markers.len() {
        if !markers[index].quality.is_weak() {
            continue;
        }
        let marker = markers[index].clone();

        let previous_anchor = markers[..index]
            .iter()
            .rev()
            .find(|other| other.surah_number == marker.surah_number && other.quality.is_anchor());
        let next_anchor = markers[index + 1..]
            .iter()
            .find(|other| other.surah_number == marker.surah_number && other.quality.is_anchor());

        let window_start = previous_anchor
            .map(|anchor| anchor.start_time + ctx.config.min_gap_seconds)
            .unwrap_or((marker.start_time - INFERRED_RESEARCH_HALF_SECONDS).max(0));
        let window_end = next_anchor
            .map(|anchor| anchor.start_time - ctx.config.min_gap_seconds)
            .unwrap_or(marker.start_time + INFERRED_RESEARCH_HALF_SECONDS);
        if window_end <= window_start {
            continue;
        }

        let Some(entry) = ctx.corpus.entry_by_id(marker.surah_number, marker.ayah) else {
            continue;
        };
        let Some((time, quality, confidence)) = gapfill::search_window(
            &gap_ctx,
            entry,
            window_start,
            window_end,
            marker.start_time,
            true,
        ) else {
            continue;
        };

        if confidence > marker.confidence {
            let slot = &mut markers[index];
            slot.set_start(time);
            slot.quality = quality;
            slot.confidence = confidence;
        }
    }

    sort_markers(&mut markers);
    markers
}
