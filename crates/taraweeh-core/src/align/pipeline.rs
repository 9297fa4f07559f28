//! The alignment supervisor.
//!
//! Wires the components end-to-end for one day's transcript: cleaning,
//! reciter filtering, matching, gap filling, overrides, and the repair
//! chain. Performs no I/O; callers feed in-memory inputs and handle
//! serialization. Identical inputs produce identical output.

use serde::Serialize;
use tracing::debug;

use crate::corpus::CorpusIndex;
use crate::domain::{Marker, ReciterWindow, TranscriptSegment};
use crate::transcript::{
    clean_for_matching, filter_by_reciter_windows, PreparedTranscript, ReciterFilterInfo,
};

use super::config::AlignConfig;
use super::gapfill::{self, GapFillContext};
use super::matcher::SequentialMatcher;
use super::overrides::{
    self, AppliedMarkerOverride, DayOverrides, FinalOverrideInfo, RangeFillInfo, ReanchorPoint,
};
use super::postprocess::{self, PostContext};

/// Everything one alignment run consumes. The corpus and transcript are
/// borrowed read-only; the engine never mutates caller state.
pub struct AlignmentRequest<'a> {
    pub corpus: &'a CorpusIndex,
    pub transcript: &'a [TranscriptSegment],
    pub config: &'a AlignConfig,
    pub overrides: Option<&'a DayOverrides>,
    pub part: Option<u32>,
    /// Pre-resolved start; takes precedence over the override's.
    pub forced_start: Option<(u16, u32)>,
    /// Reset timestamps computed outside the engine (e.g. by the audio-side
    /// Fatiha detector), merged with the matcher's own.
    pub reset_times: Option<&'a [f64]>,
    pub reciter_windows: Option<&'a [ReciterWindow]>,
}

impl<'a> AlignmentRequest<'a> {
    pub fn new(
        corpus: &'a CorpusIndex,
        transcript: &'a [TranscriptSegment],
        config: &'a AlignConfig,
    ) -> Self {
        Self {
            corpus,
            transcript,
            config,
            overrides: None,
            part: None,
            forced_start: None,
            reset_times: None,
            reciter_windows: None,
        }
    }
}

/// Diagnostic counters, always populated (also for empty runs).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlignmentCounts {
    pub markers: usize,
    pub transcript_segments_raw: usize,
    pub transcript_segments_for_matching: usize,
    pub reset_markers: usize,
    pub stale_segments: usize,
    pub fatiha_resets: usize,
    pub non_recitation_holds: usize,
}

/// The meta block returned with every run: counts, the configuration used,
/// and what each override layer did.
#[derive(Debug, Clone, Serialize)]
pub struct AlignmentMeta {
    pub counts: AlignmentCounts,
    pub match_config: AlignConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_surah_number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ayah: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reciter_filter: Option<ReciterFilterInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<FinalOverrideInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub marker_time_overrides: Vec<AppliedMarkerOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_surah_fill: Option<RangeFillInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reanchor_conflicts: Vec<ReanchorPoint>,
}

/// Final ordered markers plus the meta block.
#[derive(Debug)]
pub struct AlignmentOutcome {
    pub markers: Vec<Marker>,
    pub meta: AlignmentMeta,
}

/// Run the full alignment for one day's transcript.
pub fn align(request: AlignmentRequest<'_>) -> AlignmentOutcome {
    let config = request.config;
    let raw_segment_count = request.transcript.len();

    // Transcript preparation.
    let cleaned = clean_for_matching(request.transcript);
    let (for_matching, reciter_filter) = match request.reciter_windows {
        Some(windows) => {
            let (kept, info) = filter_by_reciter_windows(cleaned, windows);
            (kept, Some(info))
        }
        None => (cleaned, None),
    };
    let prepared = PreparedTranscript::prepare(&for_matching, config.strict_normalization);

    // Start position and scheduled re-anchors.
    let forced_start = request
        .forced_start
        .or_else(|| request.overrides.and_then(DayOverrides::forced_start));
    let reanchor_points = request
        .overrides
        .map(|overrides| overrides.reanchor_points_for_part(request.part))
        .unwrap_or_default();

    // Sequential matching.
    let mut matcher = SequentialMatcher::new(request.corpus, &prepared, config)
        .with_forced_start(forced_start)
        .with_reanchor_points(reanchor_points);
    if let Some(reset_times) = request.reset_times {
        matcher = matcher.with_reset_times(reset_times);
    }
    let outcome = matcher.run();
    debug!(
        markers = outcome.markers.len(),
        stale = outcome.stale_segments,
        "matcher finished"
    );

    let mut markers = outcome.markers;
    let reset_times = outcome.reset_times;

    // Gap recovery between anchors, plus leading backfill.
    {
        let gap_ctx = GapFillContext {
            corpus: request.corpus,
            transcript: &prepared,
            config,
            reset_times: &reset_times,
        };
        let additions = gapfill::fill_between_anchors(&markers, &gap_ctx);
        markers.extend(additions);
        let leading = gapfill::backfill_leading(&markers, &gap_ctx);
        markers.extend(leading);
        markers.sort_by_key(Marker::order_key);
    }

    // Declarative overrides.
    let mut manual_override = None;
    let mut marker_time_overrides = Vec::new();
    let mut override_surah_fill = None;
    if let Some(overrides) = request.overrides {
        let (filtered, info) =
            overrides::apply_final_ayah_override(markers, overrides, request.corpus);
        markers = filtered;
        manual_override = info;

        let (with_manual, applied) =
            overrides::apply_marker_overrides(markers, overrides, request.part, request.corpus);
        markers = with_manual;
        marker_time_overrides = applied;

        let (range_filled, info) = overrides::fill_surah_range(markers, overrides, request.corpus);
        markers = range_filled;
        override_surah_fill = info;
    }

    // Repair chain.
    let post_ctx = PostContext {
        corpus: request.corpus,
        transcript: &prepared,
        config,
        reset_times: &reset_times,
    };
    let markers = postprocess::run_postprocessors(markers, &post_ctx);

    let meta = AlignmentMeta {
        counts: AlignmentCounts {
            markers: markers.len(),
            transcript_segments_raw: raw_segment_count,
            transcript_segments_for_matching: for_matching.len(),
            reset_markers: reset_times.len(),
            stale_segments: outcome.stale_segments,
            fatiha_resets: outcome.fatiha_resets,
            non_recitation_holds: outcome.non_recitation_holds,
        },
        match_config: config.clone(),
        start_surah_number: forced_start.map(|(surah, _)| surah),
        start_ayah: forced_start.map(|(_, ayah)| ayah),
        part: request.part,
        reciter_filter,
        manual_override,
        marker_time_overrides,
        override_surah_fill,
        reanchor_conflicts: outcome.reanchor_conflicts,
    };

    AlignmentOutcome { markers, meta }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_empty_transcript_yields_empty_markers_with_counts() {
        let corpus = fixtures::baqara_corpus();
        let config = AlignConfig::default();
        let outcome = align(AlignmentRequest::new(&corpus, &[], &config));
        assert!(outcome.markers.is_empty());
        assert_eq!(outcome.meta.counts.markers, 0);
        assert_eq!(outcome.meta.counts.transcript_segments_raw, 0);
    }

    #[test]
    fn test_fatiha_only_corpus_yields_no_markers() {
        let corpus = fixtures::fatiha_only_corpus();
        let config = AlignConfig::default();
        let segments = vec![fixtures::plain_segment(
            10.0,
            "بسم الله الرحمن الرحيم الحمد لله رب العالمين",
        )];
        let outcome = align(AlignmentRequest::new(&corpus, &segments, &config));
        assert!(outcome.markers.is_empty());
    }

    #[test]
    fn test_meta_records_config_and_start() {
        let corpus = fixtures::baqara_corpus();
        let config = AlignConfig::default();
        let mut request = AlignmentRequest::new(&corpus, &[], &config);
        request.forced_start = Some((2, 255));
        let outcome = align(request);
        assert_eq!(outcome.meta.start_surah_number, Some(2));
        assert_eq!(outcome.meta.start_ayah, Some(255));
        assert_eq!(outcome.meta.match_config.min_score, 78.0);
    }
}
