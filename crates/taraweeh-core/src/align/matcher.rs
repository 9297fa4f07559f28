//! The sequential matcher: a forward-only progression state machine over the
//! corpus, consuming transcript segments in order and emitting one marker per
//! confidently identified ayah.
//!
//! Each segment runs through a fixed sequence of phases: scheduled re-anchor,
//! long-break detection, reset-phrase handling, repeat detection,
//! acquisition / normal forward / long-jump recovery, the strict re-acquire
//! gate, cross-surah tail bridging, forward validity, and emission.

use std::collections::HashMap;

use tracing::debug;

use crate::corpus::{juz_for_ayah, CorpusIndex};
use crate::domain::{Marker, Quality};
use crate::phrases;
use crate::transcript::{PreparedTranscript, PreparedWord};

use super::candidates::{CandidateEvidence, EvidenceSet, MIN_MEANINGFUL_CHARS};
use super::config::AlignConfig;
use super::gapfill::{self, GapFillContext};
use super::onset;
use super::overrides::ReanchorPoint;

const ACQUISITION_SCAN_ENTRIES: usize = 40;
const ACQUISITION_MIN_CONFIDENCE: f64 = 0.70;
const RECOVERY_SCAN_AYAT: usize = 60;
const RECOVERY_MIN_SCORE: f64 = 80.0;
const RECOVERY_MIN_OVERLAP: f64 = 0.20;
const RECOVERY_MIN_CONFIDENCE: f64 = 0.72;
const RECOVERY_SECONDS_PER_AYAH: i64 = 2;
const RECOVERY_MIN_ELAPSED_SECONDS: i64 = 10;
/// Ayah-count lock applied after a pause or scheduled re-anchor.
const REACQUIRE_LOCK_AYAT: u32 = 8;
/// Repeats may bridge this much silence while a re-acquire is pending.
const REACQUIRE_REPEAT_MAX_GAP_SECONDS: i64 = 900;
const REACQUIRE_SCORE_MARGIN: f64 = 4.0;
const REACQUIRE_OVERLAP_MARGIN: f64 = 0.04;
const REACQUIRE_CONFIDENCE_MARGIN: f64 = 0.12;
/// A cross-surah transition must start within this many ayat of the end of
/// the previous surah; anything earlier is treated as a stray match, not
/// natural progression.
const TRANSITION_NEAR_END_AYAT: u32 = 6;
const FATIHA_MIN_SCORE: f64 = 90.0;

/// What a run of the matcher produced, markers plus diagnostics for the meta
/// block.
#[derive(Debug)]
pub struct MatchOutcome {
    pub markers: Vec<Marker>,
    pub reset_times: Vec<f64>,
    pub stale_segments: usize,
    pub fatiha_resets: usize,
    pub non_recitation_holds: usize,
    pub reanchor_conflicts: Vec<ReanchorPoint>,
}

/// A candidate that cleared one of the acceptance phases.
#[derive(Debug, Clone)]
struct Accepted {
    evidence: CandidateEvidence,
    confidence: f64,
    quality: Quality,
}

pub struct SequentialMatcher<'a> {
    corpus: &'a CorpusIndex,
    transcript: &'a PreparedTranscript,
    config: &'a AlignConfig,

    // Progression state.
    pointer: Option<usize>,
    forced_start_index: Option<usize>,
    last_marker_time: i64,
    previous_segment_end: Option<f64>,
    stale_count: usize,
    awaiting_reacquire: bool,
    pause_hold_until: Option<f64>,
    lock_count: u32,

    // Scheduled resets.
    reanchor_points: Vec<ReanchorPoint>,
    next_reanchor: usize,
    reset_times: Vec<f64>,

    // Emission.
    markers: Vec<Marker>,
    positions: HashMap<(u16, u32), usize>,

    // Diagnostics.
    stale_segments_total: usize,
    fatiha_resets: usize,
    non_recitation_holds: usize,
    reanchor_conflicts: Vec<ReanchorPoint>,
}

impl<'a> SequentialMatcher<'a> {
    pub fn new(
        corpus: &'a CorpusIndex,
        transcript: &'a PreparedTranscript,
        config: &'a AlignConfig,
    ) -> Self {
        Self {
            corpus,
            transcript,
            config,
            pointer: None,
            forced_start_index: None,
            last_marker_time: -1,
            previous_segment_end: None,
            stale_count: 0,
            awaiting_reacquire: false,
            pause_hold_until: None,
            lock_count: 0,
            reanchor_points: Vec::new(),
            next_reanchor: 0,
            reset_times: Vec::new(),
            markers: Vec::new(),
            positions: HashMap::new(),
            stale_segments_total: 0,
            fatiha_resets: 0,
            non_recitation_holds: 0,
            reanchor_conflicts: Vec::new(),
        }
    }

    /// Force acquisition to begin at a known corpus position.
    pub fn with_forced_start(mut self, start: Option<(u16, u32)>) -> Self {
        self.forced_start_index =
            start.and_then(|(surah, ayah)| self.corpus.linear_index(surah, ayah));
        self
    }

    /// Install externally declared mid-run re-anchor points (sorted by time).
    pub fn with_reanchor_points(mut self, mut points: Vec<ReanchorPoint>) -> Self {
        points.sort_by_key(|point| point.at_time);
        self.reanchor_points = points;
        self
    }

    /// Seed reset timestamps computed outside the matcher.
    pub fn with_reset_times(mut self, reset_times: &[f64]) -> Self {
        self.reset_times = reset_times.to_vec();
        self.reset_times.sort_by(|a, b| a.total_cmp(b));
        self
    }

    pub fn run(mut self) -> MatchOutcome {
        for position in 0..self.transcript.len() {
            self.process_segment(position);
            self.previous_segment_end = Some(self.transcript.segments[position].end);
        }

        MatchOutcome {
            markers: self.markers,
            reset_times: self.reset_times,
            stale_segments: self.stale_segments_total,
            fatiha_resets: self.fatiha_resets,
            non_recitation_holds: self.non_recitation_holds,
            reanchor_conflicts: self.reanchor_conflicts,
        }
    }

    fn process_segment(&mut self, position: usize) {
        let segment_start = self.transcript.segments[position].start;
        let segment_end = self.transcript.segments[position].end;

        self.apply_scheduled_reanchors(segment_start);
        self.check_long_break(segment_start);
        self.expire_pause_hold(segment_start);

        if self.handle_reset_phrases(position) {
            return;
        }

        let set = EvidenceSet::build(self.transcript, position);
        if set.longest_text_chars() < MIN_MEANINGFUL_CHARS {
            return;
        }

        // Forward candidates are needed first: the repeat phase must beat the
        // best forward probe to hold the pointer in place.
        let forward = match self.pointer {
            None => self.acquire_candidates(&set),
            Some(pointer) => self.forward_candidates(&set, pointer),
        };
        // Best probe that would actually advance the pointer; the repeated
        // previous ayah must not compete with itself.
        let best_forward_adjusted = forward
            .iter()
            .filter(|candidate| {
                self.pointer
                    .map_or(true, |pointer| candidate.entry_index > pointer)
            })
            .map(|candidate| candidate.adjusted)
            .fold(-1.0f64, f64::max);

        if self.handle_repeat(&set, best_forward_adjusted, segment_start, segment_end) {
            return;
        }

        let accepted = match self.pointer {
            None => self.accept_acquisition(&forward),
            Some(pointer) => self
                .accept_forward(&forward, pointer)
                .or_else(|| self.accept_recovery(&set, pointer, segment_start)),
        };

        let Some(accepted) = accepted else {
            self.mark_stale();
            return;
        };

        if !self.passes_reacquire_gate(&accepted) {
            self.mark_stale();
            return;
        }

        self.emit(accepted);
    }

    // ------------------------------------------------------------------
    // Phase 1: scheduled re-anchors
    // ------------------------------------------------------------------

    fn apply_scheduled_reanchors(&mut self, segment_start: f64) {
        while let Some(point) = self.reanchor_points.get(self.next_reanchor) {
            if (point.at_time as f64) > segment_start {
                break;
            }
            match self.corpus.linear_index(point.surah_number, point.ayah) {
                Some(index) => {
                    debug!(
                        time = point.at_time,
                        surah = point.surah_number,
                        ayah = point.ayah,
                        "re-anchoring"
                    );
                    self.pointer = index.checked_sub(1);
                    self.awaiting_reacquire = true;
                    self.lock_count = REACQUIRE_LOCK_AYAT;
                    if self.pointer.is_none() {
                        // Re-anchor at the first entry restarts acquisition there.
                        self.forced_start_index = Some(index);
                    }
                }
                None => {
                    self.reanchor_conflicts.push(point.clone());
                }
            }
            self.next_reanchor += 1;
        }
    }

    // ------------------------------------------------------------------
    // Phase 2: long recitation breaks
    // ------------------------------------------------------------------

    fn check_long_break(&mut self, segment_start: f64) {
        if let Some(previous_end) = self.previous_segment_end {
            if segment_start - previous_end >= self.config.long_break_reacquire_seconds {
                self.awaiting_reacquire = true;
                self.lock_count = REACQUIRE_LOCK_AYAT;
            }
        }
    }

    fn expire_pause_hold(&mut self, segment_start: f64) {
        if let Some(hold) = self.pause_hold_until {
            if segment_start >= hold {
                self.pause_hold_until = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Phase 3: reset phrases
    // ------------------------------------------------------------------

    fn handle_reset_phrases(&mut self, position: usize) -> bool {
        let segment = &self.transcript.segments[position];
        if phrases::is_fatiha_like(&segment.normalized, FATIHA_MIN_SCORE) {
            self.reset_times.push(segment.start);
            self.awaiting_reacquire = true;
            self.fatiha_resets += 1;
            return true;
        }
        if phrases::is_non_recitation(&segment.normalized) {
            self.reset_times.push(segment.start);
            self.awaiting_reacquire = true;
            self.pause_hold_until =
                Some(segment.end + self.config.non_recitation_hold_seconds as f64);
            self.non_recitation_holds += 1;
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Phase 4: repeat detection
    // ------------------------------------------------------------------

    /// Recent emitted ayat that may be recited again: the latest marker plus
    /// `repeat_lookback_ayat` before it.
    fn repeat_candidates(&self) -> Vec<(u16, u32)> {
        let mut keys: Vec<(u16, u32)> = Vec::new();
        for marker in self.markers.iter().rev() {
            let key = marker.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
            if keys.len() > self.config.repeat_lookback_ayat {
                break;
            }
        }
        keys
    }

    fn handle_repeat(
        &mut self,
        set: &EvidenceSet,
        best_forward_adjusted: f64,
        segment_start: f64,
        segment_end: f64,
    ) -> bool {
        if self.markers.is_empty() || self.last_marker_time < 0 {
            return false;
        }
        let max_gap = if self.awaiting_reacquire {
            REACQUIRE_REPEAT_MAX_GAP_SECONDS
        } else {
            self.config.repeat_max_gap_seconds
        };
        if segment_start - self.last_marker_time as f64 > max_gap as f64 {
            return false;
        }

        for key in self.repeat_candidates() {
            let Some(index) = self.corpus.linear_index(key.0, key.1) else {
                continue;
            };
            let Some(entry) = self.corpus.entry(index) else {
                continue;
            };
            let Some(evidence) = set.score_entry(index, entry) else {
                continue;
            };
            if evidence.adjusted < self.config.repeat_min_score
                || evidence.overlap < self.config.repeat_min_overlap
                || evidence.adjusted < best_forward_adjusted + 1.0
            {
                continue;
            }
            let confidence =
                candidate_confidence(evidence.adjusted, best_forward_adjusted, evidence.overlap);
            if confidence < self.config.repeat_min_confidence {
                continue;
            }

            let Some(&marker_index) = self.positions.get(&key) else {
                continue;
            };
            let marker = &mut self.markers[marker_index];
            let new_end = segment_end.round() as i64;
            if new_end > marker.end_time {
                marker.end_time = new_end;
            }
            self.stale_count = 0;
            debug!(surah = key.0, ayah = key.1, "repeat extended");
            return true;
        }

        false
    }

    // ------------------------------------------------------------------
    // Phase 5: acquisition
    // ------------------------------------------------------------------

    fn acquire_candidates(&self, set: &EvidenceSet) -> Vec<CandidateEvidence> {
        let start = self.forced_start_index.unwrap_or(0);
        let end = (start + ACQUISITION_SCAN_ENTRIES).min(self.corpus.len());
        self.probe(set, start..end)
    }

    fn accept_acquisition(&self, candidates: &[CandidateEvidence]) -> Option<Accepted> {
        let best = candidates
            .iter()
            .max_by(|a, b| a.adjusted.total_cmp(&b.adjusted))?;
        let best_other = candidates
            .iter()
            .filter(|candidate| candidate.entry_index != best.entry_index)
            .map(|candidate| candidate.adjusted)
            .fold(-1.0f64, f64::max);
        let confidence = candidate_confidence(best.adjusted, best_other, best.overlap);

        let accepted = best.adjusted >= self.config.min_score
            && best.overlap >= self.config.min_overlap
            && confidence >= ACQUISITION_MIN_CONFIDENCE;
        accepted.then(|| Accepted {
            evidence: best.clone(),
            confidence,
            quality: Quality::High,
        })
    }

    // ------------------------------------------------------------------
    // Phase 6: normal forward progression
    // ------------------------------------------------------------------

    fn forward_candidates(&self, set: &EvidenceSet, pointer: usize) -> Vec<CandidateEvidence> {
        let start = pointer.saturating_sub(1);
        let end = (pointer + 3).min(self.corpus.len());
        self.probe(set, start..end)
    }

    fn accept_forward(
        &self,
        candidates: &[CandidateEvidence],
        pointer: usize,
    ) -> Option<Accepted> {
        let jump_cap = if self.awaiting_reacquire || self.lock_count > 0 {
            1
        } else {
            self.config.max_forward_jump_ayat
        };

        let mut eligible: Vec<Accepted> = Vec::new();
        for candidate in candidates {
            if candidate.entry_index <= pointer {
                continue;
            }
            let jump = candidate.entry_index - pointer;
            if jump > jump_cap {
                continue;
            }
            let best_other = candidates
                .iter()
                .filter(|other| other.entry_index != candidate.entry_index)
                .map(|other| other.adjusted)
                .fold(-1.0f64, f64::max);
            let confidence = candidate_confidence(candidate.adjusted, best_other, candidate.overlap);

            if let Some(quality) = self.classify(candidate, confidence) {
                eligible.push(Accepted {
                    evidence: candidate.clone(),
                    confidence,
                    quality,
                });
            }
        }

        eligible
            .into_iter()
            .min_by_key(|accepted| accepted.evidence.entry_index)
    }

    /// High/Ambiguous classification against the configured floors.
    fn classify(&self, candidate: &CandidateEvidence, confidence: f64) -> Option<Quality> {
        let config = self.config;
        if candidate.adjusted >= config.min_score
            && candidate.overlap >= config.min_overlap
            && confidence >= config.min_confidence
        {
            return Some(Quality::High);
        }
        if candidate.adjusted >= config.ambiguous_min_score
            && confidence >= config.ambiguous_min_confidence
            && candidate.overlap >= config.ambiguous_min_overlap()
        {
            return Some(Quality::Ambiguous);
        }
        None
    }

    // ------------------------------------------------------------------
    // Phase 7: long-jump recovery
    // ------------------------------------------------------------------

    fn accept_recovery(
        &self,
        set: &EvidenceSet,
        pointer: usize,
        segment_start: f64,
    ) -> Option<Accepted> {
        if self.awaiting_reacquire {
            return None;
        }

        let start = pointer + 1;
        let end = (pointer + 1 + RECOVERY_SCAN_AYAT).min(self.corpus.len());
        let candidates = self.probe(set, start..end);
        let best = candidates
            .iter()
            .max_by(|a, b| a.adjusted.total_cmp(&b.adjusted))?;

        let jump = best.entry_index - pointer;
        if jump > self.config.max_recovery_jump_ayat {
            return None;
        }
        let elapsed = segment_start as i64 - self.last_marker_time;
        if elapsed < (RECOVERY_SECONDS_PER_AYAH * jump as i64).max(RECOVERY_MIN_ELAPSED_SECONDS) {
            return None;
        }

        let best_other = candidates
            .iter()
            .filter(|candidate| candidate.entry_index != best.entry_index)
            .map(|candidate| candidate.adjusted)
            .fold(-1.0f64, f64::max);
        let confidence = candidate_confidence(best.adjusted, best_other, best.overlap);

        if best.adjusted < RECOVERY_MIN_SCORE
            || best.overlap < RECOVERY_MIN_OVERLAP
            || confidence < RECOVERY_MIN_CONFIDENCE
        {
            return None;
        }

        let quality = self.classify(best, confidence).unwrap_or(Quality::Ambiguous);
        debug!(jump, entry = best.entry_index, "recovery jump accepted");
        Some(Accepted {
            evidence: best.clone(),
            confidence,
            quality,
        })
    }

    // ------------------------------------------------------------------
    // Phase 8: strict re-acquire gate
    // ------------------------------------------------------------------

    fn passes_reacquire_gate(&self, accepted: &Accepted) -> bool {
        if !self.awaiting_reacquire {
            return true;
        }
        accepted.quality == Quality::High
            && accepted.evidence.adjusted >= self.config.min_score + REACQUIRE_SCORE_MARGIN
            && accepted.evidence.overlap >= self.config.min_overlap + REACQUIRE_OVERLAP_MARGIN
            && accepted.confidence >= self.config.min_confidence + REACQUIRE_CONFIDENCE_MARGIN
    }

    // ------------------------------------------------------------------
    // Phases 9-11: tail bridging, forward validity, emission
    // ------------------------------------------------------------------

    fn emit(&mut self, accepted: Accepted) {
        let Some(entry) = self.corpus.entry(accepted.evidence.entry_index) else {
            return;
        };

        let words = self.evidence_words(&accepted.evidence);
        let resolution = onset::resolve_onset(&words, entry, &accepted.evidence);
        let mut marker_time = resolution.start_time;
        let mut end_time = resolution.end_time;

        // A non-recitation hold pushes the onset past the pause.
        if let Some(hold) = self.pause_hold_until {
            if (marker_time as f64) < hold {
                marker_time = hold.ceil() as i64;
                end_time = end_time.max(marker_time);
            }
        }

        if let Some(previous) = self.markers.last() {
            if marker_time - previous.start_time < self.config.min_gap_seconds {
                self.mark_stale();
                return;
            }

            if previous.surah_number != entry.surah_number {
                if entry.surah_number != previous.surah_number + 1 {
                    self.mark_stale();
                    return;
                }
                // The previous marker must already sit near the end of its
                // surah, regardless of whether a tail could be bridged.
                let near_end = self
                    .corpus
                    .surah_total(previous.surah_number)
                    .map_or(false, |total| {
                        previous.ayah >= total.saturating_sub(TRANSITION_NEAR_END_AYAT).max(1)
                    });
                if !near_end {
                    self.mark_stale();
                    return;
                }
                let previous = previous.clone();
                if !self.bridge_surah_tail(&previous, marker_time) {
                    self.mark_stale();
                    return;
                }
            }
        }

        let mut marker = Marker::point(
            marker_time,
            entry.surah.clone(),
            entry.surah_number,
            entry.ayah,
            juz_for_ayah(entry.surah_number, entry.ayah),
            accepted.quality,
            (accepted.confidence * 1000.0).round() / 1000.0,
        );
        marker.end_time = end_time.max(marker_time);
        marker.matched_token_indices = resolution.matched_token_indices;

        self.insert_marker(marker);
        self.pointer = Some(
            self.pointer
                .map_or(accepted.evidence.entry_index, |pointer| {
                    pointer.max(accepted.evidence.entry_index)
                }),
        );
        self.last_marker_time = marker_time;
        self.stale_count = 0;
        self.awaiting_reacquire = false;
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    /// Emit tail markers for the previous surah up to its terminal ayah.
    /// Returns false when the tail cannot be bridged, which rejects the
    /// cross-surah transition.
    fn bridge_surah_tail(&mut self, previous: &Marker, until_time: i64) -> bool {
        let tail = {
            let ctx = GapFillContext {
                corpus: self.corpus,
                transcript: self.transcript,
                config: self.config,
                reset_times: &self.reset_times,
            };
            gapfill::fill_surah_tail(previous, until_time, &ctx)
        };
        match tail {
            Some(tail) => {
                for marker in tail {
                    self.insert_marker(marker);
                }
                true
            }
            None => false,
        }
    }

    /// Insert a marker, collapsing against an existing marker for the same
    /// ayah inside the duplicate window: quality rank, then confidence, then
    /// earlier time.
    fn insert_marker(&mut self, marker: Marker) {
        let key = marker.key();
        if let Some(&existing_index) = self.positions.get(&key) {
            let existing = &self.markers[existing_index];
            if (marker.start_time - existing.start_time).abs()
                <= self.config.duplicate_ayah_window_seconds
            {
                let replace = marker.quality.rank() > existing.quality.rank()
                    || (marker.quality.rank() == existing.quality.rank()
                        && (marker.confidence > existing.confidence
                            || (marker.confidence == existing.confidence
                                && marker.start_time < existing.start_time)));
                if replace {
                    self.markers[existing_index] = marker;
                }
                return;
            }
        }
        self.positions.insert(key, self.markers.len());
        self.markers.push(marker);
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn probe(
        &self,
        set: &EvidenceSet,
        indices: std::ops::Range<usize>,
    ) -> Vec<CandidateEvidence> {
        indices
            .filter(|&index| self.corpus.is_matchable(index))
            .filter_map(|index| {
                self.corpus
                    .entry(index)
                    .and_then(|entry| set.score_entry(index, entry))
            })
            .collect()
    }

    fn evidence_words(&self, evidence: &CandidateEvidence) -> Vec<PreparedWord> {
        let (from, to) = evidence.segment_span;
        self.transcript.segments[from..=to.min(self.transcript.len() - 1)]
            .iter()
            .flat_map(|segment| segment.words.iter().cloned())
            .collect()
    }

    fn mark_stale(&mut self) {
        self.stale_count += 1;
        self.stale_segments_total += 1;
    }
}

/// Confidence of a candidate given the strongest competing probe.
fn candidate_confidence(adjusted: f64, best_other_adjusted: f64, overlap: f64) -> f64 {
    let margin = (adjusted - best_other_adjusted.max(0.0)).max(0.0);
    0.55 * (adjusted.min(100.0) / 100.0) + 0.25 * (margin / 20.0).min(1.0) + 0.20 * overlap
}
