//! Transcript cleaning, reciter-window filtering, and the normalized view
//! the matcher works on.

use serde::Serialize;

use crate::domain::{ReciterWindow, TranscriptSegment, TranscriptWord};
use crate::normalize::normalize_arabic_with;

const EDGE_PADDING_SECONDS: f64 = 1.5;
const MIN_KEEP_RATIO: f64 = 0.2;
const MIN_KEEP_SEGMENTS: usize = 80;
/// Word times may stray this far outside their segment before being clamped.
const WORD_TIME_TOLERANCE: f64 = 1.0;

/// Outcome of the known-reciter transcript filter, reported in the meta block.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReciterFilterInfo {
    pub enabled: bool,
    pub reason: &'static str,
    pub kept_segments: usize,
    pub total_segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows: Option<usize>,
}

/// Drop empty segments and words, clamp stray word times into the segment
/// window, and restore start ordering.
pub fn clean_for_matching(segments: &[TranscriptSegment]) -> Vec<TranscriptSegment> {
    let mut cleaned: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let start = segment.start.min(segment.end);
        let end = segment.end.max(segment.start);

        let words: Vec<TranscriptWord> = segment
            .words
            .iter()
            .filter(|word| !word.text.trim().is_empty())
            .map(|word| {
                let word_start = word
                    .start
                    .clamp(start - WORD_TIME_TOLERANCE, end + WORD_TIME_TOLERANCE)
                    .max(start - WORD_TIME_TOLERANCE);
                let word_end = word.end.max(word_start).min(end + WORD_TIME_TOLERANCE);
                TranscriptWord {
                    start: word_start,
                    end: word_end,
                    text: word.text.trim().to_string(),
                }
            })
            .collect();

        cleaned.push(TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            words,
        });
    }

    cleaned.sort_by(|a, b| a.start.total_cmp(&b.start));
    cleaned
}

fn is_known_reciter(label: Option<&str>) -> bool {
    let normalized = label.unwrap_or("").trim().to_lowercase();
    !normalized.is_empty() && normalized != "unknown" && normalized != "talk"
}

/// Restrict matching to segments inside known-reciter windows.
///
/// Windows are edge-padded and merged first. The filter backs off (returning
/// the input untouched) when it would keep too little of the transcript to
/// align against.
pub fn filter_by_reciter_windows(
    segments: Vec<TranscriptSegment>,
    windows: &[ReciterWindow],
) -> (Vec<TranscriptSegment>, ReciterFilterInfo) {
    let total = segments.len();
    if segments.is_empty() || windows.is_empty() {
        let info = ReciterFilterInfo {
            enabled: false,
            reason: "no_transcript_or_windows",
            kept_segments: total,
            total_segments: total,
            keep_ratio: None,
            windows: None,
        };
        return (segments, info);
    }

    let mut spans: Vec<(f64, f64)> = windows
        .iter()
        .filter(|window| is_known_reciter(window.reciter.as_deref()))
        .filter_map(|window| {
            let start = (window.start as f64 - EDGE_PADDING_SECONDS).max(0.0);
            let end = window.end as f64 + EDGE_PADDING_SECONDS;
            (end > start).then_some((start, end))
        })
        .collect();

    if spans.is_empty() {
        let info = ReciterFilterInfo {
            enabled: false,
            reason: "no_known_reciter_windows",
            kept_segments: total,
            total_segments: total,
            keep_ratio: None,
            windows: None,
        };
        return (segments, info);
    }

    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let kept: Vec<TranscriptSegment> = segments
        .iter()
        .filter(|segment| {
            let midpoint = (segment.start + segment.end) / 2.0;
            merged
                .iter()
                .any(|(start, end)| *start <= midpoint && midpoint <= *end)
        })
        .cloned()
        .collect();

    let keep_ratio = kept.len() as f64 / total as f64;
    if kept.len() < MIN_KEEP_SEGMENTS || keep_ratio < MIN_KEEP_RATIO {
        let info = ReciterFilterInfo {
            enabled: false,
            reason: "insufficient_kept_coverage",
            kept_segments: kept.len(),
            total_segments: total,
            keep_ratio: Some((keep_ratio * 1000.0).round() / 1000.0),
            windows: Some(merged.len()),
        };
        return (segments, info);
    }

    let info = ReciterFilterInfo {
        enabled: true,
        reason: "known_reciter_windows",
        kept_segments: kept.len(),
        total_segments: total,
        keep_ratio: Some((keep_ratio * 1000.0).round() / 1000.0),
        windows: Some(merged.len()),
    };
    (kept, info)
}

/// A transcript word with its normalized text.
#[derive(Debug, Clone)]
pub struct PreparedWord {
    pub start: f64,
    pub end: f64,
    pub normalized: String,
}

/// A transcript segment with normalized text and words, plus its index in
/// the cleaned input.
#[derive(Debug, Clone)]
pub struct PreparedSegment {
    pub start: f64,
    pub end: f64,
    pub normalized: String,
    pub words: Vec<PreparedWord>,
    pub source_index: usize,
}

/// The normalized view of the whole transcript the matcher and gap filler
/// search over. Built once per run.
#[derive(Debug)]
pub struct PreparedTranscript {
    pub segments: Vec<PreparedSegment>,
}

impl PreparedTranscript {
    pub fn prepare(segments: &[TranscriptSegment], strict: bool) -> Self {
        let prepared = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let words = segment
                    .words
                    .iter()
                    .filter_map(|word| {
                        let normalized = normalize_arabic_with(&word.text, strict);
                        (!normalized.is_empty()).then(|| PreparedWord {
                            start: word.start,
                            end: word.end,
                            normalized,
                        })
                    })
                    .collect();
                PreparedSegment {
                    start: segment.start,
                    end: segment.end,
                    normalized: normalize_arabic_with(&segment.text, strict),
                    words,
                    source_index: index,
                }
            })
            .collect();
        Self { segments: prepared }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Recognized-word density over `[from, to]`, in words per second.
    pub fn word_density_between(&self, from: f64, to: f64) -> f64 {
        let span = (to - from).max(1.0);
        let count = self
            .segments
            .iter()
            .filter(|segment| segment.end >= from && segment.start <= to)
            .map(|segment| {
                if segment.words.is_empty() {
                    segment.normalized.split_whitespace().count()
                } else {
                    segment
                        .words
                        .iter()
                        .filter(|word| word.start >= from && word.start <= to)
                        .count()
                }
            })
            .sum::<usize>();
        count as f64 / span
    }

    /// Longest stretch of `[from, to]` not covered by any segment.
    pub fn max_silence_between(&self, from: f64, to: f64) -> f64 {
        let mut overlapping: Vec<(f64, f64)> = self
            .segments
            .iter()
            .filter(|segment| segment.end >= from && segment.start <= to)
            .map(|segment| (segment.start.max(from), segment.end.min(to)))
            .collect();
        if overlapping.is_empty() {
            return (to - from).max(0.0);
        }
        overlapping.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut longest = overlapping[0].0 - from;
        let mut covered_until = overlapping[0].1;
        for (start, end) in overlapping.into_iter().skip(1) {
            if start > covered_until {
                longest = longest.max(start - covered_until);
            }
            covered_until = covered_until.max(end);
        }
        longest.max(to - covered_until).max(0.0)
    }
}
