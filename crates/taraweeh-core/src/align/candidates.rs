//! Candidate evidence generation.
//!
//! For one transcript position the matcher considers three kinds of textual
//! evidence against each probed ayah: the segment's own text, merged text
//! across a short run of following segments (slightly penalized so longer
//! merges must earn their keep), and word-level sliding windows inside the
//! segment (penalized by how far below the full window size they fall).

use crate::domain::AyahEntry;
use crate::scoring;
use crate::transcript::PreparedTranscript;

/// Bonus applied when the evidence contains a near-exact content token of
/// the candidate ayah.
pub const ANCHOR_BONUS: f64 = 2.5;

/// Evidence below this many characters is only considered with an anchor hit.
pub const MIN_MEANINGFUL_CHARS: usize = 14;

const MAX_MERGE_SEGMENTS: usize = 6;
const MAX_MERGE_GAP_SECONDS: f64 = 2.5;
const MERGE_PENALTY_PER_SEGMENT: f64 = 1.1;
const MIN_WINDOW_WORDS: usize = 4;
const MAX_WINDOW_WORDS: usize = 8;
const WINDOW_PENALTY_PER_MISSING_WORD: f64 = 0.35;

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSource {
    Segment,
    Merged { extra_segments: usize },
    Window { from_word: usize, to_word: usize },
}

/// One scoreable text variant for a transcript position.
#[derive(Debug, Clone)]
pub struct EvidenceVariant {
    pub source: EvidenceSource,
    pub text: String,
    pub penalty: f64,
    pub start: f64,
    pub end: f64,
    /// Inclusive range of prepared-segment indices the text came from.
    pub segment_span: (usize, usize),
}

/// The best evidence found for one `(position, ayah)` pairing.
#[derive(Debug, Clone)]
pub struct CandidateEvidence {
    pub entry_index: usize,
    pub source: EvidenceSource,
    /// Composite minus penalties plus the anchor bonus; what candidates are
    /// ranked by.
    pub adjusted: f64,
    pub composite: f64,
    pub overlap: f64,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub segment_span: (usize, usize),
}

/// All evidence variants for one transcript position, built once and scored
/// against however many ayat the matcher probes.
#[derive(Debug)]
pub struct EvidenceSet {
    pub position: usize,
    pub variants: Vec<EvidenceVariant>,
}

impl EvidenceSet {
    pub fn build(transcript: &PreparedTranscript, position: usize) -> Self {
        let mut variants = Vec::new();
        let Some(segment) = transcript.segments.get(position) else {
            return Self { position, variants };
        };

        if !segment.normalized.is_empty() {
            variants.push(EvidenceVariant {
                source: EvidenceSource::Segment,
                text: segment.normalized.clone(),
                penalty: 0.0,
                start: segment.start,
                end: segment.end,
                segment_span: (position, position),
            });
        }

        // Merged variants: extend rightward while the inter-segment gap stays
        // conversational.
        let mut combined = segment.normalized.clone();
        let mut previous_end = segment.end;
        for offset in 1..=MAX_MERGE_SEGMENTS {
            let Some(next) = transcript.segments.get(position + offset) else {
                break;
            };
            if next.start - previous_end > MAX_MERGE_GAP_SECONDS {
                break;
            }
            if next.normalized.chars().count() < 2 {
                break;
            }
            if !combined.is_empty() {
                combined.push(' ');
            }
            combined.push_str(&next.normalized);
            previous_end = next.end;
            variants.push(EvidenceVariant {
                source: EvidenceSource::Merged {
                    extra_segments: offset,
                },
                text: combined.clone(),
                penalty: offset as f64 * MERGE_PENALTY_PER_SEGMENT,
                start: segment.start,
                end: previous_end,
                segment_span: (position, position + offset),
            });
        }

        // Word windows inside the segment.
        let words = &segment.words;
        if words.len() >= MIN_WINDOW_WORDS {
            for size in MIN_WINDOW_WORDS..=MAX_WINDOW_WORDS.min(words.len()) {
                for from in 0..=(words.len() - size) {
                    let to = from + size;
                    let text = words[from..to]
                        .iter()
                        .map(|word| word.normalized.as_str())
                        .collect::<Vec<_>>()
                        .join(" ");
                    variants.push(EvidenceVariant {
                        source: EvidenceSource::Window {
                            from_word: from,
                            to_word: to,
                        },
                        text,
                        penalty: (MAX_WINDOW_WORDS.saturating_sub(size)) as f64
                            * WINDOW_PENALTY_PER_MISSING_WORD,
                        start: words[from].start,
                        end: words[to - 1].end,
                        segment_span: (position, position),
                    });
                }
            }
        }

        Self { position, variants }
    }

    /// Longest variant length in characters; the matcher skips positions with
    /// nothing meaningful to say.
    pub fn longest_text_chars(&self) -> usize {
        self.variants
            .iter()
            .map(|variant| variant.text.chars().count())
            .max()
            .unwrap_or(0)
    }

    /// Score every variant against `entry`, returning the best evidence.
    pub fn score_entry(&self, entry_index: usize, entry: &AyahEntry) -> Option<CandidateEvidence> {
        let mut best: Option<CandidateEvidence> = None;

        for variant in &self.variants {
            let anchor_hit = scoring::has_anchor_hit(&variant.text, entry);
            if variant.text.chars().count() < MIN_MEANINGFUL_CHARS && !anchor_hit {
                continue;
            }

            let (composite, overlap) = scoring::score_against_entry(&variant.text, entry);
            let adjusted =
                composite - variant.penalty + if anchor_hit { ANCHOR_BONUS } else { 0.0 };

            let better = match &best {
                Some(current) => adjusted > current.adjusted,
                None => true,
            };
            if better {
                best = Some(CandidateEvidence {
                    entry_index,
                    source: variant.source,
                    adjusted,
                    composite,
                    overlap,
                    text: variant.text.clone(),
                    start: variant.start,
                    end: variant.end,
                    segment_span: variant.segment_span,
                });
            }
        }

        best
    }
}
