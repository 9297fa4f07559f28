pub mod align;
pub mod corpus;
pub mod domain;
pub mod enrich;
pub mod fuzz;
pub mod normalize;
pub mod phrases;
pub mod scoring;
pub mod transcript;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use domain::{
    AlignmentError, AyahEntry, Marker, Quality, ReciterWindow, TranscriptSegment, TranscriptWord,
};

pub use corpus::{is_excluded_surah, juz_for_ayah, CorpusIndex};

pub use align::{
    align, AlignConfig, AlignmentMeta, AlignmentOutcome, AlignmentRequest, DayOverrides,
    MarkerOverride, MatchOutcome, ReanchorPoint, SequentialMatcher,
};

pub use align::pipeline::AlignmentCounts;

pub use normalize::{normalize_arabic, normalize_arabic_with};

pub use transcript::{
    clean_for_matching, filter_by_reciter_windows, PreparedTranscript, ReciterFilterInfo,
};

pub use enrich::{
    assign_reciters_to_markers, enrich_marker_texts, parse_translation_payload, TranslationLookup,
};
