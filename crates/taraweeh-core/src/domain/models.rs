use serde::{Deserialize, Serialize};

/// Quality grade of an emitted ayah marker.
///
/// The grades form a total order used everywhere a duplicate or conflict has
/// to be resolved: `Manual > High > Ambiguous > Inferred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    High,
    Ambiguous,
    Inferred,
    Manual,
}

impl Quality {
    /// Numeric projection of the quality order. Higher wins.
    pub fn rank(&self) -> u8 {
        match self {
            Quality::Manual => 4,
            Quality::High => 3,
            Quality::Ambiguous => 2,
            Quality::Inferred => 1,
        }
    }

    /// A marker that can serve as a pivot for gap filling and repair passes.
    pub fn is_anchor(&self) -> bool {
        matches!(self, Quality::High | Quality::Manual)
    }

    /// Ambiguous or inferred: placements that repair passes may move.
    pub fn is_weak(&self) -> bool {
        matches!(self, Quality::Ambiguous | Quality::Inferred)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::High => "high",
            Quality::Ambiguous => "ambiguous",
            Quality::Inferred => "inferred",
            Quality::Manual => "manual",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recognized word with its own time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// One recognized utterance of the transcript.
///
/// Segments arrive ordered by `start`; word times fall inside the segment
/// window (the cleaner clamps strays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
}

/// One canonical ayah of the loaded corpus.
///
/// `match_forms[0]` is always the normalized text; muqatta'at openers carry
/// an extra spoken-letter variant.
#[derive(Debug, Clone, PartialEq)]
pub struct AyahEntry {
    pub surah_number: u16,
    pub surah: String,
    pub ayah: u32,
    pub text: String,
    pub normalized: String,
    pub match_forms: Vec<String>,
}

/// A labeled reciter time window, produced by the external voice segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReciterWindow {
    pub index: usize,
    pub start: i64,
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reciter: Option<String>,
}

/// One emitted ayah marker.
///
/// `start_time` is the authoritative onset; `time` mirrors it for output
/// compatibility and is re-synced whenever a pass moves the marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub surah: String,
    pub surah_number: u16,
    pub ayah: u32,
    pub juz: u8,
    pub quality: Quality,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reciter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arabic_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub english_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_token_indices: Option<Vec<(u32, u32)>>,
}

impl Marker {
    /// Build a point marker at `start_time` with `end_time == start_time`.
    pub fn point(
        start_time: i64,
        surah: impl Into<String>,
        surah_number: u16,
        ayah: u32,
        juz: u8,
        quality: Quality,
        confidence: f64,
    ) -> Self {
        Self {
            time: start_time,
            start_time,
            end_time: start_time,
            surah: surah.into(),
            surah_number,
            ayah,
            juz,
            quality,
            confidence,
            reciter: None,
            arabic_text: None,
            english_text: None,
            matched_token_indices: None,
        }
    }

    /// Move the onset, keeping `time` mirrored and `end_time >= start_time`.
    pub fn set_start(&mut self, start_time: i64) {
        self.start_time = start_time;
        self.time = start_time;
        if self.end_time < start_time {
            self.end_time = start_time;
        }
    }

    /// Identity key within the corpus.
    pub fn key(&self) -> (u16, u32) {
        (self.surah_number, self.ayah)
    }

    /// Sort key enforcing the output order: time, then surah, then ayah.
    pub fn order_key(&self) -> (i64, u16, u32) {
        (self.start_time, self.surah_number, self.ayah)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_rank_total_order() {
        assert!(Quality::Manual.rank() > Quality::High.rank());
        assert!(Quality::High.rank() > Quality::Ambiguous.rank());
        assert!(Quality::Ambiguous.rank() > Quality::Inferred.rank());
    }

    #[test]
    fn test_quality_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Quality::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&Quality::Ambiguous).unwrap(),
            "\"ambiguous\""
        );
        let parsed: Quality = serde_json::from_str("\"manual\"").unwrap();
        assert_eq!(parsed, Quality::Manual);
    }

    #[test]
    fn test_marker_point_mirrors_time() {
        let marker = Marker::point(42, "Al-Baqara", 2, 5, 1, Quality::High, 0.9);
        assert_eq!(marker.time, 42);
        assert_eq!(marker.start_time, 42);
        assert_eq!(marker.end_time, 42);
    }

    #[test]
    fn test_marker_set_start_keeps_end_valid() {
        let mut marker = Marker::point(10, "Al-Baqara", 2, 5, 1, Quality::High, 0.9);
        marker.end_time = 12;
        marker.set_start(20);
        assert_eq!(marker.time, 20);
        assert_eq!(marker.end_time, 20);
    }

    #[test]
    fn test_transcript_segment_words_default_empty() {
        let segment: TranscriptSegment =
            serde_json::from_str(r#"{"start": 1.0, "end": 2.0, "text": "abc"}"#).unwrap();
        assert!(segment.words.is_empty());
    }
}
