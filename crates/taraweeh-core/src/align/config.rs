//! Alignment thresholds and pacing bounds.

use serde::{Deserialize, Serialize};

/// Configuration for the alignment engine.
///
/// Threaded by reference through the matcher, gap filler, and repair passes;
/// nothing reads thresholds from anywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    // ==========================================================================
    // High-quality acceptance
    // ==========================================================================
    /// Composite score floor for a High marker
    ///
    /// Default: 78.0
    pub min_score: f64,

    /// Content-token overlap floor for a High marker
    ///
    /// Default: 0.18
    pub min_overlap: f64,

    /// Confidence floor for a High marker
    ///
    /// Default: 0.62
    pub min_confidence: f64,

    /// Minimum forward wall-time between consecutive markers, seconds
    ///
    /// Default: 8
    pub min_gap_seconds: i64,

    // ==========================================================================
    // Ambiguous acceptance
    // ==========================================================================
    /// Composite score floor for an Ambiguous marker
    ///
    /// Default: 74.0
    pub ambiguous_min_score: f64,

    /// Confidence floor for an Ambiguous marker
    ///
    /// Default: 0.50
    pub ambiguous_min_confidence: f64,

    // ==========================================================================
    // Progression limits
    // ==========================================================================
    /// Normal forward jump cap, in ayat
    ///
    /// Default: 2
    pub max_forward_jump_ayat: usize,

    /// Recovery jump cap, in ayat
    ///
    /// Default: 12
    pub max_recovery_jump_ayat: usize,

    /// Window for collapsing duplicate same-ayah markers, seconds
    ///
    /// Default: 120
    pub duplicate_ayah_window_seconds: i64,

    // ==========================================================================
    // Gap inference
    // ==========================================================================
    /// Largest ayah gap the filler will infer across
    ///
    /// Default: 8
    pub max_infer_gap_ayat: usize,

    /// Largest wall-time gap the filler will infer across, seconds
    ///
    /// Default: 720
    pub max_infer_gap_seconds: i64,

    /// Pacing sanity lower bound, seconds per ayah
    ///
    /// Default: 4.0
    pub min_infer_step_seconds: f64,

    /// Pacing sanity upper bound, seconds per ayah
    ///
    /// Default: 28.0
    pub max_infer_step_seconds: f64,

    /// Leading ayat backfilled before the first anchor
    ///
    /// Default: 3
    pub max_leading_infer_ayat: usize,

    /// Require weak local evidence before placing an Inferred marker
    ///
    /// Default: true
    pub require_weak_support_for_inferred: bool,

    // ==========================================================================
    // Repeat detection
    // ==========================================================================
    /// How many recent ayat are re-checked for a repeat
    ///
    /// Default: 1
    pub repeat_lookback_ayat: usize,

    /// Composite score floor for a repeat
    ///
    /// Default: 90.0
    pub repeat_min_score: f64,

    /// Overlap floor for a repeat
    ///
    /// Default: 0.25
    pub repeat_min_overlap: f64,

    /// Confidence floor for a repeat
    ///
    /// Default: 0.80
    pub repeat_min_confidence: f64,

    /// Wall-time window for treating a match as a repeat, seconds
    ///
    /// Default: 45
    pub repeat_max_gap_seconds: i64,

    // ==========================================================================
    // Pauses and re-acquisition
    // ==========================================================================
    /// Hold applied after a non-recitation phrase, seconds
    ///
    /// Default: 16
    pub non_recitation_hold_seconds: i64,

    /// Wall-time gap between segments that forces a strict re-acquire, seconds
    ///
    /// Default: 180
    pub long_break_reacquire_seconds: f64,

    // ==========================================================================
    // Normalization
    // ==========================================================================
    /// Preserve letter identity while normalizing
    ///
    /// Default: false
    pub strict_normalization: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            // High acceptance
            min_score: 78.0,
            min_overlap: 0.18,
            min_confidence: 0.62,
            min_gap_seconds: 8,

            // Ambiguous acceptance
            ambiguous_min_score: 74.0,
            ambiguous_min_confidence: 0.50,

            // Progression
            max_forward_jump_ayat: 2,
            max_recovery_jump_ayat: 12,
            duplicate_ayah_window_seconds: 120,

            // Inference
            max_infer_gap_ayat: 8,
            max_infer_gap_seconds: 720,
            min_infer_step_seconds: 4.0,
            max_infer_step_seconds: 28.0,
            max_leading_infer_ayat: 3,
            require_weak_support_for_inferred: true,

            // Repeats
            repeat_lookback_ayat: 1,
            repeat_min_score: 90.0,
            repeat_min_overlap: 0.25,
            repeat_min_confidence: 0.80,
            repeat_max_gap_seconds: 45,

            // Pauses
            non_recitation_hold_seconds: 16,
            long_break_reacquire_seconds: 180.0,

            // Normalization
            strict_normalization: false,
        }
    }
}

impl AlignConfig {
    /// Overlap floor for an Ambiguous acceptance.
    pub fn ambiguous_min_overlap(&self) -> f64 {
        0.6 * self.min_overlap
    }

    /// Clamp a seconds-per-ayah estimate into the pacing sanity bounds.
    pub fn clamp_step(&self, step: f64) -> f64 {
        step.clamp(self.min_infer_step_seconds, self.max_infer_step_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlignConfig::default();
        assert_eq!(config.min_score, 78.0);
        assert_eq!(config.min_overlap, 0.18);
        assert_eq!(config.min_confidence, 0.62);
        assert_eq!(config.max_forward_jump_ayat, 2);
        assert!(config.require_weak_support_for_inferred);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: AlignConfig = serde_json::from_str(r#"{"min_score": 82.0}"#).unwrap();
        assert_eq!(config.min_score, 82.0);
        assert_eq!(config.min_overlap, 0.18);
    }

    #[test]
    fn test_clamp_step() {
        let config = AlignConfig::default();
        assert_eq!(config.clamp_step(1.0), 4.0);
        assert_eq!(config.clamp_step(12.0), 12.0);
        assert_eq!(config.clamp_step(60.0), 28.0);
    }
}
