use thiserror::Error;

/// Hard failures surfaced to the caller. Everything recoverable (override
/// conflicts, empty inputs, a run that never acquires) is reported through
/// the outcome's meta block instead.
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("corpus payload has no \"surahs\" array")]
    MissingSurahs,

    #[error("surah number {0} is outside 1..=114")]
    SurahNumberOutOfRange(i64),

    #[error("surah {surah} has no ayahs")]
    EmptySurah { surah: u16 },

    #[error("surah {surah} ayah number {ayah} is invalid (must be >= 1)")]
    AyahNumberOutOfRange { surah: u16, ayah: i64 },

    #[error("invalid input payload: {0}")]
    InvalidPayload(String),
}
