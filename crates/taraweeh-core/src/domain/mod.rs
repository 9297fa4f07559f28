pub mod errors;
pub mod models;

pub use errors::AlignmentError;
pub use models::{
    AyahEntry, Marker, Quality, ReciterWindow, TranscriptSegment, TranscriptWord,
};
