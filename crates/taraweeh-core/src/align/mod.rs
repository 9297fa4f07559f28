//! The ayah-alignment engine: candidate generation, the sequential matcher,
//! onset refinement, gap filling, overrides, and the repair chain, wired
//! end-to-end by [`pipeline::align`].

pub mod candidates;
pub mod config;
pub mod gapfill;
pub mod matcher;
pub mod onset;
pub mod overrides;
pub mod pipeline;
pub mod postprocess;
pub mod repair;

pub use config::AlignConfig;
pub use matcher::{MatchOutcome, SequentialMatcher};
pub use overrides::{DayOverrides, MarkerOverride, ReanchorPoint};
pub use pipeline::{align, AlignmentMeta, AlignmentOutcome, AlignmentRequest};
