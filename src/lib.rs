//! echoscore - pronunciation practice core
//!
//! Captures a learner's attempt as spectral frames, compares it against a
//! reference (synthesized or recorded) and turns the comparison into a score,
//! a feedback tier and per-session statistics.

pub mod audio;
pub mod cli;
pub mod config;
pub mod reference;
pub mod scoring;
pub mod session;
pub mod types;

pub use config::PracticeConfig;
pub use session::{AttemptState, FeedbackTier, SessionController, SessionError};
pub use types::{SessionStats, SimilarityResult, SpectralFrame, WaveformRecording};
