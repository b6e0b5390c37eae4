//! Similarity scoring between a learner recording and a reference.
//!
//! The overall score blends a bin-by-bin spectral ("pitch") comparison with a
//! stress-timing ("rhythm") comparison derived from energy peaks. Both
//! components are symmetric in their inputs, so swapping learner and
//! reference never changes the result.

pub mod rhythm;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{SimilarityResult, SpectralFrame};

pub const MAX_SCORE: f32 = 100.0;

/// Tunable constants of the scoring heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub pitch_weight: f32,
    pub rhythm_weight: f32,
    /// Rhythm value used when peak detection is inconclusive.
    pub neutral_rhythm: f32,
    /// Minimum frame energy for a frame to count as a peak.
    pub peak_energy_floor: f32,
    /// Points lost per frame of interval mismatch.
    pub interval_penalty: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            pitch_weight: 0.7,
            rhythm_weight: 0.3,
            neutral_rhythm: 50.0,
            peak_energy_floor: 50.0,
            interval_penalty: 10.0,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.pitch_weight >= 0.0 && self.rhythm_weight >= 0.0,
            "scoring weights must be non-negative"
        );
        ensure!(
            self.pitch_weight + self.rhythm_weight > 0.0,
            "at least one scoring weight must be positive"
        );
        ensure!(
            (0.0..=MAX_SCORE).contains(&self.neutral_rhythm),
            "neutral rhythm must be within [0, 100]"
        );
        ensure!(
            self.interval_penalty >= 0.0,
            "interval penalty must be non-negative"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scores `user` against `reference`. Either side being empty scores 0.
    pub fn score(&self, user: &[SpectralFrame], reference: &[SpectralFrame]) -> SimilarityResult {
        let aligned = user.len().min(reference.len());
        if aligned == 0 {
            return SimilarityResult::default();
        }
        let pitch = pitch_score(&user[..aligned], &reference[..aligned]);
        let rhythm = rhythm::rhythm_score(user, reference, &self.weights);
        let score = combine(pitch, rhythm, &self.weights);
        debug!(
            aligned,
            user_frames = user.len(),
            reference_frames = reference.len(),
            pitch,
            rhythm,
            score,
            "scored attempt"
        );
        SimilarityResult {
            score,
            pitch_component: pitch,
            rhythm_component: rhythm,
        }
    }
}

/// Mean per-frame spectral similarity over aligned frame pairs.
pub fn pitch_score(user: &[SpectralFrame], reference: &[SpectralFrame]) -> f32 {
    let frames = user.len().min(reference.len());
    let total: f32 = user
        .iter()
        .zip(reference.iter())
        .map(|(u, r)| frame_similarity(u.magnitudes(), r.magnitudes()))
        .sum();
    total / frames.max(1) as f32
}

/// Mean per-bin similarity `max(0, 100 - |u - r|)` over the shared bins.
/// Frames without bins contribute 0.
pub fn frame_similarity(user: &[f32], reference: &[f32]) -> f32 {
    let bins = user.len().min(reference.len());
    let total: f32 = user
        .iter()
        .zip(reference.iter())
        .map(|(u, r)| (MAX_SCORE - (u - r).abs()).max(0.0))
        .sum();
    total / bins.max(1) as f32
}

fn combine(pitch: f32, rhythm: f32, weights: &ScoringWeights) -> u8 {
    let blended = pitch * weights.pitch_weight + rhythm * weights.rhythm_weight;
    if !blended.is_finite() {
        return 0;
    }
    blended.clamp(0.0, MAX_SCORE).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: f32, bins: usize, timestamp: u64) -> SpectralFrame {
        SpectralFrame::new(vec![value; bins], timestamp)
    }

    #[test]
    fn frame_similarity_uses_shorter_vector() {
        assert_eq!(frame_similarity(&[80.0, 80.0, 0.0], &[70.0, 80.0]), 95.0);
        assert_eq!(frame_similarity(&[], &[50.0]), 0.0);
    }

    #[test]
    fn empty_inputs_score_zero() {
        let engine = ScoringEngine::default();
        let frames = vec![flat(80.0, 4, 0)];
        assert_eq!(engine.score(&[], &frames).score, 0);
        assert_eq!(engine.score(&frames, &[]).score, 0);
    }

    #[test]
    fn flat_frames_without_peaks_use_matching_rhythm() {
        let engine = ScoringEngine::default();
        let user: Vec<_> = (0..10).map(|i| flat(80.0, 8, i)).collect();
        let reference: Vec<_> = (0..10).map(|i| flat(60.0, 8, i)).collect();
        let result = engine.score(&user, &reference);
        assert_eq!(result.pitch_component, 80.0);
        assert_eq!(result.rhythm_component, 100.0);
        assert_eq!(result.score, 86);
    }

    #[test]
    fn frames_without_bins_score_low_not_nan() {
        let engine = ScoringEngine::default();
        let user = vec![SpectralFrame::new(Vec::new(), 0); 3];
        let result = engine.score(&user, &user);
        assert_eq!(result.pitch_component, 0.0);
        assert_eq!(result.score, 30);
    }

    #[test]
    fn combine_caps_at_hundred() {
        let weights = ScoringWeights {
            pitch_weight: 1.0,
            rhythm_weight: 1.0,
            ..ScoringWeights::default()
        };
        assert_eq!(combine(100.0, 100.0, &weights), 100);
        assert_eq!(combine(f32::NAN, 100.0, &weights), 0);
    }
}
