use crate::types::SpectralFrame;

use super::ScoringWeights;

/// Sum of magnitudes for each frame.
pub fn frame_energies(frames: &[SpectralFrame]) -> Vec<f32> {
    frames.iter().map(SpectralFrame::energy).collect()
}

/// Indices of interior frames whose energy is a strict local maximum above
/// `floor`. The first and last frame never count.
pub fn detect_peaks(energies: &[f32], floor: f32) -> Vec<usize> {
    if energies.len() < 3 {
        return Vec::new();
    }
    (1..energies.len() - 1)
        .filter(|&i| {
            let energy = energies[i];
            energy > energies[i - 1] && energy > energies[i + 1] && energy > floor
        })
        .collect()
}

pub fn peak_intervals(peaks: &[usize]) -> Vec<usize> {
    peaks.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Compares stress timing of two peak lists on a 0..=100 scale.
///
/// Identical peak lists agree perfectly. Otherwise, when either side has
/// fewer than two peaks there is no interval to compare and the neutral
/// value is returned.
pub fn rhythm_similarity(user: &[usize], reference: &[usize], weights: &ScoringWeights) -> f32 {
    if user == reference {
        return 100.0;
    }
    if user.len() < 2 || reference.len() < 2 {
        return weights.neutral_rhythm;
    }
    let user_intervals = peak_intervals(user);
    let reference_intervals = peak_intervals(reference);
    let pairs = user_intervals.len().min(reference_intervals.len());
    let total: f32 = user_intervals
        .iter()
        .zip(reference_intervals.iter())
        .map(|(&u, &r)| {
            let diff = (u as f32 - r as f32).abs();
            (100.0 - diff * weights.interval_penalty).max(0.0)
        })
        .sum();
    total / pairs.max(1) as f32
}

/// Rhythm component over two full recordings.
pub fn rhythm_score(
    user: &[SpectralFrame],
    reference: &[SpectralFrame],
    weights: &ScoringWeights,
) -> f32 {
    let user_peaks = detect_peaks(&frame_energies(user), weights.peak_energy_floor);
    let reference_peaks = detect_peaks(&frame_energies(reference), weights.peak_energy_floor);
    rhythm_similarity(&user_peaks, &reference_peaks, weights)
}
