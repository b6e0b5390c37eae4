//! Frequency-domain analysis node.
//!
//! Mirrors the behaviour of a browser analyser node: a Blackman window over
//! the most recent `fft_size` samples, magnitudes scaled by `1/N`, exponential
//! smoothing across successive frames, and a decibel range mapped onto
//! byte intensities (0..=255). Intensities are then rescaled to 0..=100 when
//! they become [`SpectralFrame`] magnitudes.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;

use anyhow::{ensure, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::types::SpectralFrame;

pub const DEFAULT_FFT_SIZE: usize = 512;
pub const DEFAULT_ANALYSIS_RATE: u32 = 44_100;
pub const DEFAULT_FRAME_RATE: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserSettings {
    /// Samples per FFT window; the bin count is half of this.
    pub fft_size: usize,
    /// Weight of the previous frame in the exponential smoothing (0..1).
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Every signal is brought to this rate before analysis so bins line up.
    pub sample_rate: u32,
    /// Frames per second produced by the host tick and by offline analysis.
    pub frame_rate: u32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            sample_rate: DEFAULT_ANALYSIS_RATE,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl AnalyserSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fft_size >= 32 && self.fft_size.is_power_of_two(),
            "fft_size must be a power of two >= 32 (got {})",
            self.fft_size
        );
        ensure!(
            (0.0..1.0).contains(&self.smoothing),
            "smoothing must be in [0, 1) (got {})",
            self.smoothing
        );
        ensure!(
            self.max_decibels > self.min_decibels,
            "max_decibels must exceed min_decibels"
        );
        ensure!(self.sample_rate > 0, "analysis sample rate must be positive");
        ensure!(
            self.frame_rate > 0 && self.frame_rate <= self.sample_rate,
            "frame_rate must be between 1 and the sample rate"
        );
        Ok(())
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Samples consumed per frame when analysing a buffer offline.
    pub fn hop_size(&self) -> usize {
        (self.sample_rate / self.frame_rate).max(1) as usize
    }

    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.frame_rate as f64
    }
}

pub struct SpectrumAnalyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyser {
    pub fn new(settings: AnalyserSettings) -> Self {
        let size = settings.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);
        Self {
            window: blackman_window(size),
            history: std::iter::repeat(0.0).take(size).collect(),
            smoothed: vec![0.0; size / 2],
            scratch: vec![Complex::new(0.0, 0.0); size],
            fft,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn bin_count(&self) -> usize {
        self.settings.bin_count()
    }

    /// Appends samples to the analysis window, keeping the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let size = self.settings.fft_size;
        let skip = samples.len().saturating_sub(size);
        for &sample in &samples[skip..] {
            if self.history.len() == size {
                self.history.pop_front();
            }
            self.history
                .push_back(if sample.is_finite() { sample } else { 0.0 });
        }
    }

    /// Byte intensities (0..=255) for the current window, one per bin.
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        self.update_smoothed();
        let range = self.settings.max_decibels - self.settings.min_decibels;
        let scale = 255.0 / range;
        self.smoothed
            .iter()
            .map(|&magnitude| {
                if magnitude <= 0.0 {
                    return 0;
                }
                let db = 20.0 * magnitude.log10();
                ((db - self.settings.min_decibels) * scale)
                    .floor()
                    .clamp(0.0, 255.0) as u8
            })
            .collect()
    }

    /// Current spectrum as a frame with magnitudes rescaled to 0..=100.
    pub fn frame(&mut self, timestamp_ms: u64) -> SpectralFrame {
        let magnitudes = self
            .byte_frequency_data()
            .into_iter()
            .map(normalize_intensity)
            .collect();
        SpectralFrame::new(magnitudes, timestamp_ms)
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|sample| *sample = 0.0);
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    fn update_smoothed(&mut self) {
        let size = self.settings.fft_size;
        for (slot, (sample, weight)) in self
            .scratch
            .iter_mut()
            .zip(self.history.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.scratch);
        let tau = self.settings.smoothing;
        let norm = 1.0 / size as f32;
        for (bin, value) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[bin].norm() * norm;
            *value = tau * *value + (1.0 - tau) * magnitude;
        }
    }
}

/// Maps a raw 0..=255 intensity onto the 0..=100 frame scale.
pub fn normalize_intensity(raw: u8) -> f32 {
    raw as f32 / 255.0 * 100.0
}

/// Runs a fresh analyser over `samples` (already at the analysis rate), one
/// frame per hop, the same cadence the live capture loop uses.
pub fn analyse_samples(samples: &[f32], settings: &AnalyserSettings) -> Vec<SpectralFrame> {
    let mut analyser = SpectrumAnalyser::new(settings.clone());
    let interval = settings.frame_interval_ms();
    samples
        .chunks(settings.hop_size())
        .enumerate()
        .map(|(index, hop)| {
            analyser.push_samples(hop);
            analyser.frame((index as f64 * interval).round() as u64)
        })
        .collect()
}

fn blackman_window(size: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * amplitude)
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_intensity() {
        let mut analyser = SpectrumAnalyser::new(AnalyserSettings::default());
        analyser.push_samples(&[0.0; 1024]);
        assert!(analyser.byte_frequency_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_near_expected_bin() {
        let settings = AnalyserSettings {
            smoothing: 0.0,
            ..AnalyserSettings::default()
        };
        let mut analyser = SpectrumAnalyser::new(settings.clone());
        let bin = 12;
        let freq = bin as f32 * settings.sample_rate as f32 / settings.fft_size as f32;
        analyser.push_samples(&tone(freq, settings.sample_rate, settings.fft_size, 0.01));
        let bytes = analyser.byte_frequency_data();
        let (loudest, _) = bytes
            .iter()
            .enumerate()
            .max_by_key(|(_, &value)| value)
            .unwrap();
        assert_eq!(loudest, bin);
        assert_eq!(bytes.len(), settings.bin_count());
    }

    #[test]
    fn offline_analysis_emits_one_frame_per_hop() {
        let settings = AnalyserSettings::default();
        let samples = tone(220.0, settings.sample_rate, settings.hop_size() * 10, 0.5);
        let frames = analyse_samples(&samples, &settings);
        assert_eq!(frames.len(), 10);
        assert!(frames
            .windows(2)
            .all(|pair| pair[0].timestamp_ms() < pair[1].timestamp_ms()));
        assert!(frames.iter().all(|f| f.bin_count() == 256));
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let settings = AnalyserSettings {
            fft_size: 500,
            ..AnalyserSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn intensity_scale_endpoints() {
        assert_eq!(normalize_intensity(0), 0.0);
        assert_eq!(normalize_intensity(255), 100.0);
    }
}
