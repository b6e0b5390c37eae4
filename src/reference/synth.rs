use std::f64::consts::PI;

use anyhow::{ensure, Result};
use dasp::{signal, Signal};
use serde::{Deserialize, Serialize};

use crate::types::AudioData;

/// Shape of the surrogate "spoken phrase" signal.
///
/// This is a placeholder tone with a speech-like energy contour, not speech
/// synthesis; it carries no phonetic content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub sample_rate: u32,
    pub min_duration_secs: f64,
    pub secs_per_char: f64,
    pub base_pitch_hz: f64,
    pub pitch_depth_hz: f64,
    /// Angular rate (rad/s) of the pitch modulation.
    pub pitch_rate: f64,
    pub attack_rate: f64,
    pub decay_rate: f64,
    pub noise_amplitude: f64,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            min_duration_secs: 2.0,
            secs_per_char: 0.1,
            base_pitch_hz: 150.0,
            pitch_depth_hz: 50.0,
            pitch_rate: 2.0,
            attack_rate: 10.0,
            decay_rate: 0.5,
            noise_amplitude: 0.05,
        }
    }
}

impl SynthesisSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_rate > 0, "synthesis sample rate must be positive");
        ensure!(
            self.min_duration_secs > 0.0,
            "minimum duration must be positive"
        );
        ensure!(self.secs_per_char >= 0.0, "secs_per_char must be >= 0");
        ensure!(
            (0.0..=1.0).contains(&self.noise_amplitude),
            "noise amplitude must be within [0, 1]"
        );
        Ok(())
    }

    pub fn duration_secs(&self, text: &str) -> f64 {
        let chars = text.chars().count() as f64;
        self.min_duration_secs.max(chars * self.secs_per_char)
    }

    /// `exp(-decay t) * (1 - exp(-attack t))`
    pub fn envelope(&self, t: f64) -> f64 {
        (-self.decay_rate * t).exp() * (1.0 - (-self.attack_rate * t).exp())
    }

    pub fn pitch_hz(&self, t: f64) -> f64 {
        self.base_pitch_hz + self.pitch_depth_hz * (self.pitch_rate * t).sin()
    }
}

/// Generates the surrogate target signal for `text`.
///
/// The noise stream is seeded from the text, so a phrase always produces the
/// same buffer.
pub fn synthesize(text: &str, settings: &SynthesisSettings) -> AudioData {
    let rate = settings.sample_rate as f64;
    let total = (rate * settings.duration_secs(text)).ceil() as usize;
    let mut noise = signal::noise(phrase_seed(text));
    let samples = (0..total)
        .map(|i| {
            let t = i as f64 / rate;
            let tone = settings.envelope(t) * (2.0 * PI * settings.pitch_hz(t) * t).sin();
            let jitter = noise.next() * settings.noise_amplitude;
            (tone + jitter) as f32
        })
        .collect();
    AudioData {
        samples,
        sample_rate: settings.sample_rate,
    }
}

/// FNV-1a over the UTF-8 bytes.
fn phrase_seed(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}
