//! Target ("reference") pronunciations: the audio the learner hears and the
//! spectral frames their attempt is scored against.

pub mod synth;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::audio::analyser::{analyse_samples, AnalyserSettings};
use crate::audio::decoder::decode_file;
use crate::audio::encoder::{encode_container, AudioContainer, EncodingError};
use crate::audio::resample;
use crate::types::{AudioData, WaveformRecording};

pub use synth::{synthesize, SynthesisSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceOrigin {
    Synthesized,
    Recorded(PathBuf),
}

/// A target phrase with its audio and its analysed frames.
#[derive(Debug, Clone)]
pub struct ReferenceTrack {
    phrase: String,
    audio: AudioData,
    frames: WaveformRecording,
    origin: ReferenceOrigin,
}

impl ReferenceTrack {
    /// Builds the surrogate reference for `phrase`.
    pub fn synthesize(
        phrase: &str,
        synthesis: &SynthesisSettings,
        analysis: &AnalyserSettings,
    ) -> Result<Self> {
        let audio = synthesize(phrase, synthesis);
        info!(
            phrase,
            samples = audio.samples.len(),
            duration_secs = audio.duration_secs(),
            "synthesized reference signal"
        );
        Self::from_audio(phrase, audio, ReferenceOrigin::Synthesized, analysis)
    }

    /// Loads a genuine recording of `phrase` from disk.
    pub fn from_file(phrase: &str, path: &Path, analysis: &AnalyserSettings) -> Result<Self> {
        let audio = decode_file(path)?;
        info!(
            phrase,
            path = %path.display(),
            sample_rate = audio.sample_rate,
            duration_secs = audio.duration_secs(),
            "loaded reference recording"
        );
        Self::from_audio(
            phrase,
            audio,
            ReferenceOrigin::Recorded(path.to_path_buf()),
            analysis,
        )
    }

    pub fn from_audio(
        phrase: &str,
        audio: AudioData,
        origin: ReferenceOrigin,
        analysis: &AnalyserSettings,
    ) -> Result<Self> {
        let frames = analyse_audio(&audio, analysis)?;
        Ok(Self {
            phrase: phrase.to_string(),
            audio,
            frames,
            origin,
        })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    pub fn frames(&self) -> &WaveformRecording {
        &self.frames
    }

    pub fn origin(&self) -> &ReferenceOrigin {
        &self.origin
    }

    /// Encodes the reference audio for the playback collaborator.
    pub fn container(&self) -> Result<AudioContainer, EncodingError> {
        encode_container(&self.audio.samples, self.audio.sample_rate)
    }
}

/// Brings `audio` to the analysis rate and runs the offline analyser.
pub fn analyse_audio(audio: &AudioData, analysis: &AnalyserSettings) -> Result<WaveformRecording> {
    let samples = resample::linear_resample(&audio.samples, audio.sample_rate, analysis.sample_rate)
        .with_context(|| {
            format!(
                "failed to resample audio from {} Hz to {} Hz",
                audio.sample_rate, analysis.sample_rate
            )
        })?;
    Ok(WaveformRecording::from_frames(analyse_samples(
        &samples, analysis,
    )))
}
