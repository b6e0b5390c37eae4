//! Core types shared by the capture, reference, scoring and session layers.

use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;

/// Raw audio data representation (mono, f32 samples)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// Audio samples, nominally in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One time-stamped snapshot of per-bin magnitudes, each in [0, 100].
///
/// Bin 0 is the lowest frequency. Frames cannot be modified once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralFrame {
    magnitudes: Arc<[f32]>,
    timestamp_ms: u64,
}

impl SpectralFrame {
    /// Builds a frame, clamping every magnitude into [0, 100]. Non-finite
    /// values are treated as silence.
    pub fn new(magnitudes: Vec<f32>, timestamp_ms: u64) -> Self {
        let magnitudes: Vec<f32> = magnitudes
            .into_iter()
            .map(|value| {
                if value.is_finite() {
                    value.clamp(0.0, 100.0)
                } else {
                    0.0
                }
            })
            .collect();
        Self {
            magnitudes: Arc::from(magnitudes),
            timestamp_ms,
        }
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Sum of all bin magnitudes.
    pub fn energy(&self) -> f32 {
        self.magnitudes.iter().sum()
    }
}

/// Frozen, time-ordered sequence of spectral frames for one attempt.
///
/// Built from a [`RecordingBuffer`] when capture stops, or directly from a
/// list of frames for reference tracks. Clones share the same storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformRecording {
    frames: Arc<[SpectralFrame]>,
}

impl WaveformRecording {
    pub fn from_frames(frames: Vec<SpectralFrame>) -> Self {
        Self {
            frames: Arc::from(frames),
        }
    }

    pub fn frames(&self) -> &[SpectralFrame] {
        &self.frames
    }

    /// Capture-relative span between the first and last frame.
    pub fn span_ms(&self) -> u64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ms().saturating_sub(first.timestamp_ms()),
            _ => 0,
        }
    }
}

impl Deref for WaveformRecording {
    type Target = [SpectralFrame];

    fn deref(&self) -> &Self::Target {
        &self.frames
    }
}

/// Append-only frame buffer filled while capture is running.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    frames: Vec<SpectralFrame>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: SpectralFrame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.frames.last().map(SpectralFrame::timestamp_ms)
    }

    /// Consumes the buffer; nothing can be appended afterwards.
    pub fn freeze(self) -> WaveformRecording {
        WaveformRecording::from_frames(self.frames)
    }
}

/// Outcome of comparing a learner recording against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SimilarityResult {
    /// Overall score, 0..=100.
    pub score: u8,
    pub pitch_component: f32,
    pub rhythm_component: f32,
}

/// Per-session attempt counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    pub attempts: u32,
    pub best_score: u8,
}

impl SessionStats {
    pub fn record(&mut self, score: u8) {
        self.attempts = self.attempts.saturating_add(1);
        self.best_score = self.best_score.max(score.min(100));
    }
}
