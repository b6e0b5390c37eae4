//! Practice session state machine.
//!
//! `Idle -> Recording -> Scoring -> Scored -> Idle`, with reset available from
//! every state. The controller is a plain object driven by explicit calls: the
//! host calls [`SessionController::tick`] once per frame while recording.

pub mod feedback;

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::analyser::AnalyserSettings;
use crate::audio::capture::{CaptureError, CaptureHandle, CaptureSource, SpectralCapture};
use crate::audio::encoder::EncodingError;
use crate::audio::playback::PlaybackSink;
use crate::config::PracticeConfig;
use crate::reference::{ReferenceTrack, SynthesisSettings};
use crate::scoring::ScoringEngine;
use crate::types::{SessionStats, SimilarityResult, SpectralFrame, WaveformRecording};

pub use feedback::FeedbackTier;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(CaptureError),
    #[error("an attempt is already recording")]
    CaptureAlreadyActive,
    #[error("no attempt is recording")]
    NotRecording,
    #[error("no frames were captured; the attempt scores zero")]
    NoFramesCaptured,
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("failed to prepare reference: {0}")]
    Reference(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::AlreadyActive => Self::CaptureAlreadyActive,
            other => Self::Capture(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    #[default]
    Idle,
    Recording,
    Scoring,
    Scored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptOutcome {
    pub result: SimilarityResult,
    pub tier: FeedbackTier,
    pub user_frames: usize,
    pub reference_frames: usize,
}

/// Everything a rendering collaborator needs to draw the session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: AttemptState,
    pub phrase: Option<String>,
    pub live_frame: Option<SpectralFrame>,
    pub frames_captured: usize,
    pub outcome: Option<AttemptOutcome>,
    pub stats: SessionStats,
    pub notice: Option<String>,
}

impl SessionSnapshot {
    pub fn with_state(mut self, state: AttemptState) -> Self {
        self.state = state;
        self
    }

    pub fn with_live_frame(mut self, frame: Option<SpectralFrame>, frames_captured: usize) -> Self {
        self.live_frame = frame;
        self.frames_captured = frames_captured;
        self
    }

    pub fn with_outcome(mut self, outcome: Option<AttemptOutcome>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_notice(mut self, notice: Option<String>) -> Self {
        self.notice = notice;
        self
    }
}

pub struct SessionController<C: CaptureSource> {
    capture: SpectralCapture<C>,
    synthesis: SynthesisSettings,
    scoring: ScoringEngine,
    state: AttemptState,
    stats: SessionStats,
    reference: Option<ReferenceTrack>,
    handle: Option<CaptureHandle>,
    recording: Option<WaveformRecording>,
    outcome: Option<AttemptOutcome>,
    live_frame: Option<SpectralFrame>,
    notice: Option<String>,
}

impl<C: CaptureSource> SessionController<C> {
    pub fn new(source: C, config: &PracticeConfig) -> Self {
        Self {
            capture: SpectralCapture::new(
                source,
                config.capture.clone(),
                config.analysis.clone(),
            ),
            synthesis: config.synthesis.clone(),
            scoring: ScoringEngine::new(config.scoring),
            state: AttemptState::Idle,
            stats: SessionStats::default(),
            reference: None,
            handle: None,
            recording: None,
            outcome: None,
            live_frame: None,
            notice: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == AttemptState::Recording
    }

    pub fn analysis(&self) -> &AnalyserSettings {
        self.capture.analysis()
    }

    pub fn capture_source(&self) -> &C {
        self.capture.source()
    }

    pub fn capture_source_mut(&mut self) -> &mut C {
        self.capture.source_mut()
    }

    pub fn reference(&self) -> Option<&ReferenceTrack> {
        self.reference.as_ref()
    }

    /// Replaces the synthesized surrogate with a genuine recording. Attempts
    /// on the same phrase score against it until another phrase is started.
    pub fn use_reference(&mut self, track: ReferenceTrack) {
        info!(phrase = track.phrase(), origin = ?track.origin(), "reference installed");
        self.reference = Some(track);
    }

    /// Encodes the target for `phrase` and hands it to `sink`. The container
    /// is not kept afterwards.
    pub fn play_target(&mut self, phrase: &str, sink: &mut dyn PlaybackSink) -> Result<()> {
        let container = self.prepare_reference(phrase)?.container()?;
        debug!(phrase, bytes = container.len(), "handing target to playback");
        sink.play(container)
            .map_err(|err| SessionError::Playback(err.to_string()))
    }

    pub fn start_attempt(&mut self, phrase: &str) -> Result<()> {
        match self.state {
            AttemptState::Recording => return Err(SessionError::CaptureAlreadyActive),
            AttemptState::Scored | AttemptState::Scoring => self.reset_attempt(),
            AttemptState::Idle => {}
        }
        self.prepare_reference(phrase)?;
        let handle = self.capture.start_capture().map_err(|err| {
            warn!(error = %err, "attempt could not start; staying idle");
            SessionError::from(err)
        })?;
        self.handle = Some(handle);
        self.notice = None;
        self.state = AttemptState::Recording;
        info!(phrase, "attempt recording");
        Ok(())
    }

    /// Host frame callback. Captures exactly one frame while recording and
    /// returns it; returns `None` once the attempt is no longer recording.
    pub fn tick(&mut self) -> Option<SpectralFrame> {
        if self.state != AttemptState::Recording {
            return None;
        }
        let handle = self.handle.as_mut()?;
        let frame = self.capture.poll_frame(handle);
        self.live_frame = Some(frame.clone());
        Some(frame)
    }

    pub fn stop_attempt(&mut self) -> Result<SimilarityResult> {
        if self.state != AttemptState::Recording {
            return Err(SessionError::NotRecording);
        }
        let mut handle = self.handle.take().ok_or(SessionError::NotRecording)?;
        let recording = self.capture.stop_capture(&mut handle);
        self.state = AttemptState::Scoring;

        let reference = self
            .reference
            .as_ref()
            .map(|track| track.frames().clone())
            .unwrap_or_default();
        let result = self.scoring.score(&recording, &reference);
        if recording.is_empty() {
            let notice = SessionError::NoFramesCaptured;
            warn!(error = %notice, "stopping an attempt with no frames");
            self.notice = Some(notice.to_string());
        }

        let tier = FeedbackTier::from_score(result.score);
        self.stats.record(result.score);
        info!(
            score = result.score,
            pitch = result.pitch_component,
            rhythm = result.rhythm_component,
            tier = %tier,
            attempts = self.stats.attempts,
            best_score = self.stats.best_score,
            "attempt scored"
        );
        self.outcome = Some(AttemptOutcome {
            result,
            tier,
            user_frames: recording.len(),
            reference_frames: reference.len(),
        });
        self.recording = Some(recording);
        self.state = AttemptState::Scored;
        Ok(result)
    }

    /// Drops the current recording and result. Statistics survive.
    pub fn reset_attempt(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            let discarded = self.capture.stop_capture(&mut handle);
            debug!(frames = discarded.len(), "discarded in-flight recording");
        }
        self.recording = None;
        self.outcome = None;
        self.live_frame = None;
        self.notice = None;
        self.state = AttemptState::Idle;
    }

    /// Resets the attempt and clears statistics.
    pub fn new_session(&mut self) {
        self.reset_attempt();
        self.stats = SessionStats::default();
        info!("new practice session");
    }

    pub fn session_stats(&self) -> SessionStats {
        self.stats
    }

    pub fn outcome(&self) -> Option<&AttemptOutcome> {
        self.outcome.as_ref()
    }

    pub fn feedback(&self) -> Option<FeedbackTier> {
        self.outcome.as_ref().map(|outcome| outcome.tier)
    }

    pub fn recording(&self) -> Option<&WaveformRecording> {
        self.recording.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let frames_captured = match (&self.handle, &self.recording) {
            (Some(handle), _) => handle.frame_count(),
            (None, Some(recording)) => recording.len(),
            (None, None) => 0,
        };
        SessionSnapshot {
            phrase: self.reference.as_ref().map(|track| track.phrase().to_string()),
            stats: self.stats,
            ..SessionSnapshot::default()
        }
        .with_state(self.state)
        .with_live_frame(self.live_frame.clone(), frames_captured)
        .with_outcome(self.outcome.clone())
        .with_notice(self.notice.clone())
    }

    fn prepare_reference(&mut self, phrase: &str) -> Result<&ReferenceTrack> {
        let stale = self
            .reference
            .as_ref()
            .map_or(true, |track| track.phrase() != phrase);
        if stale {
            let track = ReferenceTrack::synthesize(phrase, &self.synthesis, self.capture.analysis())
                .map_err(|err| SessionError::Reference(format!("{:#}", err)))?;
            self.reference = Some(track);
        }
        self.reference
            .as_ref()
            .ok_or_else(|| SessionError::Reference("reference missing".to_string()))
    }
}

/// Fixed-rate stand-in for a display's frame callback.
pub struct FrameTicker {
    interval: Duration,
    next: Instant,
}

impl FrameTicker {
    pub fn new(frame_rate: u32) -> Self {
        let interval = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until the next tick. Late ticks fire immediately without
    /// trying to catch up.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.interval;
        } else {
            self.next = now + self.interval;
        }
    }
}
