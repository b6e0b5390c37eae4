use anyhow::Result;
use echoscore::audio::capture::{CaptureError, MockCapture};
use echoscore::audio::playback::CollectingSink;
use echoscore::reference::{ReferenceOrigin, ReferenceTrack};
use echoscore::session::FeedbackTier;
use echoscore::{AttemptState, PracticeConfig, SessionController, SessionError};
use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 44_100;

fn session_with(capture: MockCapture) -> SessionController<MockCapture> {
    SessionController::new(capture, &PracticeConfig::default())
}

fn tone(frequency: f32, duration_secs: f32) -> Vec<f32> {
    let total = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..total)
        .map(|i| 0.3 * (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

#[test]
fn attempt_without_frames_scores_zero() -> Result<()> {
    let mut session = session_with(MockCapture::silent(SAMPLE_RATE));
    session.start_attempt("Bonjour")?;
    assert_eq!(session.state(), AttemptState::Recording);

    let result = session.stop_attempt()?;
    assert_eq!(result.score, 0);
    assert_eq!(session.state(), AttemptState::Scored);
    assert_eq!(session.feedback(), Some(FeedbackTier::TryAgain));
    assert_eq!(session.feedback().map(|tier| tier.label()), Some("try again"));
    assert_eq!(session.session_stats().attempts, 1);
    assert_eq!(session.session_stats().best_score, 0);
    assert!(session.notice().is_some());
    assert_eq!(session.capture_source().stop_count(), 1);
    Ok(())
}

#[test]
fn permission_denied_keeps_session_idle_and_retry_works() -> Result<()> {
    let denied = CaptureError::PermissionDenied("microphone blocked".to_string());
    let mut session = session_with(MockCapture::failing(denied.clone()));

    let err = session.start_attempt("Hola").unwrap_err();
    assert!(matches!(err, SessionError::Capture(ref e) if *e == denied));
    assert_eq!(session.state(), AttemptState::Idle);
    assert_eq!(session.session_stats().attempts, 0);
    assert!(!session.capture_source().is_started());

    session.capture_source_mut().recover();
    session.start_attempt("Hola")?;
    assert!(session.is_recording());
    assert_eq!(session.capture_source().start_count(), 2);
    Ok(())
}

#[test]
fn recorded_frames_are_scored_against_reference() -> Result<()> {
    let capture = MockCapture::from_samples(SAMPLE_RATE, tone(220.0, 1.0), 735);
    let mut session = session_with(capture);
    session.start_attempt("Hello")?;
    let mut last_timestamp = None;
    for _ in 0..30 {
        let frame = session.tick().expect("recording should emit frames");
        assert_eq!(frame.bin_count(), 256);
        if let Some(previous) = last_timestamp {
            assert!(frame.timestamp_ms() > previous);
        }
        last_timestamp = Some(frame.timestamp_ms());
    }
    let result = session.stop_attempt()?;
    assert!(result.score <= 100);

    let outcome = session.outcome().expect("scored attempt has an outcome");
    assert_eq!(outcome.user_frames, 30);
    assert!(outcome.reference_frames > 0);
    assert_eq!(session.recording().map(|r| r.len()), Some(30));
    assert!(session.notice().is_none());
    Ok(())
}

#[test]
fn best_score_never_decreases_and_reset_keeps_stats() -> Result<()> {
    let capture = MockCapture::from_samples(SAMPLE_RATE, tone(330.0, 2.0), 735);
    let mut session = session_with(capture);

    session.start_attempt("Ciao")?;
    for _ in 0..20 {
        session.tick();
    }
    let first = session.stop_attempt()?;
    let best_after_first = session.session_stats().best_score;
    assert_eq!(best_after_first, first.score);

    // starting again from Scored resets the attempt implicitly
    session.start_attempt("Ciao")?;
    let second = session.stop_attempt()?;
    assert_eq!(second.score, 0);
    assert_eq!(session.session_stats().attempts, 2);
    assert_eq!(session.session_stats().best_score, best_after_first);

    session.reset_attempt();
    assert_eq!(session.state(), AttemptState::Idle);
    assert!(session.outcome().is_none());
    assert!(session.recording().is_none());
    assert_eq!(session.session_stats().attempts, 2);

    session.new_session();
    assert_eq!(session.session_stats().attempts, 0);
    assert_eq!(session.session_stats().best_score, 0);
    Ok(())
}

#[test]
fn reset_while_recording_releases_capture() -> Result<()> {
    let mut session = session_with(MockCapture::silent(SAMPLE_RATE));
    session.start_attempt("Gracias")?;
    session.tick();
    session.reset_attempt();
    assert_eq!(session.state(), AttemptState::Idle);
    assert!(!session.capture_source().is_started());
    assert_eq!(session.session_stats().attempts, 0);
    assert!(matches!(
        session.stop_attempt(),
        Err(SessionError::NotRecording)
    ));
    Ok(())
}

#[test]
fn play_target_hands_a_wav_container_to_the_sink() -> Result<()> {
    let mut session = session_with(MockCapture::silent(SAMPLE_RATE));
    let mut sink = CollectingSink::default();
    session.play_target("Hello", &mut sink)?;

    assert_eq!(sink.played.len(), 1);
    let bytes = sink.played[0].as_bytes();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WAVE");
    // 2 s minimum at 44.1 kHz, 16-bit mono
    assert!(sink.played[0].data_len() >= 88_200 * 2);
    assert_eq!(session.state(), AttemptState::Idle);
    assert_eq!(session.reference().map(|r| r.phrase()), Some("Hello"));
    Ok(())
}

#[test]
fn installed_reference_is_used_for_matching_phrase() -> Result<()> {
    let config = PracticeConfig::default();
    let recorded = ReferenceTrack::from_audio(
        "Hallo",
        echoscore::types::AudioData::new(tone(200.0, 0.5), SAMPLE_RATE),
        ReferenceOrigin::Recorded("hallo.wav".into()),
        &config.analysis,
    )?;
    let mut session = SessionController::new(MockCapture::silent(SAMPLE_RATE), &config);
    session.use_reference(recorded);
    session.start_attempt("Hallo")?;
    assert!(matches!(
        session.reference().map(|r| r.origin()),
        Some(ReferenceOrigin::Recorded(_))
    ));
    session.stop_attempt()?;

    session.start_attempt("Tschuess")?;
    assert_eq!(
        session.reference().map(|r| r.origin().clone()),
        Some(ReferenceOrigin::Synthesized)
    );
    Ok(())
}

#[test]
fn snapshot_reflects_live_state() -> Result<()> {
    let capture = MockCapture::from_samples(SAMPLE_RATE, tone(440.0, 0.5), 735);
    let mut session = session_with(capture);
    session.start_attempt("Salut")?;
    session.tick();
    session.tick();
    let live = session.snapshot();
    assert_eq!(live.state, AttemptState::Recording);
    assert_eq!(live.frames_captured, 2);
    assert!(live.live_frame.is_some());
    assert_eq!(live.phrase.as_deref(), Some("Salut"));

    session.stop_attempt()?;
    let scored = session.snapshot();
    assert_eq!(scored.state, AttemptState::Scored);
    assert_eq!(scored.stats.attempts, 1);
    assert!(scored.outcome.is_some());
    Ok(())
}
