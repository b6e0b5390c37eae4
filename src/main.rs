use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use echoscore::audio::capture::{list_input_devices, LiveCaptureSource};
use echoscore::audio::decoder::decode_file;
use echoscore::audio::encoder::write_container;
use echoscore::audio::playback::SpeakerSink;
use echoscore::cli::{Cli, Command, CompareArgs, PracticeArgs, SynthArgs};
use echoscore::reference::{analyse_audio, synthesize, ReferenceTrack};
use echoscore::scoring::ScoringEngine;
use echoscore::session::FrameTicker;
use echoscore::{FeedbackTier, PracticeConfig, SessionController, SimilarityResult};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = PracticeConfig::from_override(cli.config.as_deref())
        .context("Failed to load configuration")?;
    match cli.command {
        Command::Practice(args) => practice(config, &args),
        Command::Synth(args) => synth(&config, &args),
        Command::Compare(args) => compare(&config, &args),
        Command::Devices => devices(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn practice(mut config: PracticeConfig, args: &PracticeArgs) -> Result<()> {
    args.validate().context("Invalid practice arguments")?;
    if let Some(device) = &args.device {
        config.capture.device_name = Some(device.clone());
    }
    if let Some(frame_rate) = args.frame_rate {
        config.analysis.frame_rate = frame_rate;
        config.validate().context("Invalid --frame-rate")?;
    }

    let source = LiveCaptureSource::new(&config.capture);
    let mut session = SessionController::new(source, &config);
    if let Some(path) = &args.reference {
        let track = ReferenceTrack::from_file(&args.phrase, path, &config.analysis)
            .context("Failed to load reference recording")?;
        session.use_reference(track);
    }

    let mut speakers = SpeakerSink::new();
    let record_for = Duration::from_secs_f64(args.seconds);
    for attempt in 1..=args.attempts {
        if !args.no_playback {
            println!("Target: \"{}\"", args.phrase);
            session
                .play_target(&args.phrase, &mut speakers)
                .context("Failed to play target")?;
        }

        session
            .start_attempt(&args.phrase)
            .context("Failed to start recording")?;
        println!(
            "Attempt {}/{}: speak now ({:.1}s)...",
            attempt, args.attempts, args.seconds
        );
        let mut ticker = FrameTicker::new(config.analysis.frame_rate);
        let deadline = Instant::now() + record_for;
        while session.is_recording() && Instant::now() < deadline {
            ticker.wait();
            if let Some(frame) = session.tick() {
                debug!(
                    timestamp_ms = frame.timestamp_ms(),
                    energy = frame.energy(),
                    "frame"
                );
            }
        }

        let result = session.stop_attempt().context("Failed to score attempt")?;
        let tier = session.feedback().unwrap_or(FeedbackTier::from_score(result.score));
        print_result(&result, tier);
        if let Some(notice) = session.notice() {
            println!("  note: {}", notice);
        }
    }

    let stats = session.session_stats();
    println!(
        "\nSession: {} attempt(s), best score {}",
        stats.attempts, stats.best_score
    );
    Ok(())
}

fn synth(config: &PracticeConfig, args: &SynthArgs) -> Result<()> {
    let audio = synthesize(&args.phrase, &config.synthesis);
    write_container(&audio, &args.output)?;
    println!(
        "Wrote {:.2}s target for \"{}\" to {:?}",
        audio.duration_secs(),
        args.phrase,
        args.output
    );
    Ok(())
}

#[derive(Serialize)]
struct CompareReport {
    score: u8,
    tier: FeedbackTier,
    pitch: f32,
    rhythm: f32,
    learner_frames: usize,
    reference_frames: usize,
}

fn compare(config: &PracticeConfig, args: &CompareArgs) -> Result<()> {
    let reference = ReferenceTrack::from_file("", &args.reference, &config.analysis)
        .context("Failed to load reference")?;
    let learner_audio = decode_file(&args.learner).context("Failed to load learner attempt")?;
    let learner = analyse_audio(&learner_audio, &config.analysis)?;

    let result = ScoringEngine::new(config.scoring).score(&learner, reference.frames());
    let tier = FeedbackTier::from_score(result.score);
    if args.json {
        let report = CompareReport {
            score: result.score,
            tier,
            pitch: result.pitch_component,
            rhythm: result.rhythm_component,
            learner_frames: learner.len(),
            reference_frames: reference.frames().len(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_result(&result, tier);
    }
    Ok(())
}

fn devices() -> Result<()> {
    let names = list_input_devices().context("Failed to enumerate input devices")?;
    if names.is_empty() {
        println!("No input devices found");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn print_result(result: &SimilarityResult, tier: FeedbackTier) {
    println!(
        "  score {:>3}  ({})  pitch {:.1}  rhythm {:.1}",
        result.score, tier, result.pitch_component, result.rhythm_component
    );
}
