use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "echoscore",
    version,
    about = "Pronunciation practice: hear a target phrase, record an attempt, get a score"
)]
pub struct Cli {
    /// Optional JSON file overriding capture, analysis, synthesis and scoring settings.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play the target, record attempts from the microphone and score them.
    Practice(PracticeArgs),
    /// Write the synthesized target for a phrase to a WAV file.
    Synth(SynthArgs),
    /// Score a recorded attempt against a reference recording.
    Compare(CompareArgs),
    /// List available input devices.
    Devices,
}

#[derive(Args, Debug, Clone)]
pub struct PracticeArgs {
    /// Phrase to practise.
    #[arg(long)]
    pub phrase: String,
    /// Recording length per attempt in seconds.
    #[arg(long, default_value_t = 3.0)]
    pub seconds: f64,
    /// Number of attempts in this session.
    #[arg(long, default_value_t = 1)]
    pub attempts: u32,
    /// Optional input device name.
    #[arg(long)]
    pub device: Option<String>,
    /// Frames captured per second (overrides the config file).
    #[arg(long)]
    pub frame_rate: Option<u32>,
    /// Genuine recording of the phrase to use instead of the synthesized target.
    #[arg(long, value_name = "PATH")]
    pub reference: Option<PathBuf>,
    /// Skip playing the target before each attempt.
    #[arg(long)]
    pub no_playback: bool,
}

impl PracticeArgs {
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.phrase.trim().is_empty(), "phrase must not be empty");
        ensure!(
            self.seconds > 0.0 && self.seconds.is_finite(),
            "seconds must be positive"
        );
        ensure!(self.attempts > 0, "attempts must be at least 1");
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct SynthArgs {
    #[arg(long)]
    pub phrase: String,
    /// Destination WAV path.
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Reference pronunciation (any format symphonia decodes).
    #[arg(long, value_name = "PATH")]
    pub reference: PathBuf,
    /// Learner attempt.
    #[arg(long, value_name = "PATH")]
    pub learner: PathBuf,
    /// Print the outcome as JSON.
    #[arg(long)]
    pub json: bool,
}
