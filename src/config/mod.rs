use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::audio::analyser::AnalyserSettings;
use crate::audio::capture::CaptureSettings;
use crate::reference::SynthesisSettings;
use crate::scoring::ScoringWeights;

/// Every tunable of the practice pipeline. Missing sections and fields fall
/// back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    pub capture: CaptureSettings,
    pub analysis: AnalyserSettings,
    pub synthesis: SynthesisSettings,
    pub scoring: ScoringWeights,
}

impl PracticeConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {:?}", path))
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn from_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let latency = &self.capture.latency_ms;
        ensure!(*latency.start() > 0, "latency_ms start must be positive");
        ensure!(
            latency.end() >= latency.start(),
            "latency_ms end must be >= start"
        );
        self.analysis.validate().context("Invalid analysis settings")?;
        self.synthesis
            .validate()
            .context("Invalid synthesis settings")?;
        self.scoring.validate().context("Invalid scoring weights")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PracticeConfig;

    #[test]
    fn defaults_are_valid() {
        let config = PracticeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.analysis.bin_count(), 256);
        assert_eq!(config.scoring.pitch_weight, 0.7);
        assert_eq!(config.synthesis.sample_rate, 44_100);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = PracticeConfig::from_json(
            r#"{
                "scoring": { "pitch_weight": 0.6, "rhythm_weight": 0.4 },
                "capture": { "device_name": "USB Mic", "latency_ms": { "start": 50, "end": 80 } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.scoring.pitch_weight, 0.6);
        assert_eq!(config.scoring.neutral_rhythm, 50.0);
        assert_eq!(config.capture.device_name.as_deref(), Some("USB Mic"));
        assert_eq!(*config.capture.latency_ms.end(), 80);
        assert!(config.capture.noise_suppression);
    }

    #[test]
    fn rejects_invalid_fft_size() {
        let err = PracticeConfig::from_json(r#"{ "analysis": { "fft_size": 300 } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_override_uses_defaults() {
        let config = PracticeConfig::from_override(None).unwrap();
        assert_eq!(config, PracticeConfig::default());
    }
}
