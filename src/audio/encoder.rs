use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::types::AudioData;

/// Size of the RIFF/WAVE header preceding the PCM data.
pub const HEADER_LEN: usize = 44;
const BYTES_PER_SAMPLE: usize = 2;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("sample {index} is not finite ({value})")]
    NonFiniteSample { index: usize, value: f32 },
    #[error("buffer of {samples} samples exceeds the container size limit")]
    TooLong { samples: usize },
    #[error("failed to write container: {0}")]
    Writer(#[from] hound::Error),
}

/// A mono 16-bit PCM RIFF/WAVE byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContainer {
    bytes: Vec<u8>,
}

impl AudioContainer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn data_len(&self) -> usize {
        self.bytes.len().saturating_sub(HEADER_LEN)
    }
}

/// Encode `samples` as mono 16-bit PCM inside a RIFF/WAVE container.
///
/// Each sample is clamped to [-1.0, 1.0] and scaled by 32767, truncating
/// toward zero.
pub fn encode_container(samples: &[f32], sample_rate: u32) -> Result<AudioContainer, EncodingError> {
    validate_buffer(samples, sample_rate)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        HEADER_LEN + samples.len() * BYTES_PER_SAMPLE,
    ));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(quantize(sample))?;
        }
        writer.finalize()?;
    }

    Ok(AudioContainer {
        bytes: cursor.into_inner(),
    })
}

/// Encode AudioData and write the container to `path`.
pub fn write_container<P: AsRef<Path>>(audio: &AudioData, path: P) -> Result<()> {
    let path = path.as_ref();
    let container = encode_container(&audio.samples, audio.sample_rate)
        .with_context(|| format!("Failed to encode audio for {}", path.display()))?;
    std::fs::write(path, container.as_bytes())
        .with_context(|| format!("Failed to write WAV file: {}", path.display()))?;
    Ok(())
}

pub fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn validate_buffer(samples: &[f32], sample_rate: u32) -> Result<(), EncodingError> {
    if sample_rate == 0 {
        return Err(EncodingError::ZeroSampleRate);
    }
    let max_samples = (u32::MAX as usize - (HEADER_LEN - 8)) / BYTES_PER_SAMPLE;
    if samples.len() > max_samples {
        return Err(EncodingError::TooLong {
            samples: samples.len(),
        });
    }
    if let Some((index, &value)) = samples.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(EncodingError::NonFiniteSample { index, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    fn le_u16(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[test]
    fn header_layout_is_canonical_pcm() {
        let container = encode_container(&[0.0, 0.5, -0.5], 44_100).unwrap();
        let bytes = container.as_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 6);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(le_u32(bytes, 4), 36 + 6);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(le_u32(bytes, 16), 16);
        assert_eq!(le_u16(bytes, 20), 1);
        assert_eq!(le_u16(bytes, 22), 1);
        assert_eq!(le_u32(bytes, 24), 44_100);
        assert_eq!(le_u32(bytes, 28), 88_200);
        assert_eq!(le_u16(bytes, 32), 2);
        assert_eq!(le_u16(bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(le_u32(bytes, 40), 6);
    }

    #[test]
    fn samples_are_clamped_and_truncated() {
        let container = encode_container(&[2.0, -3.0, 0.25], 8_000).unwrap();
        let data = &container.as_bytes()[HEADER_LEN..];
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), 32767);
        assert_eq!(i16::from_le_bytes([data[2], data[3]]), -32767);
        assert_eq!(i16::from_le_bytes([data[4], data[5]]), 8191);
    }

    #[test]
    fn empty_buffer_yields_header_only() {
        let container = encode_container(&[], 16_000).unwrap();
        assert_eq!(container.len(), HEADER_LEN);
        assert_eq!(container.data_len(), 0);
    }

    #[test]
    fn rejects_malformed_buffers() {
        assert!(matches!(
            encode_container(&[0.1, f32::NAN], 44_100),
            Err(EncodingError::NonFiniteSample { index: 1, .. })
        ));
        assert!(matches!(
            encode_container(&[0.1], 0),
            Err(EncodingError::ZeroSampleRate)
        ));
    }
}
