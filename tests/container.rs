use anyhow::Result;
use approx::assert_abs_diff_eq;
use echoscore::audio::decoder::decode_bytes;
use echoscore::audio::encoder::{encode_container, write_container, HEADER_LEN};
use echoscore::reference::{synthesize, SynthesisSettings};
use std::io::Cursor;

#[test]
fn container_samples_match_clamped_input() -> Result<()> {
    let input: [f32; 8] = [0.0, 0.25, -0.25, 0.999, -1.0, 1.7, -3.0, 0.5];
    let container = encode_container(&input, 22_050)?;
    assert_eq!(container.len(), HEADER_LEN + input.len() * 2);

    let mut reader = hound::WavReader::new(Cursor::new(container.into_bytes()))?;
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, 22_050);

    let decoded: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(decoded.len(), input.len());
    for (sample, original) in decoded.iter().zip(input) {
        let restored = *sample as f32 / 32767.0;
        let expected = original.clamp(-1.0, 1.0);
        assert_abs_diff_eq!(restored, expected, epsilon = 1.0 / 32767.0);
    }
    Ok(())
}

#[test]
fn synthesized_target_survives_encode_and_decode() -> Result<()> {
    let settings = SynthesisSettings::default();
    let audio = synthesize("Hello", &settings);
    assert!(audio.samples.len() >= 88_200);

    let container = encode_container(&audio.samples, audio.sample_rate)?;
    let decoded = decode_bytes(container.into_bytes())?;
    assert_eq!(decoded.sample_rate, 44_100);
    assert_eq!(decoded.samples.len(), audio.samples.len());
    Ok(())
}

#[test]
fn written_file_is_readable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("target.wav");
    let audio = synthesize("Merci beaucoup", &SynthesisSettings::default());
    write_container(&audio, &path)?;

    let reader = hound::WavReader::open(&path)?;
    assert_eq!(reader.len() as usize, audio.samples.len());
    Ok(())
}
