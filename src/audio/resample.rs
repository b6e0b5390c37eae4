use anyhow::{ensure, Result};
use dasp::interpolate::linear::Linear;
use dasp::{signal, Signal};

/// Linearly resample `samples` from `source_rate` to `target_rate`.
pub fn linear_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    ensure!(source_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let output_len = resampled_len(samples.len(), source_rate, target_rate);
    let mut source = signal::from_iter(samples.iter().copied());
    let left = source.next();
    let right = source.next();
    let converted = source.from_hz_to_hz(
        Linear::new(left, right),
        source_rate as f64,
        target_rate as f64,
    );
    Ok(converted.take(output_len).collect())
}

fn resampled_len(len: usize, source_rate: u32, target_rate: u32) -> usize {
    let ratio = target_rate as f64 / source_rate as f64;
    ((len as f64) * ratio).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::linear_resample;

    #[test]
    fn preserves_constant_signal_after_downsample() {
        let input = vec![0.5; 480];
        let resampled = linear_resample(&input, 48_000, 16_000).unwrap();
        assert_eq!(resampled.len(), 160);
        assert!(resampled.iter().all(|&sample| (sample - 0.5).abs() < 1e-6));
    }

    #[test]
    fn passes_through_matching_rates() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(linear_resample(&input, 44_100, 44_100).unwrap(), input);
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(linear_resample(&[0.0], 0, 44_100).is_err());
    }
}
