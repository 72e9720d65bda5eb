//! Sample rate conversion using rubato
//!
//! The decoder produces interleaved stereo at the stream's native rate;
//! when the output device runs at a different rate the session converts
//! each chunk here before it enters the ring. Rendering ring samples at
//! the wrong rate would shift pitch and playback speed.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

const CHANNELS: usize = 2;

/// Resample an interleaved stereo chunk from `input_rate` to
/// `output_rate`. Chunks already at the output rate pass through
/// unchanged.
pub(crate) fn resample_chunk(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let planar_input = deinterleave(input);
    let input_frames = planar_input[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        CHANNELS,
    )
    .map_err(|e| Error::Playback(format!("resampler setup failed: {e}")))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Playback(format!("resampling failed: {e}")))?;

    Ok(interleave(&planar_output))
}

/// [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]].
fn deinterleave(samples: &[f32]) -> Vec<Vec<f32>> {
    let frames = samples.len() / CHANNELS;
    let mut planar = vec![Vec::with_capacity(frames); CHANNELS];
    for frame in samples.chunks_exact(CHANNELS) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    planar
}

/// [[L, L, ...], [R, R, ...]] to [L, R, L, R, ...].
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.first().map(Vec::len).unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            interleaved.push(channel[i]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_splits_stereo_frames() {
        let planar = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn interleave_restores_frame_order() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(interleave(&planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn matching_rates_pass_through() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_chunk(&input, 44_100, 44_100).unwrap(), input);
    }

    #[test]
    fn rate_conversion_scales_the_frame_count() {
        let input_rate = 48_000;
        let frames = 1000;
        let mut input = Vec::with_capacity(frames * CHANNELS);
        for i in 0..frames {
            let t = i as f32 / input_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            input.push(sample);
            input.push(sample);
        }

        let output = resample_chunk(&input, input_rate, 44_100).unwrap();
        let output_frames = output.len() / CHANNELS;
        let expected = (frames as f64 * 44_100.0 / input_rate as f64) as usize;
        assert!(
            output_frames.abs_diff(expected) <= 10,
            "expected ~{expected} frames, got {output_frames}"
        );
    }
}
