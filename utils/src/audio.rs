use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Opus operates natively at 48kHz; both directions of the session run at
/// this rate.
pub const OPUS_SAMPLE_RATE: f64 = 48000.0;
/// Samples per 20ms mono Opus frame at 48kHz.
pub const OPUS_FRAME_SAMPLES: usize = 960;
/// Frame duration used for outbound media samples.
pub const OPUS_FRAME_MS: u64 = 20;

pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Split into fixed-size chunks, zero-padding the tail so every chunk can be
/// fed to a fixed-frame codec.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Average interleaved frames down to mono.
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_pad_the_tail_with_silence() {
        let chunks = split_for_chunks(&[0.1, 0.2, 0.3], 2);
        assert_eq!(chunks, vec![vec![0.1, 0.2], vec![0.3, 0.0]]);
    }

    #[test]
    fn stereo_mixes_to_mono_by_averaging() {
        let mono = mix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn mono_passes_through_unchanged() {
        let samples = vec![0.25, -0.25];
        assert_eq!(mix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn frame_constants_agree() {
        assert_eq!(
            OPUS_FRAME_SAMPLES as u64,
            (OPUS_SAMPLE_RATE as u64 * OPUS_FRAME_MS) / 1000
        );
    }
}
