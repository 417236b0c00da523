// Sample rate conversion using rubato

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Result, SoundError};

const CHUNK_FRAMES: usize = 1024;

/// Convert interleaved `samples` from `from_rate` to `to_rate`.
///
/// The output always holds `round(frames * to_rate / from_rate)` frames; the
/// resampler's leading delay is trimmed off.
pub fn resample(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    let channels = channels.max(1);
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / channels;
    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
        .collect();

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, channels)
        .map_err(|e| SoundError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];

    let mut position = 0;
    while position + CHUNK_FRAMES <= frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|p| &p[position..position + CHUNK_FRAMES]).collect();
        let processed = resampler.process(chunk.as_slice(), None)
            .map_err(|e| SoundError::Resample(e.to_string()))?;
        append(&mut output, processed);
        position += CHUNK_FRAMES;
    }

    if position < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|p| &p[position..]).collect();
        let processed = resampler.process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| SoundError::Resample(e.to_string()))?;
        append(&mut output, processed);
    }

    // Flush the filter tail until the delayed output is complete
    let mut flushes = 0;
    while output[0].len() < delay + expected && flushes < 8 {
        let processed = resampler.process_partial::<Vec<f32>>(None, None)
            .map_err(|e| SoundError::Resample(e.to_string()))?;
        append(&mut output, processed);
        flushes += 1;
    }

    let mut interleaved = Vec::with_capacity(expected * channels);
    for frame in 0..expected {
        for plane in &output {
            interleaved.push(plane.get(delay + frame).copied().unwrap_or(0.0));
        }
    }
    Ok(interleaved)
}

fn append(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (plane, chunk) in output.iter_mut().zip(processed) {
        plane.extend_from_slice(&chunk);
    }
}
