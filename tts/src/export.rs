//! WAV export of synthesized audio.
//!
//! Segments are written as 16-bit mono PCM. Merging concatenates segments in
//! the order given and resamples any segment whose rate differs from the
//! target.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};
use tracing::debug;

use crate::{AudioSegment, Result, TtsError};

/// Concatenated audio at a single sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Encode samples as an in-memory WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), wav_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
    }
    Ok(bytes)
}

/// Write samples to a WAV file at `path`.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::create(path.as_ref(), wav_spec(sample_rate))?;
    for &sample in samples {
        writer.write_sample(to_i16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write a single segment to `path`.
pub fn write_segment(path: impl AsRef<Path>, segment: &AudioSegment) -> Result<()> {
    write_wav(path, &segment.samples, segment.sample_rate)
}

/// Concatenate `segments` in order.
///
/// The output rate is `target_rate`, or the rate of the first segment.
pub fn merge_segments(
    segments: &[Arc<AudioSegment>],
    target_rate: Option<u32>,
) -> Result<MergedAudio> {
    let first = segments.first().ok_or(TtsError::EmptyExport)?;
    let sample_rate = target_rate.unwrap_or(first.sample_rate);
    let mut samples = Vec::with_capacity(segments.iter().map(|s| s.samples.len()).sum());
    for segment in segments {
        if segment.sample_rate == sample_rate {
            samples.extend_from_slice(&segment.samples);
        } else {
            debug!(
                index = segment.index,
                from = segment.sample_rate,
                to = sample_rate,
                "resampling segment for export"
            );
            samples.extend(resample(&segment.samples, segment.sample_rate, sample_rate)?);
        }
    }
    Ok(MergedAudio {
        samples,
        sample_rate,
    })
}

/// Merge `segments` and write them to `path`.
pub fn write_merged(path: impl AsRef<Path>, segments: &[Arc<AudioSegment>]) -> Result<MergedAudio> {
    let merged = merge_segments(segments, None)?;
    write_wav(path, &merged.samples, merged.sample_rate)?;
    Ok(merged)
}

/// Convert mono audio from `from` Hz to `to` Hz with sinc interpolation.
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from == 0 || to == 0 {
        return Err(TtsError::Resample(format!("invalid rates {from} -> {to}")));
    }

    let sinc_len = 256;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window,
    };
    let ratio = f64::from(to) / f64::from(from);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| TtsError::Resample(e.to_string()))?;

    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| TtsError::Resample(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();
    // Flush the filter tail.
    while output.len() < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| TtsError::Resample(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }
    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
