//! WAV decode/encode for uploaded segments.
//!
//! Uploads arrive in whatever format the device produced. Everything
//! downstream works on 16kHz mono i16 PCM, so decoding normalizes: stereo is
//! downmixed and other rates are resampled with linear interpolation.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, ScribedError};
use std::io::Cursor;

/// Decode WAV bytes into 16kHz mono PCM samples.
pub fn decode_wav(bytes: &[u8]) -> Result<Vec<i16>> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| ScribedError::AudioDecode {
            message: format!("failed to parse WAV data: {}", e),
        })?;

    let spec = reader.spec();
    let source_rate = spec.sample_rate;
    let source_channels = spec.channels;

    let raw_samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ScribedError::AudioDecode {
            message: format!("failed to read WAV samples: {}", e),
        })?;

    // Downmix stereo by averaging channel pairs.
    let mono_samples = if source_channels == 2 {
        raw_samples
            .chunks_exact(2)
            .map(|chunk| {
                let left = chunk[0] as i32;
                let right = chunk[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect()
    } else if source_channels == 1 {
        raw_samples
    } else {
        return Err(ScribedError::AudioDecode {
            message: format!("unsupported channel count: {}", source_channels),
        });
    };

    let samples = if source_rate != SAMPLE_RATE {
        resample(&mono_samples, source_rate, SAMPLE_RATE)
    } else {
        mono_samples
    };

    Ok(samples)
}

/// Encode 16kHz mono PCM samples as WAV bytes, the payload format sent to
/// the transcription provider.
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| ScribedError::AudioDecode {
                message: format!("failed to create WAV writer: {}", e),
            })?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| ScribedError::AudioDecode {
                    message: format!("failed to write WAV sample: {}", e),
                })?;
        }
        writer.finalize().map_err(|e| ScribedError::AudioDecode {
            message: format!("failed to finalize WAV data: {}", e),
        })?;
    }
    Ok(cursor.into_inner())
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}
