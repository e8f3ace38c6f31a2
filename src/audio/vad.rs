//! Offline voice activity detection over whole segments.
//!
//! Frames the decoded audio at a fixed hop, thresholds each frame's RMS
//! level, and runs a small state machine over the frame labels: a voiced run
//! opens a candidate interval, a silence run of at least `min_silence_ms`
//! closes it. Candidates shorter than `min_speech_ms` are dropped, survivors
//! are padded on both sides and merged where the padding makes them touch.

use crate::config::VadSettings;
use crate::defaults;
use crate::model::SpeechInterval;

/// Speech detector for complete, already-decoded segments.
pub struct SpeechExtractor {
    settings: VadSettings,
}

impl SpeechExtractor {
    pub fn new(settings: VadSettings) -> Self {
        Self { settings }
    }

    /// Detect speech intervals in 16kHz mono PCM samples.
    ///
    /// Returned intervals are half-open `[start_ms, end_ms)`, ordered, and
    /// non-overlapping. An empty result means the segment is pure silence.
    pub fn extract(&self, samples: &[i16]) -> Vec<SpeechInterval> {
        let frame_ms = defaults::VAD_FRAME_MS;
        let frame_len = (self.settings.sample_rate as u64 * frame_ms / 1000) as usize;
        if frame_len == 0 || samples.is_empty() {
            return Vec::new();
        }
        let total_ms = samples.len() as u64 * 1000 / self.settings.sample_rate as u64;

        let mut raw: Vec<(u64, u64)> = Vec::new();
        let mut speech_start: Option<u64> = None;
        let mut silence_start: Option<u64> = None;

        for (i, frame) in samples.chunks(frame_len).enumerate() {
            let frame_at = i as u64 * frame_ms;
            let voiced = calculate_rms(frame) > self.settings.threshold;

            match (speech_start, voiced) {
                (None, true) => {
                    speech_start = Some(frame_at);
                    silence_start = None;
                }
                (None, false) => {}
                (Some(_), true) => {
                    silence_start = None;
                }
                (Some(start), false) => {
                    let silent_since = *silence_start.get_or_insert(frame_at);
                    if frame_at + frame_ms - silent_since >= self.settings.min_silence_ms {
                        raw.push((start, silent_since));
                        speech_start = None;
                        silence_start = None;
                    }
                }
            }
        }

        // Speech running at end-of-audio closes at the last voiced frame, or
        // the end of the segment if no trailing silence was seen.
        if let Some(start) = speech_start {
            let end = silence_start.unwrap_or(total_ms);
            raw.push((start, end));
        }

        let padding = self.settings.padding_ms;
        let mut intervals: Vec<SpeechInterval> = Vec::new();
        for (start, end) in raw {
            if end - start < self.settings.min_speech_ms {
                continue;
            }
            let padded_start = start.saturating_sub(padding);
            let padded_end = (end + padding).min(total_ms);

            match intervals.last_mut() {
                Some(prev) if padded_start <= prev.end_ms => {
                    prev.end_ms = padded_end.max(prev.end_ms);
                }
                _ => intervals.push(SpeechInterval {
                    start_ms: padded_start,
                    end_ms: padded_end,
                }),
            }
        }
        intervals
    }
}

/// Concatenate the samples covered by `intervals`, in order.
///
/// This is how dispatch assembles the speech-only payload: raw audio stays in
/// object storage, and only the stored interval list decides what is sent.
pub fn slice_speech(samples: &[i16], sample_rate: u32, intervals: &[SpeechInterval]) -> Vec<i16> {
    let mut out = Vec::new();
    for interval in intervals {
        let start = (interval.start_ms * sample_rate as u64 / 1000) as usize;
        let end = (interval.end_ms * sample_rate as u64 / 1000) as usize;
        let start = start.min(samples.len());
        let end = end.min(samples.len());
        out.extend_from_slice(&samples[start..end]);
    }
    out
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Normalized to 0.0..=1.0, where 0.0 is silence and ~0.707 is a full-scale
/// sine wave.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    // 30ms frame at 16kHz = 480 samples.
    const FRAME: usize = 480;

    fn settings() -> VadSettings {
        VadSettings::default()
    }

    fn speech_frames(n: usize) -> Vec<i16> {
        // RMS of a constant 3000 is ~0.09, well above the 0.02 threshold.
        vec![3000i16; n * FRAME]
    }

    fn silence_frames(n: usize) -> Vec<i16> {
        vec![0i16; n * FRAME]
    }

    #[test]
    fn rms_silence_is_zero() {
        assert_eq!(calculate_rms(&vec![0i16; 1000]), 0.0);
    }

    #[test]
    fn rms_max_amplitude_is_one() {
        let rms = calculate_rms(&vec![i16::MAX; 1000]);
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn rms_empty_samples() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn pure_silence_yields_no_intervals() {
        let extractor = SpeechExtractor::new(settings());
        assert!(extractor.extract(&silence_frames(50)).is_empty());
    }

    #[test]
    fn empty_input_yields_no_intervals() {
        let extractor = SpeechExtractor::new(settings());
        assert!(extractor.extract(&[]).is_empty());
    }

    #[test]
    fn continuous_speech_yields_one_interval() {
        let extractor = SpeechExtractor::new(settings());
        // 1 second of speech: 33 full frames plus remainder.
        let intervals = extractor.extract(&vec![3000i16; 16000]);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(intervals[0].end_ms, 1000);
    }

    #[test]
    fn long_silence_splits_speech_into_two_intervals() {
        let extractor = SpeechExtractor::new(settings());
        // 600ms speech, 300ms silence (>= min_silence_ms), 600ms speech.
        let mut samples = speech_frames(20);
        samples.extend(silence_frames(10));
        samples.extend(speech_frames(20));

        let intervals = extractor.extract(&samples);
        assert_eq!(intervals.len(), 2);
        // First interval: [0, 600) padded to [0, 630).
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(intervals[0].end_ms, 630);
        // Second interval: [900, 1500) padded to [870, 1500).
        assert_eq!(intervals[1].start_ms, 870);
        assert_eq!(intervals[1].end_ms, 1500);
    }

    #[test]
    fn short_silence_does_not_split() {
        let extractor = SpeechExtractor::new(settings());
        // 90ms of silence is below min_silence_ms (100ms).
        let mut samples = speech_frames(20);
        samples.extend(silence_frames(3));
        samples.extend(speech_frames(20));

        let intervals = extractor.extract(&samples);
        assert_eq!(intervals.len(), 1);
    }

    #[test]
    fn blip_below_min_speech_is_dropped() {
        let extractor = SpeechExtractor::new(settings());
        // 120ms of speech < min_speech_ms (250ms), surrounded by silence.
        let mut samples = silence_frames(10);
        samples.extend(speech_frames(4));
        samples.extend(silence_frames(10));

        assert!(extractor.extract(&samples).is_empty());
    }

    #[test]
    fn leading_silence_shifts_interval_start() {
        let extractor = SpeechExtractor::new(settings());
        // 300ms silence then 600ms speech.
        let mut samples = silence_frames(10);
        samples.extend(speech_frames(20));

        let intervals = extractor.extract(&samples);
        assert_eq!(intervals.len(), 1);
        // Speech starts at 300ms, padded back by 30ms.
        assert_eq!(intervals[0].start_ms, 270);
        assert_eq!(intervals[0].end_ms, 900);
    }

    #[test]
    fn padding_does_not_extend_past_audio() {
        let extractor = SpeechExtractor::new(settings());
        let intervals = extractor.extract(&speech_frames(20));
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(intervals[0].end_ms, 600);
    }

    #[test]
    fn intervals_touching_after_padding_merge() {
        let mut cfg = settings();
        cfg.padding_ms = 60;
        let extractor = SpeechExtractor::new(cfg);
        // Two speech runs separated by exactly min_silence_ms of silence;
        // 60ms padding on both sides bridges the 120ms gap.
        let mut samples = speech_frames(20);
        samples.extend(silence_frames(4));
        samples.extend(speech_frames(20));

        let intervals = extractor.extract(&samples);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_ms, 0);
        assert_eq!(intervals[0].end_ms, 1320);
    }

    #[test]
    fn slice_speech_concatenates_intervals() {
        let mut samples = vec![1i16; 1600]; // 100ms
        samples.extend(vec![0i16; 1600]);
        samples.extend(vec![2i16; 1600]);

        let intervals = vec![
            SpeechInterval {
                start_ms: 0,
                end_ms: 100,
            },
            SpeechInterval {
                start_ms: 200,
                end_ms: 300,
            },
        ];
        let speech = slice_speech(&samples, 16000, &intervals);
        assert_eq!(speech.len(), 3200);
        assert!(speech[..1600].iter().all(|&s| s == 1));
        assert!(speech[1600..].iter().all(|&s| s == 2));
    }

    #[test]
    fn slice_speech_clamps_to_audio_length() {
        let samples = vec![1i16; 800];
        let intervals = vec![SpeechInterval {
            start_ms: 0,
            end_ms: 10_000,
        }];
        assert_eq!(slice_speech(&samples, 16000, &intervals).len(), 800);
    }
}
