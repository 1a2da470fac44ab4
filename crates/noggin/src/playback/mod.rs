//! Audio playback engine
//!
//! Plays synthesized utterances in arrival order on a dedicated worker,
//! derives a live loudness level for the head's indicators while playing,
//! and supports immediate cross-thread interruption:
//! - `engine` - the queue, worker, and stop machinery
//! - `sink` - output-device abstraction (cpal behind the `audio-io` feature)
//! - `meter` - RMS loudness to indicator-level mapping
//! - `tone` - prompt-chime synthesis and WAV caching

pub mod engine;
pub mod meter;
pub mod sink;
pub mod tone;

pub use engine::{IndicatorFn, PlaybackEngine};
pub use sink::{AudioSink, SinkStream};

use crate::{NogginError, Result};
use std::path::Path;
use std::time::Duration;

/// One synthesized utterance queued for playback
///
/// Samples are mono f32 in the -1.0..=1.0 range. The originating text is
/// carried for logging only.
#[derive(Clone, Debug)]
pub struct Utterance {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub text: String,
}

impl Utterance {
    pub fn new(samples: Vec<f32>, sample_rate: u32, text: impl Into<String>) -> Self {
        Self {
            samples,
            sample_rate,
            text: text.into(),
        }
    }

    /// Playback duration of this utterance
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Load an utterance from a WAV file, mixing multi-channel audio to mono
    pub fn from_wav<P: AsRef<Path>>(path: P, text: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| NogginError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let read_err = |e: hound::Error| NogginError::Io(format!("Failed to read sample: {}", e));

        let samples: Result<Vec<f32>> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(read_err))
                .collect(),
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / i16::MAX as f32).map_err(read_err))
                    .collect(),
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / 8_388_608.0).map_err(read_err))
                    .collect(),
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / i32::MAX as f32).map_err(read_err))
                    .collect(),
                bits => {
                    return Err(NogginError::Playback(format!(
                        "Unsupported bit depth: {}",
                        bits
                    )))
                }
            },
        };
        let samples = samples?;

        let channels = spec.channels.max(1) as usize;
        let mono = if channels == 1 {
            samples
        } else {
            samples
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(Self::new(mono, spec.sample_rate, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let utterance = Utterance::new(vec![0.0; 16_000], 16_000, "one second");
        assert_eq!(utterance.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_rate_duration() {
        let utterance = Utterance::new(vec![0.0; 100], 0, "");
        assert_eq!(utterance.duration(), Duration::ZERO);
    }

    #[test]
    fn test_from_wav_mixes_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // Left at full scale, right silent: the mix lands near half scale
        for _ in 0..100 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let utterance = Utterance::from_wav(&path, "mix test").unwrap();
        assert_eq!(utterance.sample_rate, 8000);
        assert_eq!(utterance.samples.len(), 100);
        assert!((utterance.samples[0] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_from_wav_missing_file() {
        let err = Utterance::from_wav("/nonexistent.wav", "").unwrap_err();
        assert!(matches!(err, NogginError::Io(_)));
    }
}
