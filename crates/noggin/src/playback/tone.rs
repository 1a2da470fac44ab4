//! Prompt-chime synthesis
//!
//! The chime played before speech capture is a short faded sine tone. It is
//! synthesized once and cached as a WAV file so startup can reload it
//! instead of regenerating, mirroring how the head's other prompt assets
//! are managed.

use crate::playback::Utterance;
use crate::{NogginError, Result};
use std::f32::consts::TAU;
use std::path::Path;
use tracing::{debug, info, warn};

/// Chime frequency in Hz
const CHIME_FREQ: f32 = 880.0;
/// Chime duration in milliseconds
const CHIME_MS: u32 = 200;
/// Fade-in/fade-out length in milliseconds
const FADE_MS: u32 = 30;
/// Chime amplitude (-10 dBFS)
const CHIME_AMPLITUDE: f32 = 0.316;

/// Generate a sine tone with linear fades at both ends
pub fn sine(freq: f32, duration_ms: u32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let total = (sample_rate as u64 * duration_ms as u64 / 1000) as usize;
    let fade = ((sample_rate as u64 * FADE_MS as u64 / 1000) as usize).min(total / 2);

    (0..total)
        .map(|i| {
            let sample = (TAU * freq * i as f32 / sample_rate as f32).sin() * amplitude;
            let gain = if i < fade {
                i as f32 / fade as f32
            } else if i >= total - fade {
                (total - i) as f32 / fade as f32
            } else {
                1.0
            };
            sample * gain
        })
        .collect()
}

/// Synthesize the prompt chime
pub fn chime(sample_rate: u32) -> Utterance {
    Utterance::new(
        sine(CHIME_FREQ, CHIME_MS, CHIME_AMPLITUDE, sample_rate),
        sample_rate,
        "[chime]",
    )
}

/// Load the cached chime, synthesizing and caching it on first use
///
/// Cache failures are non-fatal: the freshly synthesized chime is returned
/// either way.
pub fn cached_chime(cache_path: &Path, sample_rate: u32) -> Utterance {
    if cache_path.exists() {
        match Utterance::from_wav(cache_path, "[chime]") {
            Ok(utterance) => {
                debug!("Loaded chime cache from {}", cache_path.display());
                return utterance;
            }
            Err(e) => warn!("Ignoring unreadable chime cache: {}", e),
        }
    }

    let utterance = chime(sample_rate);
    match write_wav(cache_path, &utterance.samples, sample_rate) {
        Ok(()) => info!("Cached chime at {}", cache_path.display()),
        Err(e) => warn!("Failed to cache chime: {}", e),
    }
    utterance
}

/// Write mono f32 samples as a 16-bit WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| NogginError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| NogginError::Io(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| NogginError::Io(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| NogginError::Io(format!("Failed to finalize WAV file: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chime_length_and_rate() {
        let utterance = chime(22_050);
        assert_eq!(utterance.sample_rate, 22_050);
        // 200 ms at 22.05 kHz
        assert_eq!(utterance.samples.len(), 4410);
    }

    #[test]
    fn test_chime_starts_and_ends_faded() {
        let utterance = chime(22_050);
        assert_eq!(utterance.samples[0], 0.0);
        // Fade regions stay well below full amplitude
        assert!(utterance.samples[5].abs() < 0.05);
        assert!(utterance.samples[utterance.samples.len() - 5].abs() < 0.05);
    }

    #[test]
    fn test_chime_peak_near_target_amplitude() {
        let utterance = chime(22_050);
        let peak = utterance
            .samples
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.25 && peak <= CHIME_AMPLITUDE + 0.01);
    }

    #[test]
    fn test_cached_chime_writes_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts").join("chime.wav");

        let first = cached_chime(&path, 16_000);
        assert!(path.exists());

        let second = cached_chime(&path, 16_000);
        assert_eq!(second.sample_rate, first.sample_rate);
        assert_eq!(second.samples.len(), first.samples.len());
    }
}
