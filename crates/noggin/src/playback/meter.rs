//! Loudness metering for the head's indicator readout
//!
//! Each playback chunk is reduced to an RMS amplitude, converted to a
//! dBFS-like value, and mapped through fixed thresholds to one of four
//! indicator levels. The thresholds match the head firmware's expected
//! visual range.

/// dB value reported for an all-silent chunk
const SILENCE_DB: f32 = -100.0;

/// Root-mean-square amplitude of a chunk
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert an RMS amplitude to a dBFS-like scale
pub fn to_db(rms: f32) -> f32 {
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        SILENCE_DB
    }
}

/// Map a chunk of samples to an indicator level (0–3)
pub fn level_for_chunk(samples: &[f32]) -> u8 {
    let db = to_db(rms(samples));
    if db < -40.0 {
        0
    } else if db < -30.0 {
        1
    } else if db < -20.0 {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence() {
        assert_eq!(rms(&[0.0; 64]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let chunk = vec![0.5f32; 128];
        assert!((rms(&chunk) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_maps_to_level_zero() {
        assert_eq!(level_for_chunk(&[0.0; 64]), 0);
        assert_eq!(level_for_chunk(&[]), 0);
    }

    #[test]
    fn test_full_scale_maps_to_level_three() {
        assert_eq!(level_for_chunk(&[1.0; 64]), 3);
    }

    #[test]
    fn test_threshold_bands() {
        // Constant amplitude a has RMS a, so dB = 20*log10(a)
        let at_db = |db: f32| vec![10f32.powf(db / 20.0); 64];

        assert_eq!(level_for_chunk(&at_db(-45.0)), 0);
        assert_eq!(level_for_chunk(&at_db(-35.0)), 1);
        assert_eq!(level_for_chunk(&at_db(-25.0)), 2);
        assert_eq!(level_for_chunk(&at_db(-10.0)), 3);
    }

    #[test]
    fn test_levels_monotonic_in_amplitude() {
        let mut last = 0;
        for i in 1..=100 {
            let amp = i as f32 / 100.0;
            let level = level_for_chunk(&vec![amp; 64]);
            assert!(level >= last);
            last = level;
        }
        assert_eq!(last, 3);
    }
}
