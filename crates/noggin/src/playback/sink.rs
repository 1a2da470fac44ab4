//! Output-device abstraction for the playback worker
//!
//! The engine writes small chunks and needs each write to apply
//! backpressure, so interruption checks between chunks track real playback
//! time. The cpal implementation bridges through a shared sample buffer
//! drained by the output callback, with mono samples fanned out to the
//! device's channel count and silence filled when the buffer runs dry.

use crate::Result;

/// Factory for output streams, one per utterance
pub trait AudioSink: Send {
    /// Open an output stream for the given sample rate
    fn open(&self, sample_rate: u32) -> Result<Box<dyn SinkStream>>;
}

/// An open output stream
///
/// Dropping the stream releases the output device.
pub trait SinkStream {
    /// Write one chunk of mono samples, blocking while the device catches up
    fn write(&mut self, chunk: &[f32]) -> Result<()>;

    /// Wait (bounded) for buffered audio to finish playing
    fn drain(&mut self) {}
}

#[cfg(feature = "audio-io")]
pub use cpal_sink::CpalSink;

#[cfg(feature = "audio-io")]
mod cpal_sink {
    use super::{AudioSink, SinkStream};
    use crate::{NogginError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BufferSize, SampleRate, StreamConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::{debug, error};

    /// Upper bound on buffered audio before `write` blocks, in milliseconds
    const MAX_BUFFERED_MS: u64 = 200;
    /// Bound on waiting for the tail of an utterance in `drain`
    const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

    /// Output sink backed by the default cpal device
    pub struct CpalSink;

    impl CpalSink {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for CpalSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioSink for CpalSink {
        fn open(&self, sample_rate: u32) -> Result<Box<dyn SinkStream>> {
            let host = cpal::default_host();

            let device = host
                .default_output_device()
                .ok_or_else(|| NogginError::Playback("No output device available".into()))?;

            let channels = device
                .default_output_config()
                .map(|config| config.channels())
                .unwrap_or(1)
                .max(1) as usize;

            let config = StreamConfig {
                channels: channels as u16,
                sample_rate: SampleRate(sample_rate),
                buffer_size: BufferSize::Default,
            };

            let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
            let callback_buffer = Arc::clone(&buffer);

            let err_fn = |err| {
                error!("Audio output stream error: {}", err);
            };

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut buf = callback_buffer.lock();
                        let frames_needed = data.len() / channels;
                        let frames_available = buf.len().min(frames_needed);

                        for i in 0..frames_available {
                            let sample = buf[i];
                            for c in 0..channels {
                                data[i * channels + c] = sample;
                            }
                        }
                        buf.drain(0..frames_available);

                        // Silence-fill whatever the buffer could not cover
                        for slot in &mut data[frames_available * channels..] {
                            *slot = 0.0;
                        }
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| {
                    NogginError::Playback(format!("Failed to build output stream: {}", e))
                })?;

            stream
                .play()
                .map_err(|e| NogginError::Playback(format!("Failed to start output stream: {}", e)))?;

            debug!(
                "Opened output stream: {} Hz, {} channel(s)",
                sample_rate, channels
            );

            Ok(Box::new(CpalStream {
                _stream: stream,
                buffer,
                max_buffered: (sample_rate as u64 * MAX_BUFFERED_MS / 1000) as usize,
            }))
        }
    }

    struct CpalStream {
        _stream: cpal::Stream,
        buffer: Arc<Mutex<Vec<f32>>>,
        max_buffered: usize,
    }

    impl SinkStream for CpalStream {
        fn write(&mut self, chunk: &[f32]) -> Result<()> {
            // Backpressure: wait until the callback has drained enough that
            // chunk pacing reflects real playback time
            while self.buffer.lock().len() > self.max_buffered {
                std::thread::sleep(Duration::from_millis(1));
            }
            self.buffer.lock().extend_from_slice(chunk);
            Ok(())
        }

        fn drain(&mut self) {
            let deadline = Instant::now() + DRAIN_TIMEOUT;
            while !self.buffer.lock().is_empty() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}
