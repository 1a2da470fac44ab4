//! Playback queue and worker
//!
//! A single worker thread pulls utterances off a FIFO queue and writes them
//! to the sink in ~20 ms chunks, re-checking a shared stop flag after every
//! chunk so interruption latency is bounded by the chunk size. The loudness
//! of each chunk drives the injected indicator callback; the indicator is
//! forced back to level 0 on every exit path.

use crate::config::PlaybackConfig;
use crate::playback::{meter, AudioSink, SinkStream, Utterance};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback receiving indicator levels (0–3) during playback
pub type IndicatorFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Queue entries; `Shutdown` is the sentinel that ends the worker
enum Job {
    Speak(Utterance),
    Shutdown,
}

/// Queue shared between callers and the worker
struct Queue {
    jobs: Mutex<VecDeque<Job>>,
    ready: Condvar,
}

/// Audio playback engine
///
/// `enqueue` never blocks; `stop_all` is safe to call from any thread at any
/// time, including with nothing playing.
pub struct PlaybackEngine {
    queue: Arc<Queue>,
    stop: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    indicator: IndicatorFn,
    worker: Mutex<Option<JoinHandle<()>>>,
    done_rx: Receiver<()>,
}

impl PlaybackEngine {
    /// Create the engine and start its worker thread
    pub fn new(sink: Box<dyn AudioSink>, indicator: IndicatorFn, config: PlaybackConfig) -> Self {
        let queue = Arc::new(Queue {
            jobs: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        let stop = Arc::new(AtomicBool::new(false));
        let playing = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);

        let worker = spawn_worker(
            Arc::clone(&queue),
            Arc::clone(&stop),
            Arc::clone(&playing),
            Arc::clone(&indicator),
            sink,
            config.chunk_ms,
            done_tx,
        );

        Self {
            queue,
            stop,
            playing,
            indicator,
            worker: Mutex::new(worker),
            done_rx,
        }
    }

    /// Append an utterance to the queue; returns immediately
    pub fn enqueue(&self, utterance: Utterance) {
        debug!(
            "Queued utterance ({:.2}s): {}",
            utterance.duration().as_secs_f32(),
            utterance.text
        );
        let mut jobs = self.queue.jobs.lock();
        jobs.push_back(Job::Speak(utterance));
        self.queue.ready.notify_one();
    }

    /// Stop current playback and discard every queued utterance
    ///
    /// The drain happens under the queue lock, so no utterance enqueued
    /// before this call survives past it. Safe with nothing playing.
    pub fn stop_all(&self) {
        // Flag and drain flip together under the queue lock; the worker
        // clears the flag under the same lock when it picks up a job, so a
        // stop can never be lost between pickup and clear
        let discarded = {
            let mut jobs = self.queue.jobs.lock();
            self.stop.store(true, Ordering::SeqCst);
            let before = jobs.len();
            jobs.retain(|job| matches!(job, Job::Shutdown));
            before - jobs.len()
        };
        (self.indicator)(0);

        if discarded > 0 {
            info!("Stopped playback, discarded {} queued utterance(s)", discarded);
        } else {
            debug!("Stop requested with nothing queued");
        }
    }

    /// Check whether an utterance is playing or pending
    pub fn is_playing(&self) -> bool {
        if self.playing.load(Ordering::SeqCst) {
            return true;
        }
        self.queue
            .jobs
            .lock()
            .iter()
            .any(|job| matches!(job, Job::Speak(_)))
    }

    /// Stop the worker, waiting (bounded) for it to finish
    ///
    /// The sentinel goes to the front of the queue so it outranks anything
    /// still pending; the stop flag aborts the utterance in flight.
    pub fn shutdown(&self, timeout: Duration) {
        {
            let mut jobs = self.queue.jobs.lock();
            self.stop.store(true, Ordering::SeqCst);
            jobs.push_front(Job::Shutdown);
            self.queue.ready.notify_one();
        }

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => {
                if let Some(handle) = self.worker.lock().take() {
                    let _ = handle.join();
                }
                info!("Playback engine shut down");
            }
            Err(_) => warn!("Playback worker did not stop within {:?}", timeout),
        }
    }
}

fn spawn_worker(
    queue: Arc<Queue>,
    stop: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    indicator: IndicatorFn,
    mut sink: Box<dyn AudioSink>,
    chunk_ms: u64,
    done_tx: Sender<()>,
) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("noggin-playback".to_string())
        .spawn(move || {
            info!("Playback worker started");

            loop {
                let job = {
                    let mut jobs = queue.jobs.lock();
                    let job = loop {
                        match jobs.pop_front() {
                            Some(job) => break job,
                            None => queue.ready.wait(&mut jobs),
                        }
                    };
                    // A stop aimed at an earlier utterance must not leak
                    // into this one; clearing under the queue lock pairs
                    // with stop_all's flag-and-drain
                    if matches!(job, Job::Speak(_)) {
                        stop.store(false, Ordering::SeqCst);
                    }
                    job
                };

                match job {
                    Job::Shutdown => {
                        indicator(0);
                        break;
                    }
                    Job::Speak(utterance) => {
                        playing.store(true, Ordering::SeqCst);
                        play_one(sink.as_mut(), &utterance, &stop, &indicator, chunk_ms);
                        playing.store(false, Ordering::SeqCst);
                    }
                }
            }

            info!("Playback worker stopped");
            let _ = done_tx.send(());
        });

    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to spawn playback worker: {}", e);
            None
        }
    }
}

/// Play a single utterance in stop-checked chunks
fn play_one(
    sink: &mut dyn AudioSink,
    utterance: &Utterance,
    stop: &AtomicBool,
    indicator: &IndicatorFn,
    chunk_ms: u64,
) {
    let chunk_len = ((utterance.sample_rate as u64 * chunk_ms / 1000) as usize).max(1);

    let mut stream = match sink.open(utterance.sample_rate) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open output stream: {}", e);
            indicator(0);
            return;
        }
    };

    debug!("Playing: {}", utterance.text);
    let mut completed = true;

    for chunk in utterance.samples.chunks(chunk_len) {
        if stop.load(Ordering::SeqCst) {
            debug!("Playback interrupted: {}", utterance.text);
            completed = false;
            break;
        }

        if let Err(e) = stream.write(chunk) {
            error!("Playback write failed: {}", e);
            completed = false;
            break;
        }

        indicator(meter::level_for_chunk(chunk));
    }

    if completed {
        stream.drain();
    }
    indicator(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    /// Sink that records every written chunk and paces writes slightly so
    /// tests can interrupt mid-utterance
    #[derive(Clone)]
    struct RecordingSink {
        chunks: Arc<PlMutex<Vec<Vec<f32>>>>,
        write_delay: Duration,
    }

    impl RecordingSink {
        fn new(write_delay: Duration) -> Self {
            Self {
                chunks: Arc::new(PlMutex::new(Vec::new())),
                write_delay,
            }
        }

        fn written(&self) -> Vec<Vec<f32>> {
            self.chunks.lock().clone()
        }
    }

    impl AudioSink for RecordingSink {
        fn open(&self, _sample_rate: u32) -> crate::Result<Box<dyn SinkStream>> {
            Ok(Box::new(RecordingStream {
                chunks: Arc::clone(&self.chunks),
                write_delay: self.write_delay,
            }))
        }
    }

    struct RecordingStream {
        chunks: Arc<PlMutex<Vec<Vec<f32>>>>,
        write_delay: Duration,
    }

    impl SinkStream for RecordingStream {
        fn write(&mut self, chunk: &[f32]) -> crate::Result<()> {
            if !self.write_delay.is_zero() {
                thread::sleep(self.write_delay);
            }
            self.chunks.lock().push(chunk.to_vec());
            Ok(())
        }
    }

    fn levels_recorder() -> (IndicatorFn, Arc<PlMutex<Vec<u8>>>) {
        let levels: Arc<PlMutex<Vec<u8>>> = Arc::new(PlMutex::new(Vec::new()));
        let cloned = Arc::clone(&levels);
        let indicator: IndicatorFn = Arc::new(move |level| cloned.lock().push(level));
        (indicator, levels)
    }

    /// 1 kHz sample rate with 20 ms chunks = 20 samples per chunk
    fn test_config() -> PlaybackConfig {
        PlaybackConfig {
            chunk_ms: 20,
            ..PlaybackConfig::default()
        }
    }

    fn marker_utterance(marker: f32, samples: usize) -> Utterance {
        Utterance::new(vec![marker; samples], 1000, format!("marker {}", marker))
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_utterances_play_in_fifo_order() {
        let sink = RecordingSink::new(Duration::ZERO);
        let (indicator, _) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink.clone()), indicator, test_config());

        engine.enqueue(marker_utterance(0.1, 40));
        engine.enqueue(marker_utterance(0.2, 40));
        engine.enqueue(marker_utterance(0.3, 40));

        assert!(wait_until(Duration::from_secs(2), || !engine.is_playing()
            && sink.written().len() >= 6));
        engine.shutdown(Duration::from_secs(1));

        let markers: Vec<f32> = sink.written().iter().map(|chunk| chunk[0]).collect();
        assert_eq!(markers, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_stop_discards_queued_utterances() {
        // ~10 ms per chunk write: the first utterance takes ~250 ms
        let sink = RecordingSink::new(Duration::from_millis(10));
        let (indicator, levels) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink.clone()), indicator, test_config());

        engine.enqueue(marker_utterance(0.5, 500));
        engine.enqueue(marker_utterance(0.9, 40));

        assert!(wait_until(Duration::from_secs(1), || !sink.written().is_empty()));
        engine.stop_all();

        assert!(wait_until(Duration::from_secs(1), || !engine.is_playing()));

        // No chunk of the second utterance may ever be written
        thread::sleep(Duration::from_millis(100));
        assert!(sink.written().iter().all(|chunk| chunk[0] != 0.9));

        // Stop forced the indicator to level 0
        assert_eq!(levels.lock().last(), Some(&0));

        engine.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_stop_bounds_further_writes() {
        let sink = RecordingSink::new(Duration::from_millis(10));
        let (indicator, _) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink.clone()), indicator, test_config());

        engine.enqueue(marker_utterance(0.5, 2000));
        assert!(wait_until(Duration::from_secs(1), || !sink.written().is_empty()));

        engine.stop_all();
        // At most the chunk in flight lands after the stop returns
        thread::sleep(Duration::from_millis(50));
        let count = sink.written().len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.written().len(), count);

        engine.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_stop_with_nothing_playing_is_noop() {
        let sink = RecordingSink::new(Duration::ZERO);
        let (indicator, levels) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink.clone()), indicator, test_config());

        engine.stop_all();
        engine.stop_all();
        assert!(!engine.is_playing());
        assert_eq!(*levels.lock(), vec![0, 0]);

        // A request enqueued after a stop starts with a clean flag and plays
        engine.enqueue(marker_utterance(0.4, 40));
        assert!(wait_until(Duration::from_secs(1), || sink.written().len() == 2));

        engine.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_indicator_levels_follow_loudness() {
        let sink = RecordingSink::new(Duration::ZERO);
        let (indicator, levels) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink), indicator, test_config());

        // Full-scale audio maps to level 3 on every chunk
        engine.enqueue(marker_utterance(1.0, 40));
        assert!(wait_until(Duration::from_secs(1), || levels.lock().last() == Some(&0)
            && levels.lock().len() >= 3));
        engine.shutdown(Duration::from_secs(1));

        let recorded = levels.lock().clone();
        assert!(recorded.starts_with(&[3, 3]));
        assert_eq!(recorded.last(), Some(&0));
    }

    #[test]
    fn test_shutdown_sentinel_outranks_queue() {
        let sink = RecordingSink::new(Duration::from_millis(5));
        let (indicator, _) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink.clone()), indicator, test_config());

        for _ in 0..10 {
            engine.enqueue(marker_utterance(0.5, 1000));
        }
        engine.shutdown(Duration::from_secs(2));

        // The pending utterances were never fully played
        let total_chunks = 10 * (1000 / 20);
        assert!(sink.written().len() < total_chunks);
    }

    #[test]
    fn test_is_playing_reflects_queue_and_worker() {
        let sink = RecordingSink::new(Duration::from_millis(10));
        let (indicator, _) = levels_recorder();
        let engine = PlaybackEngine::new(Box::new(sink), indicator, test_config());

        assert!(!engine.is_playing());
        engine.enqueue(marker_utterance(0.5, 400));
        assert!(engine.is_playing());

        assert!(wait_until(Duration::from_secs(2), || !engine.is_playing()));
        engine.shutdown(Duration::from_secs(1));
    }
}
