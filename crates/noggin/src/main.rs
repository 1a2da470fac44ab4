//! Noggin - interactive console for the head
//!
//! Drives the interaction core from a terminal: plain text runs a
//! direct-text session, `t` runs the full voice flow, `c` cancels whatever
//! is in flight, `q` quits. Button presses reported by the head trigger the
//! full flow as well. Capture, query, and synthesis are stubbed here; the
//! real backends live in their own services and are wired in the same way.

use anyhow::Context;
use noggin::playback::{tone, PlaybackEngine};
use noggin::{
    DeviceLink, HeadControl, HeadOrchestrator, NogginConfig, QueryEngine,
    Result as NogginResult, SpeechCapture, SpeechSynthesizer, TriggerMode, Utterance,
};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capture stub until a speech-to-text backend is wired in
struct NullCapture;

impl SpeechCapture for NullCapture {
    fn capture(&self) -> NogginResult<String> {
        warn!("No capture backend configured; returning empty text");
        Ok(String::new())
    }
}

/// Query stub that restates the question
struct EchoQuery {
    aborted: AtomicBool,
}

impl EchoQuery {
    fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
        }
    }
}

impl QueryEngine for EchoQuery {
    fn answer(&self, question: &str) -> NogginResult<String> {
        if self.aborted.load(Ordering::SeqCst) {
            return Err(noggin::NogginError::Query("aborted".into()));
        }
        Ok(format!("You asked: {}", question))
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn clear_abort(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }
}

/// Synthesis stub: one short tone per word, alternating pitch
struct ToneSpeech {
    sample_rate: u32,
}

impl SpeechSynthesizer for ToneSpeech {
    fn synthesize(&self, text: &str) -> NogginResult<Utterance> {
        let words = text.split_whitespace().count().max(1);
        let mut samples = Vec::new();
        for i in 0..words {
            let freq = if i % 2 == 0 { 660.0 } else { 550.0 };
            samples.extend(tone::sine(freq, 120, 0.25, self.sample_rate));
        }
        Ok(Utterance::new(samples, self.sample_rate, text))
    }
}

#[cfg(not(feature = "audio-io"))]
mod discard {
    //! Sink used when the crate is built without audio output: discards
    //! samples but keeps real-time pacing so interruption behavior matches

    use noggin::playback::{AudioSink, SinkStream};
    use noggin::Result;
    use std::time::Duration;

    pub struct DiscardSink;

    impl AudioSink for DiscardSink {
        fn open(&self, sample_rate: u32) -> Result<Box<dyn SinkStream>> {
            Ok(Box::new(DiscardStream { sample_rate }))
        }
    }

    struct DiscardStream {
        sample_rate: u32,
    }

    impl SinkStream for DiscardStream {
        fn write(&mut self, chunk: &[f32]) -> Result<()> {
            let secs = chunk.len() as f64 / self.sample_rate.max(1) as f64;
            std::thread::sleep(Duration::from_secs_f64(secs));
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noggin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => NogginConfig::load(&path).context("loading config")?,
        None => NogginConfig::load_or_default(),
    };

    info!("Starting noggin console");

    let link = Arc::new(DeviceLink::new(config.device.clone()));

    // Playback loudness drives the head's indicator bar
    let indicator_link = Arc::clone(&link);
    let indicator: noggin::IndicatorFn = Arc::new(move |level| {
        indicator_link.set_indicator_level(level);
    });

    #[cfg(feature = "audio-io")]
    let sink = Box::new(noggin::playback::sink::CpalSink::new());
    #[cfg(not(feature = "audio-io"))]
    let sink = Box::new(discard::DiscardSink);

    let engine = Arc::new(PlaybackEngine::new(sink, indicator, config.playback.clone()));

    let chime_path = config
        .playback
        .chime_cache
        .clone()
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("noggin").join("chime.wav")));
    let chime = match &chime_path {
        Some(path) => tone::cached_chime(path, config.playback.chime_sample_rate),
        None => tone::chime(config.playback.chime_sample_rate),
    };

    let head: Arc<dyn HeadControl> = link.clone();
    let orchestrator = Arc::new(HeadOrchestrator::new(
        head,
        Arc::clone(&engine),
        Arc::new(NullCapture),
        Arc::new(EchoQuery::new()),
        Arc::new(ToneSpeech {
            sample_rate: config.playback.chime_sample_rate,
        }),
        chime,
        config.session.clone(),
    ));
    orchestrator.attach_link(Arc::clone(&link));

    // Physical button: run the full flow off the receive-loop thread
    let button_target = Arc::clone(&orchestrator);
    orchestrator.set_button_callback(move || {
        let orchestrator = Arc::clone(&button_target);
        thread::spawn(move || {
            orchestrator.trigger(TriggerMode::Full);
        });
    });

    if orchestrator.connect() {
        link.set_servo(config.session.turn_servo, 90);
        orchestrator.speak("Head connected.");
    } else {
        warn!("Initial head connection failed; will retry between commands");
    }

    println!("Commands: <text> = direct question, t = voice flow, c = cancel, q = quit");

    let stdin = std::io::stdin();
    loop {
        if !orchestrator.is_connected() && orchestrator.connect() {
            link.set_servo(config.session.turn_servo, 90);
            info!("Head reconnected");
        }

        let status = if orchestrator.is_connected() {
            "connected"
        } else {
            "disconnected"
        };
        print!("[{}] > ", status);
        std::io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim().to_string();

        match line.as_str() {
            "" => continue,
            "q" => break,
            "c" => orchestrator.cancel_current(),
            "t" => {
                let orchestrator = Arc::clone(&orchestrator);
                thread::spawn(move || {
                    orchestrator.trigger(TriggerMode::Full);
                });
            }
            _ => {
                let orchestrator = Arc::clone(&orchestrator);
                let question = line.clone();
                thread::spawn(move || {
                    orchestrator.trigger(TriggerMode::Direct(question));
                });
            }
        }
    }

    info!("Shutting down");
    orchestrator.cancel_current();
    engine.shutdown(Duration::from_secs(2));
    link.close();
    Ok(())
}
