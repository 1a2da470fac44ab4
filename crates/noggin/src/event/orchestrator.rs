//! Interaction orchestrator
//!
//! Runs exactly one voice or text interaction at a time: prompt signaling,
//! speech capture, query processing with a concurrent actuator sequence,
//! and the spoken response. Every stage boundary checks the shared
//! cancellation token, and a new trigger or an explicit stop winds the whole
//! session down within one wait slice.

use crate::config::SessionConfig;
use crate::device::{link::DeviceLink, HeadControl};
use crate::event::cancel::CancelToken;
use crate::event::session::{EntryDecision, EventSession, SessionControl, TriggerMode};
use crate::playback::{PlaybackEngine, Utterance};
use crate::Result;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, info_span, warn};

/// The only inbound notification the head currently sends
const BUTTON_PRESS_TOKEN: &str = "BUTTON_PRESS";

/// Speech capture collaborator
///
/// Implementations must bound their own listening time; `capture` may return
/// an empty string when nothing was recognized.
pub trait SpeechCapture: Send + Sync {
    fn capture(&self) -> Result<String>;
}

/// Query processing collaborator
///
/// `answer` runs synchronously; errors are converted into a spoken
/// diagnostic by the orchestrator, never propagated. The abort pair lets the
/// orchestrator signal in-flight work to wind down during cancellation.
pub trait QueryEngine: Send + Sync {
    fn answer(&self, question: &str) -> Result<String>;

    /// Ask in-flight query work to stop
    fn abort(&self) {}

    /// Clear the abort signal ahead of a new session
    fn clear_abort(&self) {}
}

/// Speech synthesis collaborator
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Utterance>;

    /// Ask in-flight synthesis to stop
    fn abort(&self) {}

    /// Clear the abort signal ahead of a new session
    fn clear_abort(&self) {}
}

/// How one trigger was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The session ran to its natural end (including the fallback phrase)
    Completed,
    /// The session was cancelled part-way through
    Interrupted,
    /// This trigger cancelled an already-running activity instead
    CancelledActive,
    /// Dropped by the debounce window
    Debounced,
}

/// Alternating turn state; guards the actuator's last commanded position
#[derive(Debug, Default)]
struct ServoPose {
    facing_left: bool,
    last_turn: Option<u8>,
}

impl ServoPose {
    /// Pick the next turn angle, toggling the side on each invocation
    fn next_turn_angle(&mut self, config: &SessionConfig) -> u8 {
        let (lo, hi) = if self.facing_left {
            config.turn_right_range
        } else {
            config.turn_left_range
        };
        self.facing_left = !self.facing_left;

        let angle = rand::thread_rng().gen_range(lo..=hi);
        self.last_turn = Some(angle);
        angle
    }
}

/// Top-level coordinator for interaction sessions
pub struct HeadOrchestrator {
    head: Arc<dyn HeadControl>,
    engine: Arc<PlaybackEngine>,
    capture: Arc<dyn SpeechCapture>,
    query: Arc<dyn QueryEngine>,
    synth: Arc<dyn SpeechSynthesizer>,
    cancel: CancelToken,
    sessions: Arc<SessionControl>,
    pose: Arc<Mutex<ServoPose>>,
    chime: Utterance,
    config: SessionConfig,
    link: RwLock<Option<Arc<DeviceLink>>>,
    button_callback: RwLock<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl HeadOrchestrator {
    pub fn new(
        head: Arc<dyn HeadControl>,
        engine: Arc<PlaybackEngine>,
        capture: Arc<dyn SpeechCapture>,
        query: Arc<dyn QueryEngine>,
        synth: Arc<dyn SpeechSynthesizer>,
        chime: Utterance,
        config: SessionConfig,
    ) -> Self {
        Self {
            head,
            engine,
            capture,
            query,
            synth,
            cancel: CancelToken::new(),
            sessions: Arc::new(SessionControl::new()),
            pose: Arc::new(Mutex::new(ServoPose::default())),
            chime,
            config,
            link: RwLock::new(None),
            button_callback: RwLock::new(None),
        }
    }

    /// Wire a device link: inbound notifications route through this
    /// orchestrator, and `connect`/`is_connected` delegate to the link
    pub fn attach_link(self: &Arc<Self>, link: Arc<DeviceLink>) {
        let orchestrator = Arc::clone(self);
        link.set_message_handler(move |msg| orchestrator.handle_device_message(msg));
        *self.link.write() = Some(link);
    }

    /// Connect the attached device link
    pub fn connect(&self) -> bool {
        match self.link.read().as_ref() {
            Some(link) => link.connect(),
            None => {
                warn!("No device link attached");
                false
            }
        }
    }

    /// Check the attached device link's connection state
    pub fn is_connected(&self) -> bool {
        self.link
            .read()
            .as_ref()
            .map(|link| link.is_connected())
            .unwrap_or(false)
    }

    /// Register the callback invoked on a physical button press
    ///
    /// The callback runs on the link's receive-loop thread; it should spawn
    /// the trigger onto its own thread rather than run a session inline.
    pub fn set_button_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.button_callback.write() = Some(Arc::new(callback));
    }

    /// Route an inbound head notification
    pub fn handle_device_message(&self, msg: &str) {
        if msg == BUTTON_PRESS_TOKEN {
            info!("Button press notification from head");
            let callback = self.button_callback.read().clone();
            match callback {
                Some(callback) => callback(),
                None => debug!("Button press with no callback registered"),
            }
        } else {
            debug!("Ignoring head message: {}", msg);
        }
    }

    /// Handle one trigger: start a session, cancel the running one, or drop
    ///
    /// Runs the session on the calling thread; callers wanting a
    /// fire-and-forget trigger spawn their own thread.
    pub fn trigger(&self, mode: TriggerMode) -> TriggerOutcome {
        let busy = self.engine.is_playing();
        match self
            .sessions
            .evaluate(self.config.debounce_window(), busy)
        {
            EntryDecision::Debounced => {
                debug!("Trigger inside debounce window, dropped");
                TriggerOutcome::Debounced
            }
            EntryDecision::CancelActive => {
                info!("Trigger while busy: cancelling current activity");
                self.cancel_current();
                TriggerOutcome::CancelledActive
            }
            EntryDecision::Begin => {
                // Fresh session: clear every cancellation signal first
                self.cancel.reset();
                self.query.clear_abort();
                self.synth.clear_abort();
                self.run_session(EventSession::new(mode))
            }
        }
    }

    /// Check whether a session is currently in progress
    pub fn session_active(&self) -> bool {
        self.sessions.is_in_progress()
    }

    /// Cancel whatever is in flight; harmless no-op when nothing is
    pub fn cancel_current(&self) {
        info!("Cancellation requested");
        self.cancel.cancel();
        self.query.abort();
        self.synth.abort();
        self.engine.stop_all();
        self.head.set_indicator(self.config.busy_indicator, false);
        self.head.set_indicator(self.config.listening_indicator, false);
        self.sessions.clear();
    }

    /// Synthesize and enqueue a phrase; fire-and-forget
    pub fn speak(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        info!("Speaking: {}", text);
        match self.synth.synthesize(text) {
            Ok(utterance) => self.engine.enqueue(utterance),
            Err(e) => error!("Synthesis failed: {}", e),
        }
    }

    fn run_session(&self, session: EventSession) -> TriggerOutcome {
        let span = info_span!("session", id = %session.id, mode = %session.mode);
        let _enter = span.enter();

        // Clears the in-progress flag and the busy indicator on every exit
        // path, including collaborator panics
        let _guard = SessionGuard {
            sessions: Arc::clone(&self.sessions),
            head: Arc::clone(&self.head),
            busy_indicator: self.config.busy_indicator,
        };

        info!("Session started");
        self.head.set_indicator(self.config.busy_indicator, true);

        let question = match &session.mode {
            TriggerMode::Full => match self.capture_question() {
                Some(question) => question,
                None => return TriggerOutcome::Interrupted,
            },
            TriggerMode::Direct(text) => text.clone(),
        };

        if question.is_empty() {
            info!("No speech recognized");
            self.speak(&self.config.fallback_phrase);
            return TriggerOutcome::Completed;
        }

        info!("Question: {}", question);
        if self.cancel.is_cancelled() {
            return TriggerOutcome::Interrupted;
        }

        // The actuator sequence runs concurrently with query processing so
        // the head starts moving while the answer is still being worked out
        let servo_done = self.spawn_servo_sequence();

        let answer = match self.query.answer(&question) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Query processing failed: {}", e);
                format!("Query processing failed: {}", e)
            }
        };

        let late_cancel = self.cancel.is_cancelled();

        // Actuator motion must have stopped (or been cancelled) before the
        // session is considered complete
        if servo_done
            .recv_timeout(self.config.servo_join_timeout())
            .is_err()
        {
            warn!(
                "Actuator sequence still running after {:?}",
                self.config.servo_join_timeout()
            );
        }

        if late_cancel || self.cancel.is_cancelled() {
            info!("Cancelled before the answer was spoken");
            return TriggerOutcome::Interrupted;
        }

        self.speak(&answer);
        info!("Session complete");
        TriggerOutcome::Completed
    }

    /// Prompt, capture, and trim the spoken question
    ///
    /// Returns `None` on cancellation; capture errors degrade to an empty
    /// question (the fallback path), never to a failed session.
    fn capture_question(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            return None;
        }

        self.engine.enqueue(self.chime.clone());
        self.head.set_indicator(self.config.listening_indicator, true);

        // Give the chime time to land before the microphone opens
        let lead_in_done = self
            .cancel
            .sleep_while(self.config.prompt_lead_in(), self.config.cancel_slice());

        let question = if lead_in_done {
            match self.capture.capture() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Speech capture failed: {}", e);
                    String::new()
                }
            }
        } else {
            String::new()
        };

        self.head.set_indicator(self.config.listening_indicator, false);

        if self.cancel.is_cancelled() {
            return None;
        }
        Some(question.trim().to_string())
    }

    /// Spawn the per-session actuator sequence on its own thread
    ///
    /// The returned channel fires when the sequence ends; if the spawn
    /// failed the sender is dropped and the join sees a disconnect
    /// immediately.
    fn spawn_servo_sequence(&self) -> Receiver<()> {
        let (done_tx, done_rx) = bounded(1);
        let head = Arc::clone(&self.head);
        let pose = Arc::clone(&self.pose);
        let cancel = self.cancel.clone();
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name("noggin-servo".to_string())
            .spawn(move || {
                run_servo_sequence(head.as_ref(), &pose, &config, &cancel);
                let _ = done_tx.send(());
            });

        if let Err(e) = spawned {
            error!("Failed to spawn actuator sequence: {}", e);
        }
        done_rx
    }
}

/// Scripted actuator motion for one session
///
/// Nod to rest, hold, turn to an alternating random angle, hold, return to
/// rest. The cancellation token is checked before every motion and inside
/// every wait.
fn run_servo_sequence(
    head: &dyn HeadControl,
    pose: &Mutex<ServoPose>,
    config: &SessionConfig,
    cancel: &CancelToken,
) {
    let slice = config.cancel_slice();

    if cancel.is_cancelled() {
        return;
    }
    head.set_servo(config.nod_servo, config.rest_angle);

    if !cancel.sleep_while(config.servo_hold(), slice) {
        return;
    }

    let angle = pose.lock().next_turn_angle(config);
    if cancel.is_cancelled() {
        return;
    }
    debug!("Turning to {}", angle);
    head.set_servo(config.turn_servo, angle);

    if !cancel.sleep_while(config.servo_return(), slice) {
        return;
    }

    if cancel.is_cancelled() {
        return;
    }
    head.set_servo(config.nod_servo, config.rest_angle);
}

/// Guaranteed session cleanup
struct SessionGuard {
    sessions: Arc<SessionControl>,
    head: Arc<dyn HeadControl>,
    busy_indicator: u8,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.head.set_indicator(self.busy_indicator, false);
        self.sessions.clear();
        debug!("Session cleanup complete");
    }
}
