//! Session identity and the single-flight entry gate
//!
//! One trigger becomes at most one [`EventSession`]. The gate serializes
//! entry decisions under a single lock so overlapping triggers cannot both
//! start a session, and applies the debounce window before anything else.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// How a session was triggered
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    /// Full voice flow: prompt, capture, query, respond
    Full,
    /// Direct text flow: skip capture, use the provided text as the query
    Direct(String),
}

impl std::fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerMode::Full => write!(f, "full"),
            TriggerMode::Direct(_) => write!(f, "direct"),
        }
    }
}

/// One accepted interaction session
#[derive(Clone, Debug)]
pub struct EventSession {
    pub id: Uuid,
    pub mode: TriggerMode,
    pub started_at: Instant,
}

impl EventSession {
    pub fn new(mode: TriggerMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            started_at: Instant::now(),
        }
    }
}

/// Outcome of the entry gate for one trigger
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryDecision {
    /// Start a new session
    Begin,
    /// An activity is already running; cancel it instead of starting
    CancelActive,
    /// Inside the debounce window; drop the trigger silently
    Debounced,
}

/// Single-flight bookkeeping shared by every trigger source
#[derive(Debug, Default)]
pub struct SessionControl {
    in_progress: AtomicBool,
    /// Start time of the last accepted session; debounce is measured from
    /// here, so a cancel-trigger does not open a new window
    last_start: Mutex<Option<Instant>>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a session is currently in progress
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Run the entry gate for one trigger
    ///
    /// `busy` reports activity outside this gate's knowledge (speech output
    /// still playing). On `Begin` the in-progress flag is set and the
    /// debounce clock restarts; the caller must clear the flag on every exit
    /// path.
    pub fn evaluate(&self, debounce_window: Duration, busy: bool) -> EntryDecision {
        let mut last_start = self.last_start.lock();

        if let Some(last) = *last_start {
            if last.elapsed() < debounce_window {
                return EntryDecision::Debounced;
            }
        }

        if self.in_progress.load(Ordering::SeqCst) || busy {
            return EntryDecision::CancelActive;
        }

        self.in_progress.store(true, Ordering::SeqCst);
        *last_start = Some(Instant::now());
        EntryDecision::Begin
    }

    /// Clear the in-progress flag
    pub fn clear(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }
}
