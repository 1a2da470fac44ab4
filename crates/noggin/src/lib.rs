//! Noggin - interaction core for a voice-driven dashboard robot head
//!
//! Coordinates three subsystems around one cancellable interaction event:
//! a device link speaking a framed binary protocol to the head hardware,
//! an orchestrator sequencing prompt, capture, query, and actuator motion,
//! and a playback engine streaming spoken responses with live loudness
//! feedback. Speech capture, query processing, and synthesis are consumed
//! through traits; their internals live elsewhere.

pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod playback;

// Re-export error types
pub use error::{NogginError, Result};

// Re-export configuration
pub use config::{DeviceConfig, NogginConfig, PlaybackConfig, SessionConfig};

// Re-export the device surface
pub use device::{DeviceLink, HeadControl};

// Re-export playback types
pub use playback::{IndicatorFn, PlaybackEngine, Utterance};

// Re-export orchestration types
pub use event::{
    CancelToken, HeadOrchestrator, QueryEngine, SpeechCapture, SpeechSynthesizer, TriggerMode,
    TriggerOutcome,
};
