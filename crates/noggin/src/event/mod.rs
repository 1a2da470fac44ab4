//! Event orchestration
//!
//! - `cancel` - the shared, level-triggered cancellation token
//! - `session` - session identity and the single-flight entry gate
//! - `orchestrator` - the per-session sequencing logic and collaborator
//!   traits

pub mod cancel;
pub mod orchestrator;
pub mod session;

pub use cancel::CancelToken;
pub use orchestrator::{
    HeadOrchestrator, QueryEngine, SpeechCapture, SpeechSynthesizer, TriggerOutcome,
};
pub use session::{EntryDecision, EventSession, SessionControl, TriggerMode};
