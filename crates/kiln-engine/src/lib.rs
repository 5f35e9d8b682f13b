//! Build orchestration engine for Kiln.
//!
//! The registry owns the definition set and admission control; the
//! executor drives one build's steps as a state machine over child
//! processes; the log store persists finished runs and seeds the latest
//! result of each build after a restart.

pub mod changes;
pub mod events;
pub mod executor;
pub mod logstore;
pub mod notify;
pub mod procs;
pub mod queue;
pub mod registry;
pub mod schedule;

pub use changes::GitChangeDetector;
pub use events::EventBus;
pub use logstore::LogStore;
pub use notify::SendGridNotifier;
pub use procs::ProcessTracker;
pub use registry::{BuildRegistry, ReloadOutcome, StartOutcome};
