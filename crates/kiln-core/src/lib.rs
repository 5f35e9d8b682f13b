//! Core domain types and traits for the Kiln CI orchestrator.
//!
//! This crate contains:
//! - Build definitions, steps, and per-run results
//! - Lifecycle events published by the orchestration engine
//! - Collaborator traits (change detection, notification)

pub mod build;
pub mod changes;
pub mod error;
pub mod event;
pub mod notify;

pub use build::{BuildDefinition, BuildInfo, BuildResult, BuildStatus, BuildStep, LogMessage};
pub use changes::ChangeDetector;
pub use error::{Error, Result};
pub use event::EngineEvent;
pub use notify::Notifier;
