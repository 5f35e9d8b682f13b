//! Lifecycle events published by the orchestration engine.

use serde::Serialize;

use crate::build::{BuildInfo, BuildResult};

/// Notifications consumed by transport adapters (WebSocket feed, logs).
///
/// Build events carry a snapshot of the result at the moment of emission;
/// receivers never observe later mutation of an in-flight run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum EngineEvent {
    ReloadStarted,
    ReloadEnded(Vec<BuildInfo>),
    BuildStarted(BuildResult),
    BuildStepUpdated(BuildResult),
    BuildEnded(BuildResult),
    QueueChanged(Vec<String>),
    Paused,
    Resumed,
}
