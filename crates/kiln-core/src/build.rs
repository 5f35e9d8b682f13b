//! Build definitions and per-run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named CI job: where it runs, the steps it executes, and when it fires.
///
/// Definitions are persisted as one JSON file each in the definitions
/// directory and replaced wholesale on reload. Identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinition {
    /// Unique key across the whole system.
    pub name: String,
    /// Working directory for steps that do not override it.
    pub directory: String,
    /// Optional cron expression for scheduled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Sender address for failure reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    /// Recipient address for failure reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_to: Option<String>,
    /// Skip scheduled runs while the source has no unbuilt changes.
    #[serde(default)]
    pub only_run_for_changes: bool,
    /// Ordered shell steps.
    pub steps: Vec<BuildStep>,
}

/// One shell command in a build's step sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides the definition's working directory for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Regex evaluated against the run's log; a non-empty first capture
    /// group in any line fails the build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_text: Option<String>,
    /// Same matching rule as `fail_text`, but marks the build unstable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstable_text: Option<String>,
}

impl BuildStep {
    /// Human-readable `command arg1 arg2 ...` form used in log lines.
    pub fn description(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Terminal and in-flight states of one build run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display,
)]
pub enum BuildStatus {
    Running,
    Success,
    Failed,
    Unstable,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Running)
    }
}

/// One line of captured output or orchestrator commentary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub message: String,
    /// Step tag for lines announcing a step, empty otherwise.
    #[serde(default)]
    pub command: String,
    pub time: DateTime<Utc>,
}

impl LogMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: String::new(),
            time: Utc::now(),
        }
    }

    pub fn for_step(message: impl Into<String>, step_tag: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: step_tag.into(),
            time: Utc::now(),
        }
    }
}

/// The record of one execution attempt.
///
/// Mutated only by the executor driving the run; immutable once `result`
/// is terminal. `build_def` is the definition snapshot the run started
/// with, so a later reload cannot change an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub name: String,
    pub build_def: BuildDefinition,
    pub last_updated: DateTime<Utc>,
    pub result: BuildStatus,
    pub log: Vec<LogMessage>,
}

impl BuildResult {
    /// A fresh `Running` result for the given definition.
    pub fn started(definition: &BuildDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            build_def: definition.clone(),
            last_updated: Utc::now(),
            result: BuildStatus::Running,
            log: Vec::new(),
        }
    }

    /// Append a log line, refreshing `last_updated`.
    pub fn push(&mut self, line: LogMessage) {
        self.last_updated = Utc::now();
        self.log.push(line);
    }

    /// Set a terminal (or refreshed) status, updating `last_updated`.
    pub fn set_status(&mut self, status: BuildStatus) {
        self.result = status;
        self.last_updated = Utc::now();
    }
}

/// A definition paired with its most recent run, the registry's primary
/// record and the shape returned over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub definition: BuildDefinition,
    pub latest: Option<BuildResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_definition() -> BuildDefinition {
        BuildDefinition {
            name: "web-app".to_string(),
            directory: "/srv/web-app".to_string(),
            schedule: Some("0 0 3 * * *".to_string()),
            email_from: None,
            email_to: Some("team@example.com".to_string()),
            only_run_for_changes: true,
            steps: vec![BuildStep {
                command: "npm".to_string(),
                args: vec!["test".to_string()],
                directory: None,
                fail_text: Some("ERROR: (\\w+)".to_string()),
                unstable_text: None,
            }],
        }
    }

    #[test]
    fn test_definition_json_round_trip_uses_camel_case() {
        let definition = make_definition();
        let json = serde_json::to_string(&definition).unwrap();

        assert!(json.contains("\"onlyRunForChanges\":true"));
        assert!(json.contains("\"emailTo\""));
        assert!(json.contains("\"failText\""));

        let parsed: BuildDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "web-app");
        assert_eq!(parsed.steps.len(), 1);
    }

    #[test]
    fn test_definition_optional_fields_default() {
        let json = r#"{
            "name": "minimal",
            "directory": "/tmp",
            "steps": [{"command": "true"}]
        }"#;

        let parsed: BuildDefinition = serde_json::from_str(json).unwrap();
        assert!(parsed.schedule.is_none());
        assert!(!parsed.only_run_for_changes);
        assert!(parsed.steps[0].args.is_empty());
        assert!(parsed.steps[0].fail_text.is_none());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!BuildStatus::Running.is_terminal());
        assert!(BuildStatus::Success.is_terminal());
        assert!(BuildStatus::Failed.is_terminal());
        assert!(BuildStatus::Unstable.is_terminal());
        assert!(BuildStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_string(&BuildStatus::Unstable).unwrap(),
            "\"Unstable\""
        );
    }

    #[test]
    fn test_step_description() {
        let step = BuildStep {
            command: "cargo".to_string(),
            args: vec!["build".to_string(), "--release".to_string()],
            directory: None,
            fail_text: None,
            unstable_text: None,
        };
        assert_eq!(step.description(), "cargo build --release");

        let bare = BuildStep {
            command: "make".to_string(),
            args: vec![],
            directory: None,
            fail_text: None,
            unstable_text: None,
        };
        assert_eq!(bare.description(), "make");
    }

    #[test]
    fn test_result_push_refreshes_last_updated() {
        let mut result = BuildResult::started(&make_definition());
        let before = result.last_updated;
        result.push(LogMessage::new("output line"));

        assert_eq!(result.log.len(), 1);
        assert!(result.last_updated >= before);
    }
}
