//! Step execution state machine for one build run.
//!
//! Each run is an explicit loop over the definition's steps carrying the
//! step index and a shared result handle; every asynchronous continuation
//! receives that context rather than capturing ambient state. `Cancelled`
//! is a one-way veto: once set, no later process event may change the
//! outcome, though process bookkeeping still completes.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use kiln_core::{BuildDefinition, BuildResult, BuildStatus, EngineEvent, LogMessage};
use regex::RegexBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::registry::BuildRegistry;

/// A run's result, shared between the executor task and the registry
/// while the run is in flight. External views are cloned snapshots.
pub type SharedResult = Arc<Mutex<BuildResult>>;

pub(crate) const LOG_SEPARATOR: &str = "--------------";

enum StepOutcome {
    Next,
    Done,
}

/// Drive one build to a terminal status, then finalize through the
/// registry. Spawned as a task by the admission path.
pub(crate) async fn run_build(
    registry: Arc<BuildRegistry>,
    definition: BuildDefinition,
    result: SharedResult,
) {
    let mut index = 0;
    while index < definition.steps.len() {
        // A cancel between steps stops the chain before the next spawn.
        if current_status(&result) != BuildStatus::Running {
            break;
        }
        match run_step(&registry, &definition, index, &result).await {
            StepOutcome::Next => index += 1,
            StepOutcome::Done => break,
        }
    }
    registry.finalize_build(&definition, &result).await;
}

async fn run_step(
    registry: &Arc<BuildRegistry>,
    definition: &BuildDefinition,
    index: usize,
    result: &SharedResult,
) -> StepOutcome {
    let step = &definition.steps[index];
    let description = step.description();
    let step_tag = format!("(step-{}){}", index, step.command);
    let directory = step.directory.as_deref().unwrap_or(&definition.directory);

    append_line(
        registry,
        result,
        LogMessage::for_step(format!("Running step {index} ({description})..."), step_tag),
    );

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(&description)
        .current_dir(directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            finish(
                result,
                BuildStatus::Failed,
                format!("Step {index} command failed ({description}): {err}"),
            );
            return StepOutcome::Done;
        }
    };

    let handle = registry.tracker().register(&definition.name);

    // Stream stdout line by line. A kill signal terminates the child;
    // the reader then drains until the pipe closes.
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => append_line(registry, result, LogMessage::new(line)),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(build = %definition.name, error = %err, "error reading step output");
                        break;
                    }
                },
                _ = handle.killed() => {
                    if let Err(err) = child.kill().await {
                        debug!(build = %definition.name, error = %err, "failed to kill step process");
                    }
                }
            }
        }
    }

    let exit = child.wait().await;
    drop(handle);

    let exit = match exit {
        Ok(exit) => exit,
        Err(err) => {
            finish(
                result,
                BuildStatus::Failed,
                format!("Step {index} command error ({description}): {err}"),
            );
            return StepOutcome::Done;
        }
    };

    if current_status(result) == BuildStatus::Cancelled {
        return StepOutcome::Done;
    }

    if !exit.success() {
        finish(
            result,
            BuildStatus::Failed,
            format!("Step {index} command failed ({description})"),
        );
        return StepOutcome::Done;
    }

    // Exit code zero: classify from the accumulated log of this run.
    let log = result.lock().unwrap().log.clone();
    if pattern_matched(step.fail_text.as_deref(), &log) {
        finish(
            result,
            BuildStatus::Failed,
            format!("Failure text condition was met on step {index} ({description})"),
        );
        return StepOutcome::Done;
    }
    if pattern_matched(step.unstable_text.as_deref(), &log) {
        finish(
            result,
            BuildStatus::Unstable,
            format!("Unstable text condition was met on step {index} ({description})"),
        );
        return StepOutcome::Done;
    }

    if index + 1 < definition.steps.len() {
        StepOutcome::Next
    } else {
        info!(build = %definition.name, "build completed successfully");
        finish(result, BuildStatus::Success, "Build completed successfully!");
        StepOutcome::Done
    }
}

/// Whether the pattern flags any line of the log. A line counts only when
/// the regex matches with a non-empty first capture group; patterns with
/// no capture group never match.
fn pattern_matched(pattern: Option<&str>, log: &[LogMessage]) -> bool {
    let Some(pattern) = pattern else {
        return false;
    };
    let regex = match RegexBuilder::new(pattern).multi_line(true).build() {
        Ok(regex) => regex,
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "invalid classification pattern, ignoring");
            return false;
        }
    };
    if regex.captures_len() < 2 {
        return false;
    }
    log.iter().any(|line| {
        regex
            .captures(&line.message)
            .is_some_and(|caps| caps.get(1).is_some_and(|group| !group.as_str().is_empty()))
    })
}

fn current_status(result: &SharedResult) -> BuildStatus {
    result.lock().unwrap().result
}

/// Append a line and publish a step-update snapshot.
fn append_line(registry: &BuildRegistry, result: &SharedResult, line: LogMessage) {
    let snapshot = {
        let mut result = result.lock().unwrap();
        result.push(line);
        result.clone()
    };
    registry.events().publish(EngineEvent::BuildStepUpdated(snapshot));
}

/// Record a terminal outcome with its closing log lines, unless the run
/// was already cancelled.
fn finish(result: &SharedResult, status: BuildStatus, message: impl Into<String>) {
    let mut result = result.lock().unwrap();
    if result.result == BuildStatus::Cancelled {
        return;
    }
    result.set_status(status);
    result.push(LogMessage::new(LOG_SEPARATOR));
    result.push(LogMessage::new(message));
}
