//! Git-backed change detection.

use std::sync::LazyLock;

use async_trait::async_trait;
use kiln_core::{BuildDefinition, ChangeDetector, Error, Result};
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

static IS_BEHIND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"is behind .* by ([0-9]+) commit").expect("is-behind pattern is valid")
});

/// Decides "has unbuilt changes" by asking git whether the definition's
/// working copy is behind its remote.
pub struct GitChangeDetector;

#[async_trait]
impl ChangeDetector for GitChangeDetector {
    async fn has_unbuilt_changes(&self, definition: &BuildDefinition) -> Result<bool> {
        run_git(&definition.directory, "git remote update").await?;
        let status = run_git(&definition.directory, "git status").await?;

        let behind = commits_behind(&status);
        debug!(build = %definition.name, commits_behind = behind, "checked git for changes");
        Ok(behind > 0)
    }
}

async fn run_git(directory: &str, command: &str) -> Result<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(directory)
        .output()
        .await?;
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        return Err(Error::Internal(format!(
            "'{}' exited with {}: {}",
            command, output.status, combined
        )));
    }
    Ok(combined)
}

/// How many commits behind the remote the status output reports.
fn commits_behind(status_output: &str) -> u32 {
    IS_BEHIND
        .captures(status_output)
        .and_then(|caps| caps.get(1))
        .and_then(|group| group.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_behind_status() {
        let output = "On branch main\n\
                      Your branch is behind 'origin/main' by 3 commits, and can be fast-forwarded.\n";
        assert_eq!(commits_behind(output), 3);
    }

    #[test]
    fn test_up_to_date_reports_zero() {
        let output = "On branch main\nYour branch is up to date with 'origin/main'.\n";
        assert_eq!(commits_behind(output), 0);
    }

    #[test]
    fn test_unrelated_output_reports_zero() {
        assert_eq!(commits_behind("fatal: not a git repository"), 0);
    }
}
