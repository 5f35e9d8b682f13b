//! Cron trigger binding for scheduled builds.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::BuildRegistry;

/// Bind one trigger task for a scheduled definition: sleep until the next
/// cron firing, then ask the registry to start the build. The returned
/// handle is aborted at the start of every reload.
pub(crate) fn bind(
    registry: Arc<BuildRegistry>,
    name: String,
    expression: &str,
) -> Option<JoinHandle<()>> {
    let schedule = match Schedule::from_str(expression) {
        Ok(schedule) => schedule,
        Err(err) => {
            warn!(build = %name, expression = %expression, error = %err, "invalid cron expression, build will not be scheduled");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            debug!(build = %name, "schedule fired");
            registry.start_build(&name, false).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expressions_parse() {
        // Seconds-resolution expressions, as used in definition files.
        assert!(Schedule::from_str("0 0 3 * * *").is_ok());
        assert!(Schedule::from_str("*/30 * * * * *").is_ok());
        assert!(Schedule::from_str("not a schedule").is_err());
    }
}
