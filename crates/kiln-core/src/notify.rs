//! Notification trait.

use async_trait::async_trait;

use crate::build::{BuildDefinition, BuildResult};

/// Delivers a build report to the definition's notification target.
///
/// Best effort: implementations log and swallow every failure; a broken
/// mail path must never affect build bookkeeping.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        definition: &BuildDefinition,
        result: &BuildResult,
        subject: &str,
        html_body: &str,
    );
}
