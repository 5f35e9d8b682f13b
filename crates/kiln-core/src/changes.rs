//! Change detection trait.

use async_trait::async_trait;

use crate::Result;
use crate::build::BuildDefinition;

/// Decides whether a definition's source has changes that were never built.
///
/// Used by the admission path for definitions with `only_run_for_changes`;
/// callers treat an `Err` as "changes present" so a broken checkout biases
/// toward running rather than silently skipping.
#[async_trait]
pub trait ChangeDetector: Send + Sync {
    async fn has_unbuilt_changes(&self, definition: &BuildDefinition) -> Result<bool>;
}
