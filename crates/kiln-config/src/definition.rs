//! Build definition parsing.

use std::path::Path;

use kiln_core::BuildDefinition;

use crate::{ConfigError, ConfigResult};

/// Read and parse one build definition file.
pub async fn load_definition(path: &Path) -> ConfigResult<BuildDefinition> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_definition(&text)
}

/// Parse a build definition from JSON text.
///
/// `name`, `directory`, and `steps` must be present and non-empty; callers
/// treat any error here as "skip this file", never as a fatal condition.
pub fn parse_definition(json: &str) -> ConfigResult<BuildDefinition> {
    let definition: BuildDefinition = serde_json::from_str(json)?;

    if definition.name.is_empty() {
        return Err(ConfigError::MissingField("name".to_string()));
    }
    if definition.directory.is_empty() {
        return Err(ConfigError::MissingField("directory".to_string()));
    }
    if definition.steps.is_empty() {
        return Err(ConfigError::MissingField("steps".to_string()));
    }

    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_complete_definition() {
        let json = r#"{
            "name": "api-server",
            "directory": "/srv/api-server",
            "schedule": "0 0 2 * * *",
            "emailTo": "ops@example.com",
            "onlyRunForChanges": true,
            "steps": [
                {"command": "git", "args": ["pull"]},
                {"command": "make", "args": ["test"], "failText": "FAILED: (\\w+)"}
            ]
        }"#;

        let definition = parse_definition(json).unwrap();
        assert_eq!(definition.name, "api-server");
        assert_eq!(definition.steps.len(), 2);
        assert!(definition.only_run_for_changes);
        assert_eq!(definition.steps[1].fail_text.as_deref(), Some("FAILED: (\\w+)"));
    }

    #[test]
    fn test_missing_name_is_an_error() {
        let json = r#"{"directory": "/tmp", "steps": [{"command": "true"}]}"#;
        assert!(matches!(
            parse_definition(json).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_empty_name_is_an_error() {
        let json = r#"{"name": "", "directory": "/tmp", "steps": [{"command": "true"}]}"#;
        assert!(matches!(
            parse_definition(json).unwrap_err(),
            ConfigError::MissingField(field) if field == "name"
        ));
    }

    #[test]
    fn test_empty_steps_is_an_error() {
        let json = r#"{"name": "x", "directory": "/tmp", "steps": []}"#;
        assert!(matches!(
            parse_definition(json).unwrap_err(),
            ConfigError::MissingField(field) if field == "steps"
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            parse_definition("{not json").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
