//! Build report delivery through the SendGrid mail API.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use kiln_core::{BuildDefinition, BuildResult, Notifier};
use serde_json::json;
use tracing::{info, warn};

use crate::logstore::LogStore;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const DEFAULT_FROM: &str = "kiln-ci@example.org";

/// Sends failure/instability reports by mail, with the serialized result
/// attached under its log filename. Disabled when no API key is present.
pub struct SendGridNotifier {
    key: Option<String>,
    client: reqwest::Client,
}

impl SendGridNotifier {
    /// Load the API key from a `{"key": "..."}` JSON file. A missing or
    /// unreadable file disables mail delivery.
    pub async fn from_key_file(path: &Path) -> Self {
        let key = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents)
                .ok()
                .and_then(|value| value.get("key").and_then(|key| key.as_str().map(String::from))),
            Err(_) => None,
        };
        if key.is_none() {
            info!(path = %path.display(), "no sendgrid api key found, unable to send emails");
        }
        Self {
            key,
            client: reqwest::Client::new(),
        }
    }

    #[cfg(test)]
    fn with_key(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

/// The SendGrid v3 request body for one report.
fn build_payload(
    definition: &BuildDefinition,
    result: &BuildResult,
    subject: &str,
    html_body: &str,
    to: &str,
) -> serde_json::Value {
    let attachment = STANDARD.encode(serde_json::to_vec_pretty(result).unwrap_or_default());
    json!({
        "personalizations": [{"to": [{"email": to}]}],
        "from": {"email": definition.email_from.as_deref().unwrap_or(DEFAULT_FROM)},
        "subject": subject,
        "content": [{"type": "text/html", "value": html_body}],
        "attachments": [{
            "content": attachment,
            "filename": LogStore::file_name(result),
            "type": "text/plain",
            "disposition": "attachment"
        }]
    })
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn notify(
        &self,
        definition: &BuildDefinition,
        result: &BuildResult,
        subject: &str,
        html_body: &str,
    ) {
        let Some(key) = &self.key else {
            return;
        };
        let Some(to) = definition.email_to.as_deref() else {
            return;
        };

        info!(build = %definition.name, to = %to, "sending email");
        let payload = build_payload(definition, result, subject, html_body, to);
        let response = self
            .client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await;
        match response {
            Ok(response) if !response.status().is_success() => {
                warn!(build = %definition.name, status = %response.status(), "failed to send email");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(build = %definition.name, error = %err, "failed to send email");
            }
        }
    }
}
