//! CLI commands.

pub mod builds;

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Read a JSON body, turning error responses into readable failures.
pub(crate) async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let message = body
        .get("error")
        .and_then(|error| error.as_str())
        .unwrap_or("unknown error");
    anyhow::bail!("{status}: {message}")
}

pub async fn reload(api_url: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{api_url}/builds/reload"))
        .send()
        .await?;
    let _: serde_json::Value = expect_json(response).await?;
    println!("definitions reloaded");
    Ok(())
}

pub async fn pause(api_url: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{api_url}/builds/pause"))
        .send()
        .await?;
    let _: serde_json::Value = expect_json(response).await?;
    println!("builds paused");
    Ok(())
}

pub async fn resume(api_url: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{api_url}/builds/resume"))
        .send()
        .await?;
    let _: serde_json::Value = expect_json(response).await?;
    println!("builds resumed");
    Ok(())
}
