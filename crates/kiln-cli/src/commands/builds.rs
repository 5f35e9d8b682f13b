//! Build commands.

use anyhow::Result;
use kiln_core::BuildInfo;

use super::expect_json;

fn status_of(info: &BuildInfo) -> String {
    info.latest
        .as_ref()
        .map(|latest| latest.result.to_string())
        .unwrap_or_else(|| "never run".to_string())
}

pub async fn list(api_url: &str) -> Result<()> {
    let response = reqwest::get(format!("{api_url}/builds")).await?;
    let builds: Vec<BuildInfo> = expect_json(response).await?;

    if builds.is_empty() {
        println!("no build definitions");
        return Ok(());
    }
    for info in &builds {
        println!(
            "{:<24} {:<10} {}",
            info.definition.name,
            status_of(info),
            info.definition
                .schedule
                .as_deref()
                .unwrap_or("unscheduled")
        );
    }
    Ok(())
}

pub async fn show(api_url: &str, name: &str) -> Result<()> {
    let response = reqwest::get(format!("{api_url}/builds/{name}")).await?;
    let info: BuildInfo = expect_json(response).await?;

    println!("{} ({})", info.definition.name, status_of(&info));
    println!("directory: {}", info.definition.directory);
    if let Some(schedule) = &info.definition.schedule {
        println!("schedule:  {schedule}");
    }
    if let Some(latest) = &info.latest {
        println!("updated:   {}", latest.last_updated);
        println!();
        for line in &latest.log {
            println!("{}", line.message);
        }
    }
    Ok(())
}

pub async fn start(api_url: &str, name: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{api_url}/builds/{name}/start"))
        .send()
        .await?;
    let info: BuildInfo = expect_json(response).await?;
    println!("{}: {}", info.definition.name, status_of(&info));
    Ok(())
}

pub async fn cancel(api_url: &str, name: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .post(format!("{api_url}/builds/{name}/cancel"))
        .send()
        .await?;
    let info: BuildInfo = expect_json(response).await?;
    println!("{}: {}", info.definition.name, status_of(&info));
    Ok(())
}
