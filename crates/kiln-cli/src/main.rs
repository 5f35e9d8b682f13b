//! Kiln CLI tool.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Kiln CI CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "KILN_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and control builds
    Builds {
        #[command(subcommand)]
        command: BuildCommands,
    },
    /// Re-read the definitions directory on the server
    Reload,
    /// Stop admitting new builds
    Pause,
    /// Resume admitting builds
    Resume,
}

#[derive(Subcommand)]
enum BuildCommands {
    /// List all builds with their latest status
    List,
    /// Show one build, including its latest run log
    Show {
        /// Build name
        name: String,
    },
    /// Force-start a build
    Start {
        /// Build name
        name: String,
    },
    /// Cancel a running build
    Cancel {
        /// Build name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Builds { command } => match command {
            BuildCommands::List => {
                commands::builds::list(&cli.api_url).await?;
            }
            BuildCommands::Show { name } => {
                commands::builds::show(&cli.api_url, &name).await?;
            }
            BuildCommands::Start { name } => {
                commands::builds::start(&cli.api_url, &name).await?;
            }
            BuildCommands::Cancel { name } => {
                commands::builds::cancel(&cli.api_url, &name).await?;
            }
        },
        Commands::Reload => {
            commands::reload(&cli.api_url).await?;
        }
        Commands::Pause => {
            commands::pause(&cli.api_url).await?;
        }
        Commands::Resume => {
            commands::resume(&cli.api_url).await?;
        }
    }

    Ok(())
}
