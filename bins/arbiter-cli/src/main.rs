mod commands;

use anyhow::Result;
use arbiter_common::types::Language;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Arbiter CLI - Run and grade code in the sandbox, manage language images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file once against a custom input
    Run {
        /// Language (cpp, java, python, javascript)
        #[arg(short, long)]
        language: Language,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// File fed to the program's stdin (empty when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Grade a source file against a JSON list of test cases
    Grade {
        /// Language (cpp, java, python, javascript)
        #[arg(short, long)]
        language: Language,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// JSON file: [{"input": "...", "output": "..."}, ...]
        #[arg(short, long)]
        tests: PathBuf,
    },

    /// Show the effective per-language sandbox configuration
    Languages,

    /// Pull every configured sandbox image
    PullImages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { language, file, input } => {
            commands::run_program(language, &file, input.as_deref()).await?;
        }
        Commands::Grade { language, file, tests } => {
            commands::grade_program(language, &file, &tests).await?;
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
        Commands::PullImages => {
            commands::pull_images().await?;
        }
    }

    Ok(())
}
