mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "runbox-cli")]
#[command(about = "runbox CLI - submit scripts for isolated execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a script file to the gateway and print the result
    Run {
        /// Path to a JavaScript file defining a main() function
        file: PathBuf,

        /// Gateway base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8000")]
        gateway: String,
    },

    /// Check gateway liveness
    Health {
        /// Gateway base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8000")]
        gateway: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, gateway } => commands::run(&file, &gateway).await,
        Commands::Health { gateway } => commands::health(&gateway).await,
    }
}
