use anyhow::Result;
use clap::Parser;

mod buildpack;
mod ci;
mod cli;
mod cloud;
mod commands;
mod config;
mod docker;
mod error;
mod tools;
mod ui;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Single fatal-error exit point: components return typed errors, only
    // main terminates the process.
    if let Err(err) = run(cli).await {
        ui::print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        None => commands::deploy::execute(None, false).await,
        Some(Commands::Deploy {
            environment,
            skip_build,
        }) => commands::deploy::execute(environment, skip_build).await,
        Some(Commands::Apply { environment }) => commands::apply::execute(environment).await,
        Some(Commands::Init {
            name,
            ci,
            build_pack,
        }) => commands::init::execute(name, ci, build_pack).await,
        Some(Commands::Serve { environment }) => commands::serve::execute(environment).await,
        Some(Commands::Login {
            aws_access_key_id,
            aws_secret_access_key,
        }) => commands::login::execute(aws_access_key_id, aws_secret_access_key).await,
        Some(Commands::Clear) => commands::clear::execute().await,
    }
}
