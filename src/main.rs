//! # AI Rust Agent
//!
//! A minimal autonomous agent: it sends a goal to a language model, runs the
//! tool the model asks for with a `use:<tool> <input>` line, feeds the result
//! back and repeats until the model replies with a final answer. This is the
//! CLI entry point.

mod agent;
mod cli;
mod config;
mod llm;
mod tools;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Control the log level with RUST_LOG, e.g. RUST_LOG=ai_rust_agent=debug,info
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr) // Log to stderr
        .init();

    let cli_args = Cli::parse();

    let outcome = match cli_args.command {
        Commands::Run(args) => cli::handle_run(args).await,
        Commands::Interactive(args) => cli::handle_interactive(args).await,
        Commands::ShowConfig(args) => cli::handle_show_config(args).await,
        Commands::Tools(args) => cli::handle_tools_command(args).await,
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
