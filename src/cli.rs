//! # CLI Module
//!
//! Handles command-line argument parsing and dispatching to appropriate handlers
//! for the agent. It uses the `clap` crate for parsing.

use crate::agent::{Agent, AgentEvent, AgentExecution, StepOutcome};
use crate::config::{Config, DEFAULT_CONFIG_FILE};
use crate::llm::{LLMClient, OpenAIClient};
use crate::tools::ToolRegistry;
use anyhow::Context;
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const HISTORY_FILE: &str = ".agent_history.txt";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent on a single goal
    Run(RunArgs),
    /// Start an interactive session; every line is a separate goal
    Interactive(InteractiveArgs),
    /// Show current configuration settings
    ShowConfig(ShowConfigArgs),
    /// Show available tools and their descriptions
    Tools(ToolsArgs),
}

/// Backend and loop settings shared by `run` and `interactive`.
#[derive(Parser, Debug)]
pub struct BackendArgs {
    #[arg(short, long)]
    pub model: Option<String>,
    #[arg(short, long)]
    pub base_url: Option<String>,
    #[arg(short, long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub max_iterations: Option<u32>,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[arg(index = 1)]
    pub goal: String,
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Parser, Debug)]
pub struct InteractiveArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Parser, Debug)]
pub struct ShowConfigArgs {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
}

#[derive(Parser, Debug)]
pub struct ToolsArgs {}

fn load_config(args: &BackendArgs) -> anyhow::Result<Config> {
    Config::load(
        &args.config_file,
        args.model.clone(),
        args.base_url.clone(),
        args.api_key.clone(),
        args.max_iterations,
    )
}

fn build_agent(config: &Config, tool_registry: Arc<ToolRegistry>) -> anyhow::Result<Agent> {
    let client = OpenAIClient::new(&config.model_parameters)
        .context("Failed to create model client")?;
    info!(
        provider = %client.get_provider_name(),
        model = %config.model_parameters.model,
        "Model client ready"
    );
    Ok(Agent::new(
        config.model_parameters.model.clone(),
        Arc::new(client),
        tool_registry,
        config.agent_options(),
    ))
}

/// Prints agent progress to stdout until the sender side is dropped.
fn spawn_console_printer(mut event_rx: mpsc::Receiver<AgentEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AgentEvent::RunStarted { goal } => println!("Goal: {}", goal),
                AgentEvent::ModelReply { iteration, reply } => {
                    println!("\n[step {}] Agent: {}", iteration, reply)
                }
                AgentEvent::ToolCallAttempt {
                    tool_name, argument, ..
                } => println!("Using tool: {} with input: {}", tool_name, argument),
                AgentEvent::ToolCallResult {
                    tool_name, output, ..
                } => println!("Tool {} returned: {}", tool_name, output),
                AgentEvent::StepIssue { message, .. } => println!("Warning: {}", message),
                AgentEvent::FinalAnswer { answer, .. } => println!("\nFinal Answer: {}", answer),
            }
        }
    })
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling run");
            token.cancel();
        }
    })
}

pub async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    info!("Starting 'run' command with goal: {}", args.goal);
    let started = Instant::now();

    let config = load_config(&args.backend)?;
    info!(
        model = %config.model_parameters.model,
        base_url = %config.model_parameters.base_url_or_default(),
        "Configuration loaded"
    );

    let tool_registry = Arc::new(ToolRegistry::default());
    info!("ToolRegistry initialized with {} tools.", tool_registry.len());

    let (event_tx, event_rx) = mpsc::channel(100);
    let agent = build_agent(&config, tool_registry)?.with_event_sender(event_tx);
    let console_printer = spawn_console_printer(event_rx);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel_on_ctrl_c(cancel.clone());

    let result = agent.run(&args.goal, &cancel).await;
    ctrl_c.abort();
    // Dropping the agent closes the event channel so the printer can finish.
    drop(agent);
    if let Err(e) = console_printer.await {
        error!("Console printer task failed: {:?}", e);
    }

    let execution = result.context("Agent run failed")?;
    print!("{}", format_summary(&execution));
    info!("Execution time: {:?}", started.elapsed());
    Ok(())
}

/// Renders the end-of-run report, one line per step.
fn format_summary(execution: &AgentExecution) -> String {
    let mut summary = String::from("\n--- Run Summary ---\n");
    summary.push_str(&format!("Goal: {}\n", execution.goal));
    summary.push_str(&format!("Steps: {}\n", execution.steps.len()));
    for step in &execution.steps {
        let line = match &step.outcome {
            StepOutcome::ToolSucceeded {
                tool_name,
                argument,
                output,
            } => format!("{} {} -> {}", tool_name, argument, output),
            StepOutcome::FinalAnswer => "final answer".to_string(),
            other => match other.issue() {
                Some(issue) => format!("{} -> skipped ({})", step.reply, issue),
                None => format!("{} -> skipped", step.reply),
            },
        };
        summary.push_str(&format!("  [{}] {}\n", step.iteration, line));
    }
    summary.push_str(&format!("Model Calls: {}\n", execution.model_calls));
    summary.push_str(&format!("Tool Calls: {}\n", execution.tool_calls));
    summary.push_str(&format!("Duration: {:.2?}\n", execution.duration));
    summary.push_str(&format!("Final Answer: {}\n", execution.final_answer));
    summary
}

pub async fn handle_interactive(args: InteractiveArgs) -> anyhow::Result<()> {
    info!("Starting 'interactive' command session.");

    let config = load_config(&args.backend)?;
    let tool_registry = Arc::new(ToolRegistry::default());

    let (event_tx, event_rx) = mpsc::channel(100);
    let agent = build_agent(&config, tool_registry)?.with_event_sender(event_tx);
    let console_printer = spawn_console_printer(event_rx);

    let mut rl = DefaultEditor::new().context("Failed to create line editor")?;
    if PathBuf::from(HISTORY_FILE).exists() {
        let _ = rl.load_history(HISTORY_FILE);
    }

    println!(
        "Interactive mode (model: {} via {}). Type 'exit' or 'quit' to leave, 'tools' to list tools.",
        agent.model(),
        agent.provider()
    );

    loop {
        match rl.readline("agent> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                let goal = line.trim();

                if goal.is_empty() {
                    continue;
                }
                if goal == "exit" || goal == "quit" {
                    break;
                }
                if goal == "tools" {
                    print_tools(agent.tools());
                    continue;
                }

                let started = Instant::now();
                let cancel = CancellationToken::new();
                let ctrl_c = cancel_on_ctrl_c(cancel.clone());
                let result = agent.run(goal, &cancel).await;
                ctrl_c.abort();

                match result {
                    Ok(execution) => {
                        info!(
                            model_calls = execution.model_calls,
                            tool_calls = execution.tool_calls,
                            "Execution time: {:?}",
                            started.elapsed()
                        );
                    }
                    Err(e) => {
                        error!("Agent run failed: {}", e);
                        println!("Agent Error: {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error reading line: {:?}", err);
                break;
            }
        }
    }

    drop(agent);
    if let Err(e) = console_printer.await {
        error!("Console printer task failed: {:?}", e);
    }
    let _ = rl.save_history(HISTORY_FILE);
    println!("Exiting interactive session.");
    Ok(())
}

pub async fn handle_show_config(args: ShowConfigArgs) -> anyhow::Result<()> {
    println!("Attempting to load config from: {}", args.config_file);
    let config = Config::load(&args.config_file, None, None, None, None)?;
    let params = &config.model_parameters;

    println!("\n--- Configuration ---");
    println!("Model: {}", params.model);
    println!("Base URL: {}", params.base_url_or_default());
    println!(
        "API Key: {}",
        params
            .api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "Not set (placeholder will be sent)".to_string())
    );
    if let Some(temperature) = params.temperature {
        println!("Temperature: {}", temperature);
    }
    println!("Max Retries: {}", params.max_retries);
    println!("Retry Backoff: {}ms", params.retry_backoff_ms);
    println!("Request Timeout: {}s", params.request_timeout_secs);
    match config.max_iterations {
        Some(max) => println!("Max Iterations: {}", max),
        None => println!("Max Iterations: unbounded"),
    }
    if let Some(secs) = config.run_timeout_secs {
        println!("Run Timeout: {}s", secs);
    }
    println!("Report Failures To Model: {}", config.report_failures_to_model);
    println!("--- End Configuration ---");
    Ok(())
}

pub async fn handle_tools_command(_args: ToolsArgs) -> anyhow::Result<()> {
    print_tools(&ToolRegistry::default());
    Ok(())
}

fn print_tools(registry: &ToolRegistry) {
    println!("\n--- Available Tools ---");
    if registry.is_empty() {
        println!("No tools are currently registered.");
    } else {
        let tools = registry.list_tools();
        let max_name_len = tools
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(9)
            .max("Tool Name".len());

        println!("{:<width$} | Description", "Tool Name", width = max_name_len);
        println!("{:-<width$}-|----------------------------------", "-", width = max_name_len);
        for (name, description) in tools {
            println!("{:<width$} | {}", name, description, width = max_name_len);
        }
    }
    println!("--- End Available Tools ---");
}

/// Keeps the last four characters of a secret visible.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::base_agent::AgentStep;
    use std::time::Duration;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-abcdef1234"), "*********1234");
        assert_eq!(mask_secret("abc"), "***");
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "ai_rust_agent",
            "run",
            "Find the result of (4 + 5) * 2",
            "--model",
            "phi3:mini",
            "--max-iterations",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.goal, "Find the result of (4 + 5) * 2");
                assert_eq!(args.backend.model.as_deref(), Some("phi3:mini"));
                assert_eq!(args.backend.max_iterations, Some(5));
                assert_eq!(args.backend.config_file, DEFAULT_CONFIG_FILE);
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_build_agent_uses_configured_model() {
        let mut config = Config::default();
        config.model_parameters.model = "phi3:mini".to_string();
        config.max_iterations = Some(3);
        let agent = build_agent(&config, Arc::new(ToolRegistry::default())).unwrap();
        assert_eq!(agent.model(), "phi3:mini");
        assert_eq!(agent.options().max_iterations, Some(3));
        assert!(agent.tools().get_tool("calc").is_some());
        assert_eq!(agent.provider(), "openai");
    }

    #[test]
    fn test_summary_lists_goal_steps_and_duration() {
        let execution = AgentExecution {
            goal: "What is 9 times 2?".to_string(),
            final_answer: "18".to_string(),
            steps: vec![
                AgentStep {
                    iteration: 1,
                    reply: "use: search rust".to_string(),
                    outcome: StepOutcome::UnknownTool {
                        tool_name: "search".to_string(),
                    },
                },
                AgentStep {
                    iteration: 2,
                    reply: "use: calc 9*2".to_string(),
                    outcome: StepOutcome::ToolSucceeded {
                        tool_name: "calc".to_string(),
                        argument: "9*2".to_string(),
                        output: "18".to_string(),
                    },
                },
                AgentStep {
                    iteration: 3,
                    reply: "18".to_string(),
                    outcome: StepOutcome::FinalAnswer,
                },
            ],
            model_calls: 3,
            tool_calls: 1,
            duration: Duration::from_millis(1500),
        };

        let summary = format_summary(&execution);

        assert!(summary.contains("Goal: What is 9 times 2?\n"));
        assert!(summary.contains("Steps: 3\n"));
        assert!(summary.contains("  [1] use: search rust -> skipped (Unknown tool: search)\n"));
        assert!(summary.contains("  [2] calc 9*2 -> 18\n"));
        assert!(summary.contains("  [3] final answer\n"));
        assert!(summary.contains("Model Calls: 3\nTool Calls: 1\n"));
        assert!(summary.contains("Duration: 1.50s\n"));
        assert!(summary.ends_with("Final Answer: 18\n"));
    }

    #[test]
    fn test_empty_registry_is_reported_empty() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(!ToolRegistry::default().is_empty());
    }
}
