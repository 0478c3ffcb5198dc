use crate::llm::LLMError;
use crate::tools::ToolError;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the agent.
///
/// Only `ModelUnavailable`, `IterationBudgetExhausted`, `DeadlineExceeded` and
/// `Cancelled` are ever returned from a run. The other kinds describe
/// recoverable reasoning mistakes; the loop records and reports them, then
/// keeps going.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LLMError),
    #[error("Malformed tool command: '{0}'")]
    MalformedCommand(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool '{tool_name}' failed: {source}")]
    ToolExecutionFailed {
        tool_name: String,
        #[source]
        source: ToolError,
    },
    #[error("Iteration budget exhausted after {iterations} model calls without a final answer")]
    IterationBudgetExhausted { iterations: u32 },
    #[error("Run deadline exceeded after {elapsed:?}")]
    DeadlineExceeded { elapsed: Duration },
    #[error("Run cancelled")]
    Cancelled,
}

/// Limits and behaviour switches for the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    /// Maximum number of model calls per run. `None` leaves the loop unbounded.
    pub max_iterations: Option<u32>,
    /// Wall-clock budget for one run.
    pub deadline: Option<Duration>,
    /// Append a note to the prompt when a command is malformed, names an
    /// unknown tool, or the tool fails. Off by default: the model is re-prompted
    /// with unchanged context.
    pub report_failures_to_model: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        AgentOptions {
            max_iterations: Some(20),
            deadline: None,
            report_failures_to_model: false,
        }
    }
}

/// What happened to one model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    ToolSucceeded {
        tool_name: String,
        argument: String,
        output: String,
    },
    MalformedCommand {
        command_text: String,
    },
    UnknownTool {
        tool_name: String,
    },
    ToolFailed {
        tool_name: String,
        argument: String,
        error: ToolError,
    },
    FinalAnswer,
}

impl StepOutcome {
    /// The recoverable error this step absorbed, if any.
    pub fn issue(&self) -> Option<AgentError> {
        match self {
            StepOutcome::MalformedCommand { command_text } => {
                Some(AgentError::MalformedCommand(command_text.clone()))
            }
            StepOutcome::UnknownTool { tool_name } => Some(AgentError::UnknownTool(tool_name.clone())),
            StepOutcome::ToolFailed {
                tool_name, error, ..
            } => Some(AgentError::ToolExecutionFailed {
                tool_name: tool_name.clone(),
                source: error.clone(),
            }),
            StepOutcome::ToolSucceeded { .. } | StepOutcome::FinalAnswer => None,
        }
    }
}

/// One model call and how its reply was handled.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStep {
    /// 1-based index of the model call.
    pub iteration: u32,
    /// Trimmed reply text.
    pub reply: String,
    pub outcome: StepOutcome,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct AgentExecution {
    pub goal: String,
    pub final_answer: String,
    pub steps: Vec<AgentStep>,
    pub model_calls: u32,
    pub tool_calls: u32,
    pub duration: Duration,
}

/// Progress notifications sent while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    RunStarted { goal: String },
    ModelReply { iteration: u32, reply: String },
    ToolCallAttempt {
        iteration: u32,
        tool_name: String,
        argument: String,
    },
    ToolCallResult {
        iteration: u32,
        tool_name: String,
        output: String,
    },
    /// A recoverable problem (malformed command, unknown tool, tool error).
    StepIssue { iteration: u32, message: String },
    FinalAnswer { iteration: u32, answer: String },
}
