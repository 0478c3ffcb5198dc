//! # Agent Module
//!
//! Contains the reasoning/dispatch loop: `Agent` sends the goal to the model,
//! looks for a tool command in each reply with the `command_parser`, runs the
//! named tool and feeds its output back until the model answers without a
//! command. Shared result, event and error types live in `base_agent`.

pub mod base_agent;
pub mod command_parser;
pub mod reasoning_agent;

pub use base_agent::{AgentError, AgentEvent, AgentExecution, AgentOptions, StepOutcome};
pub use reasoning_agent::Agent;
