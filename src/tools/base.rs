use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// Indicates that the tool's execution logic failed.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },
}

/// Defines the interface for a tool that can be executed by the agent.
///
/// Tools receive the raw argument text the model wrote after the tool name and
/// return plain text that is fed back into the conversation. A tool must not
/// rely on hidden state from earlier invocations unless it is explicitly
/// stateful.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of the tool. Names are case-sensitive.
    fn get_name(&self) -> String;
    /// Returns a description of what the tool does, advertised to the model.
    fn get_description(&self) -> String;

    /// Executes the tool with the given argument text.
    ///
    /// # Returns
    /// A `Result` containing the tool output on success, or a `ToolError` on failure.
    async fn execute(&self, input: &str) -> Result<String, ToolError>;
}
