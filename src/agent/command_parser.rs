//! Extraction of tool commands from free-form model replies.
//!
//! The protocol is deliberately loose: a command is whatever follows the first
//! `use:` marker (any case) on the first line that contains one, in the shape
//! `<tool-name> <argument-text>`. There is no escaping and no word-boundary
//! check, so `reuse: calc 1+1` is a command too. All knowledge of the text
//! protocol lives here; the dispatch loop only sees `ParseOutcome`.

const MARKER: &str = "use:";

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub tool_name: String,
    pub argument: String,
}

/// Result of scanning one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// No marker anywhere: the reply is the final answer.
    NoCommand,
    /// A marker was found but the text after it is not `<tool> <argument>`.
    Malformed { command_text: String },
    Command(ToolCommand),
}

/// Scans `reply` for a tool command.
pub fn parse_command(reply: &str) -> ParseOutcome {
    let command_text = match find_command_text(reply.trim()) {
        Some(text) => text,
        None => return ParseOutcome::NoCommand,
    };

    match command_text.split_once(' ') {
        Some((tool_name, argument)) if !tool_name.trim().is_empty() && !argument.trim().is_empty() => {
            ParseOutcome::Command(ToolCommand {
                tool_name: tool_name.trim().to_string(),
                argument: argument.trim().to_string(),
            })
        }
        _ => ParseOutcome::Malformed {
            command_text: command_text.to_string(),
        },
    }
}

/// Returns the trimmed text after the marker on the first line that has one.
fn find_command_text(reply: &str) -> Option<&str> {
    reply.lines().map(str::trim).find_map(|line| {
        // ASCII lowercasing keeps byte offsets, so `idx` is valid in `line`.
        // A marker at index 0 is the line-prefix form.
        let idx = line.to_ascii_lowercase().find(MARKER)?;
        Some(line[idx + MARKER.len()..].trim())
    })
}
