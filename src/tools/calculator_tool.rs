use super::base::{Tool, ToolError};
use async_trait::async_trait;
use tracing::{debug, instrument};

const OPERATORS: [char; 4] = ['+', '-', '*', '/'];

/// Evaluates a single binary arithmetic expression such as `9*2` or `7 / 2`.
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        CalculatorTool
    }

    fn invalid(&self, message: impl Into<String>) -> ToolError {
        ToolError::InvalidArguments {
            tool_name: self.get_name(),
            message: message.into(),
        }
    }

    fn parse_operand(&self, text: &str, position: &str) -> Result<f64, ToolError> {
        if text.is_empty() {
            return Err(self.invalid(format!("missing {} number", position)));
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid(format!("invalid {} number: {}", position, text))),
        }
    }

    fn evaluate(&self, expression: &str) -> Result<f64, ToolError> {
        let compact: String = expression.chars().filter(|c| *c != ' ').collect();

        // A sign at index 0 belongs to the first operand.
        let (op_index, op) = compact
            .char_indices()
            .skip(1)
            .find(|(_, c)| OPERATORS.contains(c))
            .ok_or_else(|| self.invalid("no operator found"))?;

        let lhs = self.parse_operand(&compact[..op_index], "first")?;
        let rhs = self.parse_operand(&compact[op_index + op.len_utf8()..], "second")?;

        match op {
            '+' => Ok(lhs + rhs),
            '-' => Ok(lhs - rhs),
            '*' => Ok(lhs * rhs),
            '/' => {
                if rhs == 0.0 {
                    return Err(ToolError::ExecutionFailed("divide by zero".to_string()));
                }
                Ok(lhs / rhs)
            }
            other => Err(self.invalid(format!("unknown operator: {}", other))),
        }
    }
}

impl Default for CalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders integral results without a fractional part, everything else with two decimals.
fn format_result(value: f64) -> String {
    let formatted = if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    };
    // Negative values that round to zero print as "-0" or "-0.00".
    match formatted.strip_prefix('-') {
        Some(magnitude) if magnitude.chars().all(|c| c == '0' || c == '.') => {
            magnitude.to_string()
        }
        _ => formatted,
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn get_name(&self) -> String {
        "calc".to_string()
    }

    fn get_description(&self) -> String {
        "Perform simple math operations, e.g. '2+2'".to_string()
    }

    #[instrument(skip(self), fields(tool_name = %self.get_name()))]
    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let value = self.evaluate(input)?;
        if !value.is_finite() {
            return Err(ToolError::ExecutionFailed(format!(
                "result of '{}' is not a finite number",
                input
            )));
        }
        let output = format_result(value);
        debug!(%output, "Calculator evaluated expression");
        Ok(output)
    }
}
