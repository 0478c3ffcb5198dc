//! # Tools Module
//!
//! Defines the framework for tools that the agent can use: the `Tool` trait
//! and a `ToolRegistry` mapping tool names to instances. Concrete tool
//! implementations like `CalculatorTool` are also part of this module.

pub mod base;
pub mod calculator_tool;

pub use base::{Tool, ToolError};
pub use calculator_tool::CalculatorTool;

use std::collections::HashMap;
use std::sync::Arc;

/// A registry for discovering and managing available tools.
///
/// Tools are registered by name; registering a second tool under an existing
/// name replaces the first one. The registry is built before a run starts and
/// is only read while runs are active, so it can be shared behind an `Arc`
/// across concurrent runs. Mutating it while any run is in progress is not
/// supported.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    // Registration order, used only for display.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Creates a new, empty `ToolRegistry`.
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Builds a registry from a list of tools. Later tools win on duplicate names.
    pub fn from_tools(tools_list: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools_list {
            registry.register_arc(tool);
        }
        registry
    }

    /// Registers a tool with the registry.
    ///
    /// # Arguments
    /// * `tool`: An instance of a type implementing the `Tool` trait.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Registers an already shared tool instance.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.get_name();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Retrieves a tool by its exact (case-sensitive) name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns `(name, description)` pairs in registration order.
    ///
    /// The order is meant for display; nothing should depend on it for correctness.
    pub fn list_tools(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| (tool.get_name(), tool.get_description()))
            .collect()
    }

    /// Names of all registered tools, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    /// Creates a `ToolRegistry` populated with the built-in tools.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(CalculatorTool::new());
        registry
    }
}
