use super::base_agent::{
    AgentError, AgentEvent, AgentExecution, AgentOptions, AgentStep, StepOutcome,
};
use super::command_parser::{parse_command, ParseOutcome, ToolCommand};
use crate::llm::LLMClient;
use crate::tools::ToolRegistry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// An agent that reasons with a language model and calls tools on its request.
///
/// The agent itself holds no per-run state: every call to [`Agent::run`] owns
/// its own conversation prompt, so one agent (and its registry) can serve
/// several runs concurrently.
pub struct Agent {
    model: String,
    client: Arc<dyn LLMClient>,
    tools: Arc<ToolRegistry>,
    options: AgentOptions,
    event_sender: Option<mpsc::Sender<AgentEvent>>,
}

impl Agent {
    pub fn new(
        model: impl Into<String>,
        client: Arc<dyn LLMClient>,
        tools: Arc<ToolRegistry>,
        options: AgentOptions,
    ) -> Self {
        Agent {
            model: model.into(),
            client,
            tools,
            options,
            event_sender: None,
        }
    }

    /// Sends progress events to `sender` during runs.
    pub fn with_event_sender(mut self, sender: mpsc::Sender<AgentEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Name of the backend provider behind the model client.
    pub fn provider(&self) -> String {
        self.client.get_provider_name()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Builds the initial prompt: instructions, the goal and the tool listing.
    pub fn build_prompt(&self, goal: &str) -> String {
        format!(
            "You are an autonomous agent.\n\
             Your goal: {}\n\
             \n\
             Available tools:\n\
             {}\n\
             \n\
             If a tool is needed, reply with \"use:<toolname> <input>\"\n\
             Otherwise, reply with your final answer.",
            goal,
            self.describe_tools()
        )
    }

    fn describe_tools(&self) -> String {
        self.tools
            .list_tools()
            .iter()
            .map(|(name, description)| format!("- {}: {}", name, description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Runs the reasoning loop until the model gives a final answer.
    ///
    /// Fails with `ModelUnavailable` as soon as a model call fails, with
    /// `IterationBudgetExhausted` or `DeadlineExceeded` when a configured bound
    /// is hit, and with `Cancelled` when `cancel` fires. Malformed commands,
    /// unknown tools and tool errors never end the run.
    #[instrument(skip(self, cancel), fields(model = %self.model))]
    pub async fn run(
        &self,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentExecution, AgentError> {
        let started = Instant::now();
        let deadline = self.options.deadline.map(|budget| started + budget);

        let mut prompt = self.build_prompt(goal);
        let mut steps = Vec::new();
        let mut iteration: u32 = 0;
        let mut tool_calls: u32 = 0;

        info!(goal = %goal, tools = self.tools.len(), "Starting run");
        self.emit(AgentEvent::RunStarted {
            goal: goal.to_string(),
        })
        .await;

        loop {
            if let Some(max_iterations) = self.options.max_iterations {
                if iteration >= max_iterations {
                    warn!(iterations = iteration, "Iteration budget exhausted");
                    return Err(AgentError::IterationBudgetExhausted {
                        iterations: iteration,
                    });
                }
            }
            iteration += 1;

            debug!(iteration, prompt_len = prompt.len(), "Awaiting model");
            let reply = self
                .bounded(self.client.think(&self.model, &prompt), cancel, deadline, started)
                .await??;
            let reply = reply.trim().to_string();
            info!(iteration, reply = %reply, "Model replied");
            self.emit(AgentEvent::ModelReply {
                iteration,
                reply: reply.clone(),
            })
            .await;

            let outcome = match parse_command(&reply) {
                ParseOutcome::NoCommand => {
                    info!(iteration, "Final answer received");
                    self.emit(AgentEvent::FinalAnswer {
                        iteration,
                        answer: reply.clone(),
                    })
                    .await;
                    steps.push(AgentStep {
                        iteration,
                        reply: reply.clone(),
                        outcome: StepOutcome::FinalAnswer,
                    });
                    return Ok(AgentExecution {
                        goal: goal.to_string(),
                        final_answer: reply,
                        steps,
                        model_calls: iteration,
                        tool_calls,
                        duration: started.elapsed(),
                    });
                }
                ParseOutcome::Malformed { command_text } => {
                    StepOutcome::MalformedCommand { command_text }
                }
                ParseOutcome::Command(command) => {
                    let outcome = self
                        .execute_tool(iteration, command, cancel, deadline, started)
                        .await?;
                    if !matches!(outcome, StepOutcome::UnknownTool { .. }) {
                        tool_calls += 1;
                    }
                    outcome
                }
            };

            if let Some(issue) = outcome.issue() {
                warn!(iteration, error = %issue, "Recoverable step failure");
                self.emit(AgentEvent::StepIssue {
                    iteration,
                    message: issue.to_string(),
                })
                .await;
            }
            if let Some(segment) = self.prompt_segment(&outcome) {
                prompt.push_str(&segment);
            }
            steps.push(AgentStep {
                iteration,
                reply,
                outcome,
            });
        }
    }

    async fn execute_tool(
        &self,
        iteration: u32,
        command: ToolCommand,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<StepOutcome, AgentError> {
        let ToolCommand {
            tool_name,
            argument,
        } = command;

        let tool = match self.tools.get_tool(&tool_name) {
            Some(tool) => tool,
            None => return Ok(StepOutcome::UnknownTool { tool_name }),
        };

        info!(iteration, tool_name = %tool_name, argument = %argument, "Using tool");
        self.emit(AgentEvent::ToolCallAttempt {
            iteration,
            tool_name: tool_name.clone(),
            argument: argument.clone(),
        })
        .await;

        match self
            .bounded(tool.execute(&argument), cancel, deadline, started)
            .await?
        {
            Ok(output) => {
                debug!(iteration, tool_name = %tool_name, output = %output, "Tool returned");
                self.emit(AgentEvent::ToolCallResult {
                    iteration,
                    tool_name: tool_name.clone(),
                    output: output.clone(),
                })
                .await;
                Ok(StepOutcome::ToolSucceeded {
                    tool_name,
                    argument,
                    output,
                })
            }
            Err(error) => Ok(StepOutcome::ToolFailed {
                tool_name,
                argument,
                error,
            }),
        }
    }

    /// Text to append to the prompt after a step, if any.
    fn prompt_segment(&self, outcome: &StepOutcome) -> Option<String> {
        let note = match outcome {
            StepOutcome::ToolSucceeded {
                tool_name, output, ..
            } => return Some(format!("\nTool {} returned: {}\nContinue reasoning...", tool_name, output)),
            StepOutcome::FinalAnswer => return None,
            _ if !self.options.report_failures_to_model => return None,
            StepOutcome::MalformedCommand { command_text } => format!(
                "Your command \"use: {}\" could not be understood; reply with \"use:<toolname> <input>\"",
                command_text
            ),
            StepOutcome::UnknownTool { tool_name } => format!(
                "tool {} not found; available tools are: {}",
                tool_name,
                self.tools.tool_names().join(", ")
            ),
            StepOutcome::ToolFailed {
                tool_name, error, ..
            } => format!("Tool {} failed: {}", tool_name, error),
        };
        Some(format!("\n{}\nContinue reasoning...", note))
    }

    /// Drives `fut` unless the run is cancelled or its deadline passes first.
    async fn bounded<F: Future>(
        &self,
        fut: F,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<F::Output, AgentError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Run cancelled");
                Err(AgentError::Cancelled)
            }
            _ = wait_for(deadline) => {
                let elapsed = started.elapsed();
                warn!(elapsed_ms = elapsed.as_millis() as u64, "Run deadline exceeded");
                Err(AgentError::DeadlineExceeded { elapsed })
            }
            output = fut => Ok(output),
        }
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.event_sender {
            if sender.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::base_client::{LLMMessage, LLMResponse, LLMResponseChoice, MessageRole};
    use crate::llm::LLMError;
    use crate::tools::{CalculatorTool, Tool, ToolError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted replies; repeats `fallback` once the script runs out.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LLMError>>>,
        fallback: Option<String>,
        delay: Option<Duration>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<String, LLMError>>) -> Self {
            ScriptedClient {
                replies: Mutex::new(replies.into()),
                fallback: None,
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn always(reply: &str) -> Self {
            ScriptedClient {
                fallback: Some(reply.to_string()),
                ..Self::new(Vec::new())
            }
        }

        fn slow(delay: Duration) -> Self {
            ScriptedClient {
                delay: Some(delay),
                ..Self::always("too late")
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn chat(
            &self,
            _model: &str,
            messages: Vec<LLMMessage>,
        ) -> Result<LLMResponse, LLMError> {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].role, MessageRole::User);
            self.prompts
                .lock()
                .unwrap()
                .push(messages[0].content.clone().unwrap_or_default());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            let content = match next {
                Some(reply) => reply?,
                None => self.fallback.clone().ok_or(LLMError::EmptyResponse)?,
            };
            Ok(LLMResponse {
                id: "scripted".to_string(),
                model: "scripted".to_string(),
                choices: vec![LLMResponseChoice {
                    index: 0,
                    message: LLMMessage {
                        role: MessageRole::Assistant,
                        content: Some(content),
                    },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }

        fn get_provider_name(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Calculator that counts its invocations.
    struct CountingCalc {
        inner: CalculatorTool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingCalc {
        fn get_name(&self) -> String {
            self.inner.get_name()
        }

        fn get_description(&self) -> String {
            self.inner.get_description()
        }

        async fn execute(&self, input: &str) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.execute(input).await
        }
    }

    /// Tool that never finishes within a test's lifetime.
    struct SlowTool {
        started: Arc<AtomicUsize>,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn get_name(&self) -> String {
            "slow".to_string()
        }

        fn get_description(&self) -> String {
            "Sleeps for thirty seconds".to_string()
        }

        async fn execute(&self, _input: &str) -> Result<String, ToolError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok("woke up".to_string())
        }
    }

    /// Agent whose only tool is `slow`; returns its start and finish counters.
    fn agent_with_slow_tool(
        client: Arc<ScriptedClient>,
        options: AgentOptions,
    ) -> (Agent, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool {
            started: started.clone(),
            finished: finished.clone(),
        });
        let agent = Agent::new("test-model", client, Arc::new(registry), options);
        (agent, started, finished)
    }

    fn agent_with(
        client: Arc<ScriptedClient>,
        options: AgentOptions,
    ) -> (Agent, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingCalc {
            inner: CalculatorTool::new(),
            calls: calls.clone(),
        });
        let agent = Agent::new("test-model", client, Arc::new(registry), options);
        (agent, calls)
    }

    #[test]
    fn test_build_prompt_lists_goal_and_tools() {
        let client = Arc::new(ScriptedClient::replying(&[]));
        let (agent, _) = agent_with(client, AgentOptions::default());
        let prompt = agent.build_prompt("Find the result of (4 + 5) * 2");
        assert!(prompt.starts_with("You are an autonomous agent.\n"));
        assert!(prompt.contains("Your goal: Find the result of (4 + 5) * 2\n"));
        assert!(prompt.contains("Available tools:\n- calc: Perform simple math operations, e.g. '2+2'\n"));
        assert!(prompt.ends_with(
            "If a tool is needed, reply with \"use:<toolname> <input>\"\nOtherwise, reply with your final answer."
        ));
    }

    #[tokio::test]
    async fn test_tool_result_is_fed_back_until_final_answer() {
        let client = Arc::new(ScriptedClient::replying(&["use: calc 9*2", "18"]));
        let (agent, tool_calls) = agent_with(client.clone(), AgentOptions::default());

        let execution = agent
            .run("What is 9 times 2?", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(execution.final_answer, "18");
        assert_eq!(execution.model_calls, 2);
        assert_eq!(execution.tool_calls, 1);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            execution.steps[0].outcome,
            StepOutcome::ToolSucceeded {
                tool_name: "calc".to_string(),
                argument: "9*2".to_string(),
                output: "18".to_string(),
            }
        );
        assert_eq!(execution.steps[1].outcome, StepOutcome::FinalAnswer);

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(
            prompts[1],
            format!("{}\nTool calc returned: 18\nContinue reasoning...", prompts[0])
        );
    }

    #[tokio::test]
    async fn test_final_answer_is_trimmed() {
        let client = Arc::new(ScriptedClient::replying(&["  \n The answer is 18. \n"]));
        let (agent, _) = agent_with(client, AgentOptions::default());
        let execution = agent.run("goal", &CancellationToken::new()).await.unwrap();
        assert_eq!(execution.final_answer, "The answer is 18.");
        assert_eq!(execution.tool_calls, 0);
    }

    #[tokio::test]
    async fn test_malformed_commands_exhaust_budget() {
        let client = Arc::new(ScriptedClient::always("use: calc"));
        let options = AgentOptions {
            max_iterations: Some(4),
            ..AgentOptions::default()
        };
        let (agent, tool_calls) = agent_with(client.clone(), options);

        let err = agent.run("goal", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, AgentError::IterationBudgetExhausted { iterations: 4 }));
        assert_eq!(client.calls(), 4);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        // The model is re-prompted with identical context.
        let prompts = client.prompts();
        assert!(prompts.iter().all(|p| p == &prompts[0]));
    }

    #[tokio::test]
    async fn test_model_error_aborts_run() {
        let client = Arc::new(ScriptedClient::new(vec![Err(LLMError::ApiError {
            status: 503,
            body: "down".to_string(),
        })]));
        let (agent, tool_calls) = agent_with(client.clone(), AgentOptions::default());

        let err = agent.run("goal", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            AgentError::ModelUnavailable(LLMError::ApiError { status: 503, .. })
        ));
        assert_eq!(client.calls(), 1);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_error_after_tool_call_aborts_run() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("use: calc 1+1".to_string()),
            Err(LLMError::EmptyResponse),
        ]));
        let (agent, tool_calls) = agent_with(client, AgentOptions::default());

        let err = agent.run("goal", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(LLMError::EmptyResponse)));
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_leaves_prompt_unchanged() {
        let client = Arc::new(ScriptedClient::replying(&["use: search rust", "done"]));
        let (agent, tool_calls) = agent_with(client.clone(), AgentOptions::default());

        let execution = agent.run("goal", &CancellationToken::new()).await.unwrap();

        assert_eq!(execution.final_answer, "done");
        assert_eq!(execution.tool_calls, 0);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            execution.steps[0].outcome,
            StepOutcome::UnknownTool {
                tool_name: "search".to_string()
            }
        );
        let prompts = client.prompts();
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_tool_failure_leaves_prompt_unchanged() {
        let client = Arc::new(ScriptedClient::replying(&["use: calc 5/0", "cannot divide"]));
        let (agent, tool_calls) = agent_with(client.clone(), AgentOptions::default());

        let execution = agent.run("goal", &CancellationToken::new()).await.unwrap();

        assert_eq!(execution.final_answer, "cannot divide");
        assert_eq!(execution.tool_calls, 1);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
        match &execution.steps[0].outcome {
            StepOutcome::ToolFailed { tool_name, error, .. } => {
                assert_eq!(tool_name, "calc");
                assert_eq!(error, &ToolError::ExecutionFailed("divide by zero".to_string()));
            }
            other => panic!("Expected ToolFailed, got {:?}", other),
        }
        assert!(matches!(
            execution.steps[0].outcome.issue(),
            Some(AgentError::ToolExecutionFailed { .. })
        ));
        let prompts = client.prompts();
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_failures_reported_to_model_when_enabled() {
        let client = Arc::new(ScriptedClient::replying(&[
            "use: search rust",
            "use: calc",
            "use: calc 5/0",
            "ok",
        ]));
        let options = AgentOptions {
            report_failures_to_model: true,
            ..AgentOptions::default()
        };
        let (agent, _) = agent_with(client.clone(), options);

        agent.run("goal", &CancellationToken::new()).await.unwrap();

        let prompts = client.prompts();
        assert_eq!(prompts.len(), 4);
        assert!(prompts[1].ends_with(
            "\ntool search not found; available tools are: calc\nContinue reasoning..."
        ));
        assert!(prompts[2].contains("Your command \"use: calc\" could not be understood"));
        assert!(prompts[3].ends_with(
            "\nTool calc failed: Tool execution failed: divide by zero\nContinue reasoning..."
        ));
    }

    #[tokio::test]
    async fn test_unbounded_loop_when_no_cap() {
        let client = Arc::new(ScriptedClient::replying(&[
            "use: calc", "use: calc", "use: calc", "use: calc", "use: calc", "finally",
        ]));
        let options = AgentOptions {
            max_iterations: None,
            ..AgentOptions::default()
        };
        let (agent, _) = agent_with(client.clone(), options);
        let execution = agent.run("goal", &CancellationToken::new()).await.unwrap();
        assert_eq!(execution.final_answer, "finally");
        assert_eq!(execution.model_calls, 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_model_call() {
        let client = Arc::new(ScriptedClient::always("18"));
        let (agent, _) = agent_with(client.clone(), AgentOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = agent.run("goal", &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_model_call() {
        let client = Arc::new(ScriptedClient::slow(Duration::from_secs(30)));
        let (agent, _) = agent_with(client, AgentOptions::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent.run("goal", &cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let client = Arc::new(ScriptedClient::slow(Duration::from_secs(30)));
        let options = AgentOptions {
            deadline: Some(Duration::from_millis(50)),
            ..AgentOptions::default()
        };
        let (agent, _) = agent_with(client, options);

        let err = agent.run("goal", &CancellationToken::new()).await.unwrap_err();
        match err {
            AgentError::DeadlineExceeded { elapsed } => {
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_during_tool_call_leaves_prompt_unchanged() {
        let client = Arc::new(ScriptedClient::always("use: slow x"));
        let (agent, started, finished) =
            agent_with_slow_tool(client.clone(), AgentOptions::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = agent.run("goal", &cancel).await.unwrap_err();

        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(client.calls(), 1);
        let prompts = client.prompts();
        assert!(prompts.iter().all(|p| p == &prompts[0]));
        assert!(!prompts.iter().any(|p| p.contains("Tool slow returned")));
    }

    #[tokio::test]
    async fn test_deadline_during_tool_call_leaves_prompt_unchanged() {
        let client = Arc::new(ScriptedClient::always("use: slow x"));
        let options = AgentOptions {
            deadline: Some(Duration::from_millis(50)),
            ..AgentOptions::default()
        };
        let (agent, started, finished) = agent_with_slow_tool(client.clone(), options);

        let err = agent.run("goal", &CancellationToken::new()).await.unwrap_err();

        match err {
            AgentError::DeadlineExceeded { elapsed } => {
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(client.calls(), 1);
        let prompts = client.prompts();
        assert!(prompts.iter().all(|p| p == &prompts[0]));
        assert!(!prompts.iter().any(|p| p.contains("Tool slow returned")));
    }

    #[tokio::test]
    async fn test_events_follow_run_progress() {
        let client = Arc::new(ScriptedClient::replying(&["use: nope x", "use: calc 9*2", "18"]));
        let (tx, mut rx) = mpsc::channel(32);
        let (agent, _) = agent_with(client, AgentOptions::default());
        let agent = agent.with_event_sender(tx);

        agent.run("goal", &CancellationToken::new()).await.unwrap();
        drop(agent);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                AgentEvent::RunStarted {
                    goal: "goal".to_string()
                },
                AgentEvent::ModelReply {
                    iteration: 1,
                    reply: "use: nope x".to_string()
                },
                AgentEvent::StepIssue {
                    iteration: 1,
                    message: "Unknown tool: nope".to_string()
                },
                AgentEvent::ModelReply {
                    iteration: 2,
                    reply: "use: calc 9*2".to_string()
                },
                AgentEvent::ToolCallAttempt {
                    iteration: 2,
                    tool_name: "calc".to_string(),
                    argument: "9*2".to_string()
                },
                AgentEvent::ToolCallResult {
                    iteration: 2,
                    tool_name: "calc".to_string(),
                    output: "18".to_string()
                },
                AgentEvent::ModelReply {
                    iteration: 3,
                    reply: "18".to_string()
                },
                AgentEvent::FinalAnswer {
                    iteration: 3,
                    answer: "18".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_share_registry() {
        let registry = Arc::new(ToolRegistry::default());
        let first = Agent::new(
            "m",
            Arc::new(ScriptedClient::replying(&["use: calc 2+2", "4"])),
            registry.clone(),
            AgentOptions::default(),
        );
        let second = Agent::new(
            "m",
            Arc::new(ScriptedClient::replying(&["use: calc 3*3", "9"])),
            registry,
            AgentOptions::default(),
        );
        let cancel = CancellationToken::new();
        let (a, b) = tokio::join!(first.run("a", &cancel), second.run("b", &cancel));
        assert_eq!(a.unwrap().final_answer, "4");
        assert_eq!(b.unwrap().final_answer, "9");
    }
}
