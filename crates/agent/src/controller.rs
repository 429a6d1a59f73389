//! The ReAct controller.
//!
//! One query runs as one spawned task that drives rounds until the model
//! answers, the iteration limit is reached, a fatal error occurs or the caller
//! cancels. Each round:
//!
//! 1. builds the prompt (security section on round 1 only)
//! 2. opens a resilient fragment stream and parses it
//! 3. forwards events, dispatching `calls` sequentially as they arrive
//! 4. on `execute`, folds tool results into the history and starts the next round
//!
//! The transcript is persisted before the terminal event is sent, on every
//! path including cancellation.

use ironloop_config::AppConfig;
use ironloop_core::{
    ConversationId, EventSink, LlmRequest, MetricStep, MetricTotal, ObservabilityRecord,
    ToolRegistry, TranscriptRecord, TranscriptStatus, TranscriptStore, WorkingMemoryStore,
};
use ironloop_protocol::{Event, coalesce, render};
use ironloop_providers::ResilientClient;
use ironloop_security::AuditLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::error::AgentError;
use crate::prompt::{PromptBuilder, estimate_message_tokens, estimate_tokens};
use crate::round::RoundContext;
use crate::stream_event::AgentEvent;

/// Persisted in place of an answer when the caller cancels.
pub const INTERRUPTED_MESSAGE: &str = "Task interrupted by user";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: None,
            max_iterations: 8,
            tool_timeout: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

impl ControllerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            max_tokens: Some(config.provider.max_tokens),
            max_iterations: config.agent.max_iterations,
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
            channel_capacity: config.agent.channel_capacity,
        }
    }
}

/// One query.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub user_id: String,
    pub conversation_id: ConversationId,
    /// Overrides the controller's configured limit
    pub max_iterations: Option<u32>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: "local".into(),
            conversation_id: ConversationId::new(),
            max_iterations: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_conversation(mut self, conversation_id: ConversationId) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }
}

/// The result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub answer: String,
    pub task_id: String,
    pub iterations: u32,
    pub tool_calls_made: u32,
    pub total: MetricTotal,
}

/// A running query: its event stream, its cancel switch and its result.
pub struct RunHandle {
    pub events: mpsc::Receiver<AgentEvent>,
    pub cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome, AgentError>>,
}

impl RunHandle {
    pub async fn next(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain remaining events and wait for the result.
    pub async fn finish(mut self) -> Result<RunOutcome, AgentError> {
        while self.events.recv().await.is_some() {}
        self.task
            .await
            .map_err(|e| AgentError::Internal(format!("run task failed: {e}")))?
    }
}

/// How the rounds ended, before persistence.
enum Conclusion {
    Answered(String),
    Failed(AgentError),
}

#[derive(Clone)]
pub struct ReactController {
    client: ResilientClient,
    dispatcher: ToolDispatcher,
    prompt: PromptBuilder,
    transcript: Arc<dyn TranscriptStore>,
    sink: Arc<dyn EventSink>,
    config: ControllerConfig,
}

impl ReactController {
    pub fn new(
        client: ResilientClient,
        tools: Arc<ToolRegistry>,
        transcript: Arc<dyn TranscriptStore>,
        working_memory: Arc<dyn WorkingMemoryStore>,
        sink: Arc<dyn EventSink>,
        config: ControllerConfig,
    ) -> Self {
        let prompt = PromptBuilder::new(tools.descriptors());
        let dispatcher = ToolDispatcher::new(tools, working_memory, sink.clone(), config.tool_timeout);
        Self {
            client,
            dispatcher,
            prompt,
            transcript,
            sink,
            config,
        }
    }

    /// Describe the access level and root in the round-1 security section.
    pub fn with_access(mut self, access_level: impl Into<String>, root: impl Into<String>) -> Self {
        self.prompt = self.prompt.with_access(access_level, root);
        self
    }

    /// Audit tool timeouts alongside path and shell denials.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.dispatcher = self.dispatcher.with_audit(audit);
        self
    }

    /// Start a run; cancel it through the returned handle.
    pub fn run(&self, request: RunRequest) -> RunHandle {
        self.run_with_cancel(request, CancellationToken::new())
    }

    /// Start a run tied to an existing cancellation token.
    pub fn run_with_cancel(&self, request: RunRequest, cancel: CancellationToken) -> RunHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.drive(request, tx, token).await });
        RunHandle {
            events: rx,
            cancel,
            task,
        }
    }

    /// One-shot: run to a terminal state, discarding intermediate events.
    pub async fn run_to_completion(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        self.run_with_cancel(request, cancel).finish().await
    }

    async fn drive(
        self,
        request: RunRequest,
        tx: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let task_id = format!("{}-{}", request.conversation_id, uuid::Uuid::new_v4().simple());
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.max_iterations)
            .max(1);
        let mut ctx = RoundContext::new(request.query.clone());
        let mut total = MetricTotal::default();

        info!(
            conversation_id = %request.conversation_id,
            user_id = %request.user_id,
            task_id = %task_id,
            max_iterations,
            "Run started"
        );

        let conclusion = tokio::select! {
            biased;
            _ = cancel.cancelled() => Conclusion::Failed(AgentError::Cancelled),
            result = self.rounds(&request, &task_id, max_iterations, &mut ctx, &mut total, &tx) => {
                match result {
                    Ok(answer) => Conclusion::Answered(answer),
                    Err(e) => Conclusion::Failed(e),
                }
            }
        };

        let outcome = RunOutcome {
            answer: String::new(),
            task_id,
            iterations: ctx.iteration(),
            tool_calls_made: ctx.tool_calls_made(),
            total,
        };

        match conclusion {
            Conclusion::Answered(answer) => {
                if let Err(err) = self
                    .persist(&request, &answer, TranscriptStatus::Completed)
                    .await
                {
                    warn!(error = %err, "Transcript write failed, withholding completion");
                    let _ = tx
                        .send(AgentEvent::Failed {
                            kind: err.kind(),
                            message: err.to_string(),
                            partial_answer: Some(answer),
                        })
                        .await;
                    return Err(err);
                }
                info!(
                    conversation_id = %request.conversation_id,
                    iterations = outcome.iterations,
                    tool_calls = outcome.tool_calls_made,
                    "Run completed"
                );
                let _ = tx
                    .send(AgentEvent::Done {
                        answer: answer.clone(),
                        iterations: outcome.iterations,
                        tool_calls_made: outcome.tool_calls_made,
                    })
                    .await;
                Ok(RunOutcome { answer, ..outcome })
            }
            Conclusion::Failed(AgentError::Cancelled) => {
                warn!(conversation_id = %request.conversation_id, "Run cancelled");
                if let Err(e) = self
                    .persist(&request, INTERRUPTED_MESSAGE, TranscriptStatus::Cancelled)
                    .await
                {
                    warn!(error = %e, "Failed to persist interrupted transcript");
                }
                let _ = tx
                    .send(AgentEvent::Cancelled {
                        message: INTERRUPTED_MESSAGE.into(),
                    })
                    .await;
                Err(AgentError::Cancelled)
            }
            Conclusion::Failed(err) => {
                warn!(
                    conversation_id = %request.conversation_id,
                    kind = ?err.kind(),
                    error = %err,
                    "Run failed"
                );
                let partial = ctx.last_respond().map(str::to_string);
                let record = match &partial {
                    Some(p) => format!("{p}\n\n[incomplete: {err}]"),
                    None => format!("[incomplete: {err}]"),
                };
                if let Err(e) = self.persist(&request, &record, TranscriptStatus::Failed).await {
                    warn!(error = %e, "Failed to persist failed transcript");
                }
                let _ = tx
                    .send(AgentEvent::Failed {
                        kind: err.kind(),
                        message: err.to_string(),
                        partial_answer: partial,
                    })
                    .await;
                Err(err)
            }
        }
    }

    /// Drive rounds until an answer. Errors end the run.
    async fn rounds(
        &self,
        request: &RunRequest,
        task_id: &str,
        max_iterations: u32,
        ctx: &mut RoundContext,
        total: &mut MetricTotal,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<String, AgentError> {
        let conversation_id = request.conversation_id.to_string();

        while ctx.iteration() < max_iterations {
            let iteration = ctx.begin_round();
            let round_started = Instant::now();
            debug!(conversation_id = %conversation_id, iteration, "Round started");
            self.sink.emit(&ObservabilityRecord::RoundStarted {
                conversation_id: conversation_id.clone(),
                iteration,
            });

            let messages = self.prompt.build(ctx);
            ctx.mark_security_preamble_sent();
            let prompt_tokens = estimate_message_tokens(&messages);
            let llm_request = LlmRequest {
                model: self.config.model.clone(),
                messages,
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };

            let fragments = self.client.stream(llm_request).await?;
            let mut events = ironloop_protocol::parse(fragments, self.config.channel_capacity);

            let mut seen = Vec::new();
            let mut respond = String::new();
            let mut saw_execute = false;
            let mut calls_this_round = 0u32;

            while let Some(item) = events.recv().await {
                let event = item?;
                match &event {
                    Event::Think { content } => {
                        emit(tx, AgentEvent::Think { content: content.clone() }).await?;
                    }
                    Event::Respond { content } => {
                        respond.push_str(content);
                        emit(tx, AgentEvent::Respond { content: content.clone() }).await?;
                    }
                    Event::Error { content } => {
                        warn!(iteration, error = %content, "Protocol error in model output");
                        ctx.note_correction(format!(
                            "{content}. Resend the tool calls as a valid JSON array."
                        ));
                        emit(tx, AgentEvent::Error { content: content.clone() }).await?;
                    }
                    Event::Calls { calls } => {
                        emit(tx, AgentEvent::Calls { calls: calls.clone() }).await?;
                        ctx.queue_calls(calls);
                        for call in calls {
                            let result = self.dispatcher.dispatch(task_id, call).await?;
                            calls_this_round += 1;
                            emit(
                                tx,
                                AgentEvent::ToolResult {
                                    name: call.name.clone(),
                                    result: result.clone(),
                                },
                            )
                            .await?;
                            ctx.complete_call(call.clone(), result);
                        }
                    }
                    Event::Execute => saw_execute = true,
                    Event::End | Event::Metric { .. } => {}
                }
                seen.push(event);
            }

            let raw = render(&coalesce(seen));
            let step = MetricStep {
                iteration,
                prompt_tokens,
                completion_tokens: estimate_tokens(&raw),
                tool_calls: calls_this_round,
                duration_ms: u64::try_from(round_started.elapsed().as_millis()).unwrap_or(u64::MAX),
            };
            total.add(&step);
            self.sink.emit(&ObservabilityRecord::Metric { step, total: *total });
            emit(tx, AgentEvent::Metric { step, total: *total }).await?;

            ctx.record_assistant(raw);
            ctx.set_last_respond(&respond);

            let outcome = if saw_execute {
                if !ctx.fold_results() {
                    ctx.note_correction("§execute was sent without any tool calls.");
                }
                "execute"
            } else if !respond.trim().is_empty() {
                self.round_finished(&conversation_id, iteration, "respond");
                return Ok(respond.trim().to_string());
            } else {
                ctx.fold_results();
                ctx.note_correction(
                    "your reply ended without §execute or §respond. \
                     Either call tools and end with §execute, or answer with §respond and §end.",
                );
                "incomplete"
            };
            self.round_finished(&conversation_id, iteration, outcome);
        }

        Err(AgentError::IterationLimit { max_iterations })
    }

    fn round_finished(&self, conversation_id: &str, iteration: u32, outcome: &str) {
        debug!(conversation_id, iteration, outcome, "Round finished");
        self.sink.emit(&ObservabilityRecord::RoundFinished {
            conversation_id: conversation_id.to_string(),
            iteration,
            outcome: outcome.to_string(),
        });
    }

    async fn persist(
        &self,
        request: &RunRequest,
        response: &str,
        status: TranscriptStatus,
    ) -> Result<(), AgentError> {
        self.transcript
            .persist(TranscriptRecord::new(
                request.user_id.clone(),
                request.conversation_id.to_string(),
                request.query.clone(),
                response,
                status,
            ))
            .await
            .map_err(|e| AgentError::Persistence(e.to_string()))
    }
}

/// Send an event; a dropped receiver means the caller walked away.
async fn emit(tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<(), AgentError> {
    tx.send(event).await.map_err(|_| AgentError::Cancelled)
}
