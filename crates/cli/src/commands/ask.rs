//! `ironloop ask`: run one query and stream its events.

use ironloop_agent::{AgentEvent, ControllerConfig, ReactController, RunRequest};
use ironloop_config::AppConfig;
use ironloop_core::{ConversationId, EventSink, TracingSink};
use ironloop_memory::{InMemoryWorkingMemory, transcript_from_config};
use ironloop_protocol::{Event, coalesce, render};
use ironloop_providers::{OpenAiCompatClient, ResilientClient};
use ironloop_security::{AuditLogger, TracingAuditSink};
use ironloop_tools::{ToolContext, default_registry};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    /// The question or task
    pub query: String,

    /// User the transcript is recorded under
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Continue a named conversation (a fresh id otherwise)
    #[arg(long)]
    pub conversation: Option<String>,

    /// Round limit for this query
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// sandbox, project or system (defaults to config)
    #[arg(long)]
    pub access_level: Option<String>,

    /// Print each round in wire form
    #[arg(long, conflicts_with = "json")]
    pub raw: bool,

    /// Print every event as a JSON line
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: AskArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let keys = super::api_keys(&config);
    if keys.is_empty() {
        let prefix = config.provider.env_prefix.trim_end_matches('_').to_uppercase();
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    {prefix}_API_KEY_1, {prefix}_API_KEY_2, ...   (rotation pool)");
        eprintln!("    {prefix}_API_KEY                          (single key)");
        eprintln!();
        eprintln!("  Or add api_keys to the [provider] section of:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let level = super::access_level(&config, args.access_level.as_deref())?;
    let root = super::access_root(&config, level)?;
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| format!("Failed to create {}: {e}", root.display()))?;

    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let audit = Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingAuditSink)]));
    let tools = default_registry(
        ToolContext::new(level, &root)
            .with_audit(audit.clone())
            .with_forbidden(config.security.extra_forbidden_paths.clone())
            .with_allowed_commands(config.security.allowed_commands.clone())
            .with_tool_timeout(Duration::from_secs(config.agent.tool_timeout_secs)),
    );

    let raw_client = Arc::new(OpenAiCompatClient::from_settings(&config.provider)?);
    let client = ResilientClient::from_config(&config, keys, raw_client, sink.clone());

    let controller = ReactController::new(
        client,
        Arc::new(tools),
        transcript_from_config(&config.memory),
        Arc::new(InMemoryWorkingMemory::new()),
        sink.clone(),
        ControllerConfig::from_app_config(&config),
    )
    .with_access(level.to_string(), root.display().to_string())
    .with_audit(audit);

    let mut request = RunRequest::new(args.query).with_user(args.user);
    if let Some(conversation) = args.conversation.as_deref() {
        request = request.with_conversation(ConversationId::from(conversation));
    }
    if let Some(max) = args.max_iterations {
        request = request.with_max_iterations(max);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let mode = if args.json {
        Mode::Json
    } else if args.raw {
        Mode::Raw
    } else {
        Mode::Pretty
    };
    let mut renderer = Renderer::new(mode);
    let mut handle = controller.run_with_cancel(request, cancel);
    while let Some(event) = handle.next().await {
        for out in renderer.render(&event) {
            out.write();
        }
    }

    let result = handle.finish().await;
    sink.flush();
    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, "ask finished without an answer");
            Err(e.into())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Pretty,
    Raw,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Out {
    Stdout(String),
    Stderr(String),
}

impl Out {
    fn write(&self) {
        use std::io::Write;
        match self {
            Self::Stdout(s) => {
                print!("{s}");
                let _ = std::io::stdout().flush();
            }
            Self::Stderr(s) => {
                eprint!("{s}");
                let _ = std::io::stderr().flush();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Think,
    Respond,
    Other,
}

/// Turns agent events into terminal output.
struct Renderer {
    mode: Mode,
    section: Section,
    /// Protocol events of the current round, for raw mode
    round: Vec<Event>,
}

impl Renderer {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            section: Section::Other,
            round: Vec::new(),
        }
    }

    fn render(&mut self, event: &AgentEvent) -> Vec<Out> {
        match self.mode {
            Mode::Json => match serde_json::to_string(event) {
                Ok(line) => vec![Out::Stdout(format!("{line}\n"))],
                Err(e) => vec![Out::Stderr(format!("unserializable event: {e}\n"))],
            },
            Mode::Raw => self.raw(event),
            Mode::Pretty => self.pretty(event),
        }
    }

    fn raw(&mut self, event: &AgentEvent) -> Vec<Out> {
        match event {
            AgentEvent::Think { content } => self.round.push(Event::think(content.clone())),
            AgentEvent::Respond { content } => self.round.push(Event::respond(content.clone())),
            AgentEvent::Calls { calls } => self.round.push(Event::Calls {
                calls: calls.clone(),
            }),
            AgentEvent::Metric { .. } => {
                let mut events = coalesce(std::mem::take(&mut self.round));
                if events.iter().any(|e| matches!(e, Event::Calls { .. })) {
                    events.push(Event::Execute);
                } else if events.iter().any(|e| matches!(e, Event::Respond { .. })) {
                    events.push(Event::End);
                }
                return vec![Out::Stdout(format!("{}\n", render(&events)))];
            }
            AgentEvent::Failed { message, .. } => {
                return vec![Out::Stderr(format!("failed: {message}\n"))];
            }
            AgentEvent::Cancelled { message } => {
                return vec![Out::Stderr(format!("{message}\n"))];
            }
            AgentEvent::ToolResult { .. } | AgentEvent::Error { .. } | AgentEvent::Done { .. } => {}
        }
        Vec::new()
    }

    fn pretty(&mut self, event: &AgentEvent) -> Vec<Out> {
        let mut out = Vec::new();
        match event {
            AgentEvent::Think { content } => {
                if self.section != Section::Think {
                    self.break_line(&mut out);
                    out.push(Out::Stderr("  thinking: ".into()));
                    self.section = Section::Think;
                }
                out.push(Out::Stderr(content.clone()));
            }
            AgentEvent::Respond { content } => {
                if self.section != Section::Respond {
                    self.break_line(&mut out);
                    self.section = Section::Respond;
                }
                out.push(Out::Stdout(content.clone()));
            }
            AgentEvent::Calls { calls } => {
                self.break_line(&mut out);
                for call in calls {
                    let args = serde_json::Value::Object(call.args.clone());
                    out.push(Out::Stderr(format!("  -> {} {args}\n", call.name)));
                }
            }
            AgentEvent::ToolResult { name, result } => {
                self.break_line(&mut out);
                out.push(Out::Stderr(format!("  <- {name}: {}\n", result.render())));
            }
            AgentEvent::Error { content } => {
                self.break_line(&mut out);
                out.push(Out::Stderr(format!("  [protocol] {content}\n")));
            }
            AgentEvent::Metric { step, .. } => {
                self.break_line(&mut out);
                out.push(Out::Stderr(format!(
                    "  [round {}] {} tool call(s), ~{} tokens, {} ms\n",
                    step.iteration,
                    step.tool_calls,
                    step.prompt_tokens + step.completion_tokens,
                    step.duration_ms
                )));
            }
            AgentEvent::Done { .. } => self.break_line(&mut out),
            AgentEvent::Failed {
                kind,
                message,
                partial_answer,
            } => {
                self.break_line(&mut out);
                if let Some(partial) = partial_answer {
                    out.push(Out::Stdout(format!("{partial}\n")));
                }
                out.push(Out::Stderr(format!("  [failed: {kind:?}] {message}\n")));
            }
            AgentEvent::Cancelled { message } => {
                self.break_line(&mut out);
                out.push(Out::Stderr(format!("  [cancelled] {message}\n")));
            }
        }
        out
    }

    /// End an inline think or respond section.
    fn break_line(&mut self, out: &mut Vec<Out>) {
        match self.section {
            Section::Think => out.push(Out::Stderr("\n".into())),
            Section::Respond => out.push(Out::Stdout("\n".into())),
            Section::Other => {}
        }
        self.section = Section::Other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironloop_core::{MetricStep, MetricTotal, ToolCall, ToolResult};
    use serde_json::json;

    fn metric(iteration: u32) -> AgentEvent {
        AgentEvent::Metric {
            step: MetricStep {
                iteration,
                prompt_tokens: 10,
                completion_tokens: 5,
                tool_calls: 1,
                duration_ms: 3,
            },
            total: MetricTotal::default(),
        }
    }

    fn stdout(outs: &[Out]) -> String {
        outs.iter()
            .filter_map(|o| match o {
                Out::Stdout(s) => Some(s.as_str()),
                Out::Stderr(_) => None,
            })
            .collect()
    }

    #[test]
    fn pretty_streams_answer_to_stdout() {
        let mut r = Renderer::new(Mode::Pretty);
        let mut outs = Vec::new();
        for event in [
            AgentEvent::Think {
                content: "hmm".into(),
            },
            AgentEvent::Respond {
                content: "The answer ".into(),
            },
            AgentEvent::Respond {
                content: "is 143.".into(),
            },
            AgentEvent::Done {
                answer: "The answer is 143.".into(),
                iterations: 1,
                tool_calls_made: 0,
            },
        ] {
            outs.extend(r.render(&event));
        }
        assert_eq!(stdout(&outs), "The answer is 143.\n");
        assert!(outs.contains(&Out::Stderr("  thinking: ".into())));
    }

    #[test]
    fn raw_renders_each_round_in_wire_form() {
        let mut r = Renderer::new(Mode::Raw);
        let mut outs = Vec::new();
        for event in [
            AgentEvent::Think {
                content: "calc".into(),
            },
            AgentEvent::Calls {
                calls: vec![ToolCall::new("calculator", json!({"expression": "1+1"}))],
            },
            AgentEvent::ToolResult {
                name: "calculator".into(),
                result: ToolResult::ok("calculated", "2"),
            },
            metric(1),
            AgentEvent::Respond {
                content: "2".into(),
            },
            metric(2),
        ] {
            outs.extend(r.render(&event));
        }
        let text = stdout(&outs);
        assert!(text.contains("§think calc"));
        assert!(text.contains("§calls"));
        assert!(text.contains("§execute"));
        assert!(text.contains("§respond 2"));
        assert!(text.contains("§end"));
    }

    #[test]
    fn json_mode_prints_one_line_per_event() {
        let mut r = Renderer::new(Mode::Json);
        let outs = r.render(&AgentEvent::Cancelled {
            message: "Task interrupted by user".into(),
        });
        assert_eq!(outs.len(), 1);
        let line = stdout(&outs);
        assert!(line.ends_with('\n'));
        assert!(line.contains(r#""type":"cancelled""#));
    }
}
