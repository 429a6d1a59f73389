//! End-to-end controller runs against scripted model replies.

use ironloop_agent::test_helpers::{ScriptedClient, Step, resilient};
use ironloop_agent::{
    AgentError, AgentEvent, ControllerConfig, FailureKind, INTERRUPTED_MESSAGE, ReactController,
    RunRequest,
};
use ironloop_core::{
    CollectingSink, ConversationId, ProviderError, Role, ToolRegistry, TranscriptStatus,
    WorkingMemoryStore,
};
use ironloop_memory::{InMemoryTranscript, InMemoryWorkingMemory};
use ironloop_security::AccessLevel;
use ironloop_tools::{ToolContext, default_registry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CALC_ROUND: &str = "§think I need to calculate this\n\
§calls [{\"name\":\"calculator\",\"args\":{\"expression\":\"15*8+23\"}}]\n§execute";
const ANSWER_ROUND: &str = "§think The tool says 143.\n§respond The answer is 143.\n§end";

struct Harness {
    controller: ReactController,
    client: Arc<ScriptedClient>,
    transcript: InMemoryTranscript,
    memory: InMemoryWorkingMemory,
    sink: Arc<CollectingSink>,
    _dir: TempDir,
}

fn harness(steps: Vec<Step>) -> Harness {
    harness_with(steps, ControllerConfig::default())
}

fn harness_with(steps: Vec<Step>, config: ControllerConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(steps);
    let sink = Arc::new(CollectingSink::new());
    let transcript = InMemoryTranscript::new();
    let memory = InMemoryWorkingMemory::new();
    let tools: ToolRegistry = default_registry(ToolContext::new(AccessLevel::Sandbox, dir.path()));

    let controller = ReactController::new(
        resilient(client.clone(), &["sk-test-1"], sink.clone()),
        Arc::new(tools),
        Arc::new(transcript.clone()),
        Arc::new(memory.clone()),
        sink.clone(),
        config,
    )
    .with_access("sandbox", dir.path().display().to_string());

    Harness {
        controller,
        client,
        transcript,
        memory,
        sink,
        _dir: dir,
    }
}

async fn collect(handle: &mut ironloop_agent::RunHandle) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn calculator_query_completes_in_two_rounds() {
    let h = harness(vec![Step::chunked(CALC_ROUND, 7), Step::chunked(ANSWER_ROUND, 5)]);
    let conversation = ConversationId::from("conv-calc");
    let mut handle = h.controller.run(
        RunRequest::new("What is 15*8+23?")
            .with_user("alice")
            .with_conversation(conversation.clone()),
    );

    let events = collect(&mut handle).await;
    let outcome = handle.finish().await.unwrap();
    assert_eq!(outcome.answer, "The answer is 143.");
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.tool_calls_made, 1);
    assert_eq!(outcome.total.iterations, 2);

    let results: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolResult { name, result } => Some((name.clone(), result.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "calculator");
    assert_eq!(results[0].1.content.as_deref(), Some("143"));

    let respond: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Respond { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(respond, "The answer is 143.");

    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Done { iterations: 2, tool_calls_made: 1, .. })
    ));
    assert_eq!(
        events.iter().filter(|e| e.event_type() == "metric").count(),
        2
    );

    let records = h.transcript.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_id, "alice");
    assert_eq!(records[0].conversation_id, "conv-calc");
    assert_eq!(records[0].status, TranscriptStatus::Completed);
    assert_eq!(records[0].response, "The answer is 143.");

    assert_eq!(h.sink.of_kind("round_started").len(), 2);
    assert_eq!(h.sink.of_kind("tool_finished").len(), 1);
    let actions = h.memory.actions(&outcome.task_id).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].tool, "calculator");
}

#[tokio::test]
async fn security_section_sent_in_first_round_only() {
    let h = harness(vec![Step::text(CALC_ROUND), Step::text(ANSWER_ROUND)]);
    h.controller
        .run(RunRequest::new("What is 15*8+23?"))
        .finish()
        .await
        .unwrap();

    let requests = h.client.requests();
    assert_eq!(requests.len(), 2);
    let has_security = |i: usize| {
        requests[i]
            .messages
            .iter()
            .any(|m| m.content.starts_with("Security assessment"))
    };
    assert!(has_security(0));
    assert!(!has_security(1));

    let second = &requests[1].messages;
    assert!(second.iter().any(|m| m.role == Role::Assistant && m.content.contains("§calls")));
    let tool_message = second.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert!(tool_message.content.contains("calculator"));
    assert!(tool_message.content.contains("143"));
}

#[tokio::test]
async fn transcript_is_written_before_terminal_event() {
    let h = harness(vec![Step::text("§respond 42 §end")]);
    let mut handle = h.controller.run(RunRequest::new("Meaning of life?"));

    while let Some(event) = handle.next().await {
        if event.is_terminal() {
            assert_eq!(h.transcript.len().await, 1, "terminal event before persist");
        }
    }
    assert_eq!(handle.finish().await.unwrap().answer, "42");
}

#[tokio::test]
async fn cancellation_persists_interrupted_transcript() {
    let h = harness(vec![Step::Stalls(vec!["§think working on it".into()])]);
    let mut handle = h.controller.run(RunRequest::new("long task"));

    match handle.next().await {
        Some(AgentEvent::Think { content }) => assert!(content.starts_with("working")),
        other => panic!("expected think, got {other:?}"),
    }
    handle.cancel();

    let rest = collect(&mut handle).await;
    assert_eq!(
        rest.last(),
        Some(&AgentEvent::Cancelled {
            message: INTERRUPTED_MESSAGE.into()
        })
    );
    assert_eq!(handle.finish().await.unwrap_err(), AgentError::Cancelled);

    let records = h.transcript.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TranscriptStatus::Cancelled);
    assert_eq!(records[0].response, INTERRUPTED_MESSAGE);
}

#[tokio::test]
async fn malformed_calls_are_corrected_next_round() {
    let h = harness(vec![
        Step::text("§calls [{\"name\": calculator}] §execute"),
        Step::text(CALC_ROUND),
        Step::text(ANSWER_ROUND),
    ]);
    let mut handle = h.controller.run(RunRequest::new("What is 15*8+23?"));
    let events = collect(&mut handle).await;
    let outcome = handle.finish().await.unwrap();

    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.answer, "The answer is 143.");
    assert_eq!(events.iter().filter(|e| e.event_type() == "error").count(), 1);

    let second = &h.client.requests()[1].messages;
    assert!(
        second
            .iter()
            .any(|m| m.role == Role::System && m.content.starts_with("Protocol note: malformed calls"))
    );
}

#[tokio::test]
async fn schema_violation_is_fed_back_not_fatal() {
    let h = harness(vec![
        Step::text("§calls [{\"name\":\"calculator\",\"args\":{\"expr\":\"1+1\"}}] §execute"),
        Step::text("§respond fixed §end"),
    ]);
    let mut handle = h.controller.run(RunRequest::new("1+1"));
    let events = collect(&mut handle).await;
    handle.finish().await.unwrap();

    let failed = events.iter().find_map(|e| match e {
        AgentEvent::ToolResult { result, .. } => Some(result.clone()),
        _ => None,
    });
    let failed = failed.unwrap();
    assert!(failed.error);
    assert_eq!(failed.outcome, "validation failed");
}

#[tokio::test]
async fn iteration_limit_fails_with_partial_answer() {
    let config = ControllerConfig {
        max_iterations: 2,
        ..ControllerConfig::default()
    };
    let h = harness_with(
        vec![
            Step::text("§think hmm §respond draft answer §execute"),
            Step::text("§think still thinking"),
        ],
        config,
    );
    let mut handle = h.controller.run(RunRequest::new("hard question"));
    let events = collect(&mut handle).await;
    let err = handle.finish().await.unwrap_err();

    assert_eq!(err, AgentError::IterationLimit { max_iterations: 2 });
    match events.last() {
        Some(AgentEvent::Failed {
            kind,
            partial_answer,
            ..
        }) => {
            assert_eq!(*kind, FailureKind::IterationLimit);
            assert_eq!(partial_answer.as_deref(), Some("draft answer"));
        }
        other => panic!("expected failed, got {other:?}"),
    }

    let records = h.transcript.records().await;
    assert_eq!(records[0].status, TranscriptStatus::Failed);
    assert!(records[0].response.starts_with("draft answer"));
}

#[tokio::test]
async fn request_limit_overrides_config() {
    let h = harness(vec![Step::text("§think a"), Step::text("§think b")]);
    let err = h
        .controller
        .run(RunRequest::new("q").with_max_iterations(1))
        .finish()
        .await
        .unwrap_err();
    assert_eq!(err, AgentError::IterationLimit { max_iterations: 1 });
    assert_eq!(h.client.call_count(), 1);
}

#[tokio::test]
async fn provider_failure_is_typed() {
    let h = harness(vec![Step::Fails(ProviderError::AuthenticationFailed(
        "bad key".into(),
    ))]);
    let mut handle = h.controller.run(RunRequest::new("q"));
    let events = collect(&mut handle).await;
    assert!(matches!(handle.finish().await, Err(AgentError::Provider(_))));
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Failed {
            kind: FailureKind::Provider,
            partial_answer: None,
            ..
        })
    ));
    assert_eq!(h.transcript.records().await[0].status, TranscriptStatus::Failed);
}

#[tokio::test]
async fn sandbox_escape_ends_run_as_security_failure() {
    let h = harness(vec![Step::text(
        "§calls [{\"name\":\"file_read\",\"args\":{\"path\":\"../../etc/passwd\"}}] §execute",
    )]);
    let err = h
        .controller
        .run(RunRequest::new("read passwd"))
        .finish()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Security);
}

#[tokio::test]
async fn mid_stream_retry_is_invisible_to_the_caller() {
    let dir = TempDir::new().unwrap();
    let client = ScriptedClient::new(vec![
        Step::Interrupted(
            vec!["§respond The ans".into()],
            ProviderError::RateLimited { retry_after_secs: 1 },
        ),
        Step::chunked("§respond The answer is 143.§end", 3),
    ]);
    let sink = Arc::new(CollectingSink::new());
    let transcript = InMemoryTranscript::new();
    let controller = ReactController::new(
        resilient(client.clone(), &["sk-a-1111", "sk-b-2222"], sink.clone()),
        Arc::new(default_registry(ToolContext::new(AccessLevel::Sandbox, dir.path()))),
        Arc::new(transcript.clone()),
        Arc::new(InMemoryWorkingMemory::new()),
        sink.clone(),
        ControllerConfig::default(),
    );

    let mut handle = controller.run(RunRequest::new("What is 15*8+23?"));
    let events = collect(&mut handle).await;
    let outcome = handle.finish().await.unwrap();

    let respond: String = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::Respond { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(respond, "The answer is 143.");
    assert_eq!(outcome.answer, "The answer is 143.");
    assert_eq!(outcome.iterations, 1);
    assert_eq!(sink.of_kind("key_rotated").len(), 1);
}

#[tokio::test]
async fn dropped_receiver_counts_as_cancellation() {
    let h = harness(vec![Step::chunked(ANSWER_ROUND, 2)]);
    let handle = h.controller.run(RunRequest::new("q"));
    let ironloop_agent::RunHandle { events, .. } = handle;
    drop(events);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let records = h.transcript.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, TranscriptStatus::Cancelled);
}
