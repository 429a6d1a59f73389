//! Sequential tool dispatch with a deadline per call.

use ironloop_core::{
    ActionRecord, EventSink, ObservabilityRecord, ToolCall, ToolError, ToolRegistry, ToolResult,
    WorkingMemoryStore,
};
use ironloop_security::{AuditLogger, timeout_context};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    working_memory: Arc<dyn WorkingMemoryStore>,
    sink: Arc<dyn EventSink>,
    timeout: Duration,
    audit: Option<Arc<AuditLogger>>,
}

impl ToolDispatcher {
    pub fn new(
        tools: Arc<ToolRegistry>,
        working_memory: Arc<dyn WorkingMemoryStore>,
        sink: Arc<dyn EventSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            tools,
            working_memory,
            sink,
            timeout,
            audit: None,
        }
    }

    /// Record expired scopes in the security audit log.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one call.
    ///
    /// Structured failures (including schema violations) come back as
    /// `Ok(ToolResult{error:true})`. Faults, security denials and timeouts
    /// are errors. Either way the invocation lands in working memory.
    pub async fn dispatch(&self, task_id: &str, call: &ToolCall) -> Result<ToolResult, ToolError> {
        info!(task_id, tool = %call.name, "Tool started");
        self.sink.emit(&ObservabilityRecord::ToolStarted {
            task_id: task_id.to_string(),
            tool: call.name.clone(),
        });
        let started = Instant::now();

        let outcome = match timeout_context(self.timeout, &call.name, self.tools.execute(call)).await {
            Ok(result) => result,
            Err(expired) => {
                warn!(task_id, tool = %call.name, timeout = ?self.timeout, "Tool timed out");
                let err = expired.into_tool_error();
                if let (Some(audit), ToolError::Timeout { tool_name, timeout_ms }) = (&self.audit, &err) {
                    audit.tool_timeout(task_id, tool_name, *timeout_ms);
                }
                Err(err)
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let recorded = match &outcome {
            Ok(result) => result.clone(),
            Err(e) => ToolResult::failed("fault", e.to_string()),
        };
        let is_error = recorded.error;
        if let Err(e) = self
            .working_memory
            .record_action(task_id, ActionRecord::new(&call.name, call.args.clone(), recorded))
            .await
        {
            warn!(task_id, tool = %call.name, error = %e, "Failed to record tool action");
        }

        debug!(task_id, tool = %call.name, duration_ms, error = is_error, "Tool finished");
        self.sink.emit(&ObservabilityRecord::ToolFinished {
            task_id: task_id.to_string(),
            tool: call.name.clone(),
            error: is_error,
            duration_ms,
        });

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ironloop_core::{CollectingSink, FieldSpec, Tool, ToolSchema};
    use ironloop_memory::InMemoryWorkingMemory;
    use serde_json::{Map, Value, json};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new(vec![FieldSpec::integer("secs").required()])
        }
        async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError> {
            let secs = args["secs"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(ToolResult::ok("slept", secs.to_string()))
        }
    }

    fn dispatcher(memory: Arc<InMemoryWorkingMemory>, sink: Arc<CollectingSink>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        ToolDispatcher::new(Arc::new(registry), memory, sink, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn records_every_invocation() {
        let memory = Arc::new(InMemoryWorkingMemory::new());
        let sink = Arc::new(CollectingSink::new());
        let dispatcher = dispatcher(memory.clone(), sink.clone());

        let ok = dispatcher
            .dispatch("t1", &ToolCall::new("slow", json!({"secs": 1})))
            .await
            .unwrap();
        assert!(!ok.error);
        let invalid = dispatcher
            .dispatch("t1", &ToolCall::new("slow", json!({})))
            .await
            .unwrap();
        assert!(invalid.error);
        assert_eq!(invalid.outcome, "validation failed");

        let actions = memory.actions("t1").await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(sink.of_kind("tool_started").len(), 2);
        assert_eq!(sink.of_kind("tool_finished").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_distinct_and_audited() {
        let memory = Arc::new(InMemoryWorkingMemory::new());
        let sink = Arc::new(CollectingSink::new());
        let audit = Arc::new(AuditLogger::new());
        let dispatcher = dispatcher(memory.clone(), sink.clone()).with_audit(audit.clone());

        let err = dispatcher
            .dispatch("t2", &ToolCall::new("slow", json!({"secs": 60})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::Timeout {
                tool_name: "slow".into(),
                timeout_ms: 5000
            }
        );
        assert_eq!(audit.count(), 1);
        let actions = memory.actions("t2").await.unwrap();
        assert!(actions[0].result.error);
        assert_eq!(actions[0].result.outcome, "fault");
    }
}
