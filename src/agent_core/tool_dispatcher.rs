//! ToolDispatcher: routes model tool invocations to registered tools.
//!
//! Resolution is a pure registry lookup. Execution validates arguments, makes
//! a single attempt, and always produces a `tool` message: failures become
//! `{"success": false, "error": ...}` so the model can react to them.

use std::sync::Arc;
use std::time::Instant;

use crate::inference::{ChatMessage, ToolDefinition, ToolInvocation};

use super::errors::AgentError;
use super::tool_registry::{Tool, ToolRegistry};

/// Result of executing one invocation.
#[derive(Debug, Clone)]
pub struct ToolExecution {
    /// `tool`-role message answering the invocation.
    pub message: ChatMessage,
    /// Human-readable rendering for the transcript.
    pub display: String,
    pub succeeded: bool,
}

/// Dispatches tool invocations against an immutable registry.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Tool definitions to advertise on the first request of a turn.
    pub fn definitions(&self) -> &[ToolDefinition] {
        self.registry.definitions()
    }

    /// Find the tool an invocation names. Never touches the network.
    pub fn resolve(&self, invocation: &ToolInvocation) -> Result<&Arc<dyn Tool>, AgentError> {
        self.registry
            .get(&invocation.tool_name)
            .ok_or_else(|| AgentError::UnknownTool {
                name: invocation.tool_name.clone(),
            })
    }

    /// Execute an invocation and wrap the outcome as a `tool` message.
    ///
    /// An unknown tool is the only error returned; every other failure is
    /// folded into the message content.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolExecution, AgentError> {
        let tool = self.resolve(invocation)?;
        let start = Instant::now();

        let result = match tool.spec().validate_arguments(&invocation.arguments) {
            Ok(()) => tool.call(&invocation.arguments).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(
                    tool = %invocation.tool_name,
                    call_id = %invocation.id,
                    elapsed_ms,
                    "tool call succeeded"
                );
                let content = serde_json::to_string_pretty(&output.content)?;
                Ok(ToolExecution {
                    message: ChatMessage::tool_result(invocation, content),
                    display: output.display,
                    succeeded: true,
                })
            }
            Err(e) => {
                tracing::warn!(
                    tool = %invocation.tool_name,
                    call_id = %invocation.id,
                    elapsed_ms,
                    error = %e,
                    "tool call failed"
                );
                let content = serde_json::to_string_pretty(&serde_json::json!({
                    "success": false,
                    "error": e.to_string(),
                }))?;
                Ok(ToolExecution {
                    message: ChatMessage::tool_result(invocation, content),
                    display: format!("Error: {e}"),
                    succeeded: false,
                })
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent_core::tool_registry::{ParamSpec, ParamType, ToolOutput, ToolSpec};
    use crate::inference::Role;

    struct CountingTool {
        spec: ToolSpec,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingTool {
        fn new(fail: bool) -> Self {
            let mut parameters = BTreeMap::new();
            parameters.insert(
                "symbol".to_string(),
                ParamSpec {
                    param_type: ParamType::String,
                    description: "Ticker".into(),
                    required: true,
                },
            );
            Self {
                spec: ToolSpec {
                    name: "get_price".into(),
                    description: "Look up a price".into(),
                    parameters,
                },
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn spec(&self) -> &ToolSpec {
            &self.spec
        }

        async fn call(
            &self,
            arguments: &serde_json::Map<String, serde_json::Value>,
        ) -> Result<ToolOutput, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::ToolExecutionError {
                    tool: "get_price".into(),
                    reason: "HTTP 503".into(),
                });
            }
            Ok(ToolOutput {
                content: json!({"success": true, "symbol": arguments["symbol"]}),
                display: "BTC $1".into(),
            })
        }
    }

    fn dispatcher(tool: Arc<CountingTool>) -> ToolDispatcher {
        ToolDispatcher::new(ToolRegistry::builder().register(tool).build().unwrap())
    }

    fn invocation(name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            id: "call_1".into(),
            tool_name: name.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_never_calls() {
        let tool = Arc::new(CountingTool::new(false));
        let dispatcher = dispatcher(tool.clone());

        let inv = invocation("get_weather", json!({}));
        assert!(matches!(
            dispatcher.resolve(&inv),
            Err(AgentError::UnknownTool { ref name }) if name == "get_weather"
        ));
        assert!(matches!(
            dispatcher.execute(&inv).await,
            Err(AgentError::UnknownTool { .. })
        ));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_produces_tool_message() {
        let tool = Arc::new(CountingTool::new(false));
        let dispatcher = dispatcher(tool.clone());

        let exec = dispatcher
            .execute(&invocation("get_price", json!({"symbol": "BTC"})))
            .await
            .unwrap();

        assert!(exec.succeeded);
        assert_eq!(exec.display, "BTC $1");
        assert_eq!(exec.message.role, Role::Tool);
        assert_eq!(exec.message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(exec.message.tool_name.as_deref(), Some("get_price"));
        let content: serde_json::Value = serde_json::from_str(&exec.message.content).unwrap();
        assert_eq!(content["symbol"], "BTC");
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_becomes_error_message() {
        let tool = Arc::new(CountingTool::new(true));
        let dispatcher = dispatcher(tool.clone());

        let exec = dispatcher
            .execute(&invocation("get_price", json!({"symbol": "BTC"})))
            .await
            .unwrap();

        assert!(!exec.succeeded);
        let content: serde_json::Value = serde_json::from_str(&exec.message.content).unwrap();
        assert_eq!(content["success"], false);
        assert!(content["error"].as_str().unwrap().contains("HTTP 503"));
        // Single attempt, no retry
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_skip_the_call() {
        let tool = Arc::new(CountingTool::new(false));
        let dispatcher = dispatcher(tool.clone());

        let exec = dispatcher
            .execute(&invocation("get_price", json!({"symbol": 42})))
            .await
            .unwrap();

        assert!(!exec.succeeded);
        assert!(exec.message.content.contains("invalid arguments"));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }
}
