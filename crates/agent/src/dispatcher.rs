//! Tool dispatch: validate a model-issued call and run its handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parley_core::error::{ProtocolError, ToolError};
use parley_core::message::MessageToolCall;
use parley_core::tool::{ToolDeclaration, ToolHandler, ToolRegistry, ToolResult};
use tracing::{debug, warn};

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// The handler ran (or the arguments were rejected); append this result.
    Completed { result: ToolResult, duration_ms: u64 },
    /// The tool has no handler; the caller must submit the result.
    Manual,
}

/// Maps declared tools to their handlers.
#[derive(Default, Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tool together with the handler that answers it.
    pub fn register(
        &mut self,
        declaration: ToolDeclaration,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), ToolError> {
        let name = declaration.name.clone();
        self.registry.declare(declaration)?;
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Declare a tool whose calls the caller answers by hand.
    pub fn declare(&mut self, declaration: ToolDeclaration) -> Result<(), ToolError> {
        self.registry.declare(declaration)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Fail if the model called a tool that was never declared.
    pub fn ensure_declared(&self, call: &MessageToolCall) -> Result<(), ProtocolError> {
        if self.registry.get(&call.name).is_some() {
            Ok(())
        } else {
            Err(ProtocolError::UndeclaredTool {
                name: call.name.clone(),
                call_id: call.id.clone(),
            })
        }
    }

    /// Dispatch one call.
    ///
    /// Invalid arguments and handler failures become failed results whose text
    /// tells the model what went wrong. Only an undeclared tool is an error.
    pub async fn dispatch(&self, call: &MessageToolCall) -> Result<Dispatched, ProtocolError> {
        let Some(declaration) = self.registry.get(&call.name) else {
            return Err(ProtocolError::UndeclaredTool {
                name: call.name.clone(),
                call_id: call.id.clone(),
            });
        };

        let Some(handler) = self.handlers.get(&call.name) else {
            debug!(tool = %call.name, call_id = %call.id, "No handler; awaiting manual result");
            return Ok(Dispatched::Manual);
        };

        let start = Instant::now();

        let arguments = match declaration.validate_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Rejected tool arguments");
                return Ok(Dispatched::Completed {
                    result: failed(&call.id, &e),
                    duration_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        debug!(tool = %call.name, call_id = %call.id, args = arguments.len(), "Running tool handler");

        let result = match handler.handle(&call.name, &arguments).await {
            Ok(output) => ToolResult {
                call_id: call.id.clone(),
                success: true,
                output,
            },
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                failed(&call.id, &e)
            }
        };

        Ok(Dispatched::Completed {
            result,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn failed(call_id: &str, error: &ToolError) -> ToolResult {
    let output = match error {
        ToolError::InvalidArguments { tool_name, reason } => {
            format!("Error: invalid arguments for tool '{tool_name}': {reason}")
        }
        other => format!("Error: {other}"),
    };
    ToolResult {
        call_id: call_id.to_string(),
        success: false,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::tool::{ToolParameter, tool_fn};

    fn lookup() -> ToolDeclaration {
        ToolDeclaration::new("lookup", "Look a key up")
            .param(ToolParameter::string("key", "the key"))
    }

    fn dispatcher() -> ToolDispatcher {
        let mut d = ToolDispatcher::new();
        d.register(
            lookup(),
            Arc::new(tool_fn(|args| async move {
                match args.get_str("key") {
                    Some("x") => Ok("42".to_string()),
                    Some(other) => Err(ToolError::ExecutionFailed {
                        tool_name: "lookup".into(),
                        reason: format!("no entry for {other}"),
                    }),
                    None => unreachable!("validated"),
                }
            })),
        )
        .unwrap();
        d
    }

    fn completed(d: Dispatched) -> ToolResult {
        match d {
            Dispatched::Completed { result, .. } => result,
            Dispatched::Manual => panic!("expected a completed dispatch"),
        }
    }

    #[tokio::test]
    async fn runs_handler_with_validated_arguments() {
        let call = MessageToolCall::new("call_1", "lookup", r#"{"key":"x"}"#);
        let result = completed(dispatcher().dispatch(&call).await.unwrap());
        assert!(result.success);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn handler_failure_becomes_text() {
        let call = MessageToolCall::new("call_2", "lookup", r#"{"key":"nope"}"#);
        let result = completed(dispatcher().dispatch(&call).await.unwrap());
        assert!(!result.success);
        assert!(result.output.starts_with("Error: "));
        assert!(result.output.contains("no entry for nope"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_text() {
        let call = MessageToolCall::new("call_3", "lookup", r#"{"id":"x"}"#);
        let result = completed(dispatcher().dispatch(&call).await.unwrap());
        assert!(!result.success);
        assert!(
            result
                .output
                .starts_with("Error: invalid arguments for tool 'lookup': ")
        );
    }

    #[tokio::test]
    async fn undeclared_tool_is_protocol_error() {
        let call = MessageToolCall::new("call_4", "format_disk", "{}");
        let err = dispatcher().dispatch(&call).await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UndeclaredTool {
                name: "format_disk".into(),
                call_id: "call_4".into()
            }
        );
        assert!(dispatcher().ensure_declared(&call).is_err());
    }

    #[tokio::test]
    async fn declared_without_handler_is_manual() {
        let mut d = ToolDispatcher::new();
        d.declare(lookup()).unwrap();
        let call = MessageToolCall::new("call_5", "lookup", r#"{"key":"x"}"#);
        assert_eq!(d.dispatch(&call).await.unwrap(), Dispatched::Manual);
        assert!(!d.has_handler("lookup"));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut d = dispatcher();
        let err = d.declare(lookup()).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(_)));
        assert_eq!(d.registry().len(), 1);
    }
}
