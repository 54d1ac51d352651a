//! Tool registry: the static table of tools the model may call.
//!
//! Provides:
//! - Immutable lookup by tool name, built once at startup
//! - Validation of every tool spec when the registry is built
//! - Validation that a tool call's arguments match the declared parameters
//! - Serialization of tools into the `/api/chat` request format

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::errors::AgentError;

// ─── Tool Specs ─────────────────────────────────────────────────────────────

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Whether `value` is of this type.
    ///
    /// `Number` accepts integers, `Integer` accepts only whole numbers.
    pub fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// Static description of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// `parameter name → spec`, ordered so the rendered schema is stable.
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolSpec {
    /// Render the parameters as a JSON schema object.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|(name, p)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "type": p.param_type,
                        "description": p.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Render this tool as a wire tool definition.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters_schema(),
            },
        }
    }

    /// Check the tool's own name and schema; run once per tool when the registry is built.
    fn validate(&self) -> Result<(), AgentError> {
        let invalid = |reason: String| AgentError::InvalidToolSpec {
            name: self.name.clone(),
            reason,
        };

        if !is_identifier(&self.name) {
            return Err(invalid(
                "name must be non-empty lowercase ASCII letters, digits, or '_'".into(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(invalid("description is empty".into()));
        }
        for name in self.parameters.keys() {
            if !is_identifier(name) {
                return Err(invalid(format!("invalid parameter name '{name}'")));
            }
        }
        Ok(())
    }

    /// Check invocation arguments against the declared parameters.
    ///
    /// Required parameters must be present, declared parameters must have the
    /// declared type. Undeclared extras are ignored.
    pub fn validate_arguments(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AgentError> {
        for (name, param) in &self.parameters {
            match arguments.get(name) {
                None | Some(serde_json::Value::Null) if param.required => {
                    return Err(AgentError::InvalidArguments {
                        tool: self.name.clone(),
                        reason: format!("missing required field: '{name}'"),
                    });
                }
                None | Some(serde_json::Value::Null) => {}
                Some(value) if !param.param_type.matches(value) => {
                    return Err(AgentError::InvalidArguments {
                        tool: self.name.clone(),
                        reason: format!(
                            "field '{name}' should be {:?}, got {value}",
                            param.param_type
                        ),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ─── Tool Trait ─────────────────────────────────────────────────────────────

/// Successful tool output.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Structured result sent back to the model.
    pub content: serde_json::Value,
    /// Human-readable rendering for the transcript.
    pub display: String,
}

/// A callable tool backed by some external lookup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's static spec.
    fn spec(&self) -> &ToolSpec;

    /// Perform the call. Arguments have already been validated.
    async fn call(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutput, AgentError>;
}

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Immutable registry of tools, keyed by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Wire definitions, rendered once in name order.
    definitions: Vec<ToolDefinition>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    /// Start building a registry.
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder { tools: Vec::new() }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Tool definitions for the `tools` field of a chat request.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Collects tools, then validates them all in [`ToolRegistryBuilder::build`].
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistryBuilder {
    /// Add a tool.
    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Validate every spec and freeze the registry.
    ///
    /// Fails on the first malformed or duplicate spec.
    pub fn build(self) -> Result<ToolRegistry, AgentError> {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();

        for tool in self.tools {
            let spec = tool.spec();
            spec.validate()?;
            if tools.contains_key(&spec.name) {
                return Err(AgentError::InvalidToolSpec {
                    name: spec.name.clone(),
                    reason: "registered twice".into(),
                });
            }
            tools.insert(spec.name.clone(), tool);
        }

        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        let definitions = names
            .into_iter()
            .filter_map(|name| tools.get(name))
            .map(|tool| tool.spec().to_definition())
            .collect();

        tracing::info!(tool_count = tools.len(), "tool registry built");
        Ok(ToolRegistry { tools, definitions })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
