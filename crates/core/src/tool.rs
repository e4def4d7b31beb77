//! Tool declarations, typed arguments, and the handler trait.
//!
//! A [`ToolDeclaration`] tells the model what it may call. The same
//! declaration validates the model's raw JSON arguments into
//! [`ToolArguments`] before any handler runs, so handlers never see keys or
//! types they did not declare.

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The type of a declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    /// An object with its own named, typed fields.
    Object { fields: Vec<ToolParameter> },
}

/// One named, typed, described parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ParamType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ToolParameter {
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::String)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Integer)
    }

    pub fn object(
        name: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<ToolParameter>,
    ) -> Self {
        Self::new(name, description, ParamType::Object { fields })
    }

    fn new(name: impl Into<String>, description: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: true,
        }
    }

    /// Mark the parameter as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn schema(&self) -> serde_json::Value {
        let mut schema = match &self.kind {
            ParamType::String => serde_json::json!({ "type": "string" }),
            ParamType::Integer => serde_json::json!({ "type": "integer" }),
            ParamType::Object { fields } => object_schema(fields),
        };
        if !self.description.is_empty() {
            schema["description"] = serde_json::json!(self.description);
        }
        schema
    }
}

fn object_schema(fields: &[ToolParameter]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|p| (p.name.clone(), p.schema()))
        .collect();
    let required: Vec<&str> = fields
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    String(String),
    Integer(i64),
    Object(BTreeMap<String, ArgValue>),
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::String(s) => f.write_str(s),
            ArgValue::Integer(n) => write!(f, "{n}"),
            ArgValue::Object(map) => {
                let json = serde_json::Value::from(&ToolArguments(map.clone()));
                write!(f, "{json}")
            }
        }
    }
}

/// Arguments of one tool call, checked against its declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArguments(BTreeMap<String, ArgValue>);

impl ToolArguments {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_object(&self, name: &str) -> Option<ToolArguments> {
        match self.0.get(name) {
            Some(ArgValue::Object(map)) => Some(ToolArguments(map.clone())),
            _ => None,
        }
    }

    /// Flat string view of the top-level arguments.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<&ToolArguments> for serde_json::Value {
    fn from(args: &ToolArguments) -> Self {
        fn convert(value: &ArgValue) -> serde_json::Value {
            match value {
                ArgValue::String(s) => serde_json::Value::String(s.clone()),
                ArgValue::Integer(n) => serde_json::Value::from(*n),
                ArgValue::Object(map) => serde_json::Value::Object(
                    map.iter().map(|(k, v)| (k.clone(), convert(v))).collect(),
                ),
            }
        }
        serde_json::Value::Object(args.0.iter().map(|(k, v)| (k.clone(), convert(v))).collect())
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter (builder style).
    pub fn param(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON Schema describing this tool's parameters.
    pub fn parameters_schema(&self) -> serde_json::Value {
        object_schema(&self.parameters)
    }

    /// Convert into the definition sent to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    /// Parse and validate the model's raw JSON arguments.
    ///
    /// A blank string means "no arguments".
    pub fn validate_arguments(&self, raw: &str) -> Result<ToolArguments, ToolError> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool_name: self.name.clone(),
            reason,
        };

        let value: serde_json::Value = if raw.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?
        };

        let serde_json::Value::Object(map) = value else {
            return Err(invalid("arguments must be a JSON object".into()));
        };

        validate_object(&self.parameters, &map, "")
            .map(ToolArguments)
            .map_err(invalid)
    }
}

fn validate_object(
    params: &[ToolParameter],
    map: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result<BTreeMap<String, ArgValue>, String> {
    if let Some(unknown) = map.keys().find(|k| !params.iter().any(|p| &p.name == *k)) {
        return Err(format!("unknown parameter '{path}{unknown}'"));
    }

    let mut out = BTreeMap::new();
    for param in params {
        let key = format!("{path}{}", param.name);
        let Some(value) = map.get(&param.name).filter(|v| !v.is_null()) else {
            if param.required {
                return Err(format!("missing required parameter '{key}'"));
            }
            continue;
        };

        let parsed = match (&param.kind, value) {
            (ParamType::String, serde_json::Value::String(s)) => ArgValue::String(s.clone()),
            (ParamType::Integer, serde_json::Value::Number(n)) => n
                .as_i64()
                .map(ArgValue::Integer)
                .ok_or_else(|| format!("parameter '{key}' must be an integer, got {n}"))?,
            (ParamType::Integer, serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(ArgValue::Integer)
                .map_err(|_| format!("parameter '{key}' must be an integer, got \"{s}\""))?,
            (ParamType::Object { fields }, serde_json::Value::Object(inner)) => {
                ArgValue::Object(validate_object(fields, inner, &format!("{key}."))?)
            }
            (kind, other) => {
                let expected = match kind {
                    ParamType::String => "a string",
                    ParamType::Integer => "an integer",
                    ParamType::Object { .. } => "an object",
                };
                return Err(format!("parameter '{key}' must be {expected}, got {other}"));
            }
        };
        out.insert(param.name.clone(), parsed);
    }
    Ok(out)
}

/// The textual result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the handler succeeded
    pub success: bool,

    /// Text handed back to the model
    pub output: String,
}

/// The ordered set of tools offered to the model.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tool. Fails, leaving the registry unchanged, if the name is taken.
    pub fn declare(&mut self, tool: ToolDeclaration) -> Result<(), ToolError> {
        if self.get(&tool.name).is_some() {
            return Err(ToolError::DuplicateName(tool.name));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Get a declaration by name.
    pub fn get(&self, name: &str) -> Option<&ToolDeclaration> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Definitions for every declared tool, in declaration order.
    pub fn describe_all(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDeclaration::to_definition).collect()
    }

    /// List all declared tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDeclaration> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Caller-supplied behaviour behind a declared tool.
///
/// Handler errors are recoverable: the loop reports them to the model as
/// tool-result text.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, tool_name: &str, arguments: &ToolArguments) -> Result<String, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure taking the validated arguments as a handler.
pub fn tool_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F, Fut>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    async fn handle(&self, _tool_name: &str, arguments: &ToolArguments) -> Result<String, ToolError> {
        (self.f)(arguments.clone()).await
    }
}
