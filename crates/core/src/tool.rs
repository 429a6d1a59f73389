//! Tool trait, declarative argument schemas, and the tool registry.
//!
//! Tools are what give the agent the ability to act: evaluate arithmetic,
//! read and write files inside the sandbox, run vetted shell commands.
//! Every tool declares a [`ToolSchema`]; the registry validates arguments
//! against it before the tool body ever runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ToolError;

/// A request to execute a tool, as parsed from a `calls` section.
///
/// Name and arguments are not checked at parse time; the registry does that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The result of a tool execution.
///
/// `error == true` is a structured, non-fatal failure: the controller folds it
/// into the next round exactly like a success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Short summary of what happened
    pub outcome: String,

    /// The output content, if any
    pub content: Option<String>,

    /// Whether this is a structured failure
    pub error: bool,
}

impl ToolResult {
    /// A successful result with content.
    pub fn ok(outcome: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            content: Some(content.into()),
            error: false,
        }
    }

    /// A structured failure the agent can read and react to.
    pub fn failed(outcome: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            content: Some(message.into()),
            error: true,
        }
    }

    /// Render for folding into a prompt.
    pub fn render(&self) -> String {
        let status = if self.error { "error" } else { "ok" };
        match &self.content {
            Some(content) if !content.is_empty() => {
                format!("{status} ({}): {content}", self.outcome)
            }
            _ => format!("{status} ({})", self.outcome),
        }
    }
}

// ── Schemas ───────────────────────────────────────────────────────────────

/// JSON type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            min: None,
            max: None,
            min_len: None,
            max_len: None,
            description: String::new(),
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: &str) -> Self {
        Self::new(name, FieldKind::Array)
    }

    pub fn object(name: &str) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Optional with a default applied when the argument is absent.
    pub fn default_value(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    /// Inclusive numeric bounds.
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Inclusive length bounds (characters for strings, items for arrays).
    pub fn length(mut self, min_len: usize, max_len: usize) -> Self {
        self.min_len = Some(min_len);
        self.max_len = Some(max_len);
        self
    }

    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = Some(min_len);
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        if !self.kind.matches(value) {
            return Err(format!(
                "field '{}' must be of type {}",
                self.name,
                self.kind.json_type()
            ));
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min
                && n < min
            {
                return Err(format!("field '{}' must be >= {min}", self.name));
            }
            if let Some(max) = self.max
                && n > max
            {
                return Err(format!("field '{}' must be <= {max}", self.name));
            }
        }

        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = len {
            if let Some(min_len) = self.min_len
                && len < min_len
            {
                return Err(format!(
                    "field '{}' must have length >= {min_len}",
                    self.name
                ));
            }
            if let Some(max_len) = self.max_len
                && len > max_len
            {
                return Err(format!(
                    "field '{}' must have length <= {max_len}",
                    self.name
                ));
            }
        }

        Ok(())
    }
}

/// The declared argument list of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validate raw arguments, returning them with defaults applied.
    ///
    /// Missing required fields, wrong types, out-of-bound values and
    /// undeclared fields are all rejected. `null` counts as absent.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        for key in args.keys() {
            if !self.fields.iter().any(|f| &f.name == key) {
                let allowed: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
                return Err(format!(
                    "unknown field '{key}' (allowed: {})",
                    allowed.join(", ")
                ));
            }
        }

        let mut validated = Map::new();
        for field in &self.fields {
            match args.get(&field.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    field.check(value)?;
                    validated.insert(field.name.clone(), value.clone());
                }
                None if field.required => {
                    return Err(format!("missing required field '{}'", field.name));
                }
                None => {
                    if let Some(default) = &field.default {
                        validated.insert(field.name.clone(), default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }

    /// Render as a JSON Schema object for the prompt.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::from(field.kind.json_type()));
            if !field.description.is_empty() {
                prop.insert("description".into(), Value::from(field.description.clone()));
            }
            if let Some(default) = &field.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(min) = field.min {
                prop.insert("minimum".into(), Value::from(min));
            }
            if let Some(max) = field.max {
                prop.insert("maximum".into(), Value::from(max));
            }
            let (min_key, max_key) = if field.kind == FieldKind::Array {
                ("minItems", "maxItems")
            } else {
                ("minLength", "maxLength")
            };
            if let Some(min_len) = field.min_len {
                prop.insert(min_key.into(), Value::from(min_len));
            }
            if let Some(max_len) = field.max_len {
                prop.insert(max_key.into(), Value::from(max_len));
            }
            properties.insert(field.name.clone(), Value::Object(prop));
            if field.required {
                required.push(Value::from(field.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A tool as described to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Each tool (calculator, file_read, shell, etc.) implements this trait and is
/// registered by name in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "shell", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Declared arguments.
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, args: Map<String, Value>) -> Result<ToolResult, ToolError>;

    fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}

/// An explicit name → tool map, resolved once at startup.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Descriptors for every registered tool, sorted by name for stable prompts.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<ToolDescriptor> = self.tools.values().map(|t| t.to_descriptor()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Validate and execute a tool call.
    ///
    /// Unknown tools and schema violations come back as `Ok(ToolResult{error:true})`.
    /// Any other error from the tool body propagates unchanged.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.tools.get(&call.name) else {
            return Ok(ToolResult::failed(
                "validation failed",
                format!(
                    "unknown tool '{}' (available: {})",
                    call.name,
                    self.names().join(", ")
                ),
            ));
        };

        let args = match tool.schema().validate(&call.args) {
            Ok(args) => args,
            Err(reason) => {
                return Ok(ToolResult::failed(
                    "validation failed",
                    format!("{}: {reason}", call.name),
                ));
            }
        };

        match tool.execute(args).await {
            Err(e) if e.is_validation() => Ok(ToolResult::failed("validation failed", e.to_string())),
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
