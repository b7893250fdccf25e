//! Explicit tool registry.
//!
//! Tools reach the agent through a [`ToolRegistry`].  A registered tool is
//! one of two variants:
//!
//! - [`Tool::Native`] -- a tool exposed by an [`Adapter`], dispatched through
//!   [`Adapter::execute_tool`].
//! - [`Tool::Function`] -- a plain async function wrapped together with a
//!   parameter schema built by [`FunctionToolBuilder`].
//!
//! Every call is validated against the tool's JSON schema before dispatch,
//! and missing optional parameters are filled from the schema's `default`
//! values.
//!
//! # Example
//!
//! ```rust
//! # use powerllm_adapters::registry::{FunctionTool, ParamType, ToolRegistry};
//! # use serde_json::json;
//! let tool = FunctionTool::builder("async_add")
//!     .description("Add two numbers")
//!     .required("a", ParamType::Number)
//!     .required("b", ParamType::Number)
//!     .build(|params| async move {
//!         let a = params["a"].as_f64().unwrap_or_default();
//!         let b = params["b"].as_f64().unwrap_or_default();
//!         Ok(json!(a + b))
//!     })
//!     .unwrap();
//!
//! let registry = ToolRegistry::new();
//! registry.register_function(tool).unwrap();
//! assert!(registry.contains("add"));
//! ```

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use jsonschema::{Draft, JSONSchema};
use serde_json::{Map, Value, json};

use crate::error::{AdapterError, Result};
use crate::traits::{Adapter, ToolDefinition};

/// Prefix stripped from function tool names, mirroring async naming
/// conventions of host integrations.
const ASYNC_PREFIX: &str = "async_";

/// Boxed future returned by a wrapped function tool.
pub type ToolFuture = BoxFuture<'static, Result<Value>>;

type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// Function tools
// ---------------------------------------------------------------------------

/// JSON type of a function tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// Any JSON value.
    Any,
}

impl ParamType {
    fn schema(self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Object => json!({"type": "object"}),
            Self::Array => json!({"type": "array"}),
            Self::Any => json!({}),
        }
    }
}

/// An async function exposed as a tool.
#[derive(Clone)]
pub struct FunctionTool {
    definition: ToolDefinition,
    func: ToolFn,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    /// Start building a function tool.
    ///
    /// A leading `async_` in `name` is dropped, so `async_get_weather` is
    /// exposed as `get_weather`.
    pub fn builder(name: impl Into<String>) -> FunctionToolBuilder {
        let name: String = name.into();
        let name = name
            .strip_prefix(ASYNC_PREFIX)
            .map(str::to_string)
            .unwrap_or(name);
        FunctionToolBuilder {
            name,
            description: String::new(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    /// Return the tool definition presented to the agent.
    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    /// Invoke the wrapped function.
    pub async fn call(&self, params: Value) -> Result<Value> {
        (self.func)(params).await
    }
}

/// Builder for [`FunctionTool`].
#[derive(Debug)]
pub struct FunctionToolBuilder {
    name: String,
    description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl FunctionToolBuilder {
    /// Set the description shown to the language model.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a required parameter.
    pub fn required(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), ty.schema());
        self.required.push(name);
        self
    }

    /// Add an optional parameter.
    ///
    /// `default` is inserted when the caller omits the parameter.  A `null`
    /// value is always accepted for optional parameters.
    pub fn optional(mut self, name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        let mut schema = ty.schema();
        if let (Some(obj), Some(t)) = (schema.as_object_mut(), ty_name(ty)) {
            obj.insert("type".into(), json!([t, "null"]));
        }
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("default".into(), default);
        }
        self.properties.insert(name.into(), schema);
        self
    }

    /// Finish the builder, wrapping `func` as the tool body.
    pub fn build<F, Fut>(self, func: F) -> Result<FunctionTool>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if self.name.is_empty() {
            return Err(AdapterError::InvalidSchema {
                tool_name: self.name,
                reason: "tool name must not be empty".into(),
            });
        }
        let parameters = json!({
            "type": "object",
            "properties": Value::Object(self.properties),
            "required": self.required,
        });
        let func: ToolFn = Arc::new(move |params| Box::pin(func(params)));
        Ok(FunctionTool {
            definition: ToolDefinition {
                name: self.name,
                description: self.description,
                parameters,
            },
            func,
        })
    }
}

fn ty_name(ty: ParamType) -> Option<&'static str> {
    match ty {
        ParamType::String => Some("string"),
        ParamType::Integer => Some("integer"),
        ParamType::Number => Some("number"),
        ParamType::Boolean => Some("boolean"),
        ParamType::Object => Some("object"),
        ParamType::Array => Some("array"),
        ParamType::Any => None,
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A registered tool.
#[derive(Clone)]
pub enum Tool {
    /// A tool served by an adapter.
    Native {
        definition: ToolDefinition,
        adapter: Arc<dyn Adapter>,
    },
    /// A wrapped async function.
    Function(FunctionTool),
}

impl Tool {
    /// Return the tool definition.
    pub fn definition(&self) -> &ToolDefinition {
        match self {
            Self::Native { definition, .. } => definition,
            Self::Function(tool) => tool.definition(),
        }
    }

    /// Return the tool name.
    pub fn name(&self) -> &str {
        &self.definition().name
    }
}

#[derive(Clone)]
struct RegisteredTool {
    tool: Tool,
    validator: Arc<JSONSchema>,
}

/// Concurrent tool registry backed by [`DashMap`].
///
/// The registry is cheaply cloneable (`Arc`-backed) and `Send + Sync`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<DashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// If a tool with the same name already exists, it is overwritten and a
    /// warning is logged.
    pub fn register(&self, tool: Tool) -> Result<()> {
        let name = tool.name().to_string();
        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&tool.definition().parameters)
            .map_err(|e| AdapterError::InvalidSchema {
                tool_name: name.clone(),
                reason: e.to_string(),
            })?;

        let previous = self.inner.insert(
            name.clone(),
            RegisteredTool {
                tool,
                validator: Arc::new(validator),
            },
        );
        if previous.is_some() {
            tracing::warn!(tool = %name, "overwriting an already registered tool");
        } else {
            tracing::info!(tool = %name, "tool registered");
        }
        Ok(())
    }

    /// Register a wrapped function tool.
    pub fn register_function(&self, tool: FunctionTool) -> Result<()> {
        self.register(Tool::Function(tool))
    }

    /// Register every tool exposed by `adapter` as a native tool.
    pub fn register_adapter(&self, adapter: Arc<dyn Adapter>) -> Result<()> {
        for definition in adapter.tools() {
            self.register(Tool::Native {
                definition,
                adapter: Arc::clone(&adapter),
            })?;
        }
        Ok(())
    }

    /// Remove a tool.  Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.inner.remove(name).is_some();
        if removed {
            tracing::info!(tool = %name, "tool unregistered");
        }
        removed
    }

    /// Check whether a tool is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .inner
            .iter()
            .map(|e| e.value().tool.definition().clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate `params` and invoke the named tool.
    pub async fn call(&self, name: &str, params: Value) -> Result<Value> {
        // Clone out of the map so no shard lock is held across the await.
        let entry = self
            .inner
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| AdapterError::ToolNotFound {
                tool_name: name.to_string(),
            })?;

        let params = apply_defaults(params, &entry.tool.definition().parameters);
        if let Err(errors) = entry.validator.validate(&params) {
            let reasons: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(AdapterError::InvalidParams {
                tool_name: name.to_string(),
                reason: reasons.join(", "),
            });
        }

        tracing::debug!(tool = %name, "dispatching tool call");
        match &entry.tool {
            Tool::Native { adapter, .. } => adapter.execute_tool(name, params).await,
            Tool::Function(tool) => tool.call(params).await,
        }
    }
}

/// Fill absent top-level properties from their schema `default`.
fn apply_defaults(params: Value, schema: &Value) -> Value {
    let mut params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    if let (Some(obj), Some(props)) = (
        params.as_object_mut(),
        schema.get("properties").and_then(Value::as_object),
    ) {
        for (key, prop) in props {
            if let Some(default) = prop.get("default") {
                obj.entry(key.clone()).or_insert_with(|| default.clone());
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_tool(name: &str) -> FunctionTool {
        FunctionTool::builder(name)
            .description("Echo the input")
            .required("text", ParamType::String)
            .optional("repeat", ParamType::Integer, json!(1))
            .build(|params| async move { Ok(params) })
            .unwrap()
    }

    #[test]
    fn builder_strips_async_prefix() {
        let tool = echo_tool("async_echo");
        assert_eq!(tool.definition().name, "echo");
    }

    #[test]
    fn builder_produces_object_schema() {
        let tool = echo_tool("echo");
        let params = &tool.definition().parameters;
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"], json!(["text"]));
        assert_eq!(params["properties"]["repeat"]["default"], 1);
        assert_eq!(params["properties"]["repeat"]["type"], json!(["integer", "null"]));
    }

    #[test]
    fn builder_rejects_empty_name() {
        let result = FunctionTool::builder("")
            .build(|params| async move { Ok(params) });
        assert!(matches!(result, Err(AdapterError::InvalidSchema { .. })));
    }

    #[test]
    fn register_and_list_sorted() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("zeta")).unwrap();
        registry.register_function(echo_tool("alpha")).unwrap();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_overwrites_existing() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("echo")).unwrap();
        registry.register_function(echo_tool("echo")).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_tool() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("echo")).unwrap();
        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn call_fills_defaults() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("echo")).unwrap();
        let out = registry.call("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, json!({"text": "hi", "repeat": 1}));
    }

    #[tokio::test]
    async fn call_rejects_missing_required() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("echo")).unwrap();
        let err = registry.call("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn call_rejects_wrong_type() {
        let registry = ToolRegistry::new();
        registry.register_function(echo_tool("echo")).unwrap();
        let err = registry.call("echo", json!({"text": 5})).await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn call_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.call("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::ToolNotFound { .. }));
    }
}
