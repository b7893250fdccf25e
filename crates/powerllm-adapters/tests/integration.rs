//! Integration tests for the powerllm-adapters crate.
//!
//! These tests exercise the registry with both tool variants: a native
//! adapter exposing several tools and wrapped function tools.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use powerllm_adapters::{
    Adapter, AdapterError, AdapterType, FunctionTool, HealthStatus, ParamType, Result, Tool,
    ToolDefinition, ToolRegistry,
};
use serde_json::{Value, json};

struct CounterAdapter {
    calls: AtomicU32,
}

#[async_trait]
impl Adapter for CounterAdapter {
    fn id(&self) -> &str {
        "counter"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Compute
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "counter_increment".into(),
                description: "Increment the counter".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"by": {"type": "integer", "default": 1}},
                }),
            },
            ToolDefinition {
                name: "counter_read".into(),
                description: "Read the counter".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
        ]
    }

    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            "counter_increment" => {
                let by = params["by"].as_u64().unwrap_or(1) as u32;
                let now = self.calls.fetch_add(by, Ordering::SeqCst) + by;
                Ok(json!({"value": now}))
            }
            "counter_read" => Ok(json!({"value": self.calls.load(Ordering::SeqCst)})),
            other => Err(AdapterError::ToolNotFound {
                tool_name: other.to_string(),
            }),
        }
    }
}

#[tokio::test]
async fn native_adapter_tools_are_dispatched() {
    let registry = ToolRegistry::new();
    let adapter = Arc::new(CounterAdapter {
        calls: AtomicU32::new(0),
    });
    registry.register_adapter(adapter).unwrap();
    assert_eq!(registry.len(), 2);

    let out = registry.call("counter_increment", json!({})).await.unwrap();
    assert_eq!(out, json!({"value": 1}));
    let out = registry
        .call("counter_increment", json!({"by": 4}))
        .await
        .unwrap();
    assert_eq!(out, json!({"value": 5}));
    let out = registry.call("counter_read", Value::Null).await.unwrap();
    assert_eq!(out, json!({"value": 5}));
}

#[tokio::test]
async fn function_and_native_tools_coexist() {
    let registry = ToolRegistry::new();
    registry
        .register_adapter(Arc::new(CounterAdapter {
            calls: AtomicU32::new(0),
        }))
        .unwrap();
    let greet = FunctionTool::builder("async_greet")
        .description("Greet someone")
        .required("name", ParamType::String)
        .build(|params| async move {
            let name = params["name"].as_str().unwrap_or("nobody").to_string();
            Ok(json!(format!("hello {name}")))
        })
        .unwrap();
    registry.register(Tool::Function(greet)).unwrap();

    let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["counter_increment", "counter_read", "greet"]);

    let out = registry.call("greet", json!({"name": "kitchen"})).await.unwrap();
    assert_eq!(out, json!("hello kitchen"));
}

#[tokio::test]
async fn invalid_schema_is_rejected_at_registration() {
    struct BadSchema;

    #[async_trait]
    impl Adapter for BadSchema {
        fn id(&self) -> &str {
            "bad"
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Compute
        }
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
        async fn health_check(&self) -> Result<HealthStatus> {
            Ok(HealthStatus::Unhealthy)
        }
        fn tools(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "bad_tool".into(),
                description: String::new(),
                parameters: json!({"type": 12}),
            }]
        }
        async fn execute_tool(&self, _name: &str, _params: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    let registry = ToolRegistry::new();
    let err = registry.register_adapter(Arc::new(BadSchema)).unwrap_err();
    assert!(matches!(err, AdapterError::InvalidSchema { .. }));
    assert!(registry.is_empty());
}
