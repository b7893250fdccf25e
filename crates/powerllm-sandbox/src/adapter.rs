//! Tool adapter bridge.
//!
//! [`PythonCodeAdapter`] implements the [`Adapter`] trait for a
//! [`Sandbox`], exposing the single code execution tool to the agent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use powerllm_adapters::error::{AdapterError, Result};
use powerllm_adapters::registry::ToolRegistry;
use powerllm_adapters::traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};

use crate::host::Host;
use crate::runtime::Sandbox;

const TOOL_DESCRIPTION: &str = "Execute a restricted Python script against the home \
automation state and return its `output` dictionary. Only a safe subset of the language \
is available: no imports other than whitelisted modules, no private attributes and no \
file or network access. `hass` exposes states, services and the event bus; `data` holds \
the optional input mapping; `logger` records log lines; write results into `output`.";

/// Exposes a [`Sandbox`] as an agent tool.
pub struct PythonCodeAdapter {
    id: String,
    sandbox: Arc<Sandbox>,
}

impl PythonCodeAdapter {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            id: format!("sandbox:{}", sandbox.config().tool_name),
            sandbox: Arc::new(sandbox),
        }
    }

    /// Build the adapter around `host` with the default configuration.
    pub fn for_host(host: Arc<dyn Host>) -> Self {
        Self::new(Sandbox::with_defaults(host))
    }

    pub fn sandbox(&self) -> Arc<Sandbox> {
        Arc::clone(&self.sandbox)
    }

    fn tool_name(&self) -> &str {
        &self.sandbox.config().tool_name
    }

    /// JSON schema of the tool parameters.
    pub fn parameters_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Script source code."
                },
                "data": {
                    "type": ["object", "null"],
                    "description": "Input mapping available to the script as `data`."
                }
            },
            "required": ["source"]
        })
    }
}

#[async_trait]
impl Adapter for PythonCodeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Compute
    }

    async fn connect(&mut self) -> Result<()> {
        tracing::debug!(adapter = %self.id, "connect called (no-op for sandbox)");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        tracing::debug!(adapter = %self.id, "disconnect called (no-op for sandbox)");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: self.tool_name().to_owned(),
            description: TOOL_DESCRIPTION.to_owned(),
            parameters: Self::parameters_schema(),
        }]
    }

    /// Run the script on a blocking thread and return the result envelope.
    ///
    /// Script failures are part of the envelope, not adapter errors.
    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        if name != self.tool_name() {
            return Err(AdapterError::ToolNotFound {
                tool_name: name.to_owned(),
            });
        }
        tracing::debug!(adapter = %self.id, tool = %name, "executing tool via sandbox");

        let sandbox = Arc::clone(&self.sandbox);
        tokio::task::spawn_blocking(move || sandbox.run_tool(params))
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                tool_name: name.to_owned(),
                reason: format!("blocking task panicked: {e}"),
            })
    }
}

/// Register the code tool for `sandbox` in `registry`.
pub fn register(registry: &ToolRegistry, sandbox: Sandbox) -> Result<()> {
    registry.register_adapter(Arc::new(PythonCodeAdapter::new(sandbox)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::host::InMemoryHost;

    fn adapter() -> PythonCodeAdapter {
        PythonCodeAdapter::for_host(Arc::new(InMemoryHost::new()))
    }

    #[test]
    fn exposes_one_tool() {
        let tools = adapter().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "python_code_execute");
        assert_eq!(tools[0].parameters["required"], json!(["source"]));
    }

    #[test]
    fn tool_name_follows_config() {
        let sandbox = Sandbox::new(
            Arc::new(InMemoryHost::new()),
            SandboxConfig::default().with_tool_name("run_script"),
        );
        let adapter = PythonCodeAdapter::new(sandbox);
        assert_eq!(adapter.id(), "sandbox:run_script");
        assert_eq!(adapter.tools()[0].name, "run_script");
    }

    #[tokio::test]
    async fn executes_scripts() {
        let result = adapter()
            .execute_tool(
                "python_code_execute",
                json!({"source": "output['sum'] = data['a'] + 1", "data": {"a": 2}}),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"output": {"sum": 3}}));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let err = adapter().execute_tool("other", json!({})).await.unwrap_err();
        assert!(matches!(err, AdapterError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn health_is_always_good() {
        let mut adapter = adapter();
        adapter.connect().await.unwrap();
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
