//! Sandbox entry point.
//!
//! [`Sandbox::execute`] runs one script: compile, build a fresh environment,
//! interpret, then collect `output`, printed text and log records.
//! [`Sandbox::run_tool`] wraps that into the JSON envelope returned to the
//! agent, translating every failure into an `error` descriptor that still
//! carries whatever the script printed and logged before it failed.
//!
//! Script values are single-threaded, so each execution runs on its own
//! scoped thread with a stack large enough for the configured call depth.
//! Nothing survives between executions.

use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use tracing::{debug, info};

use crate::compiler::{PRINT_WARNING, compile_restricted};
use crate::config::SandboxConfig;
use crate::diagnostics::{LogRecord, ScriptLogger};
use crate::environment::{Environment, OUTPUT_NAME};
use crate::error::{Result, SandboxError};
use crate::host::Host;
use crate::interpreter::Interpreter;
use crate::value::to_json;

/// Stack size of the interpreter thread.
const INTERPRETER_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Error kind reported for compile failures.
pub const SCRIPT_ERROR: &str = "ScriptError";
/// Error kind reported for guard violations.
pub const VALIDATION_ERROR: &str = "ServiceValidationError";
/// Error kind reported for every other failure.
pub const EXECUTION_ERROR: &str = "HomeAssistantError";

/// Parameters accepted by the code tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParams {
    pub source: String,
    #[serde(default)]
    pub data: Option<Json>,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// The `output` mapping as left by the script.
    pub output: Json,
    /// Text written through `print`, if any.
    pub printed: Option<String>,
    /// Records written through `logger`, oldest first.
    pub logs: Vec<LogRecord>,
    /// Non-fatal compiler diagnostics.
    pub warnings: Vec<String>,
}

impl Execution {
    /// The success envelope: `{output, printed?, logs?}`.
    ///
    /// `output` is left out when the script printed something and never
    /// wrote to it.
    pub fn to_tool_result(&self) -> Json {
        let mut result = Map::new();
        let output_empty = self.output.as_object().is_some_and(Map::is_empty);
        if let Some(printed) = &self.printed {
            if !output_empty {
                result.insert("output".into(), self.output.clone());
            }
            result.insert("printed".into(), Json::String(printed.clone()));
        } else {
            result.insert("output".into(), self.output.clone());
        }
        if !self.logs.is_empty() {
            result.insert("logs".into(), json!(self.logs));
        }
        Json::Object(result)
    }
}

/// A failed run, with the diagnostics the script produced before failing.
#[derive(Debug)]
pub struct ExecutionFailure {
    pub error: SandboxError,
    pub printed: Option<String>,
    pub logs: Vec<LogRecord>,
}

impl ExecutionFailure {
    /// The failure envelope: `{error, error_text, printed?, logs?}`.
    pub fn to_tool_result(&self) -> Json {
        let mut result = error_result(&self.error);
        if let Json::Object(map) = &mut result {
            if let Some(printed) = &self.printed {
                map.insert("printed".into(), Json::String(printed.clone()));
            }
            if !self.logs.is_empty() {
                map.insert("logs".into(), json!(self.logs));
            }
        }
        result
    }
}

impl From<SandboxError> for ExecutionFailure {
    fn from(error: SandboxError) -> Self {
        Self {
            error,
            printed: None,
            logs: Vec::new(),
        }
    }
}

/// The failure envelope for `err`: `{error, error_text}`.
pub fn error_result(err: &SandboxError) -> Json {
    let (kind, text) = match err {
        SandboxError::Compile { .. } => (SCRIPT_ERROR, err.to_string()),
        SandboxError::Violation(message) => {
            (VALIDATION_ERROR, format!("Error executing script: {message}"))
        }
        SandboxError::Exception(exc) => (
            EXECUTION_ERROR,
            format!("Error executing script ({}): {}", exc.kind, exc.message),
        ),
        other => (
            EXECUTION_ERROR,
            format!("Error executing script ({}): {other}", other.kind_name()),
        ),
    };
    json!({ "error": kind, "error_text": text })
}

/// Runs scripts against one host.
pub struct Sandbox {
    host: Arc<dyn Host>,
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(host: Arc<dyn Host>, config: SandboxConfig) -> Self {
        Self { host, config }
    }

    /// A sandbox with the default configuration.
    pub fn with_defaults(host: Arc<dyn Host>) -> Self {
        Self::new(host, SandboxConfig::default())
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn host(&self) -> Arc<dyn Host> {
        Arc::clone(&self.host)
    }

    /// Compile and run `source` with the optional `data` mapping.
    pub fn execute(&self, source: &str, data: Option<&Json>) -> Result<Execution> {
        self.execute_reporting(source, data).map_err(|failure| failure.error)
    }

    /// Like [`Sandbox::execute`], but a failure keeps the printed text and
    /// log records written before it.
    pub fn execute_reporting(
        &self,
        source: &str,
        data: Option<&Json>,
    ) -> std::result::Result<Execution, ExecutionFailure> {
        info!(source_len = source.len(), "executing script");
        let execution = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name("powerllm-script".into())
                .stack_size(INTERPRETER_STACK_SIZE)
                .spawn_scoped(scope, || self.execute_here(source, data))
                .map_err(|e| SandboxError::Internal(format!("failed to start interpreter: {e}")))?
                .join()
                .map_err(|_| SandboxError::Internal("interpreter thread panicked".into()))?
        })?;
        debug!(output = %execution.output, "script finished");
        Ok(execution)
    }

    /// Run the tool with JSON parameters and return the result envelope.
    ///
    /// Never fails: malformed parameters and script failures both come back
    /// as `{error, error_text}`.
    pub fn run_tool(&self, params: Json) -> Json {
        let params: ToolParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return json!({
                    "error": EXECUTION_ERROR,
                    "error_text": format!("Invalid tool parameters: {e}"),
                });
            }
        };
        self.python_code_execute(&params.source, params.data.as_ref())
    }

    /// `execute`, translated into the tool result envelope.
    pub fn python_code_execute(&self, source: &str, data: Option<&Json>) -> Json {
        match self.execute_reporting(source, data) {
            Ok(execution) => execution.to_tool_result(),
            Err(failure) => {
                let err = &failure.error;
                debug!(kind = %err.kind_name(), error = %err, "script failed");
                failure.to_tool_result()
            }
        }
    }

    /// Body of [`Sandbox::execute`], run on the interpreter thread.
    fn execute_here(
        &self,
        source: &str,
        data: Option<&Json>,
    ) -> std::result::Result<Execution, ExecutionFailure> {
        let compiled = compile_restricted(source);
        if !compiled.errors.is_empty() {
            return Err(SandboxError::Compile {
                errors: compiled.errors,
            }
            .into());
        }
        let program = compiled
            .program
            .ok_or_else(|| SandboxError::Internal("compiler produced no program".into()))?;
        let warnings: Vec<String> = compiled
            .warnings
            .into_iter()
            .filter(|w| w != PRINT_WARNING)
            .collect();

        let logger = Rc::new(ScriptLogger::new(self.config.capture_logs));
        if !warnings.is_empty() {
            logger.warning(format!("Warning loading script: {}", warnings.join(", ")));
        }
        let env = Environment::build(
            Arc::clone(&self.host),
            data,
            Rc::clone(&logger),
            &self.config,
        )
        .map_err(|error| ExecutionFailure {
            error,
            printed: None,
            logs: logger.records(),
        })?;
        let globals = Rc::clone(&env.globals);
        let guards = Rc::clone(&env.guards);
        let mut interp = Interpreter::new(env);
        let outcome = interp.run(&program);

        let output = globals
            .get(OUTPUT_NAME)
            .map_or_else(|| Json::Object(Map::new()), |v| to_json(&v));
        let printed = guards.printed();
        let printed = (!printed.is_empty()).then_some(printed);
        // Functions close over the global scope; clearing it frees them.
        globals.clear();
        if let Err(error) = outcome {
            return Err(ExecutionFailure {
                error,
                printed,
                logs: logger.records(),
            });
        }

        Ok(Execution {
            output,
            printed,
            logs: logger.records(),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;

    fn sandbox() -> Sandbox {
        Sandbox::with_defaults(Arc::new(InMemoryHost::new()))
    }

    #[test]
    fn literal_output_is_returned() {
        let result = sandbox().python_code_execute("output[\"test\"] = \"passed\"", None);
        assert_eq!(result, json!({"output": {"test": "passed"}}));
    }

    #[test]
    fn compile_errors_use_the_script_error_kind() {
        let result = sandbox().python_code_execute("output[\"a\" = 1", None);
        assert_eq!(result["error"], "ScriptError");
        assert!(result.get("output").is_none());
        assert!(result["error_text"].as_str().unwrap().starts_with("Compile error: "));
    }

    #[test]
    fn printed_text_replaces_empty_output() {
        let result = sandbox().python_code_execute("print(\"hi\")", None);
        assert_eq!(result, json!({"printed": "hi\n"}));
    }

    #[test]
    fn error_envelopes() {
        let violation = error_result(&SandboxError::violation("nope"));
        assert_eq!(
            violation,
            json!({"error": "ServiceValidationError", "error_text": "Error executing script: nope"})
        );
        let exc = error_result(&SandboxError::zero_division("division by zero"));
        assert_eq!(
            exc["error_text"],
            "Error executing script (ZeroDivisionError): division by zero"
        );
    }

    #[test]
    fn malformed_tool_params() {
        let result = sandbox().run_tool(json!({"code": "x"}));
        assert_eq!(result["error"], "HomeAssistantError");
    }
}
