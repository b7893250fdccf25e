//! Per-execution namespace.
//!
//! [`Environment::build`] assembles everything one script run can see: the
//! restricted builtins, the guard hooks under their conventional names, and
//! the injected `hass`, `data`, `logger` and `output` bindings. Nothing in an
//! environment is shared with another execution.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::builtins;
use crate::config::SandboxConfig;
use crate::diagnostics::{LoggerHandle, ScriptLogger};
use crate::error::{Result, SandboxError};
use crate::guards::{self, GuardedEnvironment, SandboxGuards};
use crate::host::Host;
use crate::host::objects::HassHandle;
use crate::interpreter::Scope;
use crate::value::{Dict, Value, from_json};

/// Name under which the host handle is bound.
pub const HOST_NAME: &str = "hass";
/// Name of the caller-supplied data mapping.
pub const DATA_NAME: &str = "data";
/// Name of the script logger.
pub const LOGGER_NAME: &str = "logger";
/// Name of the result mapping.
pub const OUTPUT_NAME: &str = "output";

pub struct Environment {
    pub globals: Rc<Scope>,
    pub builtins: HashMap<&'static str, Value>,
    pub guards: Rc<dyn GuardedEnvironment>,
    pub logger: Rc<ScriptLogger>,
    pub host: Arc<dyn Host>,
    pub max_call_depth: usize,
}

impl Environment {
    /// Build a fresh namespace around `host`.
    ///
    /// `data` must be a JSON object or `null`; `null` binds an empty dict.
    pub fn build(
        host: Arc<dyn Host>,
        data: Option<&serde_json::Value>,
        logger: Rc<ScriptLogger>,
        config: &SandboxConfig,
    ) -> Result<Self> {
        let data = match data {
            None | Some(serde_json::Value::Null) => Value::dict(Dict::new()),
            Some(object @ serde_json::Value::Object(_)) => from_json(object),
            Some(other) => {
                return Err(SandboxError::type_error(format!(
                    "data must be a mapping, not {}",
                    json_type(other)
                )));
            }
        };

        let globals = Scope::global();
        for (name, hook) in guards::hooks() {
            globals.set(name, hook);
        }
        globals.set(
            HOST_NAME,
            Value::object(HassHandle::new(Arc::clone(&host))),
        );
        globals.set(DATA_NAME, data);
        globals.set(
            LOGGER_NAME,
            Value::object(LoggerHandle::new(Rc::clone(&logger))),
        );
        globals.set(OUTPUT_NAME, Value::dict(Dict::new()));

        let guards: Rc<dyn GuardedEnvironment> =
            Rc::new(SandboxGuards::new(config.print_policy, Rc::clone(&logger)));

        Ok(Self {
            globals,
            builtins: builtins::builtins(),
            guards,
            logger,
            host,
            max_call_depth: config.max_call_depth,
        })
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "None",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "str",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use serde_json::json;

    fn build(data: Option<&serde_json::Value>) -> Result<Environment> {
        Environment::build(
            Arc::new(InMemoryHost::new()),
            data,
            Rc::new(ScriptLogger::new(true)),
            &SandboxConfig::default(),
        )
    }

    #[test]
    fn namespace_has_hooks_and_injected_names() {
        let env = build(None).unwrap();
        for name in ["_getattr_", "_getitem_", "_write_", "_inplacevar_", "_print_"] {
            assert!(env.globals.get(name).is_some(), "missing hook {name}");
        }
        assert_eq!(env.globals.get(OUTPUT_NAME).unwrap().repr(), "{}");
        assert_eq!(env.globals.get(DATA_NAME).unwrap().repr(), "{}");
        assert!(env.globals.get(HOST_NAME).is_some());
        assert!(env.globals.get(LOGGER_NAME).is_some());
        assert!(env.builtins.contains_key("sorted"));
        assert_eq!(env.max_call_depth, 64);
    }

    #[test]
    fn data_is_converted_from_json() {
        let data = json!({"items": [1, 2], "name": "x"});
        let env = build(Some(&data)).unwrap();
        assert_eq!(
            env.globals.get(DATA_NAME).unwrap().repr(),
            "{'items': [1, 2], 'name': 'x'}"
        );
    }

    #[test]
    fn non_mapping_data_is_rejected() {
        let err = build(Some(&json!([1]))).err().unwrap();
        assert_eq!(err.to_string(), "TypeError: data must be a mapping, not list");
    }
}
