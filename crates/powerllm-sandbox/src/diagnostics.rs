//! Call-scoped diagnostics.
//!
//! Every execution gets its own [`ScriptLogger`]. Records written through the
//! script's `logger` are kept in memory for the tool result and forwarded to
//! `tracing` under the `powerllm_sandbox::script` target. The logger is
//! dropped with the execution, so records never leak into another call.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::format::percent_format;
use crate::interpreter::Interpreter;
use crate::object::{Attr, ScriptObject};
use crate::value::{CallArgs, Value};

pub const DEBUG: u8 = 10;
pub const INFO: u8 = 20;
pub const WARNING: u8 = 30;
pub const ERROR: u8 = 40;
pub const CRITICAL: u8 = 50;

/// Name of the script logger, as shown in `repr(logger)`.
pub const LOGGER_NAME: &str = "powerllm.tools.python_code.script";

/// One record written by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: u8,
    pub msg: String,
}

/// In-memory log sink for one execution.
#[derive(Debug, Default)]
pub struct ScriptLogger {
    records: RefCell<Vec<LogRecord>>,
    capture: bool,
}

impl ScriptLogger {
    pub fn new(capture: bool) -> Self {
        Self {
            records: RefCell::new(Vec::new()),
            capture,
        }
    }

    pub fn log(&self, level: u8, msg: impl Into<String>) {
        let msg = msg.into();
        match level {
            ..=DEBUG => tracing::debug!(target: "powerllm_sandbox::script", "{msg}"),
            ..=INFO => tracing::info!(target: "powerllm_sandbox::script", "{msg}"),
            ..=WARNING => tracing::warn!(target: "powerllm_sandbox::script", "{msg}"),
            _ => tracing::error!(target: "powerllm_sandbox::script", level, "{msg}"),
        }
        if self.capture {
            self.records.borrow_mut().push(LogRecord { level, msg });
        }
    }

    pub fn warning(&self, msg: impl Into<String>) {
        self.log(WARNING, msg);
    }

    /// Records captured so far, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.borrow().clone()
    }
}

/// Level number for a `logging` level name.
pub fn level_from_name(name: &str) -> Option<u8> {
    Some(match name {
        "DEBUG" => DEBUG,
        "INFO" => INFO,
        "WARNING" | "WARN" => WARNING,
        "ERROR" => ERROR,
        "CRITICAL" | "FATAL" => CRITICAL,
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Script-facing handle
// ---------------------------------------------------------------------------

const METHODS: &[&str] = &[
    "debug",
    "info",
    "warning",
    "warn",
    "error",
    "critical",
    "fatal",
    "exception",
    "log",
    "isEnabledFor",
    "getEffectiveLevel",
];

/// The object bound to `logger` and returned by `logging.getLogger`.
pub struct LoggerHandle {
    sink: Rc<ScriptLogger>,
}

impl LoggerHandle {
    pub fn new(sink: Rc<ScriptLogger>) -> Self {
        Self { sink }
    }

    /// Render `msg % args` the way `logging` does when args are present.
    fn render(args: &[Value]) -> Result<String> {
        let Some((msg, rest)) = args.split_first() else {
            return Err(SandboxError::type_error("missing required argument: 'msg'"));
        };
        let text = msg.to_str();
        match rest {
            [] => Ok(text),
            [single @ Value::Dict(_)] => percent_format(&text, single),
            _ => percent_format(&text, &Value::tuple(rest.to_vec())),
        }
    }
}

impl ScriptObject for LoggerHandle {
    fn type_name(&self) -> &str {
        "Logger"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        match name {
            "name" => Some(Attr::Value(Value::from(LOGGER_NAME))),
            "level" => Some(Attr::Value(Value::Int(i64::from(DEBUG)))),
            _ if METHODS.contains(&name) => Some(Attr::Method),
            _ => None,
        }
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        args.allow_keywords(name, &["exc_info", "stack_info", "stacklevel", "extra"])?;
        let level = match name {
            "debug" => DEBUG,
            "info" => INFO,
            "warning" | "warn" => WARNING,
            "error" | "exception" => ERROR,
            "critical" | "fatal" => CRITICAL,
            "log" => {
                let level = args.required("log", 0, "level")?.as_int()?;
                let level = u8::try_from(level)
                    .map_err(|_| SandboxError::value_error(format!("invalid level {level}")))?;
                let msg = Self::render(args.positional.get(1..).unwrap_or_default())?;
                self.sink.log(level, msg);
                return Ok(Value::None);
            }
            "isEnabledFor" => return Ok(Value::Bool(true)),
            "getEffectiveLevel" => return Ok(Value::Int(i64::from(DEBUG))),
            other => {
                return Err(SandboxError::attribute_error(format!(
                    "'Logger' object has no attribute '{other}'"
                )));
            }
        };
        let msg = Self::render(&args.positional)?;
        self.sink.log(level, msg);
        Ok(Value::None)
    }

    fn repr(&self) -> String {
        format!("<Logger {LOGGER_NAME} (DEBUG)>")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_captured_in_order() {
        let logger = ScriptLogger::new(true);
        logger.log(INFO, "first");
        logger.warning("second");
        assert_eq!(
            logger.records(),
            vec![
                LogRecord {
                    level: INFO,
                    msg: "first".into()
                },
                LogRecord {
                    level: WARNING,
                    msg: "second".into()
                },
            ]
        );
    }

    #[test]
    fn capture_can_be_disabled() {
        let logger = ScriptLogger::new(false);
        logger.log(ERROR, "dropped");
        assert!(logger.records().is_empty());
    }

    #[test]
    fn message_rendering() {
        let args = vec![Value::from("%s has %d items"), Value::from("cart"), Value::Int(3)];
        assert_eq!(LoggerHandle::render(&args).unwrap(), "cart has 3 items");
        assert_eq!(
            LoggerHandle::render(&[Value::Int(5)]).unwrap(),
            "5"
        );
        assert!(LoggerHandle::render(&[]).is_err());
    }

    #[test]
    fn level_names() {
        assert_eq!(level_from_name("WARNING"), Some(30));
        assert_eq!(level_from_name("verbose"), None);
    }
}
