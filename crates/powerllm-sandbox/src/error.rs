//! Sandbox error types.
//!
//! All sandbox subsystems surface errors through [`SandboxError`]. Script
//! level exceptions (`ValueError`, `KeyError`, ...) travel as
//! [`SandboxError::Exception`] so that `try`/`except` can catch them, while
//! guard violations travel as [`SandboxError::Violation`] and are never
//! catchable from inside a script.

use std::fmt;

use crate::host::HostError;

/// An exception raised inside a script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptException {
    /// Exception kind name, e.g. `ValueError`.
    pub kind: String,
    /// Rendered message (`str(exc)` inside the script).
    pub message: String,
}

impl ScriptException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Unified error type for the script sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The source failed to parse or failed static validation.
    #[error("Compile error: {}", .errors.join(", "))]
    Compile { errors: Vec<String> },

    /// A guard hook refused an operation.
    #[error("{0}")]
    Violation(String),

    /// An exception raised by the script or by a builtin it called.
    #[error("{0}")]
    Exception(ScriptException),

    /// A host operation (state write, service call) failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The sandbox configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// The interpreter met a tree it should never see.
    #[error("internal interpreter error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the sandbox crate.
pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Build a script exception of the given kind.
    pub fn exception(kind: &str, message: impl Into<String>) -> Self {
        Self::Exception(ScriptException::new(kind, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::exception("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::exception("ValueError", message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::exception("IndexError", message)
    }

    /// `KeyError` whose message is the repr of the missing key.
    pub fn key_error(key_repr: impl Into<String>) -> Self {
        Self::exception("KeyError", key_repr)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::exception("AttributeError", message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::exception("NameError", format!("name '{name}' is not defined"))
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::exception("ZeroDivisionError", message)
    }

    pub fn overflow() -> Self {
        Self::exception("OverflowError", "integer overflow")
    }

    pub fn import_error(name: &str) -> Self {
        Self::exception("ImportError", format!("Module {name} not found"))
    }

    pub fn violation(message: impl Into<String>) -> Self {
        Self::Violation(message.into())
    }

    /// The exception kind name as reported in tool results.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Compile { .. } | Self::Violation(_) => "ScriptError".to_string(),
            Self::Exception(exc) => exc.kind.clone(),
            Self::Host(err) => err.kind_name().to_string(),
            Self::Config(_) => "ConfigError".to_string(),
            Self::Internal(_) => "InternalError".to_string(),
        }
    }

    /// The error as a catchable script exception, if scripts may catch it.
    pub fn as_catchable(&self) -> Option<ScriptException> {
        match self {
            Self::Exception(exc) => Some(exc.clone()),
            Self::Host(err) => Some(ScriptException::new(err.kind_name(), err.to_string())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Exception hierarchy
// ---------------------------------------------------------------------------

/// `(kind, parent)` pairs for every exception kind a script can name or
/// receive.
const EXCEPTION_PARENTS: &[(&str, &str)] = &[
    ("Exception", "BaseException"),
    ("ArithmeticError", "Exception"),
    ("ZeroDivisionError", "ArithmeticError"),
    ("OverflowError", "ArithmeticError"),
    ("LookupError", "Exception"),
    ("KeyError", "LookupError"),
    ("IndexError", "LookupError"),
    ("ValueError", "Exception"),
    ("JSONDecodeError", "ValueError"),
    ("TypeError", "Exception"),
    ("AttributeError", "Exception"),
    ("NameError", "Exception"),
    ("UnboundLocalError", "NameError"),
    ("RuntimeError", "Exception"),
    ("RecursionError", "RuntimeError"),
    ("NotImplementedError", "RuntimeError"),
    ("AssertionError", "Exception"),
    ("ImportError", "Exception"),
    ("StopIteration", "Exception"),
    ("PatternError", "Exception"),
    ("HomeAssistantError", "Exception"),
    ("ServiceNotFound", "HomeAssistantError"),
    ("InvalidEntityFormatError", "HomeAssistantError"),
];

/// Exception kinds bound as builtins.
pub const BUILTIN_EXCEPTIONS: &[&str] = &[
    "Exception",
    "ArithmeticError",
    "ZeroDivisionError",
    "OverflowError",
    "LookupError",
    "KeyError",
    "IndexError",
    "ValueError",
    "TypeError",
    "AttributeError",
    "NameError",
    "UnboundLocalError",
    "RuntimeError",
    "RecursionError",
    "NotImplementedError",
    "AssertionError",
    "ImportError",
    "StopIteration",
];

/// Whether `kind` is `base` or derives from it.
pub fn is_subclass(kind: &str, base: &str) -> bool {
    let mut current = kind;
    loop {
        if current == base {
            return true;
        }
        match EXCEPTION_PARENTS.iter().find(|(name, _)| *name == current) {
            Some((_, parent)) => current = parent,
            // Unknown kinds are treated as direct `Exception` subclasses.
            None if current != "BaseException" && current != "Exception" => current = "Exception",
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_joins_messages() {
        let err = SandboxError::Compile {
            errors: vec!["Line 1: a".into(), "Line 2: b".into()],
        };
        assert_eq!(err.to_string(), "Compile error: Line 1: a, Line 2: b");
        assert_eq!(err.kind_name(), "ScriptError");
    }

    #[test]
    fn exception_display_and_kind() {
        let err = SandboxError::value_error("bad value");
        assert_eq!(err.to_string(), "ValueError: bad value");
        assert_eq!(err.kind_name(), "ValueError");
    }

    #[test]
    fn violations_are_not_catchable() {
        assert!(SandboxError::violation("nope").as_catchable().is_none());
        assert!(SandboxError::type_error("x").as_catchable().is_some());
    }

    #[test]
    fn hierarchy_lookup() {
        assert!(is_subclass("KeyError", "LookupError"));
        assert!(is_subclass("KeyError", "Exception"));
        assert!(is_subclass("ZeroDivisionError", "ArithmeticError"));
        assert!(!is_subclass("ValueError", "LookupError"));
        assert!(is_subclass("ServiceNotFound", "Exception"));
        assert!(is_subclass("SomethingNew", "Exception"));
        assert!(!is_subclass("Exception", "ValueError"));
    }
}
