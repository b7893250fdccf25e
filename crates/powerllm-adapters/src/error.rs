//! Adapter error types.
//!
//! All adapter and registry operations surface errors through
//! [`AdapterError`].  Each variant carries enough context for callers to
//! decide how to handle the failure without inspecting opaque strings.

/// Unified error type for PowerLLM tool adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// No tool with this name is registered or exposed by the adapter.
    #[error("tool not found: `{tool_name}`")]
    ToolNotFound { tool_name: String },

    /// The parameters supplied to a tool are invalid.
    #[error("invalid parameters for tool `{tool_name}`: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// The JSON schema attached to a tool could not be compiled.
    #[error("invalid schema for tool `{tool_name}`: {reason}")]
    InvalidSchema { tool_name: String, reason: String },

    /// A tool invocation failed.
    #[error("execution failed for tool `{tool_name}`: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_display() {
        let err = AdapterError::ToolNotFound {
            tool_name: "web_scrape".into(),
        };
        assert_eq!(err.to_string(), "tool not found: `web_scrape`");
    }

    #[test]
    fn invalid_params_display() {
        let err = AdapterError::InvalidParams {
            tool_name: "python_code_execute".into(),
            reason: "missing `source`".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid parameters for tool `python_code_execute`: missing `source`"
        );
    }

    #[test]
    fn serialization_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AdapterError::from(json_err);
        assert!(err.to_string().starts_with("serialization error:"));
    }
}
