//! Sandbox configuration.
//!
//! [`SandboxConfig`] controls how a script run treats `print`, whether log
//! records are returned to the caller, and how deep script recursion may go.
//! Defaults are provided via [`Default`], a builder-style API allows callers
//! to customise individual fields, and the whole struct can be read from the
//! `[sandbox]` table of a TOML file.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// What happens when a script calls `print`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintPolicy {
    /// Collect printed text and return it as `printed`.
    #[default]
    Capture,
    /// Drop printed text and log a one-time warning pointing at `logger`.
    Warn,
}

/// Settings for the script sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Print handling.
    ///
    /// Default: **capture**.
    pub print_policy: PrintPolicy,

    /// Whether records written through `logger` are returned in the tool
    /// result.
    ///
    /// Default: **true**.
    pub capture_logs: bool,

    /// Maximum nesting of script function calls before `RecursionError`.
    ///
    /// Default: **64**.
    pub max_call_depth: usize,

    /// Name under which the code tool is registered.
    ///
    /// Default: **`python_code_execute`**.
    pub tool_name: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            print_policy: PrintPolicy::Capture,
            capture_logs: true,
            max_call_depth: 64,
            tool_name: "python_code_execute".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the print policy.
    pub fn with_print_policy(mut self, policy: PrintPolicy) -> Self {
        self.print_policy = policy;
        self
    }

    /// Enable or disable returning log records.
    pub fn with_capture_logs(mut self, capture: bool) -> Self {
        self.capture_logs = capture;
        self
    }

    /// Set the maximum script call depth.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Set the registered tool name.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    /// Read the `[sandbox]` table from a TOML document.
    ///
    /// A document without that table yields the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let table: toml::Table =
            toml::from_str(source).map_err(|e| SandboxError::Config(e.to_string()))?;
        let config = match table.get("sandbox") {
            Some(section) => section
                .clone()
                .try_into::<SandboxConfig>()
                .map_err(|e| SandboxError::Config(e.to_string()))?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_call_depth == 0 {
            return Err(SandboxError::Config(
                "max_call_depth must be at least 1".into(),
            ));
        }
        if self.tool_name.trim().is_empty() {
            return Err(SandboxError::Config("tool_name must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.print_policy, PrintPolicy::Capture);
        assert!(cfg.capture_logs);
        assert_eq!(cfg.max_call_depth, 64);
        assert_eq!(cfg.tool_name, "python_code_execute");
    }

    #[test]
    fn builder_chaining() {
        let cfg = SandboxConfig::new()
            .with_print_policy(PrintPolicy::Warn)
            .with_capture_logs(false)
            .with_max_call_depth(8)
            .with_tool_name("run_script");
        assert_eq!(cfg.print_policy, PrintPolicy::Warn);
        assert!(!cfg.capture_logs);
        assert_eq!(cfg.max_call_depth, 8);
        assert_eq!(cfg.tool_name, "run_script");
    }

    #[test]
    fn toml_section_is_read() {
        let cfg = SandboxConfig::from_toml_str(
            "[sandbox]\nprint_policy = \"warn\"\nmax_call_depth = 16\n",
        )
        .unwrap();
        assert_eq!(cfg.print_policy, PrintPolicy::Warn);
        assert_eq!(cfg.max_call_depth, 16);
        assert!(cfg.capture_logs);
    }

    #[test]
    fn missing_section_gives_defaults() {
        let cfg = SandboxConfig::from_toml_str("[other]\nkey = 1\n").unwrap();
        assert_eq!(cfg, SandboxConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(SandboxConfig::from_toml_str("[sandbox]\nmax_call_depth = 0\n").is_err());
        assert!(SandboxConfig::from_toml_str("[sandbox]\nprint_policy = \"shout\"\n").is_err());
        assert!(SandboxConfig::from_toml_str("not toml at all [").is_err());
    }
}
