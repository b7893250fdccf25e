//! Shared helpers for the CLI: tracing setup, configuration and input
//! loading.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use powerllm_sandbox::{InMemoryHost, SandboxConfig};

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    logging: LoggingConfig,
}

/// Everything the CLI reads from its configuration file.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

impl CliConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let sandbox = SandboxConfig::from_toml_str(source)?;
        let file: ConfigFile = toml::from_str(source).context("invalid [logging] section")?;
        Ok(Self {
            sandbox,
            logging: file.logging,
        })
    }

    /// Load `path`, or the default file when present, or built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("invalid config {}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so stdout carries only the tool result.
pub fn init_tracing(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => builder.with_target(false).compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Read a script from `path`, or stdin when `path` is `-`.
pub fn read_script(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read script from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))
}

/// Resolve the `data` argument from inline JSON or a file.
pub fn read_data(inline: Option<&str>, file: Option<&Path>) -> Result<Option<Value>> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_owned(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read data file {}", path.display()))?,
        (None, None) => return Ok(None),
    };
    let data: Value = serde_json::from_str(&text).context("data is not valid JSON")?;
    if !data.is_object() {
        bail!("data must be a JSON object");
    }
    Ok(Some(data))
}

/// Build the in-memory host, seeded from a states file when given.
pub fn build_host(states: Option<&Path>) -> Result<InMemoryHost> {
    let host = InMemoryHost::new();
    if let Some(path) = states {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read states file {}", path.display()))?;
        let json: Value = serde_json::from_str(&text).context("states file is not valid JSON")?;
        let count = host.load_states(&json)?;
        tracing::info!(count, path = %path.display(), "states loaded");
    }
    Ok(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerllm_sandbox::{PrintPolicy, StateStore};
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn config_file_sections_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[sandbox]\nprint_policy = \"warn\"\n\n[logging]\nformat = \"json\"\n"
        )
        .unwrap();
        let config = CliConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.sandbox.print_policy, PrintPolicy::Warn);
        assert_eq!(config.sandbox.max_call_depth, 64);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn invalid_sandbox_section_is_rejected() {
        assert!(CliConfig::from_toml_str("[sandbox]\nmax_call_depth = 0\n").is_err());
    }

    #[test]
    fn data_must_be_an_object() {
        assert_eq!(
            read_data(Some("{\"a\": 1}"), None).unwrap(),
            Some(json!({"a": 1}))
        );
        assert!(read_data(Some("[1]"), None).is_err());
        assert!(read_data(None, None).unwrap().is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"b\": true}}").unwrap();
        assert_eq!(
            read_data(None, Some(file.path())).unwrap(),
            Some(json!({"b": true}))
        );
    }

    #[test]
    fn states_file_seeds_the_host() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!({"light.kitchen": {"state": "on", "attributes": {"brightness": 10}}})
        )
        .unwrap();
        let host = build_host(Some(file.path())).unwrap();
        let state = host.get("light.kitchen").unwrap();
        assert_eq!(state.state, "on");
        assert_eq!(state.attributes["brightness"], json!(10));
    }
}
