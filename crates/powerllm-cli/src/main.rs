//! CLI entry point for PowerLLM.
//!
//! This binary provides the `powerllm` command with subcommands for running
//! scripts through the code execution tool, checking them without running,
//! and listing the registered tools.

mod cli;
mod helpers;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use powerllm_adapters::ToolRegistry;
use powerllm_sandbox::{Host, InMemoryHost, Sandbox, adapter, compile_restricted};
use serde_json::Value;
use tracing::{error, info};

use crate::cli::{Cli, Commands};
use crate::helpers::CliConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    helpers::init_tracing("info", config.logging.format);

    match cli.command {
        Commands::Exec {
            script,
            data,
            data_file,
            states,
            pretty,
        } => {
            let source = helpers::read_script(&script)?;
            let data = helpers::read_data(data.as_deref(), data_file.as_deref())?;
            let host = helpers::build_host(states.as_deref())?;
            cmd_exec(config, host, source, data, pretty).await
        }
        Commands::Check { script } => cmd_check(&helpers::read_script(&script)?),
        Commands::Tools => cmd_tools(config),
    }
}

/// Build a registry holding the code tool for `host`.
fn build_registry(config: &CliConfig, host: InMemoryHost) -> Result<ToolRegistry> {
    let registry = ToolRegistry::new();
    let sandbox = Sandbox::new(Arc::new(host) as Arc<dyn Host>, config.sandbox.clone());
    adapter::register(&registry, sandbox).context("failed to register the code tool")?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Subcommand: exec
// ---------------------------------------------------------------------------

async fn cmd_exec(
    config: CliConfig,
    host: InMemoryHost,
    source: String,
    data: Option<Value>,
    pretty: bool,
) -> Result<ExitCode> {
    let registry = build_registry(&config, host)?;
    let mut params = serde_json::json!({ "source": source });
    if let Some(data) = data {
        params["data"] = data;
    }

    info!(tool = %config.sandbox.tool_name, "running script");
    let result = registry.call(&config.sandbox.tool_name, params).await?;

    let text = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{text}");

    if let Some(kind) = result.get("error").and_then(Value::as_str) {
        error!(kind, "script failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

fn cmd_check(source: &str) -> Result<ExitCode> {
    let compiled = compile_restricted(source);
    for warning in &compiled.warnings {
        println!("  warning: {warning}");
    }
    for err in &compiled.errors {
        println!("  error: {err}");
    }
    if compiled.errors.is_empty() {
        println!("  OK");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

fn cmd_tools(config: CliConfig) -> Result<ExitCode> {
    let registry = build_registry(&config, InMemoryHost::new())?;
    for definition in registry.definitions() {
        println!("{}", definition.name);
        println!("  {}", definition.description);
        println!(
            "  parameters: {}",
            serde_json::to_string_pretty(&definition.parameters)?
        );
    }
    Ok(ExitCode::SUCCESS)
}
