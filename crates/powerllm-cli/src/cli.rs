//! CLI argument definitions for PowerLLM.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// PowerLLM -- restricted script sandbox for language model agents.
#[derive(Parser)]
#[command(
    name = "powerllm",
    version,
    about = "PowerLLM -- restricted script sandbox",
    long_about = "Runs restricted Python-subset scripts the way an agent would through the \
                  code execution tool, against an in-memory home automation host."
)]
pub struct Cli {
    /// Configuration file. Defaults to `config/default.toml` when present.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script through the code execution tool and print the result.
    Exec {
        /// Script file, or `-` to read from stdin.
        script: PathBuf,

        /// JSON object passed to the script as `data`.
        #[arg(long, conflicts_with = "data_file")]
        data: Option<String>,

        /// File holding the JSON object passed as `data`.
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// JSON file of initial entity states,
        /// `{"light.kitchen": {"state": "on", "attributes": {...}}}`.
        #[arg(long)]
        states: Option<PathBuf>,

        /// Pretty-print the result.
        #[arg(long, short)]
        pretty: bool,
    },

    /// Compile a script without running it and report diagnostics.
    Check {
        /// Script file, or `-` to read from stdin.
        script: PathBuf,
    },

    /// List the registered tools and their parameter schemas.
    Tools,
}
