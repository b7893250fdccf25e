//! PowerLLM restricted script sandbox.
//!
//! This crate runs short scripts written in a restricted subset of Python
//! on behalf of a language model agent, against a home automation host.
//!
//! - **[`compiler`]** -- [`compile_restricted`] parses source and rejects
//!   forbidden constructs before anything runs.
//! - **[`interpreter`]** -- tree-walking evaluator; every attribute access,
//!   subscript, item write and augmented assignment goes through the
//!   [`guards`].
//! - **[`allowlist`]** -- which attributes of host objects a script may touch.
//! - **[`host`]** -- the [`Host`] traits the sandbox talks to, plus an
//!   in-memory implementation.
//! - **[`runtime`]** -- [`Sandbox`] is the main entry point: run a script,
//!   collect `output`, printed text and log records.
//! - **[`adapter`]** -- [`PythonCodeAdapter`] exposes the sandbox as an
//!   agent tool.
//!
//! Script values are single-threaded; [`Sandbox`] itself is `Send + Sync`
//! and runs every execution on a dedicated thread.

pub mod adapter;
pub mod allowlist;
pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod format;
pub mod guards;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod methods;
pub mod modules;
pub mod object;
pub mod ops;
pub mod parser;
pub mod runtime;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use adapter::PythonCodeAdapter;
pub use compiler::{CompiledProgram, compile_restricted};
pub use config::{PrintPolicy, SandboxConfig};
pub use diagnostics::LogRecord;
pub use error::{Result, SandboxError, ScriptException};
pub use host::memory::InMemoryHost;
pub use host::{EventBus, Host, HostError, JsonMap, ServiceRegistry, State, StateStore};
pub use runtime::{Execution, ExecutionFailure, Sandbox};
