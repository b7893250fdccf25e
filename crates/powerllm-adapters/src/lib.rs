//! Tool adapters for PowerLLM.
//!
//! Every component that exposes callable tools to the language model agent
//! implements the [`Adapter`] trait defined in [`traits`].  Tools are made
//! available to the agent through an explicit [`ToolRegistry`], which holds
//! either native adapter tools or wrapped async functions.

pub mod error;
pub mod registry;
pub mod traits;

pub use error::{AdapterError, Result};
pub use registry::{FunctionTool, FunctionToolBuilder, ParamType, Tool, ToolFuture, ToolRegistry};
pub use traits::{Adapter, AdapterType, HealthStatus, ToolDefinition};
