//! Forge – compiler and re-entrant interpreter for `$function[...]` templates
//!
//! Chat-bot responses are written as text with function tags
//! (`Hello $username`, `$if[$get[count]>=3;many;few]`). This crate provides:
//! - A registry of native functions, matched longest-name-first and case-insensitively
//! - A single-pass compiler producing placeholder code, invocations and a resolve template
//! - An interpreter that runs invocations sequentially against a shared context
//! - Bounded reprocessing of produced values that still contain function syntax
//! - Whole-program recovery for failures that needed more context
//! - Delivery of the resolved content and container parts to a target

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Built-in session and control functions
pub mod builtins;
/// Template compiler
pub mod compiler;
/// Engine configuration
pub mod config;
/// Render state and delivery targets
pub mod container;
/// Execution context
pub mod context;
/// Engine facade with program cache
pub mod engine;
/// Error types
pub mod error;
/// Interpreter
pub mod interpreter;
/// Native function contract
pub mod native;
/// Function catalog and registry snapshots
pub mod registry;
/// Generic helpers
pub mod util;

// Re-export key types for convenience
pub use compiler::{CompiledFunction, CompiledProgram, compile};
pub use config::EngineConfig;
pub use container::{Container, Target};
pub use context::Context;
pub use engine::Engine;
pub use error::{CompileError, CompileErrorKind, EngineError, Result};
pub use interpreter::run;
pub use native::{Call, FieldSpec, FunctionDefinition, NativeFunction, Outcome, from_fn};
pub use registry::{FunctionCatalog, FunctionRegistry};

/// Current version of the Forge engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
