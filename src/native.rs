//! Native function contract
//!
//! The engine knows nothing about individual functions beyond their
//! registration metadata ([`FunctionDefinition`]) and the [`NativeFunction`]
//! execution contract. Everything else (the hundreds of platform natives)
//! lives outside this crate and plugs in through these types.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compiler::CompiledFunction;
use crate::compiler::template::value_to_text;
use crate::context::Context;
use crate::interpreter;

/// One entry of an argument schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Name used in diagnostics
    pub name: String,
    /// Whether the argument must be supplied
    pub required: bool,
    /// Parse the field as a binary comparison
    pub condition: bool,
    /// Variable-length trailing list; repeats while `;` follows
    pub rest: bool,
}

impl FieldSpec {
    /// Required plain field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            condition: false,
            rest: false,
        }
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Mark the field as a condition.
    pub fn condition(mut self) -> Self {
        self.condition = true;
        self
    }

    /// Mark the field as a rest field.
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }
}

/// Ordered argument schema of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    /// Whether `[...]` must follow the function name
    pub brackets: bool,
    /// Field specs in positional order
    pub fields: Vec<FieldSpec>,
}

/// Registration metadata for a native function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Canonical lower-case name including the `$` prefix
    pub name: String,
    /// Alternative names, normalised like `name`
    pub aliases: Vec<String>,
    /// Argument schema; `None` means the function never takes brackets
    pub args: Option<ArgumentSchema>,
    /// Resolve every field before calling the native
    pub unwrap: bool,
}

impl FunctionDefinition {
    /// Definition with no arguments.
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            aliases: Vec::new(),
            args: None,
            unwrap: true,
        }
    }

    /// Add an alias.
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(normalize_name(alias));
        self
    }

    /// Declare an argument schema.
    pub fn args(mut self, brackets: bool, fields: Vec<FieldSpec>) -> Self {
        self.args = Some(ArgumentSchema { brackets, fields });
        self
    }

    /// Leave fields unresolved; the native resolves them through [`Call::field`].
    pub fn lazy(mut self) -> Self {
        self.unwrap = false;
        self
    }

    /// Names this definition answers to (canonical first).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Lower-case a function name and make sure it carries the `$` prefix.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    if lowered.starts_with('$') {
        lowered
    } else {
        format!("${lowered}")
    }
}

/// Failed execution with an optional replacement value.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Human-readable reason
    pub message: String,
    /// Value the function produced despite failing
    pub value: Option<Value>,
}

/// Result of executing a native function.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Produced a value
    Success(Value),
    /// Did not succeed
    Failure(Failure),
    /// Abort the run and yield this value
    Return(Value),
    /// Abort the run without output
    Stop,
}

impl Outcome {
    /// Successful outcome.
    pub fn success(value: impl Into<Value>) -> Self {
        Outcome::Success(value.into())
    }

    /// Failure without a replacement value.
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(Failure {
            message: message.into(),
            value: None,
        })
    }

    /// Failure that still carries a value.
    pub fn failure_with(message: impl Into<String>, value: impl Into<Value>) -> Self {
        Outcome::Failure(Failure {
            message: message.into(),
            value: Some(value.into()),
        })
    }

    /// Whether the outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Carries a non-success outcome of a nested function up through `?`.
///
/// Argument resolution raises this when a nested function fails or signals
/// control flow; the executor turns it back into the enclosing function's
/// outcome.
#[derive(Debug)]
pub struct Interrupt(pub Outcome);

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Outcome::Success(_) => write!(f, "nested function succeeded"),
            Outcome::Failure(failure) => write!(f, "nested function failed: {}", failure.message),
            Outcome::Return(_) => write!(f, "return signal"),
            Outcome::Stop => write!(f, "stop signal"),
        }
    }
}

impl std::error::Error for Interrupt {}

/// A single invocation handed to a native.
pub struct Call<'a> {
    /// The compiled invocation
    pub function: &'a CompiledFunction,
    /// Resolved arguments (empty for lazy natives)
    pub args: Vec<Value>,
}

impl<'a> Call<'a> {
    /// Resolved argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Argument rendered as text; missing arguments render empty.
    pub fn text(&self, index: usize) -> String {
        self.args.get(index).map(value_to_text).unwrap_or_default()
    }

    /// Number of fields written at the call site.
    pub fn field_count(&self) -> usize {
        self.function.fields.as_ref().map_or(0, Vec::len)
    }

    /// Resolve one field on demand.
    ///
    /// Nested failures and control signals surface as an [`Interrupt`] error,
    /// so natives can simply propagate them with `?`.
    pub async fn field(&self, ctx: &mut Context, index: usize) -> anyhow::Result<Value> {
        match self.function.fields.as_ref().and_then(|fields| fields.get(index)) {
            Some(field) => interpreter::resolve_field(ctx, field).await,
            None => Ok(Value::Null),
        }
    }
}

/// Execution contract implemented by every native function.
#[async_trait(?Send)]
pub trait NativeFunction: Send + Sync {
    /// Registration metadata
    fn definition(&self) -> &FunctionDefinition;

    /// Execute against the run's context.
    async fn execute(&self, ctx: &mut Context, call: Call<'_>) -> anyhow::Result<Outcome>;
}

/// Native backed by a synchronous closure.
pub struct FnNative<F> {
    definition: FunctionDefinition,
    handler: F,
}

#[async_trait(?Send)]
impl<F> NativeFunction for FnNative<F>
where
    F: Fn(&mut Context, Call<'_>) -> anyhow::Result<Outcome> + Send + Sync,
{
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &mut Context, call: Call<'_>) -> anyhow::Result<Outcome> {
        (self.handler)(ctx, call)
    }
}

/// Wrap a closure as a shareable native function.
pub fn from_fn<F>(definition: FunctionDefinition, handler: F) -> Arc<dyn NativeFunction>
where
    F: Fn(&mut Context, Call<'_>) -> anyhow::Result<Outcome> + Send + Sync + 'static,
{
    Arc::new(FnNative {
        definition,
        handler,
    })
}
