//! Execution context
//!
//! One [`Context`] is owned by a run and mutated in place. Reprocessing and
//! failure recovery reuse it, so session variables written by one pass are
//! visible to the next.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::compiler::{CompiledFunction, CompiledProgram};
use crate::config::EngineConfig;
use crate::container::{Container, Target};
use crate::native::Failure;
use crate::registry::FunctionRegistry;

/// Command-level gates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInfo {
    /// Whether bot accounts may trigger the command
    pub allow_bots: bool,
    /// Whether the command only runs inside a guild
    pub guild_only: bool,
}

/// Who triggered the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invoker {
    /// User id
    pub user_id: String,
    /// Guild the run happens in, if any
    pub guild_id: Option<String>,
    /// Whether the user is a bot account
    pub is_bot: bool,
}

/// The program being run plus per-run options.
pub struct Runnable {
    /// Compiled program
    pub program: Arc<CompiledProgram>,
    /// Gates of the command that owns the program
    pub command: Option<CommandInfo>,
    /// Who triggered the run
    pub invoker: Invoker,
    /// Resolve without delivering
    pub do_not_send: bool,
    /// Delivery target
    pub target: Option<Box<dyn Target>>,
}

/// Marks a context as running a recovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryState {
    /// Name of the function whose failure triggered recovery
    pub function: String,
    /// Its position among the program's top-level invocations
    pub position: usize,
}

/// Replacement hook for failed functions; `None` means "not handled".
pub type FailureHook = Box<dyn FnMut(&CompiledFunction, &Failure) -> Option<Value>>;

/// Mutable state shared by every pass of a run.
pub struct Context {
    /// Program and run options
    pub runtime: Runnable,
    /// Render state
    pub container: Container,
    registry: FunctionRegistry,
    config: EngineConfig,
    keywords: HashMap<String, Value>,
    errors: Vec<String>,
    failure_hook: Option<FailureHook>,
    discovered: Vec<String>,
    pub(crate) recovery: Option<RecoveryState>,
    pub(crate) recovery_attempts: usize,
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Context {
    /// Context for running `program` with the given functions and config.
    pub fn new(
        program: Arc<CompiledProgram>,
        registry: FunctionRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            runtime: Runnable {
                program,
                command: None,
                invoker: Invoker::default(),
                do_not_send: false,
                target: None,
            },
            container: Container::default(),
            registry,
            config,
            keywords: HashMap::new(),
            errors: Vec::new(),
            failure_hook: None,
            discovered: Vec::new(),
            recovery: None,
            recovery_attempts: 0,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Set a session variable.
    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.insert(name.into(), value.into());
        self
    }

    /// Deliver through `target`.
    pub fn with_target(mut self, target: impl Target + 'static) -> Self {
        self.runtime.target = Some(Box::new(target));
        self
    }

    /// Set the invoker.
    pub fn with_invoker(mut self, invoker: Invoker) -> Self {
        self.runtime.invoker = invoker;
        self
    }

    /// Set the owning command's gates.
    pub fn with_command(mut self, command: CommandInfo) -> Self {
        self.runtime.command = Some(command);
        self
    }

    /// Resolve without delivering.
    pub fn without_delivery(mut self) -> Self {
        self.runtime.do_not_send = true;
        self
    }

    /// Install a failure replacement hook.
    pub fn with_failure_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&CompiledFunction, &Failure) -> Option<Value> + 'static,
    {
        self.failure_hook = Some(Box::new(hook));
        self
    }

    /// Session variables.
    pub fn keywords(&self) -> &HashMap<String, Value> {
        &self.keywords
    }

    /// Read a session variable.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords.get(name)
    }

    /// Write a session variable.
    pub fn set_keyword(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.keywords.insert(name.into(), value.into());
    }

    /// Functions available to reprocessing and recovery.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Config snapshot this run uses.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Failures reported through the error channel.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Names of invocations found while reprocessing produced values.
    pub fn discovered(&self) -> &[String] {
        &self.discovered
    }

    pub(crate) fn record_discovered(&mut self, program: &CompiledProgram) {
        self.discovered.extend(program.function_names());
    }

    /// Set while a recovery pass runs.
    pub fn recovery(&self) -> Option<&RecoveryState> {
        self.recovery.as_ref()
    }

    /// Recovery attempts made so far in this run.
    pub fn recovery_attempts(&self) -> usize {
        self.recovery_attempts
    }

    /// Run identifier used in tracing spans.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// When the context was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Decide what a failed function's slot becomes.
    ///
    /// Returns `None` when the failure is not handled; the caller then uses
    /// [`Context::error_value`]. Without a hook, silent functions resolve
    /// empty and everything else is reported and keeps its failure value.
    pub fn handle_not_success(
        &mut self,
        function: &CompiledFunction,
        failure: &Failure,
    ) -> Option<Value> {
        if let Some(hook) = self.failure_hook.as_mut() {
            return hook(function, failure);
        }
        if function.silent {
            debug!(function = %function.name, "Silent function failed");
            return Some(Value::Null);
        }
        self.errors
            .push(format!("{}: {}", function.name, failure.message));
        failure.value.clone()
    }

    /// Generic value for unhandled failures.
    pub fn error_value(&self) -> Value {
        Value::Null
    }

    /// Whether the invoker may run this program at all.
    pub fn passes_gates(&self) -> bool {
        let invoker = &self.runtime.invoker;
        if let Some(command) = &self.runtime.command {
            if invoker.is_bot && !command.allow_bots {
                return false;
            }
            if command.guild_only && invoker.guild_id.is_none() {
                return false;
            }
        }
        // Allow-lists only apply to ids the run actually has; DMs carry no guild.
        if let Some(restrictions) = &self.config.restrictions {
            if !restrictions.user_ids.is_empty()
                && !invoker.user_id.is_empty()
                && !restrictions.user_ids.contains(&invoker.user_id)
            {
                return false;
            }
            if let Some(guild) = &invoker.guild_id {
                if !restrictions.guild_ids.is_empty() && !restrictions.guild_ids.contains(guild) {
                    return false;
                }
            }
        }
        true
    }
}
