//! Whole-program recovery for failed functions.
//!
//! Some functions only fail because they ran without the rest of the program
//! around them (a JSON builder reading a variable set later, say). Recovery
//! recompiles the run's original template, replays it with the failing
//! function marked, and uses what that replay produces for the failed slot.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use super::execute::execute_function;
use super::reprocess::is_malformed_json_with_functions;
use crate::compiler::{CompiledFunction, CompiledProgram, compile_at, contains_function_syntax};
use crate::context::{Context, RecoveryState};
use crate::native::Outcome;

/// Whether a failure with slot value `value` should trigger recovery.
pub(crate) fn should_recover(ctx: &Context, function: &CompiledFunction, value: &Value) -> bool {
    let config = ctx.config();
    if !config.recovery_enabled
        || ctx.recovery().is_some()
        || ctx.recovery_attempts() >= config.max_recovery_attempts
    {
        return false;
    }

    if let Value::String(text) = value {
        if is_malformed_json_with_functions(text) {
            debug!(function = %function.name, "Failure value is JSON with unresolved functions");
            return true;
        }
        if contains_function_syntax(text) {
            debug!(function = %function.name, "Failure value has unresolved functions");
            return true;
        }
    }

    config.needs_full_context(&function.name)
}

/// Replay the run's whole template and return a replacement for slot
/// `position` of `program`.
///
/// `program` is either the run's top-level program or a fragment being
/// reprocessed. The top-level source is always replayed first so state the
/// failing function depends on is rebuilt; the failing program is then run
/// once more in isolation. `None` means recovery produced nothing usable and
/// the slot keeps its value.
pub(crate) async fn recover(
    ctx: &mut Context,
    program: &CompiledProgram,
    position: usize,
) -> Option<Value> {
    ctx.recovery_attempts += 1;
    let function_name = program
        .functions
        .get(position)
        .map(|function| function.name.clone())
        .unwrap_or_default();
    debug!(
        function = %function_name,
        attempt = ctx.recovery_attempts,
        "Attempting full program recovery"
    );

    let root = Arc::clone(&ctx.runtime.program);
    let top_level = std::ptr::eq(program, Arc::as_ptr(&root));
    let replay = match compile_at(
        ctx.registry(),
        &root.source,
        root.path.as_deref(),
        root.depth,
    ) {
        Ok(replay) => replay,
        Err(err) => {
            error!(error = %err, "Recovery recompile failed");
            return None;
        }
    };
    if top_level && replay.functions.is_empty() {
        return Some(Value::String(root.source.clone()));
    }

    let mut scope = RecoveryScope::enter(
        ctx,
        RecoveryState {
            function: function_name,
            position,
        },
    );
    let isolated = if top_level { &replay } else { program };
    replay_program(&mut scope, &replay, isolated, position, top_level).await
}

/// Holds a context in recovery mode; dropping it restores the previous state
/// even when the replay future is abandoned mid-way.
struct RecoveryScope<'a> {
    ctx: &'a mut Context,
    previous: Option<RecoveryState>,
}

impl<'a> RecoveryScope<'a> {
    fn enter(ctx: &'a mut Context, state: RecoveryState) -> Self {
        let previous = ctx.recovery.replace(state);
        Self { ctx, previous }
    }
}

impl Deref for RecoveryScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for RecoveryScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for RecoveryScope<'_> {
    fn drop(&mut self) {
        self.ctx.recovery = self.previous.take();
    }
}

async fn replay_program(
    ctx: &mut Context,
    replay: &CompiledProgram,
    isolated: &CompiledProgram,
    position: usize,
    top_level: bool,
) -> Option<Value> {
    let values = match replay_pass(ctx, replay).await {
        Ok(Some(values)) => values,
        Ok(None) => return None,
        Err(err) => {
            error!(error = %err, "Recovery replay failed");
            return None;
        }
    };
    let candidate = replay.resolve(&values);
    debug!(%candidate, "Recovery replay resolved");

    if position < isolated.functions.len() {
        match replay_pass(ctx, isolated).await {
            Ok(Some(values)) => {
                if let Some(value) = values.into_iter().nth(position) {
                    if !is_blank(&value) {
                        return Some(value);
                    }
                }
            }
            Ok(None) => {}
            Err(err) => debug!(error = %err, "Isolated recovery pass failed"),
        }
    }

    // The whole-template text only stands in for a top-level slot.
    top_level.then_some(Value::String(candidate))
}

/// Run every function once; failures become empty, control signals abandon
/// the replay.
async fn replay_pass(
    ctx: &mut Context,
    program: &CompiledProgram,
) -> anyhow::Result<Option<Vec<Value>>> {
    let mut values = Vec::with_capacity(program.functions.len());
    for function in &program.functions {
        match execute_function(ctx, function).await? {
            Outcome::Success(value) => values.push(value),
            Outcome::Failure(_) => values.push(Value::Null),
            Outcome::Return(_) | Outcome::Stop => return Ok(None),
        }
    }
    Ok(Some(values))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
