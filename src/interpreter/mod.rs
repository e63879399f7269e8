//! Interpreter for compiled templates.
//!
//! A run executes the program's top-level invocations one at a time against a
//! [`Context`], reprocesses values that still contain function syntax,
//! attempts whole-program recovery for failures that look like they needed
//! more context, resolves the final text and hands it to the container.

mod delivery;
mod execute;
mod recovery;
mod reprocess;

use std::ops::Range;
use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument, debug, debug_span, error};

use crate::compiler::{CompiledProgram, function_syntax_spans, value_to_text};
use crate::context::Context;
use crate::native::Outcome;

pub(crate) use execute::resolve_field;
use execute::execute_function;
use reprocess::{reprocess_text, reprocess_value};

/// How a program pass ended.
pub(crate) enum Flow {
    /// Every invocation ran; one value per top-level slot
    Complete(Vec<Value>),
    /// A `Return` signal carried this value out
    Return(Value),
    /// A `Stop` signal ended the run
    Stop,
}

/// Run the context's program and deliver the result.
///
/// Returns the final text, or `None` when a gate rejected the invoker, a
/// `Stop` signal ended the run, or a native faulted.
pub async fn run(ctx: &mut Context) -> Option<String> {
    let span = debug_span!("forge_run", run_id = %ctx.run_id());
    run_program(ctx).instrument(span).await
}

async fn run_program(ctx: &mut Context) -> Option<String> {
    if !ctx.passes_gates() {
        debug!("Run rejected by command gates or restrictions");
        return None;
    }

    let program = Arc::clone(&ctx.runtime.program);
    let values = match execute_program(ctx, &program).await {
        Ok(Flow::Complete(values)) => values,
        Ok(Flow::Return(value)) => {
            debug!("Return signal ended the run");
            return Some(value_to_text(&value));
        }
        Ok(Flow::Stop) => {
            debug!("Stop signal ended the run");
            return None;
        }
        Err(err) => {
            error!(error = %err, "Run aborted");
            return None;
        }
    };

    let (mut content, spans) = program.template.resolve_spans(&values);
    if needs_final_pass(ctx, &content, &spans) {
        content = reprocess_text(ctx, content, program.depth).await;
    }

    if !ctx.runtime.do_not_send {
        if let Err(err) = delivery::deliver(ctx, content.clone()).await {
            error!(error = %err, "Delivery failed");
        }
    }
    Some(content)
}

/// Resolved text gets one more pass when a tag straddles segment boundaries.
///
/// A tag lying wholly inside one literal or one slot value is left alone: it
/// was escaped, is plain prose, or was already reprocessed with its slot.
fn needs_final_pass(ctx: &Context, content: &str, spans: &[Range<usize>]) -> bool {
    ctx.config().reprocess_enabled
        && function_syntax_spans(content).any(|tag| {
            !spans
                .iter()
                .any(|span| span.start <= tag.start && tag.end <= span.end)
        })
}

/// Execute every top-level invocation of `program` in order.
pub(crate) async fn execute_program(
    ctx: &mut Context,
    program: &CompiledProgram,
) -> anyhow::Result<Flow> {
    let mut values = Vec::with_capacity(program.functions.len());
    for (position, function) in program.functions.iter().enumerate() {
        let value = match execute_function(ctx, function).await? {
            Outcome::Success(value) if value.is_null() => value,
            Outcome::Success(value) => reprocess_value(ctx, value, program.depth).await,
            Outcome::Failure(failure) => {
                debug!(
                    function = %function.name,
                    message = %failure.message,
                    "Function did not succeed"
                );
                let mut value = ctx
                    .handle_not_success(function, &failure)
                    .unwrap_or_else(|| ctx.error_value());
                if recovery::should_recover(ctx, function, &value) {
                    if let Some(recovered) = recovery::recover(ctx, program, position).await {
                        value = recovered;
                    }
                }
                value
            }
            Outcome::Return(value) => return Ok(Flow::Return(value)),
            Outcome::Stop => return Ok(Flow::Stop),
        };
        values.push(value);
    }
    Ok(Flow::Complete(values))
}
