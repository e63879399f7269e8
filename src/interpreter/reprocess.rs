use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::{Flow, execute_program};
use crate::compiler::{self, contains_function_syntax, value_to_text};
use crate::context::Context;

/// Reprocess a value produced by a program compiled at `depth`.
///
/// Scalars pass through, strings with function syntax are parsed as JSON or
/// recompiled and run against the same context, containers are rebuilt child
/// by child. Faults keep the original value.
pub(crate) fn reprocess_value<'a>(
    ctx: &'a mut Context,
    value: Value,
    depth: usize,
) -> LocalBoxFuture<'a, Value> {
    async move {
        if !ctx.config().reprocess_enabled {
            return value;
        }
        match value {
            Value::String(text) => reprocess_string(ctx, text, depth).await,
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(reprocess_value(ctx, item, depth).await);
                }
                Value::Array(out)
            }
            Value::Object(entries) => {
                let mut out = Map::new();
                for (key, item) in entries {
                    let item = reprocess_value(ctx, item, depth).await;
                    out.insert(key, item);
                }
                Value::Object(out)
            }
            scalar => scalar,
        }
    }
    .boxed_local()
}

async fn reprocess_string(ctx: &mut Context, text: String, depth: usize) -> Value {
    if !contains_function_syntax(&text) {
        return Value::String(text);
    }

    if let Some(parsed) = parse_json_container(&text) {
        let processed = reprocess_value(ctx, parsed, depth).await;
        return match serde_json::to_string(&processed) {
            Ok(serialized) => Value::String(serialized),
            Err(err) => {
                error!(error = %err, "Failed to serialize reprocessed JSON, keeping value");
                Value::String(text)
            }
        };
    }

    Value::String(reprocess_text(ctx, text, depth).await)
}

/// Recompile `text` one level deeper and run it against `ctx`.
pub(crate) async fn reprocess_text(ctx: &mut Context, text: String, depth: usize) -> String {
    let max_depth = ctx.config().max_reprocess_depth;
    let compiled = compiler::reprocess(
        ctx.registry(),
        &text,
        ctx.runtime.program.path.as_deref(),
        depth,
        max_depth,
    );
    let program = match compiled {
        Ok(Some(program)) => program,
        Ok(None) => return text,
        Err(err) => {
            error!(error = %err, "Reprocessing compile failed, keeping value");
            return text;
        }
    };
    if program.functions.is_empty() {
        return text;
    }

    debug!(
        depth = program.depth,
        functions = program.functions.len(),
        "Reprocessing value"
    );
    ctx.record_discovered(&program);

    match execute_program(ctx, &program).await {
        Ok(Flow::Complete(values)) => program.resolve(&values),
        Ok(Flow::Return(value)) => value_to_text(&value),
        Ok(Flow::Stop) => {
            debug!("Stop signal while reprocessing, keeping value");
            text
        }
        Err(err) => {
            error!(error = %err, "Reprocessing failed, keeping value");
            text
        }
    }
}

fn parse_json_container(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(|value| value.is_object() || value.is_array())
}

/// Malformed JSON-looking text that still contains function syntax.
pub(crate) fn is_malformed_json_with_functions(text: &str) -> bool {
    let trimmed = text.trim();
    let bracketed = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    bracketed
        && contains_function_syntax(trimmed)
        && serde_json::from_str::<Value>(trimmed).is_err()
}
