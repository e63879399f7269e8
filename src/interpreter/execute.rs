use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::compiler::{CompiledFunction, Field, PlainField, value_to_text};
use crate::context::Context;
use crate::native::{Call, Interrupt, Outcome};

/// Execute one invocation: resolve its arguments, call the native, apply
/// the `!`/`@[...]` modifiers.
pub(crate) fn execute_function<'a>(
    ctx: &'a mut Context,
    function: &'a CompiledFunction,
) -> LocalBoxFuture<'a, anyhow::Result<Outcome>> {
    async move {
        debug!(function = %function.name, index = function.index, "Executing function");
        let result = invoke(ctx, function).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => match err.downcast::<Interrupt>() {
                Ok(Interrupt(outcome)) => outcome,
                Err(err) => return Err(err),
            },
        };
        Ok(apply_modifiers(function, outcome))
    }
    .boxed_local()
}

async fn invoke(ctx: &mut Context, function: &CompiledFunction) -> anyhow::Result<Outcome> {
    let native = function.native();
    let args = if native.definition().unwrap {
        match resolve_arguments(ctx, function).await? {
            Ok(args) => args,
            Err(outcome) => return Ok(outcome),
        }
    } else {
        Vec::new()
    };
    native.execute(ctx, Call { function, args }).await
}

fn apply_modifiers(function: &CompiledFunction, outcome: Outcome) -> Outcome {
    match outcome {
        Outcome::Success(_) if function.negated => Outcome::Success(Value::Null),
        Outcome::Success(Value::Array(items)) if function.count.is_some() => {
            let separator = function.count.as_deref().unwrap_or_default();
            let joined = items
                .iter()
                .map(value_to_text)
                .collect::<Vec<_>>()
                .join(separator);
            Outcome::Success(Value::String(joined))
        }
        other => other,
    }
}

/// Resolve every field against the schema.
///
/// Fields past a rest spec are gathered into one array argument. The inner
/// `Err` carries the outcome the call short-circuits to.
async fn resolve_arguments(
    ctx: &mut Context,
    function: &CompiledFunction,
) -> anyhow::Result<Result<Vec<Value>, Outcome>> {
    let definition = function.native().definition();
    let Some(schema) = &definition.args else {
        return Ok(Ok(Vec::new()));
    };
    let fields: &[Field] = function.fields.as_deref().unwrap_or_default();

    let mut args = Vec::with_capacity(schema.fields.len());
    let mut rest: Option<Vec<Value>> = None;
    for (position, field) in fields.iter().enumerate() {
        let spec_index = position.min(schema.fields.len().saturating_sub(1));
        let is_rest = schema.fields.get(spec_index).is_some_and(|spec| spec.rest);
        let value = resolve_field(ctx, field).await?;
        if is_rest {
            rest.get_or_insert_with(Vec::new).push(value);
        } else {
            args.push(value);
        }
    }
    if let Some(items) = rest {
        args.push(Value::Array(items));
    }

    for (position, spec) in schema.fields.iter().enumerate() {
        if spec.required && position >= args.len() {
            return Ok(Err(Outcome::failure(format!(
                "Missing required argument \"{}\" of {}",
                spec.name, function.name
            ))));
        }
    }
    Ok(Ok(args))
}

/// Resolve one field to a value.
///
/// Plain fields become strings; condition fields become booleans. A nested
/// invocation that does not succeed aborts with an [`Interrupt`].
pub(crate) async fn resolve_field(ctx: &mut Context, field: &Field) -> anyhow::Result<Value> {
    match field {
        Field::Plain(plain) => Ok(Value::String(resolve_plain(ctx, plain).await?)),
        Field::Condition(condition) => {
            let lhs = resolve_plain(ctx, &condition.lhs).await?;
            let rhs = match &condition.rhs {
                Some(rhs) => Some(resolve_plain(ctx, rhs).await?),
                None => None,
            };
            Ok(Value::Bool(condition.resolve(&lhs, rhs.as_deref())))
        }
    }
}

async fn resolve_plain(ctx: &mut Context, field: &PlainField) -> anyhow::Result<String> {
    let mut values = Vec::with_capacity(field.functions.len());
    for nested in &field.functions {
        match execute_function(ctx, nested).await? {
            Outcome::Success(value) => values.push(value),
            Outcome::Failure(_) if nested.silent => values.push(Value::Null),
            other => return Err(Interrupt(other).into()),
        }
    }
    Ok(field.resolve(&values))
}
