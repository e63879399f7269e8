//! Built-in functions
//!
//! A small native set registered through the same contract as external
//! natives: session variables, a lazy conditional and the two control
//! signals.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::compiler::value_to_text;
use crate::context::Context;
use crate::native::{Call, FieldSpec, FunctionDefinition, NativeFunction, Outcome, from_fn};

/// Every built-in function.
pub fn all() -> Vec<Arc<dyn NativeFunction>> {
    vec![let_var(), get_var(), Arc::new(If::new()), return_value(), stop()]
}

/// `$let[name;value]` stores a session variable.
pub fn let_var() -> Arc<dyn NativeFunction> {
    from_fn(
        FunctionDefinition::new("$let")
            .alias("$setvar")
            .args(true, vec![FieldSpec::new("name"), FieldSpec::new("value")]),
        |ctx, call| {
            let name = call.text(0);
            if name.is_empty() {
                return Ok(Outcome::failure("Variable name must not be empty"));
            }
            let value = call.arg(1).cloned().unwrap_or(Value::Null);
            ctx.set_keyword(name, value);
            Ok(Outcome::Success(Value::Null))
        },
    )
}

/// `$get[name]` reads a session variable; unknown names read empty.
pub fn get_var() -> Arc<dyn NativeFunction> {
    from_fn(
        FunctionDefinition::new("$get")
            .alias("$getvar")
            .args(true, vec![FieldSpec::new("name")]),
        |ctx, call| {
            let value = ctx.keyword(&call.text(0)).cloned().unwrap_or(Value::Null);
            Ok(Outcome::Success(value))
        },
    )
}

/// `$return[value]` ends the run with a value.
pub fn return_value() -> Arc<dyn NativeFunction> {
    from_fn(
        FunctionDefinition::new("$return")
            .args(false, vec![FieldSpec::new("value").optional()]),
        |_ctx, call| Ok(Outcome::Return(call.arg(0).cloned().unwrap_or(Value::Null))),
    )
}

/// `$stop` ends the run without output.
pub fn stop() -> Arc<dyn NativeFunction> {
    from_fn(FunctionDefinition::new("$stop"), |_ctx, _call| {
        Ok(Outcome::Stop)
    })
}

/// `$if[condition;then;else]`; only the chosen branch is evaluated.
pub struct If {
    definition: FunctionDefinition,
}

impl If {
    /// Definition with lazily resolved fields.
    pub fn new() -> Self {
        Self {
            definition: FunctionDefinition::new("$if")
                .args(
                    true,
                    vec![
                        FieldSpec::new("condition").condition(),
                        FieldSpec::new("then").optional(),
                        FieldSpec::new("else").optional(),
                    ],
                )
                .lazy(),
        }
    }
}

impl Default for If {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl NativeFunction for If {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &mut Context, call: Call<'_>) -> anyhow::Result<Outcome> {
        let condition = call.field(ctx, 0).await?;
        let passed = match &condition {
            Value::Bool(flag) => *flag,
            other => value_to_text(other) == "true",
        };
        let branch = if passed { 1 } else { 2 };
        if branch >= call.field_count() {
            return Ok(Outcome::Success(Value::Null));
        }
        Ok(Outcome::Success(call.field(ctx, branch).await?))
    }
}
