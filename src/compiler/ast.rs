use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::syntax::Operator;
use super::template::Template;
use crate::native::NativeFunction;

/// Text of one argument, with nested invocations replaced by slots.
#[derive(Debug, Clone, Serialize)]
pub struct PlainField {
    /// Literal text with nested placeholders
    pub value: String,
    /// Nested invocations, in slot order
    pub functions: Vec<CompiledFunction>,
    /// Segments used to splice nested results back in
    pub template: Template,
}

impl PlainField {
    /// Substitute nested results positionally.
    pub fn resolve(&self, values: &[Value]) -> String {
        self.template.resolve(values)
    }
}

/// Argument parsed as a single binary comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionField {
    /// First comparison token found, or [`Operator::Unknown`]
    pub op: Operator,
    /// Text before the operator
    pub lhs: PlainField,
    /// Text after the operator; absent for [`Operator::Unknown`]
    pub rhs: Option<PlainField>,
}

impl ConditionField {
    /// Evaluate with already-resolved operands.
    pub fn resolve(&self, lhs: &str, rhs: Option<&str>) -> bool {
        self.op.evaluate(lhs, rhs)
    }
}

/// One argument of an invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Field {
    /// Literal text and nested invocations
    Plain(PlainField),
    /// Binary comparison
    Condition(ConditionField),
}

impl Field {
    /// Nested invocations in source order.
    pub fn functions(&self) -> Vec<&CompiledFunction> {
        match self {
            Field::Plain(plain) => plain.functions.iter().collect(),
            Field::Condition(condition) => condition
                .lhs
                .functions
                .iter()
                .chain(condition.rhs.iter().flat_map(|rhs| rhs.functions.iter()))
                .collect(),
        }
    }
}

/// A single compiled function invocation.
#[derive(Clone, Serialize)]
pub struct CompiledFunction {
    /// Assignment order within the compile (nested invocations first)
    pub index: usize,
    /// Token standing in for this invocation in the enclosing code
    pub id: String,
    /// Canonical function name
    pub name: String,
    /// `$!` marker
    pub negated: bool,
    /// `$#` marker
    pub silent: bool,
    /// `@[...]` annotation, captured verbatim
    pub count: Option<String>,
    /// Arguments, or `None` when no bracket list was written
    pub fields: Option<Vec<Field>>,
    /// Reprocessing depth of the compile that produced this invocation
    pub depth: usize,
    #[serde(skip_serializing)]
    pub(crate) native: Arc<dyn NativeFunction>,
}

impl CompiledFunction {
    /// Placeholder token for a given index.
    pub fn placeholder(index: usize) -> String {
        format!("[@fn:{index}]")
    }

    /// Native implementation bound at compile time.
    pub fn native(&self) -> &Arc<dyn NativeFunction> {
        &self.native
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("negated", &self.negated)
            .field("silent", &self.silent)
            .field("count", &self.count)
            .field("fields", &self.fields)
            .field("depth", &self.depth)
            .finish()
    }
}

/// Output of one compile.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledProgram {
    /// Text that was compiled
    pub source: String,
    /// Where the text came from
    pub path: Option<String>,
    /// Source with each top-level invocation replaced by its placeholder
    pub code: String,
    /// Top-level invocations in execution order
    pub functions: Vec<CompiledFunction>,
    /// Segments used by [`CompiledProgram::resolve`]
    pub template: Template,
    /// Reprocessing depth this program was compiled at
    pub depth: usize,
}

impl CompiledProgram {
    /// Substitute top-level results by position; missing values render empty.
    pub fn resolve(&self, values: &[Value]) -> String {
        self.template.resolve(values)
    }

    /// Every invocation, outer before inner, in source order.
    pub fn walk(&self) -> Vec<&CompiledFunction> {
        let mut out = Vec::new();
        let mut stack: Vec<&CompiledFunction> = self.functions.iter().rev().collect();
        while let Some(function) = stack.pop() {
            out.push(function);
            if let Some(fields) = &function.fields {
                let nested: Vec<&CompiledFunction> =
                    fields.iter().flat_map(|field| field.functions()).collect();
                stack.extend(nested.into_iter().rev());
            }
        }
        out
    }

    /// Canonical names of every invocation, outer before inner.
    pub fn function_names(&self) -> Vec<String> {
        self.walk()
            .into_iter()
            .map(|function| function.name.clone())
            .collect()
    }
}
