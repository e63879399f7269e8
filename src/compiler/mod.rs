//! Template compiler
//!
//! Turns template text into a [`CompiledProgram`]: the code string with each
//! top-level invocation replaced by a placeholder, the ordered invocation list
//! and a positional template used to splice results back in. A single
//! left-to-right pass handles escapes, nested invocations and condition
//! fields.

/// Compiled program structures.
pub mod ast;
/// Tag scanner and recursive field parser.
pub mod parser;
/// Reserved characters, operators and generic syntax detection.
pub mod syntax;
/// Placeholder templates and value rendering.
pub mod template;

pub use ast::{CompiledFunction, CompiledProgram, ConditionField, Field, PlainField};
pub use parser::{compile, compile_at};
pub use syntax::{Operator, Syntax, contains_function_syntax, function_syntax_spans};
pub use template::{Segment, Template, TemplateBuilder, value_to_text};

use tracing::warn;

use crate::error::CompileResult;
use crate::registry::FunctionRegistry;

/// Compile a produced value for another pass, one level deeper.
///
/// Returns `None` when the value has no function syntax or when `depth` has
/// reached `max_depth`; in the latter case the value is meant to be kept as-is.
pub fn reprocess(
    registry: &FunctionRegistry,
    value: &str,
    path: Option<&str>,
    depth: usize,
    max_depth: usize,
) -> CompileResult<Option<CompiledProgram>> {
    if !contains_function_syntax(value) {
        return Ok(None);
    }
    if depth >= max_depth {
        warn!(
            depth,
            max_depth, "Reprocessing depth limit reached, keeping value unchanged"
        );
        return Ok(None);
    }
    compile_at(registry, value, path, depth + 1).map(Some)
}

impl CompiledProgram {
    /// Compile a value produced by this program for another pass.
    pub fn reprocess(
        &self,
        registry: &FunctionRegistry,
        value: &str,
        max_depth: usize,
    ) -> CompileResult<Option<CompiledProgram>> {
        reprocess(registry, value, self.path.as_deref(), self.depth, max_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{FunctionDefinition, Outcome, from_fn};

    fn registry() -> FunctionRegistry {
        FunctionRegistry::from_functions(vec![from_fn(
            FunctionDefinition::new("$loop"),
            |_ctx, _call| Ok(Outcome::success("$loop")),
        )])
        .unwrap()
    }

    #[test]
    fn reprocess_compiles_one_level_deeper() {
        let registry = registry();
        let program = compile(&registry, "$loop", None).unwrap();
        let next = program.reprocess(&registry, "again $loop", 5).unwrap().unwrap();
        assert_eq!(next.depth, 1);
        assert_eq!(next.functions.len(), 1);
    }

    #[test]
    fn reprocess_stops_at_max_depth() {
        let registry = registry();
        assert!(reprocess(&registry, "$loop", None, 5, 5).unwrap().is_none());
        assert!(reprocess(&registry, "plain", None, 0, 5).unwrap().is_none());
    }
}
