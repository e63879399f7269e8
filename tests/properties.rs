//! Property tests for the compiler's text handling.

use forge::builtins;
use forge::compiler::compile;
use forge::registry::FunctionRegistry;
use proptest::prelude::*;
use serde_json::json;

fn registry() -> FunctionRegistry {
    FunctionRegistry::from_functions(builtins::all()).unwrap()
}

proptest! {
    #[test]
    fn text_without_tags_is_unchanged(text in "[^$]*") {
        let program = compile(&registry(), &text, None).unwrap();
        prop_assert_eq!(&program.code, &text);
        prop_assert!(program.functions.is_empty());
        prop_assert_eq!(program.resolve(&[]), text);
    }

    #[test]
    fn escaped_tags_stay_literal(text in "[^$\\\\]*") {
        let source = format!("{text}\\$get[x]");
        let program = compile(&registry(), &source, None).unwrap();
        prop_assert_eq!(program.code, format!("{text}$get[x]"));
        prop_assert!(program.functions.is_empty());
    }

    #[test]
    fn slots_splice_between_literals(
        before in "[^$\\\\]*",
        after in "[^$\\\\]*",
        value in "[a-z0-9 ]*",
    ) {
        let source = format!("{before}$get[k]{after}");
        let program = compile(&registry(), &source, None).unwrap();
        prop_assert_eq!(&program.code, &format!("{before}[@fn:0]{after}"));
        prop_assert_eq!(program.resolve(&[json!(value.clone())]), format!("{before}{value}{after}"));
    }
}
