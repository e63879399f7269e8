use forge::config::EngineConfig;
use forge::engine::Engine;
use forge::error::{CompileErrorKind, EngineError};
use serde_json::json;

fn engine() -> Engine {
    Engine::with_builtins(EngineConfig::default()).unwrap()
}

#[test]
fn errors_carry_function_and_position() {
    let err = engine()
        .compile("Hi!\n\n  $if[1==1;a;b;c]", Some("greet.forge"))
        .unwrap_err();
    assert_eq!(err.function(), "$if");
    assert_eq!((err.line, err.column), (3, 2));
    assert_eq!(
        err.to_string(),
        "Function $if expects 3 arguments at most (at greet.forge:3:2)"
    );
}

#[test]
fn errors_default_to_index_file() {
    let err = engine().compile("$let[x", None).unwrap_err();
    assert_eq!(
        err.kind,
        CompileErrorKind::UnclosedField {
            function: "$let".into()
        }
    );
    assert_eq!(
        err.to_string(),
        "Function $let is missing brace closure (at index file:1:0)"
    );
}

#[tokio::test]
async fn render_surfaces_compile_errors() {
    let result = engine().render("$get", Vec::<(String, _)>::new()).await;
    let expected = CompileErrorKind::MissingBrackets {
        function: "$get".into(),
    };
    assert!(matches!(result, Err(EngineError::Compile(err)) if err.kind == expected));
}

#[test]
fn aliases_compile_to_canonical_names() {
    let program = engine().compile("$SETVAR[a;1]$getVar[a]", None).unwrap();
    assert_eq!(program.function_names(), vec!["$let", "$get"]);
    assert_eq!(program.code, "[@fn:0][@fn:1]");
}

#[test]
fn programs_serialize_without_natives() {
    let program = engine()
        .compile("Hi $if[$get[n]>2;many;few]!", Some("count.forge"))
        .unwrap();
    let json = serde_json::to_value(&program).unwrap();

    assert_eq!(json["code"], json!("Hi [@fn:1]!"));
    assert_eq!(json["path"], json!("count.forge"));
    assert_eq!(json["depth"], json!(0));
    assert_eq!(
        json["template"]["segments"],
        json!([{"text": "Hi "}, {"slot": 0}, {"text": "!"}])
    );

    let outer = &json["functions"][0];
    assert_eq!(outer["name"], json!("$if"));
    assert_eq!(outer["id"], json!("[@fn:1]"));
    assert!(outer.get("native").is_none());

    let condition = &outer["fields"][0];
    assert_eq!(condition["kind"], json!("condition"));
    assert_eq!(condition["lhs"]["value"], json!("[@fn:0]"));
    assert_eq!(condition["lhs"]["functions"][0]["name"], json!("$get"));
    assert_eq!(condition["rhs"]["value"], json!("2"));
    assert_eq!(outer["fields"][1]["kind"], json!("plain"));
}
