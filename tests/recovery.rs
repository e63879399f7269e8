use std::sync::Arc;

use forge::builtins;
use forge::compiler::compile;
use forge::config::EngineConfig;
use forge::context::Context;
use forge::native::{FunctionDefinition, NativeFunction, Outcome, from_fn};
use forge::registry::FunctionRegistry;
use forge::run;
use parking_lot::Mutex;
use serde_json::Value;

fn natives(seen: Seen) -> Vec<Arc<dyn NativeFunction>> {
    let mut natives = builtins::all();
    natives.extend([
        // Needs `x`, which only a full replay guarantees.
        from_fn(FunctionDefinition::new("$jsonTemplate"), |ctx, _call| {
            if ctx.recovery().is_some() {
                let user = ctx.keyword("x").cloned().unwrap_or(Value::Null);
                return Ok(Outcome::Success(user));
            }
            Ok(Outcome::failure_with(
                "unresolved template",
                r#"{"user": $get[x]}"#,
            ))
        }),
        from_fn(FunctionDefinition::new("$brokenjson"), |_ctx, _call| {
            Ok(Outcome::failure_with("still broken", "$get[x]"))
        }),
        from_fn(FunctionDefinition::new("$fragment"), |_ctx, _call| {
            Ok(Outcome::success("Hi $jsonTemplate"))
        }),
        {
            let seen = seen.clone();
            from_fn(FunctionDefinition::new("$tick"), move |_ctx, _call| {
                seen.lock().push(("$tick".into(), 0));
                Ok(Outcome::Success(Value::Null))
            })
        },
        from_fn(FunctionDefinition::new("$formatname"), move |ctx, _call| {
            if let Some(state) = ctx.recovery() {
                seen.lock().push((state.function.clone(), state.position));
                return Ok(Outcome::success("Bob"));
            }
            Ok(Outcome::failure("no name yet"))
        }),
        from_fn(FunctionDefinition::new("$plainfail"), |_ctx, _call| {
            Ok(Outcome::failure("nope"))
        }),
    ]);
    natives
}

type Seen = Arc<Mutex<Vec<(String, usize)>>>;

fn context_with(source: &str, config: EngineConfig) -> (Context, Seen) {
    let seen = Seen::default();
    let registry = FunctionRegistry::from_functions(natives(seen.clone())).unwrap();
    let program = Arc::new(compile(&registry, source, Some("recovery.forge")).unwrap());
    let ctx = Context::new(program, registry, config).without_delivery();
    (ctx, seen)
}

fn context(source: &str) -> Context {
    context_with(source, EngineConfig::default()).0
}

#[tokio::test]
async fn malformed_json_failure_recovers_from_full_replay() {
    let mut ctx = context("$let[x;Alice]Hi $jsonTemplate");
    assert_eq!(run(&mut ctx).await.as_deref(), Some("Hi Alice"));
    assert_eq!(ctx.recovery_attempts(), 1);
    assert!(ctx.recovery().is_none());
}

#[tokio::test]
async fn recovery_can_be_disabled() {
    let config = EngineConfig {
        recovery_enabled: false,
        ..EngineConfig::default()
    };
    let (mut ctx, _) = context_with("$let[x;Alice]Hi $jsonTemplate", config);
    assert_eq!(
        run(&mut ctx).await.as_deref(),
        Some(r#"Hi {"user": $get[x]}"#)
    );
    assert_eq!(ctx.recovery_attempts(), 0);
}

#[tokio::test]
async fn function_name_triggers_recovery() {
    let (mut ctx, seen) = context_with("Name: $formatname", EngineConfig::default());
    assert_eq!(run(&mut ctx).await.as_deref(), Some("Name: Bob"));
    let seen = seen.lock().clone();
    assert!(!seen.is_empty());
    assert!(
        seen.iter()
            .all(|(function, position)| function == "$formatname" && *position == 0)
    );
}

#[tokio::test]
async fn unrelated_failures_do_not_recover() {
    let mut ctx = context("[$plainfail]");
    assert_eq!(run(&mut ctx).await.as_deref(), Some("[]"));
    assert_eq!(ctx.recovery_attempts(), 0);
}

#[tokio::test]
async fn attempts_are_capped_per_run() {
    let config = EngineConfig {
        max_recovery_attempts: 2,
        ..EngineConfig::default()
    };
    let (mut ctx, _) = context_with("$brokenjson $brokenjson $brokenjson", config);
    assert!(run(&mut ctx).await.is_some());
    assert_eq!(ctx.recovery_attempts(), 2);
}

#[tokio::test]
async fn mode_independent_failure_falls_back_to_replayed_text() {
    let mut ctx = context("$let[x;Alice]Hi $brokenjson");
    // The replayed slot is still empty, so the whole replayed text fills it.
    assert_eq!(run(&mut ctx).await.as_deref(), Some("Hi Hi "));
    assert_eq!(ctx.recovery_attempts(), 1);
    assert!(ctx.recovery().is_none());
}

#[tokio::test]
async fn fragment_failures_replay_the_whole_template() {
    let (mut ctx, seen) = context_with("$tick$fragment$let[x;Alice]", EngineConfig::default());
    assert_eq!(run(&mut ctx).await.as_deref(), Some("Hi Alice"));
    assert_eq!(ctx.recovery_attempts(), 1);
    let ticks = seen
        .lock()
        .iter()
        .filter(|(function, _)| function == "$tick")
        .count();
    assert_eq!(ticks, 2);
}
