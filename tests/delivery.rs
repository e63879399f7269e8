use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge::compiler::compile;
use forge::config::EngineConfig;
use forge::container::{Attachment, CollectingTarget};
use forge::context::Context;
use forge::native::{Call, FunctionDefinition, NativeFunction, Outcome, from_fn};
use forge::registry::FunctionRegistry;
use forge::run;
use serde_json::{Value, json};

struct Slow {
    definition: FunctionDefinition,
}

#[async_trait(?Send)]
impl NativeFunction for Slow {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    async fn execute(&self, _ctx: &mut Context, _call: Call<'_>) -> anyhow::Result<Outcome> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Outcome::success("late"))
    }
}

/// Fails until a recovery pass runs, then stalls before succeeding.
struct SlowJson {
    definition: FunctionDefinition,
}

#[async_trait(?Send)]
impl NativeFunction for SlowJson {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    async fn execute(&self, ctx: &mut Context, _call: Call<'_>) -> anyhow::Result<Outcome> {
        if ctx.recovery().is_none() {
            return Ok(Outcome::failure("not ready"));
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(Outcome::success("late json"))
    }
}

fn registry() -> FunctionRegistry {
    FunctionRegistry::from_functions(vec![
        from_fn(FunctionDefinition::new("$username"), |_ctx, _call| {
            Ok(Outcome::success("Alice"))
        }),
        from_fn(FunctionDefinition::new("$decorate"), |ctx, _call| {
            let container = &mut ctx.container;
            container.embeds.push(json!({
                "title": "Hi $username",
                "fields": [{"name": "by $username", "inline": true}]
            }));
            container.components.push(json!({
                "type": 1,
                "components": [
                    {"type": 2, "label": "Wave at $username", "emoji": "$username"},
                    {"type": 3, "options": [{"label": "$username", "value": "pick"}]}
                ]
            }));
            container.files.push(Attachment {
                name: "$username.txt".into(),
                description: Some("for $username".into()),
                data: b"$username".to_vec(),
            });
            container.modal = Some(json!({
                "title": "Form for $username",
                "components": [{"type": 4, "label": "Name", "value": "$username"}]
            }));
            container.poll = Some(json!({
                "question": {"text": "Is $username here?"},
                "answers": [{"text": "$username"}, {"text": "nobody"}]
            }));
            container.stickers.push("$username".into());
            container.username = Some("$username bot".into());
            container.thread_name = Some("Thread of $username".into());
            Ok(Outcome::Success(Value::Null))
        }),
        from_fn(FunctionDefinition::new("$slowembed"), |ctx, _call| {
            ctx.container.embeds.push(json!({"title": "$slow"}));
            ctx.container.embeds.push(json!({"title": "$username"}));
            Ok(Outcome::Success(Value::Null))
        }),
        Arc::new(Slow {
            definition: FunctionDefinition::new("$slow"),
        }),
        from_fn(FunctionDefinition::new("$jsonembeds"), |ctx, _call| {
            ctx.container.embeds.push(json!({"title": "$slowjson"}));
            ctx.container.embeds.push(json!({"title": "$mode"}));
            Ok(Outcome::Success(Value::Null))
        }),
        Arc::new(SlowJson {
            definition: FunctionDefinition::new("$slowjson"),
        }),
        from_fn(FunctionDefinition::new("$mode"), |ctx, _call| {
            let mode = if ctx.recovery().is_some() { "recovery" } else { "normal" };
            Ok(Outcome::success(mode))
        }),
    ])
    .unwrap()
}

fn context(source: &str, config: EngineConfig) -> Context {
    let registry = registry();
    let program = Arc::new(compile(&registry, source, None).unwrap());
    Context::new(program, registry, config)
}

#[tokio::test]
async fn container_parts_are_reprocessed_before_sending() {
    let (target, sent) = CollectingTarget::new();
    let mut ctx = context("$decorate Hello", EngineConfig::default()).with_target(target);

    assert_eq!(run(&mut ctx).await.as_deref(), Some(" Hello"));
    assert_eq!(sent.len(), 1);
    let all = sent.all();
    let container = &all[0];

    assert_eq!(container.content.as_deref(), Some(" Hello"));
    assert_eq!(
        container.embeds,
        vec![json!({
            "title": "Hi Alice",
            "fields": [{"name": "by Alice", "inline": true}]
        })]
    );
    assert_eq!(
        container.components,
        vec![json!({
            "type": 1,
            "components": [
                {"type": 2, "label": "Wave at Alice", "emoji": "$username"},
                {"type": 3, "options": [{"label": "Alice", "value": "pick"}]}
            ]
        })]
    );
    assert_eq!(container.files[0].name, "Alice.txt");
    assert_eq!(container.files[0].description.as_deref(), Some("for Alice"));
    assert_eq!(container.files[0].data, b"$username".to_vec());
    assert_eq!(
        container.modal,
        Some(json!({
            "title": "Form for Alice",
            "components": [{"type": 4, "label": "Name", "value": "Alice"}]
        }))
    );
    assert_eq!(
        container.poll,
        Some(json!({
            "question": {"text": "Is Alice here?"},
            "answers": [{"text": "Alice"}, {"text": "nobody"}]
        }))
    );
    assert_eq!(container.stickers, vec!["Alice".to_string()]);
    assert_eq!(container.username.as_deref(), Some("Alice bot"));
    assert_eq!(container.thread_name.as_deref(), Some("Thread of Alice"));
}

#[tokio::test]
async fn disabled_delivery_sends_nothing() {
    let (target, sent) = CollectingTarget::new();
    let mut ctx = context("$decorate Hello", EngineConfig::default())
        .with_target(target)
        .without_delivery();

    assert_eq!(run(&mut ctx).await.as_deref(), Some(" Hello"));
    assert!(sent.is_empty());
    assert_eq!(ctx.container.embeds[0]["title"], json!("Hi $username"));
}

#[tokio::test]
async fn disabled_reprocessing_sends_parts_verbatim() {
    let (target, sent) = CollectingTarget::new();
    let config = EngineConfig {
        reprocess_enabled: false,
        ..EngineConfig::default()
    };
    let mut ctx = context("$decorate", config).with_target(target);

    run(&mut ctx).await;
    let all = sent.all();
    let container = &all[0];
    assert_eq!(container.embeds[0]["title"], json!("Hi $username"));
    assert_eq!(container.username.as_deref(), Some("$username bot"));
}

#[tokio::test]
async fn slow_elements_keep_their_original_value() {
    let (target, sent) = CollectingTarget::new();
    let config = EngineConfig {
        element_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let mut ctx = context("$slowembed", config).with_target(target);

    run(&mut ctx).await;
    let all = sent.all();
    let container = &all[0];
    assert_eq!(
        container.embeds,
        vec![json!({"title": "$slow"}), json!({"title": "Alice"})]
    );
}

#[tokio::test]
async fn timed_out_recovery_leaves_later_elements_in_normal_mode() {
    let (target, sent) = CollectingTarget::new();
    let config = EngineConfig {
        element_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let mut ctx = context("$jsonembeds", config).with_target(target);

    run(&mut ctx).await;
    let all = sent.all();
    assert_eq!(
        all[0].embeds,
        vec![json!({"title": "$slowjson"}), json!({"title": "normal"})]
    );
    assert_eq!(ctx.recovery_attempts(), 1);
    assert!(ctx.recovery().is_none());
}
