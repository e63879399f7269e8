use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use super::reprocess::reprocess_value;
use crate::compiler::value_to_text;
use crate::container::Attachment;
use crate::context::Context;
use crate::error::DeliveryResult;
use crate::util::map_with_deadline;

const COMPONENT_TEXT_KEYS: [&str; 5] = ["label", "placeholder", "custom_id", "url", "value"];
const OPTION_TEXT_KEYS: [&str; 3] = ["label", "description", "value"];
const MODAL_TEXT_KEYS: [&str; 2] = ["title", "custom_id"];

/// Store the final content, reprocess every renderable part, then send.
pub(crate) async fn deliver(ctx: &mut Context, content: String) -> DeliveryResult<()> {
    ctx.container.content = Some(content);
    reprocess_container(ctx).await;

    match ctx.runtime.target.as_mut() {
        Some(target) => target.send(&ctx.container).await,
        None => {
            debug!("No delivery target configured");
            Ok(())
        }
    }
}

/// Reprocess container parts element by element, each under the configured
/// deadline.
pub(crate) async fn reprocess_container(ctx: &mut Context) {
    if !ctx.config().reprocess_enabled {
        return;
    }
    let deadline = ctx.config().element_timeout();
    let depth = ctx.runtime.program.depth;

    let embeds = std::mem::take(&mut ctx.container.embeds);
    ctx.container.embeds = map_with_deadline(ctx, embeds, deadline, |ctx, embed| {
        reprocess_value(ctx, embed, depth)
    })
    .await;

    let components = std::mem::take(&mut ctx.container.components);
    ctx.container.components = map_with_deadline(ctx, components, deadline, |ctx, row| {
        reprocess_component(ctx, row, depth)
    })
    .await;

    let files = std::mem::take(&mut ctx.container.files);
    ctx.container.files = map_with_deadline(ctx, files, deadline, |ctx, file| {
        reprocess_attachment(ctx, file, depth)
    })
    .await;

    let modal: Vec<Value> = ctx.container.modal.take().into_iter().collect();
    ctx.container.modal = map_with_deadline(ctx, modal, deadline, |ctx, modal| {
        reprocess_modal(ctx, modal, depth)
    })
    .await
    .pop();

    let poll: Vec<Value> = ctx.container.poll.take().into_iter().collect();
    ctx.container.poll = map_with_deadline(ctx, poll, deadline, |ctx, poll| {
        reprocess_poll(ctx, poll, depth)
    })
    .await
    .pop();

    let stickers = std::mem::take(&mut ctx.container.stickers);
    ctx.container.stickers = map_with_deadline(ctx, stickers, deadline, |ctx, sticker| {
        reprocess_string(ctx, sticker, depth)
    })
    .await;

    let username: Vec<String> = ctx.container.username.take().into_iter().collect();
    ctx.container.username = map_with_deadline(ctx, username, deadline, |ctx, name| {
        reprocess_string(ctx, name, depth)
    })
    .await
    .pop();

    let thread_name: Vec<String> = ctx.container.thread_name.take().into_iter().collect();
    ctx.container.thread_name = map_with_deadline(ctx, thread_name, deadline, |ctx, name| {
        reprocess_string(ctx, name, depth)
    })
    .await
    .pop();
}

fn reprocess_string<'a>(
    ctx: &'a mut Context,
    text: String,
    depth: usize,
) -> LocalBoxFuture<'a, String> {
    async move { value_to_text(&reprocess_value(ctx, Value::String(text), depth).await) }
        .boxed_local()
}

/// Components nest through `components`; only known text keys and select
/// options are reprocessed.
fn reprocess_component<'a>(
    ctx: &'a mut Context,
    component: Value,
    depth: usize,
) -> LocalBoxFuture<'a, Value> {
    async move {
        match component {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(reprocess_component(ctx, item, depth).await);
                }
                Value::Array(out)
            }
            Value::Object(entries) => {
                let mut out = Map::new();
                for (key, value) in entries {
                    let value = match (key.as_str(), value) {
                        ("components", children @ Value::Array(_)) => {
                            reprocess_component(ctx, children, depth).await
                        }
                        ("options", Value::Array(options)) => {
                            let mut processed = Vec::with_capacity(options.len());
                            for option in options {
                                processed.push(
                                    reprocess_keys(ctx, option, &OPTION_TEXT_KEYS, depth).await,
                                );
                            }
                            Value::Array(processed)
                        }
                        (name, text @ Value::String(_)) if COMPONENT_TEXT_KEYS.contains(&name) => {
                            reprocess_value(ctx, text, depth).await
                        }
                        (_, other) => other,
                    };
                    out.insert(key, value);
                }
                Value::Object(out)
            }
            other => other,
        }
    }
    .boxed_local()
}

/// Reprocess the string values stored under `keys` of an object.
async fn reprocess_keys(ctx: &mut Context, value: Value, keys: &[&str], depth: usize) -> Value {
    let entries = match value {
        Value::Object(entries) => entries,
        other => return other,
    };
    let mut out = Map::new();
    for (key, item) in entries {
        let item = if keys.contains(&key.as_str()) && item.is_string() {
            reprocess_value(ctx, item, depth).await
        } else {
            item
        };
        out.insert(key, item);
    }
    Value::Object(out)
}

fn reprocess_attachment<'a>(
    ctx: &'a mut Context,
    file: Attachment,
    depth: usize,
) -> LocalBoxFuture<'a, Attachment> {
    async move {
        let name = reprocess_string(ctx, file.name, depth).await;
        let description = match file.description {
            Some(description) => Some(reprocess_string(ctx, description, depth).await),
            None => None,
        };
        Attachment {
            name,
            description,
            data: file.data,
        }
    }
    .boxed_local()
}

fn reprocess_modal<'a>(
    ctx: &'a mut Context,
    modal: Value,
    depth: usize,
) -> LocalBoxFuture<'a, Value> {
    async move {
        let modal = reprocess_keys(ctx, modal, &MODAL_TEXT_KEYS, depth).await;
        let mut entries = match modal {
            Value::Object(entries) => entries,
            other => return other,
        };
        if let Some(components) = entries.remove("components") {
            let components = reprocess_component(ctx, components, depth).await;
            entries.insert("components".to_string(), components);
        }
        Value::Object(entries)
    }
    .boxed_local()
}

fn reprocess_poll<'a>(ctx: &'a mut Context, poll: Value, depth: usize) -> LocalBoxFuture<'a, Value> {
    async move {
        let mut entries = match poll {
            Value::Object(entries) => entries,
            other => return other,
        };
        if let Some(question) = entries.remove("question") {
            let question = reprocess_keys(ctx, question, &["text"], depth).await;
            entries.insert("question".to_string(), question);
        }
        match entries.remove("answers") {
            Some(Value::Array(answers)) => {
                let mut processed = Vec::with_capacity(answers.len());
                for answer in answers {
                    processed.push(reprocess_keys(ctx, answer, &["text"], depth).await);
                }
                entries.insert("answers".to_string(), Value::Array(processed));
            }
            Some(other) => {
                entries.insert("answers".to_string(), other);
            }
            None => {}
        }
        Value::Object(entries)
    }
    .boxed_local()
}
