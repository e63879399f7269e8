//! Deadline-bounded mapping over a batch of items.

use std::time::Duration;

use futures::future::LocalBoxFuture;
use tracing::warn;

/// Map every item through `f`, each under its own deadline.
///
/// Items are processed one after another because `f` borrows `state`
/// mutably. When an item misses its deadline the original item is kept and
/// processing continues with the next one.
pub async fn map_with_deadline<S, T, F>(
    state: &mut S,
    items: Vec<T>,
    deadline: Duration,
    mut f: F,
) -> Vec<T>
where
    S: ?Sized,
    T: Clone,
    F: for<'a> FnMut(&'a mut S, T) -> LocalBoxFuture<'a, T>,
{
    let mut out = Vec::with_capacity(items.len());
    for (position, item) in items.into_iter().enumerate() {
        let original = item.clone();
        match tokio::time::timeout(deadline, f(state, item)).await {
            Ok(mapped) => out.push(mapped),
            Err(_) => {
                warn!(
                    position,
                    timeout_ms = deadline.as_millis() as u64,
                    "Element timed out, keeping original"
                );
                out.push(original);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn maps_items_in_order() {
        let mut calls = 0usize;
        let out = map_with_deadline(
            &mut calls,
            vec![1, 2, 3],
            Duration::from_secs(1),
            |calls, n| {
                async move {
                    *calls += 1;
                    n * 10
                }
                .boxed_local()
            },
        )
        .await;
        assert_eq!(out, vec![10, 20, 30]);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn slow_items_keep_original() {
        let mut unit = ();
        let out = map_with_deadline(
            &mut unit,
            vec![1u64, 200, 2],
            Duration::from_millis(50),
            |_, n| {
                async move {
                    tokio::time::sleep(Duration::from_millis(n)).await;
                    n + 1
                }
                .boxed_local()
            },
        )
        .await;
        assert_eq!(out, vec![2, 200, 3]);
    }
}
