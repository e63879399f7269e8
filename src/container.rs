//! Render state handed to the delivery target.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeliveryResult;

/// File attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Raw bytes
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Mutable holder of everything a run renders.
///
/// Structured parts are kept as JSON so any platform payload shape fits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    /// Resolved message text
    pub content: Option<String>,
    /// Embed objects
    pub embeds: Vec<Value>,
    /// Component rows
    pub components: Vec<Value>,
    /// Sticker ids
    pub stickers: Vec<String>,
    /// Attachments
    pub files: Vec<Attachment>,
    /// Modal definition
    pub modal: Option<Value>,
    /// Poll definition
    pub poll: Option<Value>,
    /// Username override
    pub username: Option<String>,
    /// Thread to create for the response
    pub thread_name: Option<String>,
}

impl Container {
    /// Whether nothing would be sent.
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.embeds.is_empty()
            && self.components.is_empty()
            && self.stickers.is_empty()
            && self.files.is_empty()
            && self.modal.is_none()
            && self.poll.is_none()
    }
}

/// Where a finished container is sent.
#[async_trait(?Send)]
pub trait Target {
    /// Deliver the container.
    async fn send(&mut self, container: &Container) -> DeliveryResult<()>;
}

/// Target that keeps every container it receives.
#[derive(Debug, Default)]
pub struct CollectingTarget {
    sent: std::rc::Rc<std::cell::RefCell<Vec<Container>>>,
}

impl CollectingTarget {
    /// Target plus a handle for reading what it received.
    pub fn new() -> (Self, SentContainers) {
        let target = Self::default();
        let handle = SentContainers(target.sent.clone());
        (target, handle)
    }
}

#[async_trait(?Send)]
impl Target for CollectingTarget {
    async fn send(&mut self, container: &Container) -> DeliveryResult<()> {
        self.sent.borrow_mut().push(container.clone());
        Ok(())
    }
}

/// Read handle for a [`CollectingTarget`].
#[derive(Debug, Clone)]
pub struct SentContainers(std::rc::Rc<std::cell::RefCell<Vec<Container>>>);

impl SentContainers {
    /// Containers received so far.
    pub fn all(&self) -> Vec<Container> {
        self.0.borrow().clone()
    }

    /// Number of sends.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether nothing was sent.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_container() {
        let mut container = Container::default();
        assert!(container.is_empty());
        container.content = Some(String::new());
        assert!(container.is_empty());
        container.embeds.push(json!({"title": "x"}));
        assert!(!container.is_empty());
    }

    #[tokio::test]
    async fn collecting_target_records_sends() {
        let (mut target, sent) = CollectingTarget::new();
        let container = Container {
            content: Some("hi".into()),
            ..Container::default()
        };
        target.send(&container).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.all()[0].content.as_deref(), Some("hi"));
    }
}
