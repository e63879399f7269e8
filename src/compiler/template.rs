//! Placeholder templates
//!
//! A compiled piece of text is kept twice: as a code string where each
//! function invocation is replaced by its placeholder token, and as a segment
//! list used to splice produced values back in by position.

use std::ops::Range;

use serde::Serialize;
use serde_json::Value;

/// Piece of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Literal text
    Text(String),
    /// Value of the function at this position
    Slot(usize),
}

/// Literal text interleaved with positional slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Template consisting of a single literal.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Text(text)]
        };
        Self { segments }
    }

    /// Segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Slot(_)))
            .count()
    }

    /// Splice values into their slots; missing values render empty.
    pub fn resolve(&self, values: &[Value]) -> String {
        self.resolve_spans(values).0
    }

    /// Like [`Template::resolve`], also returning the byte range each segment
    /// occupies in the output.
    pub fn resolve_spans(&self, values: &[Value]) -> (String, Vec<Range<usize>>) {
        let mut out = String::new();
        let mut spans = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let start = out.len();
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(position) => {
                    if let Some(value) = values.get(*position) {
                        out.push_str(&value_to_text(value));
                    }
                }
            }
            spans.push(start..out.len());
        }
        (out, spans)
    }
}

/// Accumulates literal text and slots while scanning source.
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    code: String,
    segments: Vec<Segment>,
    pending: String,
    slots: usize,
}

impl TemplateBuilder {
    /// Append one literal character.
    pub fn push(&mut self, ch: char) {
        self.code.push(ch);
        self.pending.push(ch);
    }

    /// Append literal text.
    pub fn push_str(&mut self, text: &str) {
        self.code.push_str(text);
        self.pending.push_str(text);
    }

    /// Append the next slot, writing `placeholder` into the code string.
    pub fn push_slot(&mut self, placeholder: &str) {
        self.flush();
        self.code.push_str(placeholder);
        self.segments.push(Segment::Slot(self.slots));
        self.slots += 1;
    }

    /// Finish into the code string and its template.
    pub fn finish(mut self) -> (String, Template) {
        self.flush();
        (
            self.code,
            Template {
                segments: self.segments,
            },
        )
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.segments
                .push(Segment::Text(std::mem::take(&mut self.pending)));
        }
    }
}

/// Render a value as template text.
///
/// `null` renders empty, strings verbatim, everything else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
