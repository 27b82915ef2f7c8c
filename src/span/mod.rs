//! Span chain carried by every log record.
//!
//! A line like `event_loop:startup:release_tag{tag=1}: msg` enters three
//! scopes in order. We keep them as a singly-linked chain, outermost first:
//!
//!   event_loop -> startup -> release_tag{tag=1}
//!
//! A node owns at most one child, so the type itself rules out branching.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanNode {
    pub name: String,
    /// Fields in source order.
    pub fields: Vec<(String, String)>,
    pub child: Option<Box<SpanNode>>,
}

impl SpanNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            child: None,
        }
    }

    pub fn with_fields(name: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            name: name.into(),
            fields,
            child: None,
        }
    }

    /// Build a chain from `(name, fields)` segments, outermost first.
    /// Returns `None` for an empty segment list.
    pub fn chain(segments: Vec<(String, Vec<(String, String)>)>) -> Option<Self> {
        // Fold from the innermost segment outward so each node takes
        // ownership of the already-built tail.
        let mut tail: Option<Box<SpanNode>> = None;
        for (name, fields) in segments.into_iter().rev() {
            tail = Some(Box::new(SpanNode {
                name,
                fields,
                child: tail,
            }));
        }
        tail.map(|b| *b)
    }

    pub fn iter(&self) -> SpanIter<'_> {
        SpanIter { next: Some(self) }
    }

    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Innermost span.
    pub fn leaf(&self) -> &SpanNode {
        let mut cur = self;
        while let Some(child) = cur.child.as_deref() {
            cur = child;
        }
        cur
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Colon-joined span names, e.g. `event_loop:startup:release_tag`.
    pub fn path(&self) -> String {
        self.iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join(":")
    }
}

pub struct SpanIter<'a> {
    next: Option<&'a SpanNode>,
}

impl<'a> Iterator for SpanIter<'a> {
    type Item = &'a SpanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.next = cur.child.as_deref();
        Some(cur)
    }
}
