//! Edit buffer with conflict detection
//!
//! Handlers request edits keyed by source spans; the buffer accepts them
//! eagerly and renders the rewritten text once at the end. Destructive edits
//! (remove/replace) are rejected at request time when their spans overlap a
//! previously accepted destructive span, so two rules can never silently
//! corrupt the same range. Insertions never conflict: multiple insertions at
//! the same point render in request order and concatenate.

use crate::span::Span;
use thiserror::Error;

/// Two destructive edits overlapped
#[derive(Debug, Clone, Error)]
#[error("conflicting edits: {requested} overlaps already accepted edit {existing}")]
pub struct RewriteConflict {
    /// Span of the previously accepted destructive edit
    pub existing: Span,
    /// Span of the rejected request
    pub requested: Span,
}

#[derive(Debug, Clone)]
enum EditKind {
    Remove,
    Replace(String),
    InsertBefore(String),
    InsertAfter(String),
}

#[derive(Debug, Clone)]
struct Edit {
    span: Span,
    kind: EditKind,
    seq: usize,
}

impl Edit {
    fn is_destructive(&self) -> bool {
        matches!(self.kind, EditKind::Remove | EditKind::Replace(_))
    }
}

/// Accumulates edit requests against one source text
#[derive(Debug, Clone)]
pub struct SourceRewriter {
    source: String,
    edits: Vec<Edit>,
}

impl SourceRewriter {
    /// Create a rewriter over the given source text
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            edits: Vec::new(),
        }
    }

    /// The unmodified source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of accepted edit requests
    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    /// Check whether any edit has been accepted
    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Remove the text covered by `span`
    pub fn remove(&mut self, span: Span) -> Result<(), RewriteConflict> {
        self.push_destructive(span, EditKind::Remove)
    }

    /// Replace the text covered by `span` with `text`
    pub fn replace(&mut self, span: Span, text: &str) -> Result<(), RewriteConflict> {
        self.push_destructive(span, EditKind::Replace(text.to_string()))
    }

    /// Insert `text` immediately before `span`
    pub fn insert_before(&mut self, span: Span, text: &str) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            span,
            kind: EditKind::InsertBefore(text.to_string()),
            seq,
        });
    }

    /// Insert `text` immediately after `span`
    pub fn insert_after(&mut self, span: Span, text: &str) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            span,
            kind: EditKind::InsertAfter(text.to_string()),
            seq,
        });
    }

    fn push_destructive(&mut self, span: Span, kind: EditKind) -> Result<(), RewriteConflict> {
        if let Some(existing) = self
            .edits
            .iter()
            .find(|e| e.is_destructive() && e.span.overlaps(span))
        {
            return Err(RewriteConflict {
                existing: existing.span,
                requested: span,
            });
        }
        let seq = self.edits.len();
        self.edits.push(Edit { span, kind, seq });
        Ok(())
    }

    /// Render the rewritten text
    pub fn rewrite(&self) -> String {
        // Order actions by position, then by class so that text inserted
        // after an earlier region precedes text inserted before a later one,
        // with destructive content last at its own start position. Ties
        // within a class keep request order.
        let mut actions: Vec<(usize, u8, &Edit)> = self
            .edits
            .iter()
            .map(|e| match &e.kind {
                EditKind::InsertAfter(_) => (e.span.end, 0u8, e),
                EditKind::InsertBefore(_) => (e.span.start, 1u8, e),
                EditKind::Remove | EditKind::Replace(_) => (e.span.start, 2u8, e),
            })
            .collect();
        actions.sort_by_key(|(pos, class, e)| (*pos, *class, e.seq));

        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (pos, _, edit) in actions {
            if pos > cursor {
                output.push_str(&self.source[cursor..pos]);
                cursor = pos;
            }
            match &edit.kind {
                EditKind::InsertBefore(text) | EditKind::InsertAfter(text) => {
                    output.push_str(text);
                }
                EditKind::Replace(text) => {
                    output.push_str(text);
                    cursor = edit.span.end;
                }
                EditKind::Remove => {
                    cursor = edit.span.end;
                }
            }
        }
        output.push_str(&self.source[cursor..]);
        output
    }
}
