//! Conversion records
//!
//! A record is one logged before/after example of a performed conversion.
//! The texts are short canonical patterns (`obj.should` -> `expect(obj).to`),
//! not the literal rewritten code, so identical conversions collapse into one
//! report group no matter what the real call sites looked like.

use regex::Regex;
use serde::Serialize;

/// Immutable description of one before/after conversion
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConversionRecord {
    /// Canonical example of the original syntax
    pub original_syntax: String,
    /// Canonical example of the converted syntax
    pub converted_syntax: String,
    /// The conversion was incomplete and needs human review
    pub annotation: bool,
}

impl ConversionRecord {
    /// Create a record for a clean conversion
    pub fn new(original_syntax: &str, converted_syntax: &str) -> Self {
        Self {
            original_syntax: original_syntax.to_string(),
            converted_syntax: converted_syntax.to_string(),
            annotation: false,
        }
    }

    /// Mark the record as needing human review
    pub fn with_annotation(mut self) -> Self {
        self.annotation = true;
        self
    }

    /// Derived type tag of the original syntax
    pub fn original_syntax_type(&self) -> String {
        syntax_type(&self.original_syntax)
    }

    /// Derived type tag of the converted syntax
    pub fn converted_syntax_type(&self) -> String {
        syntax_type(&self.converted_syntax)
    }
}

/// Derive a grouping tag from a canonical syntax example
///
/// The tag is the leading identifier of the final dot segment (`obj.should`
/// -> `should`, `allow(obj).to receive(:message)` -> `to`); when the final
/// segment carries no identifier the first identifier of the whole example is
/// used instead (`expect { }.` -> `expect`).
fn syntax_type(text: &str) -> String {
    let ident = Regex::new(r"[A-Za-z_][A-Za-z0-9_!?]*").unwrap();
    let last_segment = text.rsplit('.').next().unwrap_or(text).trim_start();
    if let Some(m) = ident.find(last_segment) {
        if m.start() == 0 {
            return m.as_str().to_string();
        }
    }
    ident
        .find(text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
