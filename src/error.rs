//! Conversion-time error types
//!
//! Three disjoint error channels run through the tool and are never
//! conflated:
//!
//! - syntax errors: the input could not be parsed at all (see
//!   [`crate::parse::ParseError`]); the unit is skipped but still counted,
//! - conversion errors: a handler recognizes its target but cannot rewrite
//!   it safely in this context; recorded per node, the run continues,
//! - configuration errors: duplicate or malformed registrations (see
//!   [`crate::registry::RegistryError`]); fatal at load time.

use crate::span::{Location, Span};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A handler could not safely perform a desired conversion
///
/// Carries the offending construct, the replacement that was unavailable,
/// and the precise source range, so the report can point the user at the
/// exact call site.
#[derive(Debug, Clone, Error, Serialize)]
#[error("cannot convert {construct} to {replacement} in this context")]
pub struct ConversionError {
    /// The construct that should have been converted (e.g. `#stub`)
    pub construct: String,
    /// The unavailable replacement syntax (e.g. `#allow`)
    pub replacement: String,
    /// Source range of the offending construct
    pub span: Span,
}

impl ConversionError {
    pub fn new(construct: &str, replacement: &str, span: Span) -> Self {
        Self {
            construct: construct.to_string(),
            replacement: replacement.to_string(),
            span,
        }
    }
}

/// An input unit that could not be analyzed at all
#[derive(Debug, Clone, Error, Serialize)]
#[error("{file}:{location}: {message}")]
pub struct SyntaxError {
    /// Input unit the error was found in
    pub file: PathBuf,
    /// Parser message
    pub message: String,
    /// Position of the failure
    pub location: Location,
}

impl SyntaxError {
    pub fn new(file: impl Into<PathBuf>, message: &str, location: Location) -> Self {
        Self {
            file: file.into(),
            message: message.to_string(),
            location,
        }
    }
}
