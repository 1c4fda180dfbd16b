//! Respec - spec convention migration engine
//!
//! Converts source written against the old monkey-patched assertion and
//! stubbing convention (`obj.should`, `obj.stub`) to the explicit
//! `expect(obj).to` / `allow(obj).to receive` convention, by matching syntax
//! tree nodes against a registry of pluggable conversion rules, optionally
//! informed by runtime observation of the program under conversion.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Converter -> Dispatcher -> RuleHandler -> SourceRewriter
//! ```
//!
//! The converter parses each input unit into an arena tree, walks it once
//! per phase, and routes each node through the dispatcher: the first
//! standalone rule kind whose trial instance claims the node wins, its
//! handler and mixin capability callbacks request edits against the shared
//! edit buffer, and dependent instances are dispatched recursively. Results
//! aggregate into a mergeable [`report::Report`].
//!
//! # Two-phase conversion
//!
//! Phase 1 compiles instrumentation requests ([`Converter::instrumentation`])
//! for external execution; the run's JSON output is ingested into a
//! [`runtime::RuntimeData`] fact store. Phase 2
//! ([`Converter::convert_source`]) consults those facts per node and falls
//! back to a conservative static heuristic when none exist.

pub mod capabilities;
pub mod config;
pub mod converter;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod parse;
pub mod record;
pub mod registry;
pub mod report;
pub mod rewriter;
pub mod runtime;
pub mod span;
pub mod tree;

// Re-export main types
pub use config::{ColorMode, Config, ConfigError, NegativeForm};
pub use converter::{default_callbacks, default_registry, Converter, FileConversion};
pub use dispatcher::Dispatcher;
pub use error::{ConversionError, SyntaxError};
pub use handler::{ConversionContext, HandlerCallback, RuleHandler};
pub use parse::{parse, ParseError};
pub use record::ConversionRecord;
pub use registry::{Registry, RegistryError, RuleKind};
pub use report::{pluralize, Report, SummaryOptions};
pub use rewriter::{RewriteConflict, SourceRewriter};
pub use runtime::{InstrumentationBuilder, ProbeRequest, RuntimeData};
pub use span::{Location, Span};
pub use tree::{NodeId, NodeKind, SyntaxNode, SyntaxTree};
