//! Rule handler contract
//!
//! A [`RuleHandler`] is one rule kind bound to exactly one tree node. The
//! dispatcher constructs trial instances, asks them whether they claim the
//! node, and routes driver callbacks to the winning instance. Handlers reach
//! the edit buffer only through the [`ConversionContext`] façade, which
//! forwards the four primitive edit operations verbatim.

use crate::config::Config;
use crate::error::ConversionError;
use crate::report::Report;
use crate::rewriter::{RewriteConflict, SourceRewriter};
use crate::runtime::{InstrumentationBuilder, RuntimeData};
use crate::span::Span;
use crate::tree::{NodeId, SyntaxTree};
use std::any::Any;

/// Everything a handler may consult or mutate while processing its node
pub struct ConversionContext<'a> {
    /// The immutable tree being converted
    pub tree: &'a SyntaxTree,
    /// Edit buffer for the current input unit
    pub rewriter: &'a mut SourceRewriter,
    /// Facts gathered by the phase-1 instrumented run (may be empty)
    pub runtime_data: &'a RuntimeData,
    /// Report collecting records and errors for this unit
    pub report: &'a mut Report,
    /// Conversion options
    pub config: &'a Config,
}

impl ConversionContext<'_> {
    // Rewrite request façade: forwarded verbatim to the edit buffer. Callers
    // must pass spans drawn from the bound node or its descendants; range
    // validation is the buffer's contract.

    /// Remove the text covered by `span`
    pub fn remove(&mut self, span: Span) -> Result<(), RewriteConflict> {
        self.rewriter.remove(span)
    }

    /// Insert `text` immediately before `span`
    pub fn insert_before(&mut self, span: Span, text: &str) {
        self.rewriter.insert_before(span, text);
    }

    /// Insert `text` immediately after `span`
    pub fn insert_after(&mut self, span: Span, text: &str) {
        self.rewriter.insert_after(span, text);
    }

    /// Replace the text covered by `span` with `text`
    pub fn replace(&mut self, span: Span, text: &str) -> Result<(), RewriteConflict> {
        self.rewriter.replace(span, text)
    }
}

/// A conversion rule bound to one syntax node
///
/// Implementations are stateful: a trial instance may cache what it learned
/// about its node between the applicability test and the handler callbacks.
pub trait RuleHandler {
    /// Registered kind name this instance belongs to
    fn kind_name(&self) -> &'static str;

    /// The bound node
    fn node(&self) -> NodeId;

    /// Whether this node should be observed during the phase-1 walk
    fn dynamic_analysis_target(&self, _ctx: &ConversionContext) -> bool {
        false
    }

    /// Whether this instance claims the node for conversion
    fn conversion_target(&self, ctx: &ConversionContext) -> bool {
        self.dynamic_analysis_target(ctx)
    }

    /// Dependent instances discovered while processing this node; the
    /// dispatcher resolves these after the handlers ran and dispatches them
    /// recursively
    fn dependents(&self, _ctx: &ConversionContext) -> Vec<Box<dyn RuleHandler>> {
        Vec::new()
    }

    /// Downcast support so driver callbacks can reach kind-specific
    /// operations
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Fallible trial-instance constructor for a kind
///
/// Construction may fail on malformed or unexpected tree shapes; the
/// dispatcher records the failure against the node and tries the next kind
/// rather than aborting the run.
pub type BuildFn =
    fn(NodeId, &ConversionContext) -> Result<Box<dyn RuleHandler>, ConversionError>;

/// A phase-1 instrumentation request compiler for a kind, run against each
/// trial instance that answers `dynamic_analysis_target`
pub type AnalysisRequestFn =
    fn(&dyn RuleHandler, &ConversionContext, &mut InstrumentationBuilder);

/// A driver callback routed by derived handler name
///
/// Conversion errors returned here are recorded at the dispatch boundary and
/// never abort the run.
pub type HandlerCallback =
    fn(&mut dyn RuleHandler, &mut ConversionContext) -> Result<(), ConversionError>;
