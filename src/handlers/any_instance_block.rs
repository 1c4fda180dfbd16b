//! Instance argument for any-instance implementation blocks
//!
//! The explicit any-instance form passes the receiving instance as the first
//! block parameter. This dependent kind adds that parameter to the
//! implementation block of a converted any-instance stub; it is never a
//! dispatch root and only runs when a winning stub instance exposes it.

use crate::error::ConversionError;
use crate::handler::{ConversionContext, RuleHandler};
use crate::record::ConversionRecord;
use crate::tree::{NodeId, NodeKind};
use std::any::Any;

/// One implementation block bound to its node
pub struct AnyInstanceBlock {
    node: NodeId,
}

/// Dependent-instance constructor used by the owning stub kind
pub fn instance(block: NodeId) -> Box<dyn RuleHandler> {
    Box::new(AnyInstanceBlock { node: block })
}

/// Trial-instance constructor for registration; the kind is not standalone,
/// so this only ever runs for dependent re-dispatch bookkeeping
pub fn build(
    node: NodeId,
    _ctx: &ConversionContext,
) -> Result<Box<dyn RuleHandler>, ConversionError> {
    Ok(Box::new(AnyInstanceBlock { node }))
}

impl RuleHandler for AnyInstanceBlock {
    fn kind_name(&self) -> &'static str {
        "AnyInstanceBlock"
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn conversion_target(&self, ctx: &ConversionContext) -> bool {
        ctx.tree.node(self.node).kind == NodeKind::Block
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Driver callback for the kind
pub fn process(
    handler: &mut dyn RuleHandler,
    ctx: &mut ConversionContext,
) -> Result<(), ConversionError> {
    let Some(this) = handler.as_any_mut().downcast_mut::<AnyInstanceBlock>() else {
        return Ok(());
    };
    let Some(&params) = ctx.tree.children(this.node).first() else {
        return Ok(());
    };
    if ctx.tree.node(params).kind != NodeKind::Params {
        return Ok(());
    }

    let span = ctx.tree.node(params).span;
    if span.is_empty() {
        // The parser leaves a zero-width parameter slot after the brace.
        ctx.insert_before(span, " |instance|");
        ctx.report.add_record(ConversionRecord::new(
            "Klass.any_instance.stub(:message) { }",
            "allow_any_instance_of(Klass).to receive(:message) { |instance| }",
        ));
    } else {
        let existing = ctx.tree.text(span).trim_start_matches('|').to_string();
        ctx.replace(span, &format!("|instance, {}", existing))
            .map_err(|c| {
                ConversionError::new("block parameters", "`|instance, ...|`", c.requested)
            })?;
        ctx.report.add_record(ConversionRecord::new(
            "Klass.any_instance.stub(:message) { |arg| }",
            "allow_any_instance_of(Klass).to receive(:message) { |instance, arg| }",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parse::parse;
    use crate::report::Report;
    use crate::rewriter::SourceRewriter;
    use crate::runtime::RuntimeData;
    use pretty_assertions::assert_eq;

    fn add_parameter(source: &str) -> (String, Report) {
        let tree = parse(source).unwrap();
        let call = tree.roots()[0];
        let block = tree.call_block(call).expect("block in fixture");
        let mut rewriter = SourceRewriter::new(source);
        let mut report = Report::new();
        let runtime = RuntimeData::new();
        let config = Config::default();
        let mut ctx = ConversionContext {
            tree: &tree,
            rewriter: &mut rewriter,
            runtime_data: &runtime,
            report: &mut report,
            config: &config,
        };
        let mut handler = instance(block);
        assert!(handler.conversion_target(&ctx));
        process(&mut *handler, &mut ctx).unwrap();
        (rewriter.rewrite(), report)
    }

    #[test]
    fn test_adds_parameter_to_bare_block() {
        let (out, report) = add_parameter("Klass.any_instance.stub(:message) { 1 }");
        assert_eq!(out, "Klass.any_instance.stub(:message) { |instance| 1 }");
        assert!(report.records[0]
            .converted_syntax
            .contains("{ |instance| }"));
    }

    #[test]
    fn test_prepends_to_existing_parameters() {
        let (out, _) = add_parameter("Klass.any_instance.stub(:message) { |arg| arg }");
        assert_eq!(
            out,
            "Klass.any_instance.stub(:message) { |instance, arg| arg }"
        );
    }
}
