//! Implicit-subject assertion conversion
//!
//! Rewrites `obj.should matcher` and `obj.should_not matcher` to the
//! explicit `expect(obj).to matcher` / `expect(obj).not_to matcher` forms.
//! Proc subjects (`lambda { }.should`, `proc { }.should`,
//! `Proc.new { }.should`) become `expect { }`. When runtime observation
//! shows `expect` is unavailable at the call site the node is left alone and
//! a conversion error is recorded.

use crate::capabilities::{selector_span, wrap_receiver};
use crate::error::ConversionError;
use crate::handler::{ConversionContext, RuleHandler};
use crate::record::ConversionRecord;
use crate::runtime::InstrumentationBuilder;
use crate::span::Span;
use crate::tree::{NodeId, NodeKind};
use std::any::Any;

/// Probe confirming the explicit assertion syntax is reachable at this site
pub const EXPECT_AVAILABLE: &str = "expect_available";

/// The proc-subject form in front of `.should`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcForm {
    /// `lambda { }` or `proc { }`; the span covers the keyword selector
    Keyword(Span),
    /// `Proc.new { }`; the span covers `Proc.new`
    New(Span),
}

/// One `should`/`should_not` call bound to its node
pub struct ImplicitAssertion {
    node: NodeId,
    matches: bool,
    negative: bool,
    proc_subject: Option<ProcForm>,
}

impl ImplicitAssertion {
    fn keyword(&self) -> &'static str {
        if self.negative {
            "should_not"
        } else {
            "should"
        }
    }
}

/// Trial-instance constructor
pub fn build(
    node: NodeId,
    ctx: &ConversionContext,
) -> Result<Box<dyn RuleHandler>, ConversionError> {
    let tree = ctx.tree;
    let negative = match (tree.node(node).kind, tree.selector_name(node)) {
        (NodeKind::Call, Some("should")) => false,
        (NodeKind::Call, Some("should_not")) => true,
        _ => {
            return Ok(Box::new(ImplicitAssertion {
                node,
                matches: false,
                negative: false,
                proc_subject: None,
            }))
        }
    };

    let Some(receiver) = tree.call_receiver(node) else {
        // One-liner form without an explicit subject; not a target.
        return Ok(Box::new(ImplicitAssertion {
            node,
            matches: false,
            negative: false,
            proc_subject: None,
        }));
    };

    let proc_subject = proc_form(ctx, receiver);
    Ok(Box::new(ImplicitAssertion {
        node,
        matches: true,
        negative,
        proc_subject,
    }))
}

/// Detect a proc literal receiver carrying a block
fn proc_form(ctx: &ConversionContext, receiver: NodeId) -> Option<ProcForm> {
    let tree = ctx.tree;
    if tree.node(receiver).kind != NodeKind::Call || tree.call_block(receiver).is_none() {
        return None;
    }
    match tree.selector_name(receiver) {
        Some("lambda") | Some("proc") if tree.call_receiver(receiver).is_none() => {
            Some(ProcForm::Keyword(selector_span(tree, receiver)?))
        }
        Some("new") => {
            let class = tree.call_receiver(receiver)?;
            if tree.node(class).kind != NodeKind::Const || tree.node_text(class) != "Proc" {
                return None;
            }
            let start = tree.node(class).span.start;
            let end = selector_span(tree, receiver)?.end;
            Some(ProcForm::New(Span::new(start, end)))
        }
        _ => None,
    }
}

impl RuleHandler for ImplicitAssertion {
    fn kind_name(&self) -> &'static str {
        "ImplicitAssertion"
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn dynamic_analysis_target(&self, ctx: &ConversionContext) -> bool {
        self.matches && ctx.config.convert_should
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Phase-1 request: observe whether `expect` resolves at this call site
pub fn request_expect_probe(
    handler: &dyn RuleHandler,
    ctx: &ConversionContext,
    builder: &mut InstrumentationBuilder,
) {
    let node = handler.node();
    builder.register(EXPECT_AVAILABLE, node, ctx.tree.node(node).span, "expect");
}

/// Driver callback for the kind
pub fn process(
    handler: &mut dyn RuleHandler,
    ctx: &mut ConversionContext,
) -> Result<(), ConversionError> {
    let Some(this) = handler.as_any_mut().downcast_mut::<ImplicitAssertion>() else {
        return Ok(());
    };
    let node = this.node;
    let sel_span = selector_span(ctx.tree, node)
        .unwrap_or(ctx.tree.node(node).span);

    if ctx.runtime_data.has_data(node) && !ctx.runtime_data.observed(node, EXPECT_AVAILABLE) {
        return Err(ConversionError::new(
            &format!("`{}`", this.keyword()),
            "`expect`",
            sel_span,
        ));
    }

    let to_form = if this.negative {
        ctx.config.negative_form.as_str()
    } else {
        "to"
    };
    let construct = format!("`{}`", this.keyword());

    match this.proc_subject {
        Some(ProcForm::Keyword(span)) => {
            let keyword = ctx.tree.text(span).to_string();
            ctx.replace(span, "expect")
                .map_err(|c| ConversionError::new(&construct, "`expect`", c.requested))?;
            ctx.replace(sel_span, to_form)
                .map_err(|c| ConversionError::new(&construct, "`expect`", c.requested))?;
            ctx.report.add_record(ConversionRecord::new(
                &format!("{} {{ }}.{}", keyword, this.keyword()),
                &format!("expect {{ }}.{}", to_form),
            ));
        }
        Some(ProcForm::New(span)) => {
            ctx.replace(span, "expect")
                .map_err(|c| ConversionError::new(&construct, "`expect`", c.requested))?;
            ctx.replace(sel_span, to_form)
                .map_err(|c| ConversionError::new(&construct, "`expect`", c.requested))?;
            ctx.report.add_record(ConversionRecord::new(
                &format!("Proc.new {{ }}.{}", this.keyword()),
                &format!("expect {{ }}.{}", to_form),
            ));
        }
        None => {
            let receiver = ctx
                .tree
                .call_receiver(node)
                .map(|r| ctx.tree.node(r).span)
                .unwrap_or(sel_span);
            wrap_receiver(ctx, receiver, "expect");
            ctx.replace(sel_span, to_form)
                .map_err(|c| ConversionError::new(&construct, "`expect`", c.requested))?;
            ctx.report.add_record(ConversionRecord::new(
                &format!("obj.{}", this.keyword()),
                &format!("expect(obj).{}", to_form),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, NegativeForm};
    use crate::parse::parse;
    use crate::report::Report;
    use crate::rewriter::SourceRewriter;
    use crate::runtime::RuntimeData;
    use pretty_assertions::assert_eq;

    fn convert(source: &str, config: &Config, runtime: &RuntimeData) -> (String, Report) {
        let tree = parse(source).unwrap();
        let mut rewriter = SourceRewriter::new(source);
        let mut report = Report::new();
        for id in tree.iter() {
            let mut ctx = ConversionContext {
                tree: &tree,
                rewriter: &mut rewriter,
                runtime_data: runtime,
                report: &mut report,
                config,
            };
            let Ok(mut instance) = build(id, &ctx) else {
                continue;
            };
            if instance.conversion_target(&ctx) {
                if let Err(error) = process(&mut *instance, &mut ctx) {
                    ctx.report.add_conversion_error(error);
                }
            }
        }
        (rewriter.rewrite(), report)
    }

    #[test]
    fn test_should_becomes_expect_to() {
        let (out, report) = convert(
            "obj.should eq(1)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "expect(obj).to eq(1)");
        assert_eq!(report.records[0].original_syntax, "obj.should");
        assert_eq!(report.records[0].converted_syntax, "expect(obj).to");
    }

    #[test]
    fn test_should_not_uses_configured_negative_form() {
        let (out, _) = convert(
            "obj.should_not eq(1)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "expect(obj).not_to eq(1)");

        let config = Config {
            negative_form: NegativeForm::ToNot,
            ..Config::default()
        };
        let (out, _) = convert("obj.should_not eq(1)", &config, &RuntimeData::new());
        assert_eq!(out, "expect(obj).to_not eq(1)");
    }

    #[test]
    fn test_lambda_subject_becomes_expect_block() {
        let (out, report) = convert(
            "lambda { raise }.should raise_error",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "expect { raise }.to raise_error");
        assert_eq!(report.records[0].original_syntax, "lambda { }.should");
        assert_eq!(report.records[0].converted_syntax, "expect { }.to");
    }

    #[test]
    fn test_proc_new_subject_becomes_expect_block() {
        let (out, _) = convert(
            "Proc.new { raise }.should raise_error",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "expect { raise }.to raise_error");
    }

    #[test]
    fn test_unavailable_expect_records_error_and_leaves_source() {
        let tree = parse("obj.should eq(1)").unwrap();
        let node = tree.roots()[0];
        let mut runtime = RuntimeData::new();
        runtime.record(node, EXPECT_AVAILABLE, false);

        let (out, report) = convert("obj.should eq(1)", &Config::default(), &runtime);
        assert_eq!(out, "obj.should eq(1)");
        assert_eq!(report.conversion_errors.len(), 1);
        assert_eq!(report.conversion_errors[0].construct, "`should`");
    }

    #[test]
    fn test_observed_availability_allows_conversion() {
        let tree = parse("obj.should eq(1)").unwrap();
        let node = tree.roots()[0];
        let mut runtime = RuntimeData::new();
        runtime.record(node, EXPECT_AVAILABLE, true);

        let (out, _) = convert("obj.should eq(1)", &Config::default(), &runtime);
        assert_eq!(out, "expect(obj).to eq(1)");
    }

    #[test]
    fn test_convert_should_disabled() {
        let config = Config {
            convert_should: false,
            ..Config::default()
        };
        let (out, report) = convert("obj.should eq(1)", &config, &RuntimeData::new());
        assert_eq!(out, "obj.should eq(1)");
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_unrelated_call_not_claimed() {
        let (out, report) = convert(
            "obj.save(:now)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "obj.save(:now)");
        assert!(report.records.is_empty());
    }
}
