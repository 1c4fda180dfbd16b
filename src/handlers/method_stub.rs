//! Monkey-patched stubbing conversion
//!
//! Rewrites `obj.stub(:msg)`, `obj.stub_chain(...)` and `obj.unstub(:msg)`
//! to the explicit `allow(obj).to receive(...)` forms, including the
//! any-instance variant `Klass.any_instance.stub` ->
//! `allow_any_instance_of(Klass)`. The deprecated bang aliases (`stub!`,
//! `unstub!`) are rewritten in place when full conversion is disabled.
//!
//! Receivers may define their own `stub` method, in which case the call must
//! not be touched. With runtime facts the decision is exact; without them a
//! static denylist of libraries known to do this keeps the conversion
//! conservative.

use crate::capabilities::{
    any_instance_target, receiver_root_name, selector_span, wrap_receiver,
};
use crate::error::ConversionError;
use crate::handler::{ConversionContext, RuleHandler};
use crate::handlers::any_instance_block;
use crate::record::ConversionRecord;
use crate::runtime::InstrumentationBuilder;
use crate::span::Location;
use crate::tree::{NodeId, NodeKind};
use std::any::Any;

/// Probe confirming the call resolves to the framework's own `stub`
pub const ALLOW_AVAILABLE: &str = "allow_available";

/// Probe confirming `receive_messages` is accepted by the target framework
pub const RECEIVE_MESSAGES_AVAILABLE: &str = "receive_messages_available";

/// Libraries known to define their own `stub` on their objects
const RECEIVER_DENYLIST: [&str; 3] = ["Typhoeus", "Excon", "Factory"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StubForm {
    Stub,
    StubChain,
    Unstub,
}

/// One stubbing call bound to its node
pub struct MethodStub {
    node: NodeId,
    matches: bool,
    form: StubForm,
    deprecated_bang: bool,
    any_instance_class: Option<NodeId>,
}

/// Trial-instance constructor
pub fn build(
    node: NodeId,
    ctx: &ConversionContext,
) -> Result<Box<dyn RuleHandler>, ConversionError> {
    let tree = ctx.tree;
    let selector = if tree.node(node).kind == NodeKind::Call {
        tree.selector_name(node)
    } else {
        None
    };
    let form = match selector {
        Some("stub") | Some("stub!") => Some(StubForm::Stub),
        Some("stub_chain") => Some(StubForm::StubChain),
        Some("unstub") | Some("unstub!") => Some(StubForm::Unstub),
        _ => None,
    };
    // Receiverless forms are old-style double creation (`stub(:name)`), not
    // stubbing; the node is simply not a target.
    let (Some(form), Some(_)) = (form, tree.call_receiver(node)) else {
        return Ok(Box::new(MethodStub {
            node,
            matches: false,
            form: StubForm::Stub,
            deprecated_bang: false,
            any_instance_class: None,
        }));
    };

    Ok(Box::new(MethodStub {
        node,
        matches: true,
        form,
        deprecated_bang: selector.is_some_and(|s| s.ends_with('!')),
        any_instance_class: any_instance_target(tree, node),
    }))
}

impl MethodStub {
    fn selector_name<'t>(&self, ctx: &'t ConversionContext) -> &'t str {
        ctx.tree.selector_name(self.node).unwrap_or_default()
    }

    /// First argument when it is a hash literal
    fn hash_arg(&self, ctx: &ConversionContext) -> Option<NodeId> {
        let args = ctx.tree.call_args(self.node);
        match args.as_slice() {
            [single] if ctx.tree.node(*single).kind == NodeKind::Hash => Some(*single),
            _ => None,
        }
    }

    /// Whether rewriting to an allowance is safe for this receiver
    fn allowance_safe(&self, ctx: &ConversionContext) -> bool {
        if ctx.runtime_data.has_data(self.node) {
            return ctx.runtime_data.observed(self.node, ALLOW_AVAILABLE);
        }
        let Some(receiver) = ctx.tree.call_receiver(self.node) else {
            return false;
        };
        let root = receiver_root_name(ctx.tree, receiver);
        !RECEIVER_DENYLIST.contains(&root.as_str())
    }
}

impl RuleHandler for MethodStub {
    fn kind_name(&self) -> &'static str {
        "MethodStub"
    }

    fn node(&self) -> NodeId {
        self.node
    }

    fn dynamic_analysis_target(&self, ctx: &ConversionContext) -> bool {
        self.matches && ctx.config.convert_stub
    }

    fn conversion_target(&self, ctx: &ConversionContext) -> bool {
        if !self.matches {
            return false;
        }
        if ctx.config.convert_stub {
            self.allowance_safe(ctx)
        } else {
            self.deprecated_bang && ctx.config.convert_deprecated_method
        }
    }

    fn dependents(&self, ctx: &ConversionContext) -> Vec<Box<dyn RuleHandler>> {
        if self.any_instance_class.is_none() || !ctx.config.convert_stub {
            return Vec::new();
        }
        ctx.tree
            .call_block(self.node)
            .map(|block| vec![any_instance_block::instance(block)])
            .unwrap_or_default()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Phase-1 request: observe whether the call reaches the framework's stub
pub fn request_allow_probe(
    handler: &dyn RuleHandler,
    ctx: &ConversionContext,
    builder: &mut InstrumentationBuilder,
) {
    let node = handler.node();
    builder.register(ALLOW_AVAILABLE, node, ctx.tree.node(node).span, "allow");
}

/// Phase-1 request: observe `receive_messages` support for hash stubs
pub fn request_receive_messages_probe(
    handler: &dyn RuleHandler,
    ctx: &ConversionContext,
    builder: &mut InstrumentationBuilder,
) {
    let node = handler.node();
    let args = ctx.tree.call_args(node);
    let has_hash = matches!(args.as_slice(),
        [single] if ctx.tree.node(*single).kind == NodeKind::Hash);
    if has_hash {
        builder.register(
            RECEIVE_MESSAGES_AVAILABLE,
            node,
            ctx.tree.node(node).span,
            "receive_messages",
        );
    }
}

/// Driver callback for the kind
pub fn process(
    handler: &mut dyn RuleHandler,
    ctx: &mut ConversionContext,
) -> Result<(), ConversionError> {
    let Some(this) = handler.as_any_mut().downcast_mut::<MethodStub>() else {
        return Ok(());
    };
    let node = this.node;
    let sel_name = this.selector_name(ctx).to_string();
    let sel_span =
        selector_span(ctx.tree, node).unwrap_or(ctx.tree.node(node).span);

    if !ctx.config.convert_stub {
        // Deprecated alias rewritten in place.
        let plain = sel_name.trim_end_matches('!');
        ctx.replace(sel_span, plain)
            .map_err(|c| ConversionError::new(&format!("`{}`", sel_name), "its current name", c.requested))?;
        ctx.report.add_record(ConversionRecord::new(
            &format!("obj.{}(:message)", sel_name),
            &format!("obj.{}(:message)", plain),
        ));
        return Ok(());
    }

    let construct = format!("`{}`", sel_name);
    let receiver = ctx.tree.call_receiver(node).unwrap_or(node);
    let receiver_span = ctx.tree.node(receiver).span;
    let original_base = if this.any_instance_class.is_some() {
        "Klass.any_instance"
    } else {
        "obj"
    };
    let converted_base = if this.any_instance_class.is_some() {
        "allow_any_instance_of(Klass)".to_string()
    } else {
        "allow(obj)".to_string()
    };

    // Hash stubs where receive_messages was observed unavailable expand into
    // one allowance per pair, replacing the whole call.
    if this.form == StubForm::Stub && this.hash_arg(ctx).is_some() {
        let unavailable = ctx.runtime_data.has_data(node)
            && !ctx.runtime_data.observed(node, RECEIVE_MESSAGES_AVAILABLE);
        if unavailable {
            let hash = this.hash_arg(ctx).unwrap_or(node);
            let allow_target = match this.any_instance_class {
                Some(class) => {
                    format!("allow_any_instance_of({})", ctx.tree.node_text(class))
                }
                None => format!("allow({})", ctx.tree.node_text(receiver)),
            };
            let call_span = ctx.tree.node(node).span;
            let indent = " ".repeat(
                Location::of_offset(ctx.tree.source(), call_span.start).column - 1,
            );
            let lines: Vec<String> = ctx
                .tree
                .children(hash)
                .iter()
                .map(|pair| {
                    let kv = ctx.tree.children(*pair);
                    format!(
                        "{}.to receive({}).and_return({})",
                        allow_target,
                        ctx.tree.node_text(kv[0]),
                        ctx.tree.node_text(kv[1]),
                    )
                })
                .collect();
            ctx.replace(call_span, &lines.join(&format!("\n{}", indent)))
                .map_err(|c| {
                    ConversionError::new(&construct, "`receive`", c.requested)
                })?;
            ctx.report.add_record(
                ConversionRecord::new(
                    &format!("{}.{}(:message => value)", original_base, sel_name),
                    &format!("{}.to receive(:message).and_return(value)", converted_base),
                )
                .with_annotation(),
            );
            return Ok(());
        }
    }

    match this.any_instance_class {
        Some(class) => {
            let class_text = ctx.tree.node_text(class).to_string();
            ctx.replace(receiver_span, &format!("allow_any_instance_of({})", class_text))
                .map_err(|c| {
                    ConversionError::new(&construct, "`allow_any_instance_of`", c.requested)
                })?;
        }
        None => wrap_receiver(ctx, receiver_span, "allow"),
    }

    let (replacement, original_args, converted_tail) = match this.form {
        StubForm::Stub if this.hash_arg(ctx).is_some() => (
            "to receive_messages",
            "(:message => value)",
            ".to receive_messages(:message => value)",
        ),
        StubForm::Stub => ("to receive", "(:message)", ".to receive(:message)"),
        StubForm::StubChain => (
            "to receive_message_chain",
            "(:first, :second)",
            ".to receive_message_chain(:first, :second)",
        ),
        StubForm::Unstub => (
            "to receive",
            "(:message)",
            ".to receive(:message).and_call_original",
        ),
    };
    ctx.replace(sel_span, replacement)
        .map_err(|c| ConversionError::new(&construct, "`allow`", c.requested))?;
    if this.form == StubForm::Unstub {
        ctx.insert_after(ctx.tree.node(node).span, ".and_call_original");
    }

    ctx.report.add_record(ConversionRecord::new(
        &format!("{}.{}{}", original_base, sel_name, original_args),
        &format!("{}{}", converted_base, converted_tail),
    ));
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
    fn test_stub_becomes_allow_to_receive() {
        let (out, report) = convert(
            "obj.stub(:message)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow(obj).to receive(:message)");
        assert_eq!(report.records[0].original_syntax, "obj.stub(:message)");
        assert_eq!(
            report.records[0].converted_syntax,
            "allow(obj).to receive(:message)"
        );
    }

    #[test]
    fn test_bang_stub_converts_fully_when_enabled() {
        let (out, _) = convert(
            "obj.stub!(:message)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow(obj).to receive(:message)");
    }

    #[test]
    fn test_bang_stub_renamed_when_conversion_disabled() {
        let config = Config {
            convert_stub: false,
            ..Config::default()
        };
        let (out, report) = convert("obj.stub!(:message)", &config, &RuntimeData::new());
        assert_eq!(out, "obj.stub(:message)");
        assert_eq!(report.records[0].original_syntax, "obj.stub!(:message)");
    }

    #[test]
    fn test_plain_stub_untouched_when_conversion_disabled() {
        let config = Config {
            convert_stub: false,
            ..Config::default()
        };
        let (out, report) = convert("obj.stub(:message)", &config, &RuntimeData::new());
        assert_eq!(out, "obj.stub(:message)");
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_hash_stub_becomes_receive_messages() {
        let (out, _) = convert(
            "obj.stub(:a => 1, :b => 2)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow(obj).to receive_messages(:a => 1, :b => 2)");
    }

    #[test]
    fn test_hash_stub_splits_when_receive_messages_unavailable() {
        let tree = parse("obj.stub(:a => 1, :b => 2)").unwrap();
        let node = tree.roots()[0];
        let mut runtime = RuntimeData::new();
        runtime.record(node, ALLOW_AVAILABLE, true);
        runtime.record(node, RECEIVE_MESSAGES_AVAILABLE, false);

        let (out, report) = convert("obj.stub(:a => 1, :b => 2)", &Config::default(), &runtime);
        assert_eq!(
            out,
            "allow(obj).to receive(:a).and_return(1)\nallow(obj).to receive(:b).and_return(2)"
        );
        assert!(report.records[0].annotation);
    }

    #[test]
    fn test_stub_chain() {
        let (out, report) = convert(
            "obj.stub_chain(:first, :second)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow(obj).to receive_message_chain(:first, :second)");
        assert_eq!(
            report.records[0].converted_syntax,
            "allow(obj).to receive_message_chain(:first, :second)"
        );
    }

    #[test]
    fn test_unstub_appends_and_call_original() {
        let (out, _) = convert(
            "obj.unstub(:message)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow(obj).to receive(:message).and_call_original");
    }

    #[test]
    fn test_any_instance_stub() {
        let (out, report) = convert(
            "Klass.any_instance.stub(:message)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "allow_any_instance_of(Klass).to receive(:message)");
        assert_eq!(
            report.records[0].original_syntax,
            "Klass.any_instance.stub(:message)"
        );
    }

    #[test]
    fn test_denylisted_receiver_left_alone_without_runtime_facts() {
        let (out, report) = convert(
            "Factory.stub(:build)",
            &Config::default(),
            &RuntimeData::new(),
        );
        assert_eq!(out, "Factory.stub(:build)");
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_runtime_fact_overrides_denylist() {
        let tree = parse("Factory.stub(:build)").unwrap();
        let node = tree.roots()[0];
        let mut runtime = RuntimeData::new();
        runtime.record(node, ALLOW_AVAILABLE, true);

        let (out, _) = convert("Factory.stub(:build)", &Config::default(), &runtime);
        assert_eq!(out, "allow(Factory).to receive(:build)");
    }

    #[test]
    fn test_runtime_fact_blocks_custom_stub() {
        let tree = parse("obj.stub(:message)").unwrap();
        let node = tree.roots()[0];
        let mut runtime = RuntimeData::new();
        runtime.record(node, ALLOW_AVAILABLE, false);

        let (out, report) = convert("obj.stub(:message)", &Config::default(), &runtime);
        assert_eq!(out, "obj.stub(:message)");
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_receiverless_stub_is_not_a_target() {
        // Old-style double creation, left alone without any report noise.
        let (out, report) = convert("stub(:name)", &Config::default(), &RuntimeData::new());
        assert_eq!(out, "stub(:name)");
        assert!(report.records.is_empty());
        assert!(report.conversion_errors.is_empty());
    }
}
