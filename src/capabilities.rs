//! Mixin capabilities shared by the conversion rule kinds
//!
//! A capability is a named bundle of behavior attached to many rule kinds at
//! registration. Its callback runs after the owning kind's own handler, in
//! capability registration order. `monkey_patch` contributes only geometry
//! helpers and keeps its callback unmapped.

use crate::error::ConversionError;
use crate::handler::{ConversionContext, RuleHandler};
use crate::record::ConversionRecord;
use crate::span::Span;
use crate::tree::{NodeId, NodeKind, SyntaxTree};
use log::debug;

/// Capability name for kinds converting monkey-patched call forms
pub const MONKEY_PATCH: &str = "monkey_patch";

/// Capability name for kinds whose node hosts message allowances
pub const MESSAGING_HOST: &str = "messaging_host";

/// Remove a redundant no-message allowance chained onto the handled call
///
/// `.any_number_of_times` and `.at_least(0)` carry no meaning once the call
/// is expressed through the explicit convention; the trailing segment is
/// dropped wholesale.
pub fn process_messaging_host(
    handler: &mut dyn RuleHandler,
    ctx: &mut ConversionContext,
) -> Result<(), ConversionError> {
    let node = handler.node();
    let Some(parent) = ctx.tree.parent(node) else {
        return Ok(());
    };
    if ctx.tree.node(parent).kind != NodeKind::Call
        || ctx.tree.call_receiver(parent) != Some(node)
    {
        return Ok(());
    }

    let allowance = match ctx.tree.selector_name(parent) {
        Some("any_number_of_times") if ctx.tree.call_args(parent).is_empty() => {
            "any_number_of_times"
        }
        Some("at_least") => {
            let args = ctx.tree.call_args(parent);
            if args.len() == 1 && ctx.tree.node_text(args[0]) == "0" {
                "at_least(0)"
            } else {
                return Ok(());
            }
        }
        _ => return Ok(()),
    };

    let tail = Span::new(ctx.tree.node(node).span.end, ctx.tree.node(parent).span.end);
    debug!("removing redundant allowance {:?}", ctx.tree.text(tail));
    ctx.remove(tail)
        .map_err(|conflict| ConversionError::new("no-message allowance", "removal", conflict.requested))?;
    ctx.report.add_record(ConversionRecord::new(
        &format!("obj.stub(:message).{}", allowance),
        "obj.stub(:message)",
    ));
    Ok(())
}

// Shared geometry for monkey-patched call forms: every handled call is
// `receiver.selector(args..)`, and the conversions wrap or replace the
// receiver and selector portions independently.

/// Span of a call's receiver
pub fn receiver_span(tree: &SyntaxTree, call: NodeId) -> Option<Span> {
    tree.call_receiver(call).map(|r| tree.node(r).span)
}

/// Span of a call's selector token
pub fn selector_span(tree: &SyntaxTree, call: NodeId) -> Option<Span> {
    tree.call_selector(call).map(|s| tree.node(s).span)
}

/// Match a `Klass.any_instance` receiver; returns the constant node
pub fn any_instance_target(tree: &SyntaxTree, call: NodeId) -> Option<NodeId> {
    let receiver = tree.call_receiver(call)?;
    if tree.node(receiver).kind != NodeKind::Call
        || tree.selector_name(receiver) != Some("any_instance")
    {
        return None;
    }
    let class = tree.call_receiver(receiver)?;
    (tree.node(class).kind == NodeKind::Const).then_some(class)
}

/// Leading identifier of a receiver expression, for denylist matching
/// (`Factory.build(:user)` -> `Factory`)
pub fn receiver_root_name(tree: &SyntaxTree, receiver: NodeId) -> String {
    let text = tree.node_text(receiver);
    text.split(['.', '(']).next().unwrap_or(text).to_string()
}

/// Wrap a receiver span in a call to `wrapper`
pub fn wrap_receiver(ctx: &mut ConversionContext, receiver: Span, wrapper: &str) {
    ctx.insert_before(receiver, &format!("{}(", wrapper));
    ctx.insert_after(receiver, ")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn test_any_instance_target() {
        let tree = parse("Klass.any_instance.stub(:message)").unwrap();
        let call = tree.roots()[0];
        let class = any_instance_target(&tree, call).unwrap();
        assert_eq!(tree.node_text(class), "Klass");
    }

    #[test]
    fn test_any_instance_target_rejects_plain_receiver() {
        let tree = parse("obj.stub(:message)").unwrap();
        assert!(any_instance_target(&tree, tree.roots()[0]).is_none());
    }

    #[test]
    fn test_receiver_root_name() {
        let tree = parse("Factory.build(:user).stub(:save)").unwrap();
        let call = tree.roots()[0];
        let receiver = tree.call_receiver(call).unwrap();
        assert_eq!(receiver_root_name(&tree, receiver), "Factory");
    }

    #[test]
    fn test_receiver_root_name_of_ident() {
        let tree = parse("obj.stub(:save)").unwrap();
        let receiver = tree.call_receiver(tree.roots()[0]).unwrap();
        assert_eq!(receiver_root_name(&tree, receiver), "obj");
    }
}
