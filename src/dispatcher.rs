//! Per-node dispatch engine
//!
//! For each tree node the dispatcher tries every standalone kind in
//! registration order; the first kind whose trial instance claims the node
//! wins and no further kind is tried, so at most one standalone rule ever
//! owns a node. The winning instance's own handler callback runs first,
//! then the callback of every capability it includes, then its dependent
//! instances are dispatched recursively.
//!
//! Callbacks are routed by derived handler name; a name the driver did not
//! map is a deliberate no-op hook point, not an error. Conversion errors are
//! recorded against the report at this boundary and never abort the run.

use crate::handler::{ConversionContext, HandlerCallback, RuleHandler};
use crate::registry::{RegisteredKind, Registry};
use crate::runtime::InstrumentationBuilder;
use crate::tree::NodeId;
use log::{debug, warn};
use std::collections::HashMap;

/// Routes nodes to rule handlers and driver callbacks
pub struct Dispatcher<'r> {
    registry: &'r Registry,
    callbacks: HashMap<String, HandlerCallback>,
}

impl<'r> Dispatcher<'r> {
    /// Create a dispatcher over a populated registry and the driver's
    /// callback map (handler name -> callback), built once at startup
    pub fn new(registry: &'r Registry, callbacks: HashMap<String, HandlerCallback>) -> Self {
        Self {
            registry,
            callbacks,
        }
    }

    /// Dispatch one node; returns `true` when a standalone kind claimed it
    pub fn dispatch_node(&self, node: NodeId, ctx: &mut ConversionContext) -> bool {
        for kind in self.registry.standalone_kinds() {
            let instance = match (kind.kind.build)(node, ctx) {
                Ok(instance) => instance,
                Err(error) => {
                    // Malformed tree shape for this kind; record and keep
                    // trying the remaining kinds.
                    ctx.report.add_conversion_error(error);
                    continue;
                }
            };
            if !instance.conversion_target(ctx) {
                continue;
            }
            debug!("{} claimed by {}", node, kind.kind.name);
            self.dispatch_instance(kind, instance, ctx);
            return true;
        }
        false
    }

    /// Run the handler callbacks for a claiming instance, then its
    /// dependents
    fn dispatch_instance(
        &self,
        kind: &RegisteredKind,
        mut instance: Box<dyn RuleHandler>,
        ctx: &mut ConversionContext,
    ) {
        self.invoke(&kind.handler_name, &mut *instance, ctx);
        for capability_handler in &kind.capability_handlers {
            self.invoke(capability_handler, &mut *instance, ctx);
        }

        // Dependents are resolved after the handlers ran: discovering them
        // may require the main handler's rewrite to have happened already.
        for dependent in instance.dependents(ctx) {
            let Some(dependent_kind) = self.registry.find_kind(dependent.kind_name()) else {
                warn!("dependent instance of unregistered kind {}", dependent.kind_name());
                continue;
            };
            if dependent.conversion_target(ctx) {
                self.dispatch_instance(dependent_kind, dependent, ctx);
            }
        }
    }

    fn invoke(&self, handler_name: &str, instance: &mut dyn RuleHandler, ctx: &mut ConversionContext) {
        let Some(callback) = self.callbacks.get(handler_name) else {
            // Unmapped handler names are deliberate no-op hook points.
            return;
        };
        if let Err(error) = callback(instance, ctx) {
            debug!("{}: {}", handler_name, error);
            ctx.report.add_conversion_error(error);
        }
    }

    /// Phase-1 side mode: compile instrumentation requests for every
    /// standalone kind that claims this node as a dynamic-analysis target
    pub fn register_dynamic_analysis(
        &self,
        node: NodeId,
        ctx: &ConversionContext,
        builder: &mut InstrumentationBuilder,
    ) {
        for kind in self.registry.standalone_kinds() {
            let Ok(instance) = (kind.kind.build)(node, ctx) else {
                continue;
            };
            if !instance.dynamic_analysis_target(ctx) {
                continue;
            }
            for analysis in &kind.kind.dynamic_analyses {
                analysis(&*instance, ctx, builder);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ConversionError;
    use crate::record::ConversionRecord;
    use crate::registry::RuleKind;
    use crate::report::Report;
    use crate::rewriter::SourceRewriter;
    use crate::runtime::RuntimeData;
    use crate::span::Span;
    use crate::tree::{NodeKind, SyntaxTree};

    // A minimal kind that claims `Ident` nodes and logs which callbacks ran
    // by appending records.

    struct ClaimIdent {
        node: NodeId,
    }

    impl RuleHandler for ClaimIdent {
        fn kind_name(&self) -> &'static str {
            "ClaimIdent"
        }
        fn node(&self) -> NodeId {
            self.node
        }
        fn conversion_target(&self, ctx: &ConversionContext) -> bool {
            ctx.tree.node(self.node).kind == NodeKind::Ident
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    struct ClaimAnything {
        node: NodeId,
    }

    impl RuleHandler for ClaimAnything {
        fn kind_name(&self) -> &'static str {
            "ClaimAnything"
        }
        fn node(&self) -> NodeId {
            self.node
        }
        fn conversion_target(&self, _ctx: &ConversionContext) -> bool {
            true
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn build_claim_ident(
        node: NodeId,
        _ctx: &ConversionContext,
    ) -> Result<Box<dyn RuleHandler>, ConversionError> {
        Ok(Box::new(ClaimIdent { node }))
    }

    fn build_claim_anything(
        node: NodeId,
        _ctx: &ConversionContext,
    ) -> Result<Box<dyn RuleHandler>, ConversionError> {
        Ok(Box::new(ClaimAnything { node }))
    }

    fn build_failing(
        _node: NodeId,
        _ctx: &ConversionContext,
    ) -> Result<Box<dyn RuleHandler>, ConversionError> {
        Err(ConversionError::new("#broken", "#fixed", Span::new(0, 1)))
    }

    fn ident_tree() -> (SyntaxTree, NodeId) {
        let mut tree = SyntaxTree::new("obj");
        let id = tree.push(NodeKind::Ident, Some("obj".into()), Span::new(0, 3));
        tree.add_root(id);
        (tree, id)
    }

    fn cb_own(
        _h: &mut dyn RuleHandler,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        ctx.report.add_record(ConversionRecord::new("own", "ran"));
        Ok(())
    }

    fn cb_first(
        _h: &mut dyn RuleHandler,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        ctx.report.add_record(ConversionRecord::new("first", "ran"));
        Ok(())
    }

    fn cb_second(
        _h: &mut dyn RuleHandler,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        ctx.report.add_record(ConversionRecord::new("second", "ran"));
        Ok(())
    }

    fn cb_wrong_kind(
        _h: &mut dyn RuleHandler,
        ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        ctx.report.add_record(ConversionRecord::new("wrong", "kind"));
        Ok(())
    }

    fn cb_fail(
        _h: &mut dyn RuleHandler,
        _ctx: &mut ConversionContext,
    ) -> Result<(), ConversionError> {
        Err(ConversionError::new("#should", "#expect", Span::new(0, 3)))
    }

    fn run_dispatch(
        registry: &Registry,
        callbacks: HashMap<String, HandlerCallback>,
        tree: &SyntaxTree,
        node: NodeId,
    ) -> (bool, Report) {
        let mut rewriter = SourceRewriter::new(tree.source());
        let mut report = Report::new();
        let runtime_data = RuntimeData::new();
        let config = Config::default();
        let claimed = {
            let mut ctx = ConversionContext {
                tree,
                rewriter: &mut rewriter,
                runtime_data: &runtime_data,
                report: &mut report,
                config: &config,
            };
            Dispatcher::new(registry, callbacks).dispatch_node(node, &mut ctx)
        };
        (claimed, report)
    }

    #[test]
    fn test_first_claiming_kind_wins() {
        let mut registry = Registry::new();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                capabilities: Vec::new(),
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();
        registry
            .register_kind(RuleKind {
                name: "ClaimAnything",
                standalone: true,
                capabilities: Vec::new(),
                build: build_claim_anything,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let mut callbacks: HashMap<String, HandlerCallback> = HashMap::new();
        callbacks.insert("process_claim_ident".into(), cb_own as HandlerCallback);
        callbacks.insert("process_claim_anything".into(), cb_wrong_kind as HandlerCallback);

        let (tree, node) = ident_tree();
        let (claimed, report) = run_dispatch(&registry, callbacks, &tree, node);
        assert!(claimed);
        // Only the first claiming kind's callback ran.
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].original_syntax, "own");
    }

    #[test]
    fn test_unclaimed_node() {
        let mut registry = Registry::new();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                capabilities: Vec::new(),
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let mut tree = SyntaxTree::new(":sym");
        let node = tree.push(NodeKind::Sym, Some("sym".into()), Span::new(0, 4));
        tree.add_root(node);

        let (claimed, report) = run_dispatch(&registry, HashMap::new(), &tree, node);
        assert!(!claimed);
        assert!(report.records.is_empty());
    }

    #[test]
    fn test_mixin_callbacks_run_after_own_in_registration_order() {
        let mut registry = Registry::new();
        registry.register_capability("first_capability").unwrap();
        registry.register_capability("second_capability").unwrap();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                // Declared out of order; invocation follows registration.
                capabilities: vec!["second_capability", "first_capability"],
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let mut callbacks: HashMap<String, HandlerCallback> = HashMap::new();
        callbacks.insert("process_claim_ident".into(), cb_own as HandlerCallback);
        callbacks.insert("process_first_capability".into(), cb_first as HandlerCallback);
        callbacks.insert("process_second_capability".into(), cb_second as HandlerCallback);

        let (tree, node) = ident_tree();
        let (_, report) = run_dispatch(&registry, callbacks, &tree, node);
        let order: Vec<&str> = report
            .records
            .iter()
            .map(|r| r.original_syntax.as_str())
            .collect();
        assert_eq!(order, vec!["own", "first", "second"]);
    }

    #[test]
    fn test_unmapped_callback_is_noop() {
        let mut registry = Registry::new();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                capabilities: Vec::new(),
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let (tree, node) = ident_tree();
        let (claimed, report) = run_dispatch(&registry, HashMap::new(), &tree, node);
        assert!(claimed);
        assert!(report.records.is_empty());
        assert!(report.conversion_errors.is_empty());
    }

    #[test]
    fn test_failing_trial_construction_is_recorded_and_skipped() {
        let mut registry = Registry::new();
        registry
            .register_kind(RuleKind {
                name: "Broken",
                standalone: true,
                capabilities: Vec::new(),
                build: build_failing,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                capabilities: Vec::new(),
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let mut callbacks: HashMap<String, HandlerCallback> = HashMap::new();
        callbacks.insert("process_claim_ident".into(), cb_own as HandlerCallback);

        let (tree, node) = ident_tree();
        let (claimed, report) = run_dispatch(&registry, callbacks, &tree, node);
        // The broken kind was recorded; the run continued to the next kind.
        assert!(claimed);
        assert_eq!(report.conversion_errors.len(), 1);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn test_callback_error_recorded_without_abort() {
        let mut registry = Registry::new();
        registry.register_capability("after_error").unwrap();
        registry
            .register_kind(RuleKind {
                name: "ClaimIdent",
                standalone: true,
                capabilities: vec!["after_error"],
                build: build_claim_ident,
                dynamic_analyses: Vec::new(),
            })
            .unwrap();

        let mut callbacks: HashMap<String, HandlerCallback> = HashMap::new();
        callbacks.insert("process_claim_ident".into(), cb_fail as HandlerCallback);
        callbacks.insert("process_after_error".into(), cb_first as HandlerCallback);

        let (tree, node) = ident_tree();
        let (claimed, report) = run_dispatch(&registry, callbacks, &tree, node);
        assert!(claimed);
        assert_eq!(report.conversion_errors.len(), 1);
        // The mixin callback still ran after the error was recorded.
        assert_eq!(report.records.len(), 1);
    }
}
