//! Dynamic analysis: instrumentation requests and the runtime fact store
//!
//! Phase 1 walks the tree in a side mode and compiles instrumentation
//! requests (probe name, target node, trigger condition) into an
//! [`InstrumentationBuilder`]. The program is then executed externally under
//! instrumentation; its JSON output is ingested into a [`RuntimeData`] store
//! keyed by node identity. Phase 2 consults the store through
//! `observed(node, probe)`, which is true only if that exact probe fired
//! during execution. When no fact exists for a node, rules fall back to a
//! conservative static heuristic.

use crate::rewriter::SourceRewriter;
use crate::span::Span;
use crate::tree::NodeId;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// One compiled instrumentation request
#[derive(Debug, Clone, Serialize)]
pub struct ProbeRequest {
    /// Probe identifier (e.g. `expect_available`)
    pub probe: String,
    /// Target node identity
    #[serde(skip)]
    pub node: NodeId,
    /// Source range the probe observes
    pub span: Span,
    /// Condition under which the probe fires (e.g. a selector whose
    /// implementation must be reached)
    pub trigger: String,
}

/// Collects instrumentation requests during the phase-1 walk
#[derive(Debug, Default)]
pub struct InstrumentationBuilder {
    requests: Vec<ProbeRequest>,
}

impl InstrumentationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe against a node
    pub fn register(&mut self, probe: &str, node: NodeId, span: Span, trigger: &str) {
        debug!("instrumentation request: {} on {} ({})", probe, node, trigger);
        self.requests.push(ProbeRequest {
            probe: probe.to_string(),
            node,
            span,
            trigger: trigger.to_string(),
        });
    }

    /// All compiled requests in registration order
    pub fn requests(&self) -> &[ProbeRequest] {
        &self.requests
    }

    /// Render the program with probe markers injected around each target
    /// span, ready for external execution
    pub fn instrument(&self, source: &str) -> String {
        let mut rewriter = SourceRewriter::new(source);
        for (index, request) in self.requests.iter().enumerate() {
            rewriter.insert_before(request.span, &format!("__respec_probe({}, ", index));
            rewriter.insert_after(request.span, ")");
        }
        rewriter.rewrite()
    }

    /// Ingest the instrumented run's JSON output (`{"<index>": bool, ..}`)
    /// into a fact store keyed by node identity
    pub fn ingest(&self, json: &str) -> Result<RuntimeData, serde_json::Error> {
        let fired: HashMap<String, bool> = serde_json::from_str(json)?;
        let mut data = RuntimeData::new();
        for (index, request) in self.requests.iter().enumerate() {
            if let Some(value) = fired.get(&index.to_string()) {
                data.record(request.node, &request.probe, *value);
            }
        }
        Ok(data)
    }
}

/// Facts gathered by executing the instrumented program
///
/// An empty store is also the "analysis skipped" state; rules then use their
/// static fallbacks.
#[derive(Debug, Clone, Default)]
pub struct RuntimeData {
    facts: HashMap<NodeId, HashMap<String, bool>>,
}

impl RuntimeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fact for a node
    pub fn record(&mut self, node: NodeId, probe: &str, value: bool) {
        self.facts
            .entry(node)
            .or_default()
            .insert(probe.to_string(), value);
    }

    /// Check whether any fact exists for the node (the instrumented path ran)
    pub fn has_data(&self, node: NodeId) -> bool {
        self.facts.contains_key(&node)
    }

    /// True only if this exact probe fired for this node during execution
    pub fn observed(&self, node: NodeId, probe: &str) -> bool {
        self.facts
            .get(&node)
            .and_then(|probes| probes.get(probe))
            .copied()
            .unwrap_or(false)
    }
}
