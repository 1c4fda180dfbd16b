//! Registry of rule kinds and mixin capabilities
//!
//! The registry is populated once at process start and read-only thereafter.
//! Registration order is preserved and drives dispatch order. Registering
//! two kinds or capabilities under one name, or including an unknown
//! capability, is a configuration error and fails fast at load time.

use crate::handler::{AnalysisRequestFn, BuildFn};
use log::debug;
use thiserror::Error;

/// Load-time configuration error
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("rule kind `{0}` is already registered")]
    DuplicateKind(String),

    #[error("capability `{0}` is already registered")]
    DuplicateCapability(String),

    #[error("rule kind `{kind}` includes unknown capability `{capability}`")]
    UnknownCapability { kind: String, capability: String },
}

/// Declaration of one rule handler kind
pub struct RuleKind {
    /// Unique kind name (e.g. `MethodStub`)
    pub name: &'static str,
    /// Only standalone kinds are dispatch roots
    pub standalone: bool,
    /// Names of the mixin capabilities this kind includes
    pub capabilities: Vec<&'static str>,
    /// Trial-instance constructor
    pub build: BuildFn,
    /// Phase-1 instrumentation request compilers, in declaration order
    pub dynamic_analyses: Vec<AnalysisRequestFn>,
}

/// A registered kind with its derived routing data
pub struct RegisteredKind {
    pub kind: RuleKind,
    /// Derived handler callback name (`process_` + snake-cased kind name)
    pub handler_name: String,
    /// Handler names of the included capabilities, in capability
    /// registration order
    pub capability_handlers: Vec<String>,
}

/// A registered mixin capability
#[derive(Debug, Clone)]
pub struct RegisteredCapability {
    /// Capability name (already snake-cased, e.g. `messaging_host`)
    pub name: &'static str,
    /// Derived handler callback name
    pub handler_name: String,
}

/// Catalog of all known rule kinds and capabilities
#[derive(Default)]
pub struct Registry {
    kinds: Vec<RegisteredKind>,
    capabilities: Vec<RegisteredCapability>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mixin capability; must precede the kinds including it
    pub fn register_capability(&mut self, name: &'static str) -> Result<(), RegistryError> {
        if self.capabilities.iter().any(|c| c.name == name) {
            return Err(RegistryError::DuplicateCapability(name.to_string()));
        }
        debug!("registered capability {}", name);
        self.capabilities.push(RegisteredCapability {
            name,
            handler_name: format!("process_{}", name),
        });
        Ok(())
    }

    /// Register a rule kind, resolving its included capabilities
    pub fn register_kind(&mut self, kind: RuleKind) -> Result<(), RegistryError> {
        if self.kinds.iter().any(|k| k.kind.name == kind.name) {
            return Err(RegistryError::DuplicateKind(kind.name.to_string()));
        }
        for capability in &kind.capabilities {
            if !self.capabilities.iter().any(|c| c.name == *capability) {
                return Err(RegistryError::UnknownCapability {
                    kind: kind.name.to_string(),
                    capability: capability.to_string(),
                });
            }
        }
        // Resolve includes in capability registration order, which fixes the
        // mixin invocation order for this kind.
        let capability_handlers = self
            .capabilities
            .iter()
            .filter(|c| kind.capabilities.contains(&c.name))
            .map(|c| c.handler_name.clone())
            .collect();
        let handler_name = format!("process_{}", snake_case(kind.name));
        debug!("registered kind {} -> {}", kind.name, handler_name);
        self.kinds.push(RegisteredKind {
            kind,
            handler_name,
            capability_handlers,
        });
        Ok(())
    }

    /// Every registered kind in registration order
    pub fn all_kinds(&self) -> impl Iterator<Item = &RegisteredKind> {
        self.kinds.iter()
    }

    /// Registered standalone kinds, order preserved
    pub fn standalone_kinds(&self) -> impl Iterator<Item = &RegisteredKind> {
        self.kinds.iter().filter(|k| k.kind.standalone)
    }

    /// Every registered capability in registration order
    pub fn capabilities(&self) -> &[RegisteredCapability] {
        &self.capabilities
    }

    /// Look up a kind by name
    pub fn find_kind(&self, name: &str) -> Option<&RegisteredKind> {
        self.kinds.iter().find(|k| k.kind.name == name)
    }
}

/// Derive a snake-cased name from a camel-cased kind name
/// (`MethodStub` -> `method_stub`)
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
