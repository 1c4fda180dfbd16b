//! Conversion driver
//!
//! Owns the populated registry and the handler-callback map built once at
//! startup, and runs the two conversion phases per input unit: phase 1
//! compiles instrumentation requests for external execution, phase 2 walks
//! the tree dispatching every node and renders the rewritten source.
//!
//! Runtime facts are keyed by node identity within one tree, so ingested
//! facts only apply to the file whose instrumentation produced them.

use crate::capabilities::{self, MESSAGING_HOST, MONKEY_PATCH};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::SyntaxError;
use crate::handler::{ConversionContext, HandlerCallback};
use crate::handlers::{any_instance_block, implicit_assertion, method_stub};
use crate::parse::parse;
use crate::registry::{Registry, RegistryError, RuleKind};
use crate::report::Report;
use crate::rewriter::SourceRewriter;
use crate::runtime::{InstrumentationBuilder, RuntimeData};
use crate::span::Location;
use crate::tree::SyntaxTree;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Outcome of converting one input unit
#[derive(Debug, Clone)]
pub struct FileConversion {
    /// Path of the input unit
    pub path: PathBuf,
    /// Rewritten source text (unchanged when nothing applied)
    pub rewritten: String,
    /// Whether any edit was performed
    pub modified: bool,
    /// Per-unit report
    pub report: Report,
}

/// Registry populated with the built-in capabilities and rule kinds
pub fn default_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    registry.register_capability(MONKEY_PATCH)?;
    registry.register_capability(MESSAGING_HOST)?;
    registry.register_kind(RuleKind {
        name: "ImplicitAssertion",
        standalone: true,
        capabilities: vec![MONKEY_PATCH],
        build: implicit_assertion::build,
        dynamic_analyses: vec![implicit_assertion::request_expect_probe],
    })?;
    registry.register_kind(RuleKind {
        name: "MethodStub",
        standalone: true,
        capabilities: vec![MONKEY_PATCH, MESSAGING_HOST],
        build: method_stub::build,
        dynamic_analyses: vec![
            method_stub::request_allow_probe,
            method_stub::request_receive_messages_probe,
        ],
    })?;
    registry.register_kind(RuleKind {
        name: "AnyInstanceBlock",
        standalone: false,
        capabilities: Vec::new(),
        build: any_instance_block::build,
        dynamic_analyses: Vec::new(),
    })?;
    Ok(registry)
}

/// Handler-name routing table for the built-in kinds
///
/// `process_monkey_patch` is deliberately absent: the capability contributes
/// geometry only and its callback slot stays a no-op.
pub fn default_callbacks() -> HashMap<String, HandlerCallback> {
    let mut callbacks: HashMap<String, HandlerCallback> = HashMap::new();
    callbacks.insert(
        "process_implicit_assertion".to_string(),
        implicit_assertion::process,
    );
    callbacks.insert("process_method_stub".to_string(), method_stub::process);
    callbacks.insert(
        "process_any_instance_block".to_string(),
        any_instance_block::process,
    );
    callbacks.insert(
        "process_messaging_host".to_string(),
        capabilities::process_messaging_host,
    );
    callbacks
}

/// Two-phase converter over a fixed registry and configuration
pub struct Converter {
    registry: Registry,
    callbacks: HashMap<String, HandlerCallback>,
    config: Config,
}

impl Converter {
    /// Create a converter with the built-in rule kinds
    pub fn new(config: Config) -> Result<Self, RegistryError> {
        Ok(Self {
            registry: default_registry()?,
            callbacks: default_callbacks(),
            config,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Phase 1: compile instrumentation requests for a parsed tree
    ///
    /// The returned builder renders the instrumented program and ingests the
    /// external run's JSON output into a [`RuntimeData`] store for phase 2.
    pub fn instrumentation(&self, tree: &SyntaxTree) -> InstrumentationBuilder {
        let dispatcher = Dispatcher::new(&self.registry, self.callbacks.clone());
        let mut builder = InstrumentationBuilder::new();
        let mut rewriter = SourceRewriter::new(tree.source());
        let mut report = Report::new();
        let runtime = RuntimeData::new();
        for node in tree.iter() {
            let ctx = ConversionContext {
                tree,
                rewriter: &mut rewriter,
                runtime_data: &runtime,
                report: &mut report,
                config: &self.config,
            };
            dispatcher.register_dynamic_analysis(node, &ctx, &mut builder);
        }
        debug!("compiled {} instrumentation requests", builder.requests().len());
        builder
    }

    /// Phase 2: convert one source text, consulting the given runtime facts
    pub fn convert_source(
        &self,
        source: &str,
        path: &Path,
        runtime: &RuntimeData,
    ) -> (String, Report) {
        let mut report = Report::new();
        let tree = match parse(source) {
            Ok(tree) => tree,
            Err(error) => {
                report.add_syntax_error(SyntaxError::new(path, &error.message, error.location));
                return (source.to_string(), report);
            }
        };

        let dispatcher = Dispatcher::new(&self.registry, self.callbacks.clone());
        let mut rewriter = SourceRewriter::new(source);
        for node in tree.iter() {
            let mut ctx = ConversionContext {
                tree: &tree,
                rewriter: &mut rewriter,
                runtime_data: runtime,
                report: &mut report,
                config: &self.config,
            };
            dispatcher.dispatch_node(node, &mut ctx);
        }
        (rewriter.rewrite(), report)
    }

    /// Convert one file; IO failures are reported against the unit rather
    /// than aborting the run
    pub fn convert_file(&self, path: &Path, runtime: &RuntimeData) -> FileConversion {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                let mut report = Report::new();
                report.add_syntax_error(SyntaxError::new(
                    path,
                    &format!("failed to read file: {}", error),
                    Location::new(1, 1),
                ));
                return FileConversion {
                    path: path.to_path_buf(),
                    rewritten: String::new(),
                    modified: false,
                    report,
                };
            }
        };

        let (rewritten, report) = self.convert_source(&source, path, runtime);
        let modified = rewritten != source;
        if modified {
            info!("{}: {} conversions", path.display(), report.records.len());
        }
        FileConversion {
            path: path.to_path_buf(),
            rewritten,
            modified,
            report,
        }
    }

    /// Convert many files, in parallel when configured, and aggregate one
    /// run-wide report
    pub fn convert_files(
        &self,
        paths: &[PathBuf],
        runtime: &RuntimeData,
    ) -> (Vec<FileConversion>, Report) {
        let pool = if self.config.parallel {
            rayon::ThreadPoolBuilder::new()
                .num_threads(if self.config.jobs > 0 {
                    self.config.jobs
                } else {
                    num_cpus::get()
                })
                .build()
                .ok()
        } else {
            None
        };
        let conversions: Vec<FileConversion> = match pool {
            Some(pool) => pool.install(|| {
                paths
                    .par_iter()
                    .map(|path| self.convert_file(path, runtime))
                    .collect()
            }),
            None => paths
                .iter()
                .map(|path| self.convert_file(path, runtime))
                .collect(),
        };

        let mut combined = Report::new();
        for conversion in &conversions {
            combined.merge(conversion.report.clone());
        }
        (conversions, combined)
    }
}
