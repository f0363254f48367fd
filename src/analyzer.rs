//! Driver glue.
//!
//! Wires the pipeline: function discovery -> call-graph construction ->
//! wrapping propagation -> per-function flow analysis -> reporting. The
//! pass body runs under `catch_unwind`; an internal fault becomes the pass's
//! error result instead of tearing down the process, and diagnostics emitted
//! before the fault are preserved.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::Config;
use crate::diagnostics::{CollectingReporter, Diagnostic};
use crate::error::StacklintError;
use crate::go::ast::Position;
use crate::go::package::PkgInfo;
use crate::index::PackageIndex;
use crate::registry::{FuncId, FunctionRegistry};

/// Name reported for pass-level faults.
pub const ANALYZER_NAME: &str = "stacklint";

/// Input for one analysis run: the package under analysis plus the shared
/// package index.
#[derive(Debug, Clone)]
pub struct Pass {
    pub pkg: Arc<PkgInfo>,
    pub index: Arc<PackageIndex>,
}

/// Output of one analysis run. `error` is set when the pass hit an internal
/// fault; diagnostics gathered before the fault are still present.
#[derive(Debug)]
pub struct PassResult {
    pub diagnostics: Vec<Diagnostic>,
    pub error: Option<StacklintError>,
}

/// Per-run mutable state shared by the pipeline stages. The stage
/// implementations live in `callgraph`, `propagate` and `flow`.
pub(crate) struct Session<'a> {
    pub(crate) config: &'a Config,
    pub(crate) index: &'a PackageIndex,
    pub(crate) pass_pkg: Arc<PkgInfo>,
    pub(crate) registry: FunctionRegistry,
    /// Functions declared in the pass files, in discovery (pre-)order.
    pub(crate) original: Vec<FuncId>,
    /// Memoised error-typedness per object definition position.
    pub(crate) error_cache: FxHashMap<Position, bool>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(config: &'a Config, index: &'a PackageIndex, pass_pkg: Arc<PkgInfo>) -> Self {
        Self {
            config,
            index,
            pass_pkg,
            registry: FunctionRegistry::default(),
            original: Vec::new(),
            error_cache: FxHashMap::default(),
        }
    }

    fn run(&mut self, reporter: &mut CollectingReporter) {
        debug!("discovering error-returning functions");
        self.discover_functions();
        debug!(functions = self.registry.len(), "building call graph");
        self.build_call_graph();
        debug!("propagating wrapping");
        self.mark_tainted_functions();
        debug!("analyzing original functions");
        self.analyze_original_functions(reporter);

        for id in self.registry.ids() {
            let func = self.registry.get(id);
            debug!(
                name = %func.name,
                pkg = %func.pkg_path,
                wrapping = func.is_wrapping,
                callers = func.called_by.len(),
                pos = %func.pos,
                "function"
            );
        }
    }
}

/// The analyzer: immutable policy plus the `analyze` entry point.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: Config,
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the full pipeline over one pass.
    pub fn analyze(&self, pass: &Pass) -> PassResult {
        let mut reporter = CollectingReporter::default();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut session = Session::new(&self.config, &pass.index, Arc::clone(&pass.pkg));
            session.run(&mut reporter);
        }));

        let error = match outcome {
            Ok(()) => None,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                Some(StacklintError::Internal {
                    analyzer: ANALYZER_NAME,
                    message,
                    backtrace: std::backtrace::Backtrace::force_capture().to_string(),
                })
            }
        };

        PassResult {
            diagnostics: reporter.diagnostics,
            error,
        }
    }
}
