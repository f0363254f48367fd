//! stacklint - finds unnecessary error wrapping with stack traces in Go.
//!
//! Wrapping an error that already carries a stack trace (for example
//! `errors.Wrap(errors.WithStack(err), "...")` with `github.com/pkg/errors`)
//! duplicates the trace in logs. This crate detects such call sites
//! statically and proposes textual fixes that swap the wrapper for a
//! non-stack-adding alternative or drop it entirely.
//!
//! # Architecture
//!
//! The pipeline runs in four phases over a parsed package:
//!
//! - **Function registry** ([`registry`]): every function whose result list
//!   contains an error-typed field, keyed by declaration position.
//! - **Call graph** ([`callgraph`]): resolves call expressions and records
//!   reverse `called_by` edges, bounded by the configured depth.
//! - **Propagation** ([`propagate`]): seeds configured wrapper/clean
//!   functions and pushes "returns stack-traced errors" backwards to
//!   callers; clean functions are a hard barrier.
//! - **Flow analysis** ([`flow`]): walks each original function's CFG with
//!   a per-variable taint map and reports wrapper calls whose argument is
//!   already traced.
//!
//! The Go front end ([`go`]) lowers tree-sitter parse trees into the typed
//! AST the analyzer inspects; [`index`] holds the lazily-populated package
//! index used to resolve cross-package references.
//!
//! # Quick start
//!
//! ```no_run
//! use stacklint::{analyze_dir, Config};
//!
//! let report = analyze_dir(std::path::Path::new("./internal/api"), Config::default())?;
//! for diag in &report.diagnostics {
//!     println!("{}: {}", diag.position, diag.message);
//! }
//! # Ok::<(), stacklint::StacklintError>(())
//! ```

pub mod analyzer;
pub mod callgraph;
pub mod cfg;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod go;
pub mod index;
pub mod propagate;
pub mod registry;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

pub use analyzer::{Analyzer, Pass, PassResult, ANALYZER_NAME};
pub use config::{Config, PkgFunctions, PkgsFunctions};
pub use diagnostics::{render_text, CollectingReporter, Diagnostic, Reporter, SuggestedFix, TextEdit};
pub use error::{Result, StacklintError};
pub use go::ast::Position;
pub use index::PackageIndex;

use go::package::PkgInfo;

/// Result of analyzing one package.
#[derive(Debug)]
pub struct AnalysisReport {
    /// Diagnostics in emission order (CFG pre-order within a function,
    /// discovery order across functions).
    pub diagnostics: Vec<Diagnostic>,
    /// Pass-level internal fault, if one occurred.
    pub error: Option<String>,
}

/// Analyze the Go package in `dir` as one pass.
///
/// The directory's non-test `.go` files form the package under analysis;
/// the package index walks the same directory (including `vendor/` unless
/// disabled) to resolve cross-package references. Unless the caller set one,
/// `work_dir` becomes `dir` itself, so package paths are relative to it.
pub fn analyze_dir(dir: &Path, mut config: Config) -> Result<AnalysisReport> {
    if config.work_dir.is_empty() {
        config.resolve_paths(Some(dir));
    }

    let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| StacklintError::io_with_path(e, dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("go")
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with("_test.go"))
        })
        .collect();
    entries.sort();

    let mut files = Vec::with_capacity(entries.len());
    for path in &entries {
        files.push(Arc::new(go::parser::parse_file(path)?));
    }

    let pkg_path = config.dir_pkg_path(&dir.to_string_lossy());
    debug!(dir = %dir.display(), pkg = %pkg_path, files = files.len(), "analyzing package");
    let pass = Pass {
        pkg: Arc::new(PkgInfo::from_files(pkg_path, files)),
        index: Arc::new(PackageIndex::new(config.clone())),
    };

    let result = Analyzer::new(config).analyze(&pass);
    Ok(AnalysisReport {
        diagnostics: result.diagnostics,
        error: result.error.map(|e| e.to_string()),
    })
}

/// Analyze in-memory sources as one package. No package index is built;
/// external references resolve only through the configured wrapper/clean
/// sets. Intended for tests and embedding.
pub fn analyze_sources(files: &[(&str, &str)], config: Config) -> Result<AnalysisReport> {
    let mut parsed = Vec::with_capacity(files.len());
    for (name, source) in files {
        parsed.push(Arc::new(go::parser::parse_source(name, source)?));
    }

    let pass = Pass {
        pkg: Arc::new(PkgInfo::from_files("main", parsed)),
        index: Arc::new(PackageIndex::empty()),
    };

    let result = Analyzer::new(config).analyze(&pass);
    Ok(AnalysisReport {
        diagnostics: result.diagnostics,
        error: result.error.map(|e| e.to_string()),
    })
}
