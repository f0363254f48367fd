//! Analyzer configuration.
//!
//! The serialized form is YAML with the same field set whether it arrives
//! via the `--yaml-config` flag, a config file, or an embedding driver:
//!
//! ```yaml
//! wrapperFunctions:
//!   - pkg: github.com/pkg/errors
//!     names: [New, Errorf, Wrap, Wrapf, WithStack]
//!     replaceWith: WithMessage
//!     replaceWithFormat: WithMessagef
//! cleanFunctions:
//!   - pkg: errors
//!     names: [New]
//! maxDepth: 100
//! includeVendor: true
//! excludePatterns: []
//! ```
//!
//! `workDir` and `goRoot` are not serialized; the driver resolves them from
//! the environment and they are only used to canonicalise package paths.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StacklintError};

/// Functions of one package classified as wrappers or cleans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkgFunctions {
    /// Canonical import path of the package (e.g. `github.com/pkg/errors`).
    pub pkg: String,
    /// Function names within that package.
    pub names: Vec<String>,
    /// Replacement function name suggested for two-argument wrapper calls.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replace_with: String,
    /// Replacement function name suggested for format-style wrapper calls.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replace_with_format: String,
}

/// An ordered list of [`PkgFunctions`] entries with matching helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgsFunctions(pub Vec<PkgFunctions>);

impl PkgsFunctions {
    /// True if `(pkg, name)` matches any entry.
    pub fn match_fn(&self, pkg: &str, name: &str) -> bool {
        self.entry_for(pkg, name).is_some()
    }

    /// The first entry matching `(pkg, name)`, if any.
    pub fn entry_for(&self, pkg: &str, name: &str) -> Option<&PkgFunctions> {
        self.0
            .iter()
            .find(|item| item.pkg == pkg && item.names.iter().any(|n| n == name))
    }

    /// Rewrite the matched function name inside `text` with the entry's
    /// `replaceWith` hint. Returns `None` when nothing matches or the hint
    /// is empty, in which case no fix should be offered.
    pub fn replace_with(&self, pkg: &str, name: &str, text: &str) -> Option<String> {
        let entry = self.entry_for(pkg, name)?;
        if entry.replace_with.is_empty() {
            return None;
        }
        Some(text.replacen(name, &entry.replace_with, 1))
    }

    /// Same as [`replace_with`](Self::replace_with) for the format-style hint.
    pub fn replace_with_format(&self, pkg: &str, name: &str, text: &str) -> Option<String> {
        let entry = self.entry_for(pkg, name)?;
        if entry.replace_with_format.is_empty() {
            return None;
        }
        Some(text.replacen(name, &entry.replace_with_format, 1))
    }
}

/// Wrapper functions assumed when the config does not name any.
pub fn default_wrapper_functions() -> PkgsFunctions {
    PkgsFunctions(vec![PkgFunctions {
        pkg: "github.com/pkg/errors".to_string(),
        names: ["New", "Errorf", "Wrap", "Wrapf", "WithStack"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        replace_with: "WithMessage".to_string(),
        replace_with_format: "WithMessagef".to_string(),
    }])
}

/// Clean functions assumed when the config does not name any.
pub fn default_clean_functions() -> PkgsFunctions {
    PkgsFunctions(vec![
        PkgFunctions {
            pkg: "github.com/pkg/errors".to_string(),
            names: vec!["WithMessage".to_string(), "WithMessagef".to_string()],
            ..Default::default()
        },
        PkgFunctions {
            pkg: "errors".to_string(),
            names: vec!["New".to_string()],
            ..Default::default()
        },
        PkgFunctions {
            pkg: "fmt".to_string(),
            names: vec!["Errorf".to_string()],
            ..Default::default()
        },
    ])
}

/// Default traversal bound. Values <= 0 disable depth checks entirely.
pub const DEFAULT_MAX_DEPTH: i64 = 100;

/// Resolved analyzer policy. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Functions that wrap errors with a captured stack trace. Calls to
    /// these on an already-traced value are what the analyzer reports.
    pub wrapper_functions: PkgsFunctions,
    /// Functions that return errors without capturing a stack trace. A
    /// clean-matched function is never considered wrapping, whatever it
    /// calls internally.
    pub clean_functions: PkgsFunctions,
    /// Bound on call-graph and CFG traversal depth; <= 0 means unbounded.
    pub max_depth: i64,
    /// Whether the package index also walks `vendor/`.
    pub include_vendor: bool,
    /// Glob patterns excluded from the package index walk.
    pub exclude_patterns: Vec<String>,

    /// Work directory prefix used to canonicalise package paths.
    #[serde(skip)]
    pub work_dir: String,
    /// GOROOT `src/` prefix used to canonicalise stdlib paths.
    #[serde(skip)]
    pub go_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wrapper_functions: default_wrapper_functions(),
            clean_functions: default_clean_functions(),
            max_depth: DEFAULT_MAX_DEPTH,
            include_vendor: true,
            exclude_patterns: Vec::new(),
            work_dir: String::new(),
            go_root: String::new(),
        }
    }
}

impl Config {
    /// Parse the full YAML form. Used by the `yaml-config` flag, which
    /// overrides every other configuration source.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| StacklintError::Config(e.to_string()))
    }

    /// Fill `work_dir`/`go_root` from the process environment. `work_dir`
    /// defaults to the current directory; `go_root` comes from `$GOROOT`.
    pub fn resolve_paths(&mut self, work_dir: Option<&Path>) {
        let wd = match work_dir {
            Some(p) => p.to_path_buf(),
            None => std::env::current_dir().unwrap_or_default(),
        };
        self.work_dir = ensure_trailing_slash(&wd.to_string_lossy());
        if let Ok(goroot) = std::env::var("GOROOT") {
            if !goroot.is_empty() {
                self.go_root = ensure_trailing_slash(&format!("{goroot}/src"));
            }
        }
    }

    /// Canonical package path for the directory containing `file`.
    pub fn pkg_path(&self, file: &str) -> String {
        let dir = Path::new(file)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        self.dir_pkg_path(&dir)
    }

    /// Canonical package path for a directory: the work-dir prefix is
    /// stripped (plus a leading `vendor/`), else the GOROOT prefix, else
    /// the directory is returned as-is.
    pub fn dir_pkg_path(&self, dir: &str) -> String {
        if !self.work_dir.is_empty() {
            if let Some(rest) = dir.strip_prefix(self.work_dir.trim_end_matches('/')) {
                let rest = rest.trim_start_matches('/');
                return rest.strip_prefix("vendor/").unwrap_or(rest).to_string();
            }
        }
        if !self.go_root.is_empty() {
            if let Some(rest) = dir.strip_prefix(self.go_root.trim_end_matches('/')) {
                return rest.trim_start_matches('/').to_string();
            }
        }
        dir.to_string()
    }
}

fn ensure_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{s}/")
    }
}
