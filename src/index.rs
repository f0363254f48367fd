//! Read-only package index.
//!
//! Maps canonical package paths to preloaded package records. Construction
//! is cheap; the store populates on first access behind a one-shot gate and
//! is immutable afterwards, so any number of analysis runs can read it
//! without locks. Only the on-demand object cache takes a mutex.
//!
//! Population walks the work directory with `ignore` (so `.gitignore`-style
//! files are honoured), filters through the config's `excludePatterns`,
//! skips `vendor/` unless `includeVendor`, and parses candidate files in
//! parallel with rayon.

use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::Config;
use crate::go::ast::FuncIdx;
use crate::go::package::PkgInfo;
use crate::go::{parser, GoFile};

type ObjectCacheKey = (String, Option<String>, String);
type ObjectCacheValue = Option<(Arc<PkgInfo>, Arc<GoFile>, FuncIdx)>;

/// Lazily-populated, then immutable, package store.
pub struct PackageIndex {
    config: Config,
    store: OnceCell<FxHashMap<String, Arc<PkgInfo>>>,
    /// Cache for resolved cross-package lookups.
    object_cache: Mutex<FxHashMap<ObjectCacheKey, ObjectCacheValue>>,
}

impl std::fmt::Debug for PackageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageIndex")
            .field("populated", &self.store.get().is_some())
            .finish()
    }
}

impl PackageIndex {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: OnceCell::new(),
            object_cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// An index that never loads anything. Used for in-memory analysis.
    pub fn empty() -> Self {
        let index = Self::new(Config::default());
        let _ = index.store.set(FxHashMap::default());
        index
    }

    /// The package record for a canonical path, populating the store on
    /// first use. Missing packages are logged and yield `None`.
    pub fn package(&self, pkg_path: &str) -> Option<Arc<PkgInfo>> {
        let store = self.store.get_or_init(|| self.populate());
        let found = store.get(pkg_path).cloned();
        if found.is_none() {
            debug!(pkg = pkg_path, "package not found in index");
        }
        found
    }

    /// Find a top-level function (or method, when `recv` is given) in an
    /// indexed package. Results are memoised.
    pub fn load_function(
        &self,
        pkg_path: &str,
        recv: Option<&str>,
        name: &str,
    ) -> Option<(Arc<PkgInfo>, Arc<GoFile>, FuncIdx)> {
        let key = (
            pkg_path.to_string(),
            recv.map(|r| r.to_string()),
            name.to_string(),
        );
        if let Some(cached) = self.object_cache.lock().unwrap().get(&key) {
            return cached.clone();
        }

        let resolved = self.package(pkg_path).and_then(|pkg| {
            let found = match recv {
                Some(recv) => pkg.find_method(recv, name),
                None => pkg.function(name),
            };
            found.map(|(file, idx)| (Arc::clone(&pkg), Arc::clone(file), idx))
        });

        self.object_cache
            .lock()
            .unwrap()
            .insert(key, resolved.clone());
        resolved
    }

    fn populate(&self) -> FxHashMap<String, Arc<PkgInfo>> {
        let work_dir = self.config.work_dir.trim_end_matches('/');
        if work_dir.is_empty() {
            return FxHashMap::default();
        }
        debug!(work_dir, "populating package index");

        let mut walker = ignore::WalkBuilder::new(work_dir);
        walker.hidden(true).follow_links(false);
        if !self.config.exclude_patterns.is_empty() {
            // Overrides use `!pattern` to exclude.
            let mut overrides = ignore::overrides::OverrideBuilder::new(work_dir);
            for pattern in &self.config.exclude_patterns {
                if let Err(err) = overrides.add(&format!("!{pattern}")) {
                    debug!(%pattern, %err, "invalid exclude pattern");
                }
            }
            match overrides.build() {
                Ok(built) => {
                    walker.overrides(built);
                }
                Err(err) => debug!(%err, "exclude patterns disabled"),
            }
        }

        let mut candidates: Vec<std::path::PathBuf> = Vec::new();
        for entry in walker.build().flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("go") {
                continue;
            }
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_test.go"))
            {
                continue;
            }
            if !self.config.include_vendor
                && path.components().any(|c| c.as_os_str() == "vendor")
            {
                continue;
            }
            candidates.push(path.to_path_buf());
        }

        let parsed: Vec<(String, Arc<GoFile>)> = candidates
            .par_iter()
            .filter_map(|path| match parse_candidate(path) {
                Ok(Some(file)) => {
                    let pkg = self.config.pkg_path(&path.to_string_lossy());
                    Some((pkg, Arc::new(file)))
                }
                Ok(None) => None,
                Err(err) => {
                    debug!(path = %path.display(), %err, "skipping unparseable file");
                    None
                }
            })
            .collect();

        let mut by_pkg: FxHashMap<String, Vec<Arc<GoFile>>> = FxHashMap::default();
        for (pkg, file) in parsed {
            by_pkg.entry(pkg).or_default().push(file);
        }

        let mut store = FxHashMap::default();
        for (pkg_path, mut files) in by_pkg {
            files.sort_by(|a, b| a.path.cmp(&b.path));
            debug!(pkg = %pkg_path, files = files.len(), "indexed package");
            store.insert(
                pkg_path.clone(),
                Arc::new(PkgInfo::from_files(pkg_path, files)),
            );
        }
        store
    }
}

fn parse_candidate(path: &Path) -> crate::error::Result<Option<GoFile>> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| crate::error::StacklintError::io_with_path(e, path))?;
    // Files with no functions cannot contribute declarations or edges.
    if !parser::contains_functions(&source)? {
        return Ok(None);
    }
    parser::parse_source(&path.to_string_lossy(), &source).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn indexes_packages_by_canonical_path() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "store/store.go",
            "package store\n\nfunc Open() error { return nil }\n",
        );
        write(
            tmp.path(),
            "vendor/github.com/pkg/errors/errors.go",
            "package errors\n\nfunc Wrap(err error, msg string) error { return err }\n",
        );

        let mut config = Config::default();
        config.resolve_paths(Some(tmp.path()));
        let index = PackageIndex::new(config);

        assert!(index.package("store").is_some());
        assert!(index.package("github.com/pkg/errors").is_some());
        assert!(index.package("nonexistent").is_none());

        let (pkg, _, _) = index.load_function("store", None, "Open").unwrap();
        assert_eq!(pkg.path, "store");
        assert!(index.load_function("store", None, "Close").is_none());
    }

    #[test]
    fn vendor_can_be_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "vendor/github.com/pkg/errors/errors.go",
            "package errors\n\nfunc Wrap(err error, msg string) error { return err }\n",
        );

        let mut config = Config {
            include_vendor: false,
            ..Config::default()
        };
        config.resolve_paths(Some(tmp.path()));
        let index = PackageIndex::new(config);
        assert!(index.package("github.com/pkg/errors").is_none());
    }

    #[test]
    fn empty_index_resolves_nothing() {
        let index = PackageIndex::empty();
        assert!(index.package("fmt").is_none());
        assert!(index.load_function("fmt", None, "Errorf").is_none());
    }
}
