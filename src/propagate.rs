//! Wrapping propagation.
//!
//! One seeding pass matches every registered function against the
//! configured wrapper and clean sets, then a reverse-reachability sweep
//! pushes `is_wrapping` backwards across `called_by` edges. Clean-matched
//! functions are a hard barrier: they are never marked, even when they call
//! wrappers, and their callers are not reached through them.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::analyzer::Session;
use crate::registry::FuncId;

impl Session<'_> {
    /// Seed and propagate `is_wrapping` over the whole registry.
    pub(crate) fn mark_tainted_functions(&mut self) {
        let ids: Vec<FuncId> = self.registry.ids().collect();

        for &id in &ids {
            let (pkg, name) = {
                let f = self.registry.get(id);
                (f.pkg_path.clone(), f.name.clone())
            };
            if self.config.clean_functions.match_fn(&pkg, &name) {
                debug!(func = %name, pkg = %pkg, "clean function");
                self.registry.get_mut(id).is_wrapping = false;
                continue;
            }
            if self.config.wrapper_functions.match_fn(&pkg, &name) {
                debug!(func = %name, pkg = %pkg, "wrapper function");
                self.registry.get_mut(id).is_wrapping = true;
            }
        }

        let mut visited: FxHashSet<FuncId> = FxHashSet::default();
        for &id in &ids {
            self.propagate_wrapping(&mut visited, id);
        }
    }

    /// Push `is_wrapping` from one function to its transitive callers.
    fn propagate_wrapping(&mut self, visited: &mut FxHashSet<FuncId>, id: FuncId) {
        let seed = self.registry.get(id);
        if !seed.is_wrapping
            || self
                .config
                .clean_functions
                .match_fn(&seed.pkg_path, &seed.name)
        {
            return;
        }

        let mut stack: Vec<(FuncId, i64)> =
            seed.called_by.iter().map(|&caller| (caller, 0)).collect();

        while let Some((fid, depth)) = stack.pop() {
            if !visited.insert(fid) {
                continue;
            }
            let (pkg, name) = {
                let f = self.registry.get(fid);
                (f.pkg_path.clone(), f.name.clone())
            };
            if self.config.clean_functions.match_fn(&pkg, &name) {
                continue;
            }
            if self.config.max_depth > 0 && depth >= self.config.max_depth {
                debug!(
                    max_depth = self.config.max_depth,
                    func = %name,
                    "max propagation depth reached"
                );
                continue;
            }
            debug!(func = %name, pkg = %pkg, depth, "marking wrapping");
            self.registry.get_mut(fid).is_wrapping = true;

            let callers = self.registry.get(fid).called_by.clone();
            for caller in callers {
                stack.push((caller, depth + 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::analyzer::Session;
    use crate::config::Config;
    use crate::go::package::PkgInfo;
    use crate::index::PackageIndex;

    fn empty_session<'a>(config: &'a Config, index: &'a PackageIndex) -> Session<'a> {
        Session::new(
            config,
            index,
            Arc::new(PkgInfo::from_files("main", Vec::new())),
        )
    }

    #[test]
    fn wrapping_propagates_to_transitive_callers() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let mut session = empty_session(&config, &index);

        let wrap = session
            .registry
            .add_virtual("github.com/pkg/errors", "Wrap", true);
        let b = session.registry.add_virtual("app", "b", false);
        let a = session.registry.add_virtual("app", "a", false);
        session.registry.add_called_by(wrap, b);
        session.registry.add_called_by(b, a);

        session.mark_tainted_functions();
        assert!(session.registry.get(wrap).is_wrapping);
        assert!(session.registry.get(b).is_wrapping);
        assert!(session.registry.get(a).is_wrapping);
    }

    #[test]
    fn clean_lock_blocks_propagation() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let mut session = empty_session(&config, &index);

        let wrap = session
            .registry
            .add_virtual("github.com/pkg/errors", "Wrap", true);
        // errors.New is clean-matched; it calls the wrapper but must stay
        // clean, and its callers must not be reached through it.
        let clean = session.registry.add_virtual("errors", "New", false);
        let caller = session.registry.add_virtual("app", "caller", false);
        session.registry.add_called_by(wrap, clean);
        session.registry.add_called_by(clean, caller);

        session.mark_tainted_functions();
        assert!(!session.registry.get(clean).is_wrapping);
        assert!(!session.registry.get(caller).is_wrapping);
    }

    #[test]
    fn self_call_does_not_taint() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let mut session = empty_session(&config, &index);

        let f = session.registry.add_virtual("app", "f", false);
        session.registry.add_called_by(f, f);

        session.mark_tainted_functions();
        assert!(!session.registry.get(f).is_wrapping);
    }

    #[test]
    fn depth_bound_limits_propagation() {
        let config = Config {
            max_depth: 2,
            ..Config::default()
        };
        let index = PackageIndex::empty();
        let mut session = empty_session(&config, &index);

        let wrap = session
            .registry
            .add_virtual("github.com/pkg/errors", "Wrap", true);
        let mut prev = wrap;
        let mut chain = Vec::new();
        for name in ["e", "d", "c", "b", "a"] {
            let id = session.registry.add_virtual("app", name, false);
            session.registry.add_called_by(prev, id);
            chain.push(id);
            prev = id;
        }

        session.mark_tainted_functions();
        // Depth 0 and 1 callers get marked; past the bound they stay clean.
        assert!(session.registry.get(chain[0]).is_wrapping);
        assert!(session.registry.get(chain[1]).is_wrapping);
        assert!(!session.registry.get(chain[2]).is_wrapping);
        assert!(!session.registry.get(chain[3]).is_wrapping);
    }

    #[test]
    fn marking_is_monotone() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let mut session = empty_session(&config, &index);

        let wrap = session
            .registry
            .add_virtual("github.com/pkg/errors", "Wrap", true);
        let a = session.registry.add_virtual("app", "a", false);
        session.registry.add_called_by(wrap, a);

        session.mark_tainted_functions();
        assert!(session.registry.get(a).is_wrapping);
        // A second sweep must not flip anything back.
        session.mark_tainted_functions();
        assert!(session.registry.get(a).is_wrapping);
        assert!(session.registry.get(wrap).is_wrapping);
    }
}
