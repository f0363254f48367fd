//! Function registry.
//!
//! An arena of [`Function`] records keyed by declaration [`Position`].
//! `called_by` edges hold arena indices, never owning references, so the
//! cyclic caller graph needs no reference counting. The registry is owned
//! by one analysis run; after discovery the only mutation left is the
//! monotone `false -> true` transition of `is_wrapping`.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::cfg::FuncCfg;
use crate::go::ast::{FuncIdx, GoFile, Position, ANONYMOUS};
use crate::go::package::PkgInfo;

/// Stable index of a function in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

/// Where an in-source function lives and its prebuilt CFG.
#[derive(Debug, Clone)]
pub struct FuncSource {
    pub pkg: Arc<PkgInfo>,
    pub file: Arc<GoFile>,
    pub idx: FuncIdx,
    /// `None` when the declaration has no body.
    pub cfg: Option<Arc<FuncCfg>>,
}

/// One error-returning function, or a virtual record for a configured
/// external wrapper/clean function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub pos: Position,
    pub pkg_path: String,
    /// True once the function is known to return stack-traced errors.
    /// Monotone for the analysis run, except clean-matched functions which
    /// are pinned to `false`.
    pub is_wrapping: bool,
    /// Functions that call this one, in first-insertion order, deduplicated.
    pub called_by: Vec<FuncId>,
    /// `None` for virtual records.
    pub source: Option<FuncSource>,
}

impl Function {
    pub fn is_virtual(&self) -> bool {
        self.source.is_none()
    }
}

/// Arena of functions keyed by position.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    funcs: Vec<Function>,
    by_pos: FxHashMap<Position, FuncId>,
}

impl FunctionRegistry {
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    pub fn get(&self, id: FuncId) -> &Function {
        &self.funcs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.funcs.len() as u32).map(FuncId)
    }

    /// Register a declaration or literal if its result list contains an
    /// error-typed field. Re-registering the same position returns the
    /// existing record.
    pub fn try_add_function(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        idx: FuncIdx,
    ) -> Option<FuncId> {
        let func = file.func(idx);
        let pos = func.span.pos.clone();
        if let Some(&existing) = self.by_pos.get(&pos) {
            return Some(existing);
        }
        if func.results.is_empty() {
            return None;
        }
        if !func.results.iter().any(|f| pkg.type_ref_is_error(&f.ty)) {
            return None;
        }

        let cfg = FuncCfg::build(func).map(Arc::new);
        let name = if func.is_literal {
            ANONYMOUS.to_string()
        } else {
            func.name.clone()
        };
        Some(self.insert(Function {
            name,
            pos,
            pkg_path: pkg.path.clone(),
            is_wrapping: false,
            called_by: Vec::new(),
            source: Some(FuncSource {
                pkg: Arc::clone(pkg),
                file: Arc::clone(file),
                idx,
                cfg,
            }),
        }))
    }

    /// Register a virtual record for a configured external function. The
    /// synthetic position keys the registry uniquely per `(pkg, name)`.
    pub fn add_virtual(&mut self, pkg_path: &str, name: &str, is_wrapping: bool) -> FuncId {
        let pos = Position::new(format!("<{pkg_path}.{name}>"), 0, 0);
        if let Some(&existing) = self.by_pos.get(&pos) {
            return existing;
        }
        self.insert(Function {
            name: name.to_string(),
            pos,
            pkg_path: pkg_path.to_string(),
            is_wrapping,
            called_by: Vec::new(),
            source: None,
        })
    }

    /// Record `caller` in `callee`'s caller set. Idempotent; preserves
    /// first-insertion order.
    pub fn add_called_by(&mut self, callee: FuncId, caller: FuncId) {
        let list = &mut self.funcs[callee.0 as usize].called_by;
        if !list.contains(&caller) {
            list.push(caller);
        }
    }

    fn insert(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.by_pos.insert(function.pos.clone(), id);
        self.funcs.push(function);
        id
    }
}
