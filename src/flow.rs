//! Per-function flow analysis.
//!
//! For every original function that ended up `is_wrapping`, walks its CFG
//! in pre-order with a per-variable taint map keyed by object definition
//! position. Each wrapper call site is asked whether any argument already
//! carries a stack trace; assignments update the map as control flows
//! forward. The walk shares one map across all blocks of a function, so
//! successors observe the assignments of previously visited predecessors.
//!
//! The taint of an expression is three-valued: a value is tainted, clean,
//! or the expression says nothing about error flow at all. `Unknown` never
//! overwrites map entries.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::analyzer::Session;
use crate::callgraph::collect_expr_calls;
use crate::cfg::{BlockId, FuncCfg};
use crate::diagnostics::{Diagnostic, Reporter, SuggestedFix, TextEdit};
use crate::go::ast::{CallExpr, Expr, FuncIdx, GoFile, Position, Stmt, StmtId};
use crate::go::package::PkgInfo;
use crate::go::resolver::{CalleeRef, ObjectId, ObjectKind, VarInit};

/// Three-valued taint verdict for an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Taint {
    Yes,
    No,
    Unknown,
}

/// Resolution context of the function being walked.
struct FlowCtx {
    pkg: Arc<PkgInfo>,
    file: Arc<GoFile>,
    idx: FuncIdx,
}

type Variables = FxHashMap<Position, bool>;

impl Session<'_> {
    /// Walk every original wrapping function and report unnecessary wraps.
    pub(crate) fn analyze_original_functions(&mut self, reporter: &mut dyn Reporter) {
        let originals = self.original.clone();
        for id in originals {
            let function = self.registry.get(id);
            if !function.is_wrapping {
                continue;
            }
            let Some(source) = function.source.clone() else {
                continue;
            };
            let Some(cfg) = source.cfg.clone() else {
                continue;
            };
            debug!(func = %function.name, pos = %function.pos, "flow analysis");

            let ctx = FlowCtx {
                pkg: source.pkg,
                file: source.file,
                idx: source.idx,
            };
            let mut visited: FxHashSet<BlockId> = FxHashSet::default();
            let mut variables: Variables = FxHashMap::default();
            self.walk_block(&ctx, &cfg, cfg.entry, &mut visited, &mut variables, 0, reporter);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_block(
        &mut self,
        ctx: &FlowCtx,
        cfg: &FuncCfg,
        block: BlockId,
        visited: &mut FxHashSet<BlockId>,
        variables: &mut Variables,
        depth: i64,
        reporter: &mut dyn Reporter,
    ) {
        if visited.contains(&block) {
            return;
        }
        if self.config.max_depth > 0 && depth >= self.config.max_depth {
            debug!(max_depth = self.config.max_depth, "max CFG depth reached");
            return;
        }
        visited.insert(block);
        trace!(block = block.0, "visiting block");

        for &sid in &cfg.block(block).nodes {
            self.inspect_stmt_calls(ctx, sid, variables, reporter);
            self.propagate_stmt_assigns(ctx, sid, variables);
        }

        let succs = cfg.block(block).succs.clone();
        for succ in succs {
            self.walk_block(ctx, cfg, succ, visited, variables, depth + 1, reporter);
        }
    }

    // -------------------------------------------------------------------------
    // Call inspection
    // -------------------------------------------------------------------------

    /// Check every call expression in the statement's head for unnecessary
    /// wrapping. Compound statements contribute only their head expressions
    /// here; their bodies belong to successor blocks.
    fn inspect_stmt_calls(
        &mut self,
        ctx: &FlowCtx,
        sid: StmtId,
        variables: &Variables,
        reporter: &mut dyn Reporter,
    ) {
        let file = Arc::clone(&ctx.file);
        let func = file.func(ctx.idx);
        let mut calls: Vec<&CallExpr> = Vec::new();
        for expr in head_exprs(func.stmt(sid)) {
            // Function literal bodies are analyzed as their own original
            // functions, not inside the enclosing walk.
            collect_expr_calls(&file, expr, false, &mut calls);
        }
        for call in calls {
            self.check_wrapper_call(ctx, call, variables, reporter);
        }
    }

    fn check_wrapper_call(
        &mut self,
        ctx: &FlowCtx,
        call: &CallExpr,
        variables: &Variables,
        reporter: &mut dyn Reporter,
    ) {
        let Some(fid) = self.try_add_call_expr(&ctx.pkg, &ctx.file, &call.fun) else {
            return;
        };
        let (pkg_path, name) = {
            let f = self.registry.get(fid);
            (f.pkg_path.clone(), f.name.clone())
        };
        let Some(entry) = self
            .config
            .wrapper_functions
            .entry_for(&pkg_path, &name)
            .cloned()
        else {
            return;
        };

        let mut wrapping = false;
        for arg in &call.args {
            if self.analyze_taint(ctx, arg, variables) == Taint::Yes {
                wrapping = true;
            }
        }
        if !wrapping {
            return;
        }

        self.registry.get_mut(fid).is_wrapping = true;
        debug!(call = %call.span.pos, func = %name, "unnecessary wrapping");

        let alternative = if entry.replace_with.is_empty() {
            "errors.WithMessage"
        } else {
            entry.replace_with.as_str()
        };
        let format_alternative = if entry.replace_with_format.is_empty() {
            "fmt.Errorf"
        } else {
            entry.replace_with_format.as_str()
        };
        let message = format!(
            "{name} call unnecessarily wraps error with stacktrace. \
             Replace with {alternative}() or {format_alternative}()"
        );

        let mut fixes = Vec::new();
        if let Some(error_arg) = self.error_argument(ctx, call) {
            let call_text = ctx.file.text(&call.span).to_string();
            match call.args.len() {
                1 => {
                    let new_text = ctx.file.text(error_arg.span()).to_string();
                    fixes.push(SuggestedFix {
                        message: "Remove unnecessary error wrapping".to_string(),
                        edits: vec![TextEdit {
                            start_byte: call.span.start_byte,
                            end_byte: call.span.end_byte,
                            new_text,
                        }],
                    });
                }
                2 => {
                    if let Some(new_text) =
                        self.config
                            .wrapper_functions
                            .replace_with(&pkg_path, &name, &call_text)
                    {
                        fixes.push(SuggestedFix {
                            message: "Replace unnecessary error wrapping".to_string(),
                            edits: vec![TextEdit {
                                start_byte: call.span.start_byte,
                                end_byte: call.span.end_byte,
                                new_text,
                            }],
                        });
                    }
                }
                _ => {
                    if let Some(new_text) = self.config.wrapper_functions.replace_with_format(
                        &pkg_path,
                        &name,
                        &call_text,
                    ) {
                        fixes.push(SuggestedFix {
                            message: "Replace unnecessary error wrapping".to_string(),
                            edits: vec![TextEdit {
                                start_byte: call.span.start_byte,
                                end_byte: call.span.end_byte,
                                new_text,
                            }],
                        });
                    }
                }
            }
        }

        reporter.report(Diagnostic {
            position: call.span.pos.clone(),
            start_byte: call.span.start_byte,
            end_byte: call.span.end_byte,
            message,
            fixes,
        });
    }

    /// The argument whose text can replace a single-argument wrapper call:
    /// the first argument that, after peeling `*`, `()`, `.sel` and `[i]`,
    /// is an error-typed identifier or a call resolving to a known function.
    fn error_argument<'e>(&mut self, ctx: &FlowCtx, call: &'e CallExpr) -> Option<&'e Expr> {
        for root in &call.args {
            let mut current = root;
            loop {
                match current {
                    Expr::Ident(id) => {
                        if let Some((oid, _)) = ctx.file.resolution.object_at(&id.span.pos) {
                            if self.object_is_error(&ctx.pkg, &ctx.file, oid) {
                                return Some(root);
                            }
                        }
                        break;
                    }
                    Expr::Call(inner) => {
                        if self
                            .try_add_call_expr(&ctx.pkg, &ctx.file, &inner.fun)
                            .is_some()
                        {
                            return Some(root);
                        }
                        break;
                    }
                    Expr::Star(inner, _) | Expr::Paren(inner, _) => current = inner,
                    Expr::Selector(sel) => current = &sel.x,
                    Expr::Index(index) => current = &index.x,
                    _ => break,
                }
            }
        }
        None
    }

    // -------------------------------------------------------------------------
    // Assignment propagation
    // -------------------------------------------------------------------------

    fn propagate_stmt_assigns(&mut self, ctx: &FlowCtx, sid: StmtId, variables: &mut Variables) {
        let file = Arc::clone(&ctx.file);
        let func = file.func(ctx.idx);

        let (lhs, rhs): (Vec<&Expr>, &[Expr]) = match func.stmt(sid) {
            Stmt::Assign(assign) => (assign.lhs.iter().collect(), assign.rhs.as_slice()),
            _ => return,
        };

        // Definition positions of the error-typed left-hand identifiers.
        let mut positions: Vec<Option<Position>> = Vec::with_capacity(lhs.len());
        let mut found = false;
        for expr in &lhs {
            let pos = match expr {
                Expr::Ident(id) => ctx
                    .file
                    .resolution
                    .object_at(&id.span.pos)
                    .filter(|(oid, _)| self.object_is_error(&ctx.pkg, &ctx.file, *oid))
                    .map(|(_, obj)| obj.def_pos.clone()),
                _ => None,
            };
            found |= pos.is_some();
            positions.push(pos);
        }
        if !found {
            return;
        }

        if rhs.len() == 1 {
            let taint = self.analyze_taint(ctx, &rhs[0], variables);
            if taint == Taint::Unknown {
                return;
            }
            for pos in positions.into_iter().flatten() {
                trace!(var = %pos, tainted = (taint == Taint::Yes), "variable update");
                variables.insert(pos, taint == Taint::Yes);
            }
        } else if rhs.len() == lhs.len() {
            for (i, pos) in positions.into_iter().enumerate() {
                let Some(pos) = pos else { continue };
                let taint = self.analyze_taint(ctx, &rhs[i], variables);
                if taint == Taint::Unknown {
                    continue;
                }
                trace!(var = %pos, tainted = (taint == Taint::Yes), "variable update");
                variables.insert(pos, taint == Taint::Yes);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Taint evaluation
    // -------------------------------------------------------------------------

    /// Is this expression's value already carrying a stack trace?
    fn analyze_taint(&mut self, ctx: &FlowCtx, expr: &Expr, variables: &Variables) -> Taint {
        match expr {
            Expr::Star(inner, _) | Expr::Paren(inner, _) => {
                self.analyze_taint(ctx, inner, variables)
            }
            Expr::Ident(id) => {
                let Some((oid, obj)) = ctx.file.resolution.object_at(&id.span.pos) else {
                    return Taint::Unknown;
                };
                let def_pos = obj.def_pos.clone();
                if !self.object_is_error(&ctx.pkg, &ctx.file, oid) {
                    return Taint::Unknown;
                }
                if variables.get(&def_pos).copied().unwrap_or(false) {
                    Taint::Yes
                } else {
                    Taint::No
                }
            }
            Expr::Call(call) => {
                match self.try_add_call_expr(&ctx.pkg, &ctx.file, &call.fun) {
                    Some(fid) => {
                        if self.registry.get(fid).is_wrapping {
                            return Taint::Yes;
                        }
                        for arg in &call.args {
                            match self.analyze_taint(ctx, arg, variables) {
                                Taint::Unknown => continue,
                                verdict => return verdict,
                            }
                        }
                        Taint::No
                    }
                    // Unresolved callees are assumed to return clean errors;
                    // this keeps stdlib calls like json.Marshal quiet.
                    None => Taint::No,
                }
            }
            _ => Taint::Unknown,
        }
    }

    // -------------------------------------------------------------------------
    // Object typing
    // -------------------------------------------------------------------------

    /// Whether an object is error-typed, resolving initializer descriptors
    /// against the registry, the index and the config. Memoised per
    /// definition position; recursion through `Copy` chains is cycle-safe
    /// because the cache is seeded before descending.
    pub(crate) fn object_is_error(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        oid: ObjectId,
    ) -> bool {
        let obj = file.resolution.object(oid).clone();
        if let Some(&cached) = self.error_cache.get(&obj.def_pos) {
            return cached;
        }
        self.error_cache.insert(obj.def_pos.clone(), false);

        let result = match &obj.kind {
            ObjectKind::Param { ty } | ObjectKind::ResultVar { ty } => pkg.type_ref_is_error(ty),
            ObjectKind::Var { ty: Some(ty), .. } => pkg.type_ref_is_error(ty),
            ObjectKind::Var { ty: None, init } => match init {
                VarInit::TypeOf(ty) => pkg.type_ref_is_error(ty),
                VarInit::Copy(other) => self.object_is_error(pkg, file, *other),
                VarInit::Call {
                    callee,
                    index,
                    count,
                } => self.call_result_is_error(pkg, file, callee, *index, *count),
                VarInit::FuncLit(_) | VarInit::Unknown => false,
            },
            _ => false,
        };

        self.error_cache.insert(obj.def_pos, result);
        result
    }

    /// Whether left-hand position `index` of `count` fed by a call to
    /// `callee` receives an error.
    fn call_result_is_error(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        callee: &CalleeRef,
        index: usize,
        count: usize,
    ) -> bool {
        // Configured externals have no parsed signature and are assumed to
        // return a single error; in a multi-value assignment the last
        // position is taken to be the error.
        if let CalleeRef::Selector {
            base,
            base_pos,
            path,
            sel,
        } = callee
        {
            if path.is_empty() {
                if let Some(pkg_path) = selector_pkg_path(file, base, base_pos.as_ref()) {
                    if self.config.wrapper_functions.match_fn(&pkg_path, sel)
                        || self.config.clean_functions.match_fn(&pkg_path, sel)
                    {
                        return count == 1 || index + 1 == count;
                    }
                }
            }
        }

        let Some((sig_pkg, sig_file, sig_idx)) = self.callee_signature(pkg, file, callee) else {
            return false;
        };
        let func = sig_file.func(sig_idx);
        let results = &func.results;
        let slot = if count == 1 && results.len() == 1 {
            0
        } else {
            index
        };
        results
            .get(slot)
            .is_some_and(|field| sig_pkg.type_ref_is_error(&field.ty))
    }

    /// Resolve a callee descriptor to the function whose signature types
    /// the assignment's left-hand side.
    fn callee_signature(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        callee: &CalleeRef,
    ) -> Option<(Arc<PkgInfo>, Arc<GoFile>, FuncIdx)> {
        match callee {
            CalleeRef::Plain { name, pos } => {
                match file.resolution.object_at(pos).map(|(_, obj)| obj.kind.clone()) {
                    Some(ObjectKind::Func(idx)) => Some((Arc::clone(pkg), Arc::clone(file), idx)),
                    Some(ObjectKind::Var {
                        init: VarInit::FuncLit(idx),
                        ..
                    }) => Some((Arc::clone(pkg), Arc::clone(file), idx)),
                    _ => pkg
                        .function(name)
                        .map(|(f, idx)| (Arc::clone(pkg), Arc::clone(f), idx)),
                }
            }
            CalleeRef::Selector {
                base,
                base_pos,
                path,
                sel,
            } => {
                if path.is_empty() {
                    if let Some(pkg_path) = selector_pkg_path(file, base, base_pos.as_ref()) {
                        return self.index.load_function(&pkg_path, None, sel);
                    }
                }
                // A method call: type the receiver (stepping through any
                // field chain), then find the method.
                let mut ty = base_pos
                    .as_ref()
                    .and_then(|pos| self.object_type(file, pos))?;
                for segment in path {
                    let base_name = ty.base_name()?.to_string();
                    ty = pkg.field_type(&base_name, segment)?.clone();
                }
                self.method_source(pkg, file, &ty, sel)
            }
            CalleeRef::Other => None,
        }
    }
}

/// The import path a selector base names, if it is a package identifier.
fn selector_pkg_path(file: &GoFile, base: &str, base_pos: Option<&Position>) -> Option<String> {
    match base_pos.and_then(|pos| file.resolution.object_at(pos)) {
        Some((_, obj)) => match &obj.kind {
            ObjectKind::PkgName(path) => Some(path.clone()),
            _ => None,
        },
        None => file.import_path(base).map(str::to_string),
    }
}

/// The expressions a statement contributes to its own CFG block: plain
/// statements contribute everything, compound statements only their heads.
fn head_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::Assign(assign) => assign.lhs.iter().chain(&assign.rhs).collect(),
        Stmt::VarDecl(decl) => decl.values.iter().collect(),
        Stmt::Return(ret) => ret.results.iter().collect(),
        Stmt::Expr(expr) => vec![expr],
        Stmt::If(stmt) => vec![&stmt.cond],
        Stmt::For(stmt) => stmt.cond.iter().collect(),
        Stmt::Switch(stmt) => stmt
            .value
            .iter()
            .chain(stmt.cases.iter().flat_map(|c| c.exprs.iter()))
            .collect(),
        Stmt::Block(_) | Stmt::Other(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::go::parser::parse_source;
    use crate::index::PackageIndex;

    fn session_for<'a>(
        config: &'a Config,
        index: &'a PackageIndex,
        source: &str,
    ) -> (Session<'a>, Arc<GoFile>) {
        let file = Arc::new(parse_source("main.go", source).unwrap());
        let pkg = Arc::new(PkgInfo::from_files("main", vec![Arc::clone(&file)]));
        let mut session = Session::new(config, index, pkg);
        session.discover_functions();
        session.build_call_graph();
        session.mark_tainted_functions();
        (session, file)
    }

    fn object_named(file: &GoFile, name: &str) -> ObjectId {
        let idx = file
            .resolution
            .objects
            .iter()
            .position(|o| o.name == name)
            .unwrap_or_else(|| panic!("no object named {name}"));
        ObjectId(idx as u32)
    }

    #[test]
    fn objects_are_typed_through_call_initializers() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let source = r#"package main

import (
	stderrors "errors"
)

func f() error {
	err := stderrors.New("boom")
	n := 1
	_ = n
	return err
}
"#;
        let (mut session, file) = session_for(&config, &index, source);
        let pkg = Arc::clone(&session.pass_pkg);

        let err = object_named(&file, "err");
        let n = object_named(&file, "n");
        assert!(session.object_is_error(&pkg, &file, err));
        assert!(!session.object_is_error(&pkg, &file, n));
    }

    #[test]
    fn objects_are_typed_through_local_signatures() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let source = r#"package main

func source() (int, error) {
	return 0, nil
}

func f() error {
	count, err := source()
	_ = count
	return err
}
"#;
        let (mut session, file) = session_for(&config, &index, source);
        let pkg = Arc::clone(&session.pass_pkg);

        assert!(session.object_is_error(&pkg, &file, object_named(&file, "err")));
        assert!(!session.object_is_error(&pkg, &file, object_named(&file, "count")));
    }

    #[test]
    fn taint_evaluator_truth_table() {
        let config = Config::default();
        let index = PackageIndex::empty();
        let source = r#"package main

import (
	stderrors "errors"

	"github.com/pkg/errors"
)

func helper() error {
	return errors.WithStack(nil)
}

func f() error {
	err := stderrors.New("e")
	count := 1
	a := errors.WithStack(nil)
	b := stderrors.New("x")
	c := unknownFn()
	d := helper()
	p := (err)
	_, _, _, _, _, _ = count, a, b, c, d, p
	return err
}
"#;
        let (mut session, file) = session_for(&config, &index, source);
        let ctx = FlowCtx {
            pkg: Arc::clone(&session.pass_pkg),
            file: Arc::clone(&file),
            idx: file.decls[1],
        };
        let func = file.func(ctx.idx);
        let body = func.body.as_ref().unwrap();
        let rhs_of = |i: usize| match func.stmt(body[i]) {
            Stmt::Assign(assign) => &assign.rhs[0],
            other => panic!("expected assign, got {other:?}"),
        };
        let mut variables: Variables = FxHashMap::default();

        // Call to a configured wrapper.
        assert_eq!(session.analyze_taint(&ctx, rhs_of(2), &variables), Taint::Yes);
        // Call to a configured clean function.
        assert_eq!(session.analyze_taint(&ctx, rhs_of(3), &variables), Taint::No);
        // Unresolved callees count as clean.
        assert_eq!(session.analyze_taint(&ctx, rhs_of(4), &variables), Taint::No);
        // Call to an in-source function that became wrapping.
        assert_eq!(session.analyze_taint(&ctx, rhs_of(5), &variables), Taint::Yes);
        // Integer literal says nothing about error flow.
        assert_eq!(session.analyze_taint(&ctx, rhs_of(1), &variables), Taint::Unknown);
        // Neither does a non-error identifier.
        let Stmt::Assign(multi) = func.stmt(body[7]) else {
            panic!("expected assign");
        };
        assert_eq!(
            session.analyze_taint(&ctx, &multi.rhs[0], &variables),
            Taint::Unknown
        );

        // Error-typed identifier: clean until the map says otherwise, and
        // parentheses peel transparently.
        let Stmt::Return(ret) = func.stmt(body[8]) else {
            panic!("expected return");
        };
        let err_use = &ret.results[0];
        let paren_use = rhs_of(6);
        assert_eq!(session.analyze_taint(&ctx, err_use, &variables), Taint::No);
        assert_eq!(session.analyze_taint(&ctx, paren_use, &variables), Taint::No);

        let err_def = file
            .resolution
            .objects
            .iter()
            .find(|o| o.name == "err")
            .unwrap()
            .def_pos
            .clone();
        variables.insert(err_def, true);
        assert_eq!(session.analyze_taint(&ctx, err_use, &variables), Taint::Yes);
        assert_eq!(session.analyze_taint(&ctx, paren_use, &variables), Taint::Yes);
    }

    #[test]
    fn head_exprs_cover_heads_only() {
        let source = r#"package main

func f(ok bool) error {
	if ok {
		return nil
	}
	return nil
}
"#;
        let file = parse_source("main.go", source).unwrap();
        let func = file.func(file.decls[0]);
        let body = func.body.as_ref().unwrap();
        let exprs = head_exprs(func.stmt(body[0]));
        // Only the condition; the branch bodies belong to other blocks.
        assert_eq!(exprs.len(), 1);
        assert!(matches!(exprs[0], Expr::Ident(id) if id.name == "ok"));
    }
}
