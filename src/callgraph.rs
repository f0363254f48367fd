//! Call-graph construction.
//!
//! Seeds the registry with every error-returning function declared in the
//! pass files, then walks their bodies with a depth-tagged work stack,
//! resolving each call expression to a registered function and recording a
//! `called_by` edge from callee to caller.
//!
//! Selector resolution order: configured external wrapper/clean (virtual
//! record) -> same-package declaration or method (embedding-aware) ->
//! package-index load -> unresolved.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::analyzer::Session;
use crate::go::ast::{CallExpr, Expr, FuncIdx, FuncNode, GoFile, Position, Stmt, StmtId, TypeRef};
use crate::go::package::PkgInfo;
use crate::go::resolver::{ObjectKind, VarInit};
use crate::registry::FuncId;

impl Session<'_> {
    /// Find every function declaration and literal in the pass files whose
    /// result list contains an error-typed field, in pre-order.
    pub(crate) fn discover_functions(&mut self) {
        let pkg = Arc::clone(&self.pass_pkg);
        for file in &pkg.files {
            // The function arena is filled in pre-order during lowering:
            // each declaration precedes the literals nested inside it.
            for i in 0..file.funcs.len() {
                if let Some(id) = self.registry.try_add_function(&pkg, file, FuncIdx(i)) {
                    self.original.push(id);
                }
            }
        }
    }

    /// Walk bodies starting from the original functions, adding callee
    /// records and caller edges. Descent stops at `max_depth` when positive.
    pub(crate) fn build_call_graph(&mut self) {
        let mut stack: Vec<(FuncId, i64)> = self.original.iter().map(|&id| (id, 0)).collect();
        let mut visited: FxHashSet<FuncId> = FxHashSet::default();

        while let Some((id, depth)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if self.config.max_depth > 0 && depth >= self.config.max_depth {
                debug!(
                    max_depth = self.config.max_depth,
                    func = %self.registry.get(id).name,
                    "max depth reached, not descending"
                );
                continue;
            }
            let Some(source) = self.registry.get(id).source.clone() else {
                continue;
            };
            let func = source.file.func(source.idx);

            let mut calls: Vec<&CallExpr> = Vec::new();
            collect_calls(&source.file, func, true, &mut calls);
            for call in calls {
                trace!(call = %call.span.pos, "resolving call");
                if let Some(callee) = self.try_add_call_expr(&source.pkg, &source.file, &call.fun)
                {
                    self.registry.add_called_by(callee, id);
                    stack.push((callee, depth + 1));
                }
            }
        }
    }

    /// Resolve a call's callee expression to a registered function.
    /// Mirrors the dispatch table: nested calls, plain identifiers,
    /// selectors, and `*`/`()`/`[i]` peels; anything else is unresolved.
    pub(crate) fn try_add_call_expr(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        fun: &Expr,
    ) -> Option<FuncId> {
        match fun {
            Expr::Call(call) => self.try_add_call_expr(pkg, file, &call.fun),
            Expr::Star(inner, _) | Expr::Paren(inner, _) => {
                self.try_add_call_expr(pkg, file, inner)
            }
            Expr::Index(index) => self.try_add_call_expr(pkg, file, &index.x),
            Expr::Ident(id) => {
                if let Some((_, obj)) = file.resolution.object_at(&id.span.pos) {
                    match &obj.kind {
                        ObjectKind::Func(idx) => {
                            let idx = *idx;
                            self.registry.try_add_function(pkg, file, idx)
                        }
                        ObjectKind::Var {
                            init: VarInit::FuncLit(idx),
                            ..
                        } => {
                            let idx = *idx;
                            self.registry.try_add_function(pkg, file, idx)
                        }
                        _ => None,
                    }
                } else {
                    // Package-scope identifier declared in a sibling file.
                    let (sibling, idx) = pkg.function(&id.name)?;
                    let sibling = Arc::clone(sibling);
                    self.registry.try_add_function(pkg, &sibling, idx)
                }
            }
            Expr::Selector(sel) => self.resolve_selector(pkg, file, sel),
            _ => None,
        }
    }

    fn resolve_selector(
        &mut self,
        pkg: &Arc<PkgInfo>,
        file: &Arc<GoFile>,
        sel: &crate::go::ast::SelectorExpr,
    ) -> Option<FuncId> {
        let name = &sel.sel.name;

        // `pkgname.Func(...)`
        if let Expr::Ident(x) = &sel.x {
            if let Some(path) = self.package_of_ident(file, x) {
                if self.config.clean_functions.match_fn(&path, name) {
                    return Some(self.registry.add_virtual(&path, name, false));
                }
                if self.config.wrapper_functions.match_fn(&path, name) {
                    return Some(self.registry.add_virtual(&path, name, true));
                }
                if let Some((ext_pkg, ext_file, idx)) = self.index.load_function(&path, None, name)
                {
                    return self.registry.try_add_function(&ext_pkg, &ext_file, idx);
                }
                debug!(pkg = %path, func = %name, "selector target not resolvable");
                return None;
            }
        }

        // `receiver.Method(...)`, where the receiver may be a field chain.
        let ty = self.operand_type(pkg, file, &sel.x)?;
        let (method_pkg, method_file, idx) = self.method_source(pkg, file, &ty, name)?;
        self.registry.try_add_function(&method_pkg, &method_file, idx)
    }

    /// The method `name` on a receiver of type `ty`, wherever it lives.
    pub(crate) fn method_source(
        &self,
        pkg: &Arc<PkgInfo>,
        file: &GoFile,
        ty: &TypeRef,
        name: &str,
    ) -> Option<(Arc<PkgInfo>, Arc<GoFile>, FuncIdx)> {
        match ty {
            TypeRef::Named(base) => pkg
                .find_method(base, name)
                .map(|(f, idx)| (Arc::clone(pkg), Arc::clone(f), idx)),
            TypeRef::Pointer(inner) => {
                let base = inner.base_name()?;
                pkg.find_method(base, name)
                    .map(|(f, idx)| (Arc::clone(pkg), Arc::clone(f), idx))
            }
            TypeRef::Qualified { pkg: alias, name: ty_name } => {
                let path = file.import_path(alias)?;
                self.index.load_function(path, Some(ty_name.as_str()), name)
            }
            TypeRef::Other(_) => None,
        }
    }

    /// Type of a selector operand: an identifier's object type, or a struct
    /// field chain stepped through the package's type declarations.
    pub(crate) fn operand_type(
        &self,
        pkg: &Arc<PkgInfo>,
        file: &GoFile,
        expr: &Expr,
    ) -> Option<TypeRef> {
        match expr {
            Expr::Ident(id) => self.object_type(file, &id.span.pos),
            Expr::Selector(sel) => {
                let base = self.operand_type(pkg, file, &sel.x)?;
                pkg.field_type(base.base_name()?, &sel.sel.name).cloned()
            }
            Expr::Star(inner, _) | Expr::Paren(inner, _) => self.operand_type(pkg, file, inner),
            Expr::Composite(lit) => Some(lit.ty.clone()),
            _ => None,
        }
    }

    /// The import path named by an identifier, if it is a package name.
    pub(crate) fn package_of_ident(&self, file: &GoFile, x: &crate::go::ast::Ident) -> Option<String> {
        match file.resolution.object_at(&x.span.pos) {
            Some((_, obj)) => match &obj.kind {
                ObjectKind::PkgName(path) => Some(path.clone()),
                _ => None,
            },
            // Fall back to the import table for unresolved identifiers.
            None => file.import_path(&x.name).map(str::to_string),
        }
    }

    /// Declared or inferred type of the object an identifier names.
    pub(crate) fn object_type(&self, file: &GoFile, pos: &Position) -> Option<TypeRef> {
        let (_, obj) = file.resolution.object_at(pos)?;
        match &obj.kind {
            ObjectKind::Param { ty } | ObjectKind::ResultVar { ty } => Some(ty.clone()),
            ObjectKind::Var { ty: Some(ty), .. } => Some(ty.clone()),
            ObjectKind::Var { ty: None, init } => match init {
                VarInit::TypeOf(ty) => Some(ty.clone()),
                VarInit::Copy(other) => {
                    let def = file.resolution.object(*other).def_pos.clone();
                    self.object_type(file, &def)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Collect every call expression in a function body, in pre-order.
/// `descend_literals` controls whether nested `func` literal bodies are
/// included (the call-graph walk wants them; the flow analyzer does not).
pub(crate) fn collect_calls<'f>(
    file: &'f GoFile,
    func: &'f FuncNode,
    descend_literals: bool,
    out: &mut Vec<&'f CallExpr>,
) {
    if let Some(body) = &func.body {
        for &sid in body {
            collect_stmt_calls(file, func, sid, descend_literals, out);
        }
    }
}

fn collect_stmt_calls<'f>(
    file: &'f GoFile,
    func: &'f FuncNode,
    sid: StmtId,
    descend_literals: bool,
    out: &mut Vec<&'f CallExpr>,
) {
    match func.stmt(sid) {
        Stmt::Assign(assign) => {
            for expr in assign.lhs.iter().chain(&assign.rhs) {
                collect_expr_calls(file, expr, descend_literals, out);
            }
        }
        Stmt::VarDecl(decl) => {
            for expr in &decl.values {
                collect_expr_calls(file, expr, descend_literals, out);
            }
        }
        Stmt::Return(ret) => {
            for expr in &ret.results {
                collect_expr_calls(file, expr, descend_literals, out);
            }
        }
        Stmt::If(stmt) => {
            if let Some(init) = stmt.init {
                collect_stmt_calls(file, func, init, descend_literals, out);
            }
            collect_expr_calls(file, &stmt.cond, descend_literals, out);
            for &sid in &stmt.then_body {
                collect_stmt_calls(file, func, sid, descend_literals, out);
            }
            if let Some(els) = stmt.else_body {
                collect_stmt_calls(file, func, els, descend_literals, out);
            }
        }
        Stmt::For(stmt) => {
            if let Some(init) = stmt.init {
                collect_stmt_calls(file, func, init, descend_literals, out);
            }
            if let Some(cond) = &stmt.cond {
                collect_expr_calls(file, cond, descend_literals, out);
            }
            if let Some(post) = stmt.post {
                collect_stmt_calls(file, func, post, descend_literals, out);
            }
            for &sid in &stmt.body {
                collect_stmt_calls(file, func, sid, descend_literals, out);
            }
        }
        Stmt::Switch(stmt) => {
            if let Some(init) = stmt.init {
                collect_stmt_calls(file, func, init, descend_literals, out);
            }
            if let Some(value) = &stmt.value {
                collect_expr_calls(file, value, descend_literals, out);
            }
            for case in &stmt.cases {
                for expr in &case.exprs {
                    collect_expr_calls(file, expr, descend_literals, out);
                }
                for &sid in &case.body {
                    collect_stmt_calls(file, func, sid, descend_literals, out);
                }
            }
        }
        Stmt::Block(ids) => {
            for &sid in ids {
                collect_stmt_calls(file, func, sid, descend_literals, out);
            }
        }
        Stmt::Expr(expr) => collect_expr_calls(file, expr, descend_literals, out),
        Stmt::Other(_) => {}
    }
}

pub(crate) fn collect_expr_calls<'f>(
    file: &'f GoFile,
    expr: &'f Expr,
    descend_literals: bool,
    out: &mut Vec<&'f CallExpr>,
) {
    match expr {
        Expr::Call(call) => {
            out.push(call);
            collect_expr_calls(file, &call.fun, descend_literals, out);
            for arg in &call.args {
                collect_expr_calls(file, arg, descend_literals, out);
            }
        }
        Expr::Selector(sel) => collect_expr_calls(file, &sel.x, descend_literals, out),
        Expr::Star(inner, _) | Expr::Paren(inner, _) => {
            collect_expr_calls(file, inner, descend_literals, out)
        }
        Expr::Index(index) => {
            collect_expr_calls(file, &index.x, descend_literals, out);
            collect_expr_calls(file, &index.index, descend_literals, out);
        }
        Expr::Composite(lit) => {
            for elem in &lit.elems {
                collect_expr_calls(file, elem, descend_literals, out);
            }
        }
        Expr::FuncLit(idx, _) => {
            if descend_literals {
                collect_calls(file, file.func(*idx), descend_literals, out);
            }
        }
        Expr::Other(children, _) => {
            for child in children {
                collect_expr_calls(file, child, descend_literals, out);
            }
        }
        Expr::Ident(_) => {}
    }
}
