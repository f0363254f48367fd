//! Object and scope resolution.
//!
//! A second pass over a lowered file that binds every identifier use to the
//! object (definition site) it refers to. This is the type-resolver side of
//! the AST facade: downstream code asks "which object does this identifier
//! name" and "is that object error-typed" without touching scopes again.
//!
//! Go scoping rules that matter here:
//! - `:=` introduces a fresh object unless the name is already declared in
//!   the *innermost* scope (shadowing produces distinct objects, so an inner
//!   `err` never aliases an outer one).
//! - `if`/`for`/`switch` initializers live in an implicit scope that wraps
//!   the statement's blocks.
//! - function literals capture the enclosing scopes.
//!
//! Variable types are not computed here. Each definition records a
//! [`VarInit`] describing where its value came from; whether that makes the
//! object error-typed is decided lazily by the analysis session, which can
//! see the registry, the package index and the config.

use rustc_hash::FxHashMap;

use crate::go::ast::{
    AssignStmt, Expr, FuncIdx, FuncNode, GoFile, Position, Stmt, StmtId, TypeRef,
};

/// Index into [`Resolution::objects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// Where a variable's value came from, recorded at its definition site.
#[derive(Debug, Clone)]
pub enum VarInit {
    /// Defined from a call: `err := f()` or `a, err := f()`.
    Call {
        callee: CalleeRef,
        /// Index of this variable on the left-hand side.
        index: usize,
        /// Number of left-hand positions fed by the call.
        count: usize,
    },
    /// Defined from another variable: `e2 := e1`.
    Copy(ObjectId),
    /// Defined from a composite literal or other typed expression.
    TypeOf(TypeRef),
    /// Defined from a function literal.
    FuncLit(FuncIdx),
    Unknown,
}

/// A lightweight, re-resolvable description of a call's callee.
#[derive(Debug, Clone)]
pub enum CalleeRef {
    /// `f(...)`
    Plain { name: String, pos: Position },
    /// `base.f(...)` or a field chain `base.a.b.f(...)`. `path` holds the
    /// intermediate field names, outermost first (empty for the plain
    /// two-part form).
    Selector {
        base: String,
        base_pos: Option<Position>,
        path: Vec<String>,
        sel: String,
    },
    Other,
}

/// What kind of thing an object is.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Var { ty: Option<TypeRef>, init: VarInit },
    Param { ty: TypeRef },
    /// A named result variable.
    ResultVar { ty: TypeRef },
    /// A package-level function declaration in this file.
    Func(FuncIdx),
    /// An imported package name; the payload is the import path.
    PkgName(String),
}

/// One declared object.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    /// Definition position; the stable key used by the variable-taint map.
    pub def_pos: Position,
    pub kind: ObjectKind,
}

/// Resolution output for one file.
#[derive(Debug, Default)]
pub struct Resolution {
    pub objects: Vec<Object>,
    /// Identifier use position -> object.
    use_defs: FxHashMap<Position, ObjectId>,
}

impl Resolution {
    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    /// The object an identifier at `pos` refers to, if resolution found one.
    pub fn object_at(&self, pos: &Position) -> Option<(ObjectId, &Object)> {
        let id = *self.use_defs.get(pos)?;
        Some((id, self.object(id)))
    }
}

/// Scope-stack resolver for one file.
pub struct Resolver<'a> {
    file: &'a GoFile,
    objects: Vec<Object>,
    use_defs: FxHashMap<Position, ObjectId>,
    /// Innermost scope last. Scope 0 is the package/file scope.
    scopes: Vec<FxHashMap<String, ObjectId>>,
}

impl<'a> Resolver<'a> {
    pub fn resolve(file: &'a GoFile) -> Resolution {
        let mut resolver = Resolver {
            file,
            objects: Vec::new(),
            use_defs: FxHashMap::default(),
            scopes: vec![FxHashMap::default()],
        };

        // File scope: imports and package-level function declarations.
        for (i, imp) in file.imports.iter().enumerate() {
            let pos = Position::new(file.path.as_str(), 0, i + 1);
            resolver.define_at(imp.name.clone(), pos, ObjectKind::PkgName(imp.path.clone()));
        }
        for &idx in &file.decls {
            let func = file.func(idx);
            if func.receiver.is_none() && func.name != crate::go::ast::ANONYMOUS {
                resolver.define_at(
                    func.name.clone(),
                    func.span.pos.clone(),
                    ObjectKind::Func(idx),
                );
            }
        }

        for &idx in &file.decls {
            resolver.resolve_func(idx);
        }

        Resolution {
            objects: resolver.objects,
            use_defs: resolver.use_defs,
        }
    }

    // -------------------------------------------------------------------------
    // Scope plumbing
    // -------------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn define_at(&mut self, name: String, pos: Position, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object {
            name: name.clone(),
            def_pos: pos.clone(),
            kind,
        });
        // The defining occurrence resolves to itself, so `object_at` works
        // uniformly for definitions and uses.
        self.use_defs.insert(pos, id);
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .insert(name, id);
        id
    }

    fn lookup(&self, name: &str) -> Option<ObjectId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declared_in_innermost(&self, name: &str) -> Option<ObjectId> {
        self.scopes
            .last()
            .and_then(|scope| scope.get(name))
            .copied()
    }

    fn record_use(&mut self, pos: &Position, id: ObjectId) {
        self.use_defs.insert(pos.clone(), id);
    }

    // -------------------------------------------------------------------------
    // Functions and statements
    // -------------------------------------------------------------------------

    fn resolve_func(&mut self, idx: FuncIdx) {
        let func = self.file.func(idx);
        self.push_scope();

        if let Some(recv) = &func.receiver {
            if let Some(name) = &recv.name {
                self.define_at(
                    name.name.clone(),
                    name.span.pos.clone(),
                    ObjectKind::Param {
                        ty: recv.ty.clone(),
                    },
                );
            }
        }
        for param in &func.params {
            if let Some(name) = &param.name {
                if name.name != "_" {
                    self.define_at(
                        name.name.clone(),
                        name.span.pos.clone(),
                        ObjectKind::Param {
                            ty: param.ty.clone(),
                        },
                    );
                }
            }
        }
        for result in &func.results {
            if let Some(name) = &result.name {
                if name.name != "_" {
                    self.define_at(
                        name.name.clone(),
                        name.span.pos.clone(),
                        ObjectKind::ResultVar {
                            ty: result.ty.clone(),
                        },
                    );
                }
            }
        }

        if let Some(body) = &func.body {
            self.push_scope();
            for &sid in body {
                self.resolve_stmt(func, sid);
            }
            self.pop_scope();
        }

        self.pop_scope();
    }

    fn resolve_stmt(&mut self, func: &'a FuncNode, sid: StmtId) {
        match func.stmt(sid) {
            Stmt::Assign(assign) => self.resolve_assign(assign),
            Stmt::VarDecl(decl) => {
                for value in &decl.values {
                    self.resolve_expr(value);
                }
                let count = decl.names.len();
                for (i, name) in decl.names.iter().enumerate() {
                    if name.name == "_" {
                        continue;
                    }
                    let init = if decl.ty.is_some() {
                        VarInit::Unknown
                    } else {
                        self.infer_init(i, count, &decl.values)
                    };
                    self.define_at(
                        name.name.clone(),
                        name.span.pos.clone(),
                        ObjectKind::Var {
                            ty: decl.ty.clone(),
                            init,
                        },
                    );
                }
            }
            Stmt::Return(ret) => {
                for result in &ret.results {
                    self.resolve_expr(result);
                }
            }
            Stmt::If(stmt) => {
                self.push_scope();
                if let Some(init) = stmt.init {
                    self.resolve_stmt(func, init);
                }
                self.resolve_expr(&stmt.cond);
                self.push_scope();
                for &sid in &stmt.then_body {
                    self.resolve_stmt(func, sid);
                }
                self.pop_scope();
                if let Some(els) = stmt.else_body {
                    self.resolve_stmt(func, els);
                }
                self.pop_scope();
            }
            Stmt::For(stmt) => {
                self.push_scope();
                if let Some(init) = stmt.init {
                    self.resolve_stmt(func, init);
                }
                if let Some(cond) = &stmt.cond {
                    self.resolve_expr(cond);
                }
                if let Some(post) = stmt.post {
                    self.resolve_stmt(func, post);
                }
                self.push_scope();
                for &sid in &stmt.body {
                    self.resolve_stmt(func, sid);
                }
                self.pop_scope();
                self.pop_scope();
            }
            Stmt::Switch(stmt) => {
                self.push_scope();
                if let Some(init) = stmt.init {
                    self.resolve_stmt(func, init);
                }
                if let Some(value) = &stmt.value {
                    self.resolve_expr(value);
                }
                for case in &stmt.cases {
                    for expr in &case.exprs {
                        self.resolve_expr(expr);
                    }
                    self.push_scope();
                    for &sid in &case.body {
                        self.resolve_stmt(func, sid);
                    }
                    self.pop_scope();
                }
                self.pop_scope();
            }
            Stmt::Block(ids) => {
                self.push_scope();
                for &sid in ids {
                    self.resolve_stmt(func, sid);
                }
                self.pop_scope();
            }
            Stmt::Expr(expr) => self.resolve_expr(expr),
            Stmt::Other(_) => {}
        }
    }

    fn resolve_assign(&mut self, assign: &AssignStmt) {
        for rhs in &assign.rhs {
            self.resolve_expr(rhs);
        }
        let count = assign.lhs.len();
        for (i, lhs) in assign.lhs.iter().enumerate() {
            match lhs {
                Expr::Ident(id) if id.name != "_" => {
                    if assign.define {
                        // Redeclaration in the same scope assigns; otherwise
                        // a fresh (possibly shadowing) object is introduced.
                        if let Some(existing) = self.declared_in_innermost(&id.name) {
                            self.record_use(&id.span.pos, existing);
                        } else {
                            let init = self.infer_init(i, count, &assign.rhs);
                            self.define_at(
                                id.name.clone(),
                                id.span.pos.clone(),
                                ObjectKind::Var { ty: None, init },
                            );
                        }
                    } else if let Some(obj) = self.lookup(&id.name) {
                        self.record_use(&id.span.pos, obj);
                    }
                }
                _ => self.resolve_expr(lhs),
            }
        }
    }

    /// Describe the initializer feeding left-hand position `i` of `count`.
    fn infer_init(&mut self, i: usize, count: usize, rhs: &[Expr]) -> VarInit {
        let (expr, index, fed) = if rhs.len() == 1 {
            (&rhs[0], i, count)
        } else if rhs.len() == count {
            (&rhs[i], 0, 1)
        } else {
            return VarInit::Unknown;
        };
        self.init_from_expr(expr, index, fed)
    }

    fn init_from_expr(&mut self, expr: &Expr, index: usize, count: usize) -> VarInit {
        match expr {
            Expr::Paren(inner, _) | Expr::Star(inner, _) => {
                self.init_from_expr(inner, index, count)
            }
            Expr::Call(call) => VarInit::Call {
                callee: self.callee_ref(&call.fun),
                index,
                count,
            },
            Expr::Ident(id) => match self.lookup(&id.name) {
                Some(obj) => VarInit::Copy(obj),
                None => VarInit::Unknown,
            },
            Expr::Composite(lit) => VarInit::TypeOf(lit.ty.clone()),
            Expr::FuncLit(idx, _) => VarInit::FuncLit(*idx),
            _ => VarInit::Unknown,
        }
    }

    fn callee_ref(&self, fun: &Expr) -> CalleeRef {
        match fun {
            Expr::Ident(id) => CalleeRef::Plain {
                name: id.name.clone(),
                pos: id.span.pos.clone(),
            },
            Expr::Selector(sel) => {
                // Flatten the operand down to its base identifier, keeping
                // the intermediate field names: `baz.Bar.Foo.Method` yields
                // base `baz`, path `[Bar, Foo]`, sel `Method`.
                let mut path = Vec::new();
                let mut current = &sel.x;
                loop {
                    match current {
                        Expr::Selector(inner) => {
                            path.push(inner.sel.name.clone());
                            current = &inner.x;
                        }
                        Expr::Paren(inner, _) => current = inner,
                        Expr::Ident(base) => {
                            path.reverse();
                            return CalleeRef::Selector {
                                base: base.name.clone(),
                                base_pos: Some(base.span.pos.clone()),
                                path,
                                sel: sel.sel.name.clone(),
                            };
                        }
                        _ => return CalleeRef::Other,
                    }
                }
            }
            Expr::Paren(inner, _) => self.callee_ref(inner),
            _ => CalleeRef::Other,
        }
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(id) => {
                if let Some(obj) = self.lookup(&id.name) {
                    self.record_use(&id.span.pos, obj);
                }
            }
            Expr::Call(call) => {
                self.resolve_expr(&call.fun);
                for arg in &call.args {
                    self.resolve_expr(arg);
                }
            }
            // Selector fields are not independent objects; only the operand
            // resolves here.
            Expr::Selector(sel) => self.resolve_expr(&sel.x),
            Expr::Star(inner, _) | Expr::Paren(inner, _) => self.resolve_expr(inner),
            Expr::Index(index) => {
                self.resolve_expr(&index.x);
                self.resolve_expr(&index.index);
            }
            Expr::Composite(lit) => {
                for elem in &lit.elems {
                    self.resolve_expr(elem);
                }
            }
            // Literal bodies resolve inline so they capture enclosing scopes.
            Expr::FuncLit(idx, _) => self.resolve_func(*idx),
            Expr::Other(children, _) => {
                for child in children {
                    self.resolve_expr(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::go::parser::parse_source;

    fn ident_pos(expr: &Expr) -> Position {
        match expr {
            Expr::Ident(id) => id.span.pos.clone(),
            other => panic!("expected ident, got {other:?}"),
        }
    }

    fn assign<'f>(func: &'f FuncNode, sid: StmtId) -> &'f AssignStmt {
        match func.stmt(sid) {
            Stmt::Assign(a) => a,
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn shadowing_creates_distinct_objects() {
        let file = parse_source(
            "main.go",
            r#"package main

func inner() error { return nil }

func f() error {
	err := inner()
	if true {
		err := inner()
		_ = err
	}
	return err
}
"#,
        )
        .unwrap();
        let func = file.func(file.decls[1]);
        let body = func.body.as_ref().unwrap();

        let outer_def = ident_pos(&assign(func, body[0]).lhs[0]);
        let Stmt::If(if_stmt) = func.stmt(body[1]) else {
            panic!("expected if");
        };
        let inner_def = ident_pos(&assign(func, if_stmt.then_body[0]).lhs[0]);
        let inner_use = ident_pos(&assign(func, if_stmt.then_body[1]).rhs[0]);
        let Stmt::Return(ret) = func.stmt(body[2]) else {
            panic!("expected return");
        };
        let ret_use = ident_pos(&ret.results[0]);

        let err_objects: Vec<_> = file
            .resolution
            .objects
            .iter()
            .filter(|o| o.name == "err")
            .collect();
        assert_eq!(err_objects.len(), 2);
        assert_ne!(inner_def, outer_def);

        // The inner use binds to the inner object, the return to the outer.
        let (_, inner_obj) = file.resolution.object_at(&inner_use).unwrap();
        assert_eq!(inner_obj.def_pos, inner_def);
        let (_, ret_obj) = file.resolution.object_at(&ret_use).unwrap();
        assert_eq!(ret_obj.def_pos, outer_def);
    }

    #[test]
    fn redeclaration_in_same_scope_reuses_the_object() {
        let file = parse_source(
            "main.go",
            r#"package main

func pair() (int, error) { return 0, nil }

func f() error {
	n, err := pair()
	m, err := pair()
	_, _ = n, m
	return err
}
"#,
        )
        .unwrap();
        let func = file.func(file.decls[1]);
        let body = func.body.as_ref().unwrap();

        let first_def = ident_pos(&assign(func, body[0]).lhs[1]);
        let second_occurrence = ident_pos(&assign(func, body[1]).lhs[1]);

        let err_objects: Vec<_> = file
            .resolution
            .objects
            .iter()
            .filter(|o| o.name == "err")
            .collect();
        assert_eq!(err_objects.len(), 1);
        let (_, obj) = file.resolution.object_at(&second_occurrence).unwrap();
        assert_eq!(obj.def_pos, first_def);
    }

    #[test]
    fn if_initializer_scopes_wrap_the_branches() {
        let file = parse_source(
            "main.go",
            r#"package main

func inner() error { return nil }

func f() error {
	if err := inner(); err != nil {
		return err
	}
	err := inner()
	return err
}
"#,
        )
        .unwrap();
        let func = file.func(file.decls[1]);
        let body = func.body.as_ref().unwrap();

        let Stmt::If(if_stmt) = func.stmt(body[0]) else {
            panic!("expected if");
        };
        let init_def = ident_pos(&assign(func, if_stmt.init.unwrap()).lhs[0]);
        let Expr::Other(cond_children, _) = &if_stmt.cond else {
            panic!("expected binary condition");
        };
        let cond_use = ident_pos(&cond_children[0]);
        let Stmt::Return(branch_ret) = func.stmt(if_stmt.then_body[0]) else {
            panic!("expected return");
        };
        let branch_use = ident_pos(&branch_ret.results[0]);
        let later_def = ident_pos(&assign(func, body[1]).lhs[0]);

        // Condition and branch see the initializer's object; the statement
        // after the `if` defines a fresh one.
        let (_, cond_obj) = file.resolution.object_at(&cond_use).unwrap();
        assert_eq!(cond_obj.def_pos, init_def);
        let (_, branch_obj) = file.resolution.object_at(&branch_use).unwrap();
        assert_eq!(branch_obj.def_pos, init_def);
        assert_ne!(later_def, init_def);
    }

    #[test]
    fn params_and_named_results_become_objects() {
        let file = parse_source(
            "main.go",
            r#"package main

func g(a int) (err error) {
	return
}
"#,
        )
        .unwrap();
        let objects = &file.resolution.objects;
        let a = objects.iter().find(|o| o.name == "a").unwrap();
        assert!(matches!(a.kind, ObjectKind::Param { .. }));
        let err = objects.iter().find(|o| o.name == "err").unwrap();
        assert!(matches!(err.kind, ObjectKind::ResultVar { .. }));
    }

    #[test]
    fn callee_refs_flatten_selector_chains() {
        let file = parse_source(
            "main.go",
            r#"package main

type Foo struct{}

func (f Foo) Method() (int, error) { return 0, nil }

type Bar struct {
	Foo Foo
}

func f() error {
	b := Bar{}
	_, err := b.Foo.Method()
	return err
}
"#,
        )
        .unwrap();
        let err = file
            .resolution
            .objects
            .iter()
            .find(|o| o.name == "err")
            .unwrap();
        let ObjectKind::Var {
            init:
                VarInit::Call {
                    callee:
                        CalleeRef::Selector {
                            base,
                            path,
                            sel,
                            base_pos,
                        },
                    index,
                    count,
                },
            ..
        } = &err.kind
        else {
            panic!("expected selector-call initializer, got {:?}", err.kind);
        };
        assert_eq!(base, "b");
        assert!(base_pos.is_some());
        assert_eq!(path, &vec!["Foo".to_string()]);
        assert_eq!(sel, "Method");
        assert_eq!((*index, *count), (1, 2));
    }
}
