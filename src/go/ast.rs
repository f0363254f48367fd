//! Typed Go AST.
//!
//! Lowers tree-sitter parse trees into the small set of tagged variants the
//! analyzer inspects. Anything the analyzer has no business understanding
//! lowers to [`Expr::Other`] / [`Stmt::Other`]; those still carry their
//! child expressions so call discovery stays complete, but the taint
//! evaluator treats them as unknown.
//!
//! Statements are arena-allocated per function ([`StmtId`] indices into
//! `FuncNode::stmts`) so that CFG blocks and control-flow children can refer
//! to them without owning them. Function literals found inside expressions
//! are hoisted into the per-file function arena ([`FuncIdx`]) and referenced
//! by index; their bodies are ordinary functions for the rest of the
//! pipeline.

use serde::Serialize;
use tree_sitter::Node;

use crate::go::resolver::Resolution;

/// A `(file, line, column)` triple. 1-indexed; the stable identity for
/// declarations, objects and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Byte span plus the position of its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub pos: Position,
}

/// Index into the per-file function arena (`GoFile::funcs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncIdx(pub usize);

/// Index into the per-function statement arena (`FuncNode::stmts`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub usize);

/// Reference to a declared type, kept only as deep as the error-typedness
/// test needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// A plain named type: `error`, `string`, `MyErr`.
    Named(String),
    /// `*T`
    Pointer(Box<TypeRef>),
    /// `pkg.T`
    Qualified { pkg: String, name: String },
    /// Anything else, kept as source text.
    Other(String),
}

impl TypeRef {
    /// The base type name with pointers peeled, if this is a named type.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(n) => Some(n),
            TypeRef::Pointer(inner) => inner.base_name(),
            _ => None,
        }
    }
}

/// An identifier occurrence.
#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub fun: Expr,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SelectorExpr {
    pub x: Expr,
    pub sel: Ident,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IndexExpr {
    pub x: Expr,
    pub index: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CompositeLit {
    pub ty: TypeRef,
    pub elems: Vec<Expr>,
    pub span: Span,
}

/// Expression shapes the resolver inspects, plus an explicit fall-through.
#[derive(Debug, Clone)]
pub enum Expr {
    Ident(Ident),
    Call(Box<CallExpr>),
    Selector(Box<SelectorExpr>),
    Star(Box<Expr>, Span),
    Paren(Box<Expr>, Span),
    Index(Box<IndexExpr>),
    FuncLit(FuncIdx, Span),
    Composite(Box<CompositeLit>),
    /// Unknown shape; children retained so call discovery can descend.
    Other(Vec<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Ident(id) => &id.span,
            Expr::Call(c) => &c.span,
            Expr::Selector(s) => &s.span,
            Expr::Star(_, span) | Expr::Paren(_, span) => span,
            Expr::Index(i) => &i.span,
            Expr::FuncLit(_, span) => span,
            Expr::Composite(c) => &c.span,
            Expr::Other(_, span) => span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignStmt {
    pub lhs: Vec<Expr>,
    pub rhs: Vec<Expr>,
    /// `:=` rather than `=`.
    pub define: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct VarDeclStmt {
    pub names: Vec<Ident>,
    pub ty: Option<TypeRef>,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub results: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub init: Option<StmtId>,
    pub cond: Expr,
    pub then_body: Vec<StmtId>,
    /// Either a `Block` or a chained `If`.
    pub else_body: Option<StmtId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<StmtId>,
    pub cond: Option<Expr>,
    pub post: Option<StmtId>,
    pub body: Vec<StmtId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Empty for `default:`.
    pub exprs: Vec<Expr>,
    pub body: Vec<StmtId>,
}

#[derive(Debug, Clone)]
pub struct SwitchStmt {
    pub init: Option<StmtId>,
    pub value: Option<Expr>,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

/// Statement variants. Control-flow children are `StmtId`s so CFG blocks
/// can reference head and body parts independently.
#[derive(Debug, Clone)]
pub enum Stmt {
    Assign(AssignStmt),
    VarDecl(VarDeclStmt),
    Return(ReturnStmt),
    If(IfStmt),
    For(ForStmt),
    Switch(SwitchStmt),
    Block(Vec<StmtId>),
    Expr(Expr),
    Other(Span),
}

/// One named parameter or result field (flattened: `a, b int` produces two).
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<Ident>,
    pub ty: TypeRef,
}

/// Sentinel name given to function literals.
pub const ANONYMOUS: &str = "anonymous";

/// A function declaration, method declaration, or function literal.
#[derive(Debug, Clone)]
pub struct FuncNode {
    pub name: String,
    pub receiver: Option<Field>,
    pub params: Vec<Field>,
    pub results: Vec<Field>,
    /// Statement arena for this function's body.
    pub stmts: Vec<Stmt>,
    /// Top-level statement ids of the body, in source order. `None` when
    /// the declaration has no body.
    pub body: Option<Vec<StmtId>>,
    pub span: Span,
    pub is_literal: bool,
}

impl FuncNode {
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0]
    }
}

/// A single import.
#[derive(Debug, Clone)]
pub struct Import {
    /// Local name: explicit alias, or the last path segment.
    pub name: String,
    /// Canonical import path.
    pub path: String,
}

/// Method signature recorded for interface declarations.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub name: String,
    pub params: usize,
    pub results: Vec<TypeRef>,
}

/// A declared named type, kept only as deep as embedding and field-chain
/// resolution need.
#[derive(Debug, Clone, Default)]
pub struct TypeDecl {
    pub name: String,
    /// Embedded field type names (structs) or embedded interfaces.
    pub embedded: Vec<String>,
    /// Struct fields by name. Embedded fields appear here too, under their
    /// base type name, so selector chains like `b.Foo.Method()` resolve.
    pub fields: Vec<(String, TypeRef)>,
    /// Methods declared inline (interfaces only).
    pub interface_methods: Vec<MethodSig>,
}

/// One lowered Go source file.
#[derive(Debug)]
pub struct GoFile {
    pub path: String,
    pub source: String,
    pub package_name: String,
    pub imports: Vec<Import>,
    /// Function arena: declarations first (source order), literals appended
    /// as they are encountered during lowering.
    pub funcs: Vec<FuncNode>,
    /// Indices of top-level declarations, in source order.
    pub decls: Vec<FuncIdx>,
    /// Declared named types.
    pub types: Vec<TypeDecl>,
    /// Object/scope resolution, filled in by [`crate::go::resolver`].
    pub resolution: Resolution,
}

impl GoFile {
    /// Source text of a span. This is the node-formatting facade: spans are
    /// byte-exact, so no re-rendering is needed.
    pub fn text(&self, span: &Span) -> &str {
        &self.source[span.start_byte..span.end_byte]
    }

    pub fn func(&self, idx: FuncIdx) -> &FuncNode {
        &self.funcs[idx.0]
    }

    /// Resolve an import's local name to its canonical path.
    pub fn import_path(&self, local: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|imp| imp.name == local)
            .map(|imp| imp.path.as_str())
    }
}

// =============================================================================
// Lowering
// =============================================================================

/// Lowers one parse tree into a [`GoFile`] (without object resolution).
pub struct Lowerer<'a> {
    file: &'a str,
    source: &'a str,
    funcs: Vec<FuncNode>,
}

impl<'a> Lowerer<'a> {
    pub fn lower(file: &'a str, source: &'a str, tree: &tree_sitter::Tree) -> GoFile {
        let mut lowerer = Lowerer {
            file,
            source,
            funcs: Vec::new(),
        };

        let root = tree.root_node();
        let mut package_name = String::new();
        let mut imports = Vec::new();
        let mut decls = Vec::new();
        let mut types = Vec::new();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    if let Some(name) = child.named_child(0) {
                        package_name = lowerer.node_text(name).to_string();
                    }
                }
                "import_declaration" => lowerer.lower_imports(child, &mut imports),
                "function_declaration" | "method_declaration" => {
                    let idx = lowerer.lower_func(child);
                    decls.push(idx);
                }
                "type_declaration" => lowerer.lower_type_decl(child, &mut types),
                _ => {}
            }
        }

        GoFile {
            path: file.to_string(),
            source: source.to_string(),
            package_name,
            imports,
            funcs: lowerer.funcs,
            decls,
            types,
            resolution: Resolution::default(),
        }
    }

    fn node_text(&self, node: Node) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }

    fn span(&self, node: Node) -> Span {
        let start = node.start_position();
        Span {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            pos: Position::new(self.file, start.row + 1, start.column + 1),
        }
    }

    fn ident(&self, node: Node) -> Ident {
        Ident {
            name: self.node_text(node).to_string(),
            span: self.span(node),
        }
    }

    // -------------------------------------------------------------------------
    // Imports and type declarations
    // -------------------------------------------------------------------------

    fn lower_imports(&self, node: Node, out: &mut Vec<Import>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_spec" => self.lower_import_spec(child, out),
                "import_spec_list" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() == "import_spec" {
                            self.lower_import_spec(spec, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_import_spec(&self, node: Node, out: &mut Vec<Import>) {
        let path = match node.child_by_field_name("path") {
            Some(p) => self.node_text(p).trim_matches('"').to_string(),
            None => return,
        };
        let name = match node.child_by_field_name("name") {
            Some(n) => self.node_text(n).to_string(),
            None => path.rsplit('/').next().unwrap_or(&path).to_string(),
        };
        // Dot and blank imports cannot be referenced by selector.
        if name == "." || name == "_" {
            return;
        }
        out.push(Import { name, path });
    }

    fn lower_type_decl(&self, node: Node, out: &mut Vec<TypeDecl>) {
        let mut cursor = node.walk();
        for spec in node.named_children(&mut cursor) {
            if spec.kind() != "type_spec" {
                continue;
            }
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            let Some(ty) = spec.child_by_field_name("type") else {
                continue;
            };
            let mut decl = TypeDecl {
                name: self.node_text(name).to_string(),
                ..Default::default()
            };
            match ty.kind() {
                "struct_type" => self.collect_struct_fields(ty, &mut decl),
                "interface_type" => self.collect_interface_methods(ty, &mut decl),
                _ => {}
            }
            out.push(decl);
        }
    }

    fn collect_struct_fields(&self, node: Node, decl: &mut TypeDecl) {
        let mut cursor = node.walk();
        for list in node.named_children(&mut cursor) {
            if list.kind() != "field_declaration_list" {
                continue;
            }
            let mut inner = list.walk();
            for field in list.named_children(&mut inner) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                let Some(ty_node) = field.child_by_field_name("type") else {
                    continue;
                };
                let ty = self.lower_type(ty_node);
                let mut names = Vec::new();
                let mut fields = field.walk();
                for child in field.named_children(&mut fields) {
                    if child.kind() == "field_identifier" && child.end_byte() <= ty_node.start_byte()
                    {
                        names.push(self.node_text(child).to_string());
                    }
                }
                if names.is_empty() {
                    // Embedded field: promoted methods resolve through
                    // `embedded`, and the field itself is addressable under
                    // the base type name.
                    if let Some(base) = ty.base_name() {
                        decl.embedded.push(base.to_string());
                        decl.fields.push((base.to_string(), ty.clone()));
                    }
                } else {
                    for name in names {
                        decl.fields.push((name, ty.clone()));
                    }
                }
            }
        }
    }

    fn collect_interface_methods(&self, node: Node, decl: &mut TypeDecl) {
        let mut cursor = node.walk();
        for elem in node.named_children(&mut cursor) {
            match elem.kind() {
                "method_spec" | "method_elem" => {
                    let Some(name) = elem.child_by_field_name("name") else {
                        continue;
                    };
                    let params = elem
                        .child_by_field_name("parameters")
                        .map(|p| p.named_child_count())
                        .unwrap_or(0);
                    let results = elem
                        .child_by_field_name("result")
                        .map(|r| self.lower_result(r).into_iter().map(|f| f.ty).collect())
                        .unwrap_or_default();
                    decl.interface_methods.push(MethodSig {
                        name: self.node_text(name).to_string(),
                        params,
                        results,
                    });
                }
                "type_identifier" => {
                    // Embedded interface.
                    decl.embedded.push(self.node_text(elem).to_string());
                }
                _ => {}
            }
        }
    }

    // -------------------------------------------------------------------------
    // Types
    // -------------------------------------------------------------------------

    fn lower_type(&self, node: Node) -> TypeRef {
        match node.kind() {
            "type_identifier" | "identifier" => TypeRef::Named(self.node_text(node).to_string()),
            "pointer_type" => {
                let inner = node
                    .named_child(0)
                    .map(|n| self.lower_type(n))
                    .unwrap_or_else(|| TypeRef::Other(self.node_text(node).to_string()));
                TypeRef::Pointer(Box::new(inner))
            }
            "qualified_type" => {
                let pkg = node
                    .child_by_field_name("package")
                    .map(|n| self.node_text(n).to_string())
                    .unwrap_or_default();
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.node_text(n).to_string())
                    .unwrap_or_default();
                TypeRef::Qualified { pkg, name }
            }
            "parenthesized_type" => node
                .named_child(0)
                .map(|n| self.lower_type(n))
                .unwrap_or_else(|| TypeRef::Other(self.node_text(node).to_string())),
            _ => TypeRef::Other(self.node_text(node).to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Functions
    // -------------------------------------------------------------------------

    /// Lower a declaration or literal into the function arena; returns its
    /// index. Called recursively for literals found inside expressions.
    fn lower_func(&mut self, node: Node) -> FuncIdx {
        let is_literal = node.kind() == "func_literal";
        let name = if is_literal {
            ANONYMOUS.to_string()
        } else {
            node.child_by_field_name("name")
                .map(|n| self.node_text(n).to_string())
                .unwrap_or_else(|| ANONYMOUS.to_string())
        };

        let receiver = node
            .child_by_field_name("receiver")
            .and_then(|r| self.lower_receiver(r));
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.lower_param_list(p))
            .unwrap_or_default();
        let results = node
            .child_by_field_name("result")
            .map(|r| self.lower_result(r))
            .unwrap_or_default();
        let span = self.span(node);

        // Reserve the slot before lowering the body so nested literals get
        // distinct indices.
        let idx = FuncIdx(self.funcs.len());
        self.funcs.push(FuncNode {
            name,
            receiver,
            params,
            results,
            stmts: Vec::new(),
            body: None,
            span,
            is_literal,
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut arena = Vec::new();
            let ids = self.lower_block(body, &mut arena);
            let func = &mut self.funcs[idx.0];
            func.stmts = arena;
            func.body = Some(ids);
        }

        idx
    }

    fn lower_receiver(&self, node: Node) -> Option<Field> {
        let mut cursor = node.walk();
        for decl in node.named_children(&mut cursor) {
            if decl.kind() == "parameter_declaration" {
                let name = decl.child_by_field_name("name").map(|n| self.ident(n));
                let ty = decl
                    .child_by_field_name("type")
                    .map(|t| self.lower_type(t))?;
                return Some(Field { name, ty });
            }
        }
        None
    }

    fn lower_param_list(&self, node: Node) -> Vec<Field> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for decl in node.named_children(&mut cursor) {
            if decl.kind() != "parameter_declaration"
                && decl.kind() != "variadic_parameter_declaration"
            {
                continue;
            }
            let Some(ty_node) = decl.child_by_field_name("type") else {
                continue;
            };
            let ty = self.lower_type(ty_node);
            let mut names = Vec::new();
            let mut inner = decl.walk();
            for child in decl.named_children(&mut inner) {
                if child.kind() == "identifier" && child.end_byte() <= ty_node.start_byte() {
                    names.push(self.ident(child));
                }
            }
            if names.is_empty() {
                out.push(Field { name: None, ty });
            } else {
                for name in names {
                    out.push(Field {
                        name: Some(name),
                        ty: ty.clone(),
                    });
                }
            }
        }
        out
    }

    /// `result` is either a parameter list or a bare type.
    fn lower_result(&self, node: Node) -> Vec<Field> {
        if node.kind() == "parameter_list" {
            self.lower_param_list(node)
        } else {
            vec![Field {
                name: None,
                ty: self.lower_type(node),
            }]
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn push_stmt(&mut self, arena: &mut Vec<Stmt>, stmt: Stmt) -> StmtId {
        let id = StmtId(arena.len());
        arena.push(stmt);
        id
    }

    fn lower_block(&mut self, node: Node, arena: &mut Vec<Stmt>) -> Vec<StmtId> {
        let mut ids = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "statement_list" {
                let mut inner = child.walk();
                for stmt in child.named_children(&mut inner) {
                    ids.push(self.lower_stmt(stmt, arena));
                }
            } else {
                ids.push(self.lower_stmt(child, arena));
            }
        }
        ids
    }

    fn lower_stmt(&mut self, node: Node, arena: &mut Vec<Stmt>) -> StmtId {
        let span = self.span(node);
        match node.kind() {
            "short_var_declaration" | "assignment_statement" => {
                let define = node.kind() == "short_var_declaration";
                let lhs = node
                    .child_by_field_name("left")
                    .map(|n| self.lower_expr_list(n))
                    .unwrap_or_default();
                let rhs = node
                    .child_by_field_name("right")
                    .map(|n| self.lower_expr_list(n))
                    .unwrap_or_default();
                self.push_stmt(
                    arena,
                    Stmt::Assign(AssignStmt {
                        lhs,
                        rhs,
                        define,
                        span,
                    }),
                )
            }
            "var_declaration" => {
                let mut specs = Vec::new();
                let mut cursor = node.walk();
                for spec in node.named_children(&mut cursor) {
                    if spec.kind() != "var_spec" {
                        continue;
                    }
                    let spec_span = self.span(spec);
                    let mut names = Vec::new();
                    let mut inner = spec.walk();
                    for child in spec.named_children(&mut inner) {
                        if child.kind() == "identifier" {
                            names.push(self.ident(child));
                        }
                    }
                    let ty = spec
                        .child_by_field_name("type")
                        .map(|t| self.lower_type(t));
                    let values = spec
                        .child_by_field_name("value")
                        .map(|v| self.lower_expr_list(v))
                        .unwrap_or_default();
                    specs.push(Stmt::VarDecl(VarDeclStmt {
                        names,
                        ty,
                        values,
                        span: spec_span,
                    }));
                }
                let ids: Vec<StmtId> = specs
                    .into_iter()
                    .map(|s| self.push_stmt(arena, s))
                    .collect();
                match ids.as_slice() {
                    [] => self.push_stmt(arena, Stmt::Other(span)),
                    [single] => *single,
                    _ => self.push_stmt(arena, Stmt::Block(ids)),
                }
            }
            "return_statement" => {
                let results = match node.named_child(0) {
                    Some(n) if n.kind() == "expression_list" => self.lower_expr_list(n),
                    Some(n) => vec![self.lower_expr(n)],
                    None => Vec::new(),
                };
                self.push_stmt(arena, Stmt::Return(ReturnStmt { results, span }))
            }
            "if_statement" => {
                let init = node
                    .child_by_field_name("initializer")
                    .map(|n| self.lower_stmt(n, arena));
                let cond = node
                    .child_by_field_name("condition")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                let then_body = node
                    .child_by_field_name("consequence")
                    .map(|n| self.lower_block(n, arena))
                    .unwrap_or_default();
                let else_body = node.child_by_field_name("alternative").map(|alt| {
                    if alt.kind() == "if_statement" {
                        self.lower_stmt(alt, arena)
                    } else {
                        let ids = self.lower_block(alt, arena);
                        self.push_stmt(arena, Stmt::Block(ids))
                    }
                });
                self.push_stmt(
                    arena,
                    Stmt::If(IfStmt {
                        init,
                        cond,
                        then_body,
                        else_body,
                        span,
                    }),
                )
            }
            "for_statement" => self.lower_for(node, arena, span),
            "expression_switch_statement" => self.lower_switch(node, arena, span),
            "block" => {
                let ids = self.lower_block(node, arena);
                self.push_stmt(arena, Stmt::Block(ids))
            }
            "expression_statement" => {
                let expr = node
                    .named_child(0)
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                self.push_stmt(arena, Stmt::Expr(expr))
            }
            "go_statement" | "defer_statement" => {
                let expr = node
                    .named_child(0)
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                self.push_stmt(arena, Stmt::Expr(expr))
            }
            "labeled_statement" => match node.named_child(1) {
                Some(inner) => self.lower_stmt(inner, arena),
                None => self.push_stmt(arena, Stmt::Other(span)),
            },
            _ => self.push_stmt(arena, Stmt::Other(span)),
        }
    }

    fn lower_for(&mut self, node: Node, arena: &mut Vec<Stmt>, span: Span) -> StmtId {
        let mut init = None;
        let mut cond = None;
        let mut post = None;
        let mut body_ids = Vec::new();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "for_clause" => {
                    init = child
                        .child_by_field_name("initializer")
                        .map(|n| self.lower_stmt(n, arena));
                    cond = child
                        .child_by_field_name("condition")
                        .map(|n| self.lower_expr(n));
                    post = child
                        .child_by_field_name("update")
                        .map(|n| self.lower_stmt(n, arena));
                }
                "range_clause" => {
                    // `for k, v := range expr` lowers the clause into an
                    // assignment so definitions and the range expression are
                    // tracked like any other assignment.
                    let lhs = child
                        .child_by_field_name("left")
                        .map(|n| self.lower_expr_list(n))
                        .unwrap_or_default();
                    let rhs = child
                        .child_by_field_name("right")
                        .map(|n| vec![self.lower_expr(n)])
                        .unwrap_or_default();
                    let define = self.node_text(child).contains(":=");
                    let clause_span = self.span(child);
                    init = Some(self.push_stmt(
                        arena,
                        Stmt::Assign(AssignStmt {
                            lhs,
                            rhs,
                            define,
                            span: clause_span,
                        }),
                    ));
                }
                "block" => {
                    body_ids = self.lower_block(child, arena);
                }
                _ => {
                    // `for cond { ... }` - a bare condition expression.
                    cond = Some(self.lower_expr(child));
                }
            }
        }

        self.push_stmt(
            arena,
            Stmt::For(ForStmt {
                init,
                cond,
                post,
                body: body_ids,
                span,
            }),
        )
    }

    fn lower_switch(&mut self, node: Node, arena: &mut Vec<Stmt>, span: Span) -> StmtId {
        let init = node
            .child_by_field_name("initializer")
            .map(|n| self.lower_stmt(n, arena));
        let value = node
            .child_by_field_name("value")
            .map(|n| self.lower_expr(n));

        let mut cases = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "expression_case" | "default_case" => {
                    let exprs = child
                        .child_by_field_name("value")
                        .map(|n| self.lower_expr_list(n))
                        .unwrap_or_default();
                    let mut body = Vec::new();
                    let mut inner = child.walk();
                    for stmt in child.named_children(&mut inner) {
                        // Skip the case expression list itself.
                        if Some(stmt) == child.child_by_field_name("value") {
                            continue;
                        }
                        if stmt.kind() == "statement_list" {
                            let mut stmts = stmt.walk();
                            for s in stmt.named_children(&mut stmts) {
                                body.push(self.lower_stmt(s, arena));
                            }
                        } else {
                            body.push(self.lower_stmt(stmt, arena));
                        }
                    }
                    cases.push(SwitchCase { exprs, body });
                }
                _ => {}
            }
        }

        self.push_stmt(
            arena,
            Stmt::Switch(SwitchStmt {
                init,
                value,
                cases,
                span,
            }),
        )
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn lower_expr_list(&mut self, node: Node) -> Vec<Expr> {
        if node.kind() == "expression_list" {
            let mut out = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                out.push(self.lower_expr(child));
            }
            out
        } else {
            vec![self.lower_expr(node)]
        }
    }

    fn lower_expr(&mut self, node: Node) -> Expr {
        let span = self.span(node);
        match node.kind() {
            "identifier" | "field_identifier" | "package_identifier" | "type_identifier" => {
                Expr::Ident(self.ident(node))
            }
            "call_expression" => {
                let fun = node
                    .child_by_field_name("function")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                let args = node
                    .child_by_field_name("arguments")
                    .map(|a| {
                        let mut out = Vec::new();
                        let mut cursor = a.walk();
                        for arg in a.named_children(&mut cursor) {
                            out.push(self.lower_expr(arg));
                        }
                        out
                    })
                    .unwrap_or_default();
                Expr::Call(Box::new(CallExpr { fun, args, span }))
            }
            "selector_expression" => {
                let x = node
                    .child_by_field_name("operand")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                let sel = match node.child_by_field_name("field") {
                    Some(f) => self.ident(f),
                    None => return Expr::Other(vec![x], span),
                };
                Expr::Selector(Box::new(SelectorExpr { x, sel, span }))
            }
            "parenthesized_expression" => {
                let inner = node
                    .named_child(0)
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                Expr::Paren(Box::new(inner), span)
            }
            "unary_expression" => {
                let operand = node
                    .child_by_field_name("operand")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                let op = node
                    .child_by_field_name("operator")
                    .map(|n| self.node_text(n))
                    .unwrap_or("");
                if op == "*" {
                    Expr::Star(Box::new(operand), span)
                } else {
                    Expr::Other(vec![operand], span)
                }
            }
            "index_expression" => {
                let x = node
                    .child_by_field_name("operand")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                let index = node
                    .child_by_field_name("index")
                    .map(|n| self.lower_expr(n))
                    .unwrap_or_else(|| Expr::Other(Vec::new(), span.clone()));
                Expr::Index(Box::new(IndexExpr { x, index, span }))
            }
            "func_literal" => {
                let idx = self.lower_func(node);
                Expr::FuncLit(idx, span)
            }
            "composite_literal" => {
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.lower_type(t))
                    .unwrap_or_else(|| TypeRef::Other(String::new()));
                let mut elems = Vec::new();
                if let Some(body) = node.child_by_field_name("body") {
                    let mut cursor = body.walk();
                    for elem in body.named_children(&mut cursor) {
                        match elem.kind() {
                            "literal_element" => {
                                if let Some(value) = elem.named_child(0) {
                                    elems.push(self.lower_expr(value));
                                }
                            }
                            "keyed_element" => {
                                let count = elem.named_child_count();
                                if count > 0 {
                                    if let Some(value) = elem.named_child(count - 1) {
                                        elems.push(self.lower_expr(value));
                                    }
                                }
                            }
                            _ => elems.push(self.lower_expr(elem)),
                        }
                    }
                }
                Expr::Composite(Box::new(CompositeLit { ty, elems, span }))
            }
            // Literals carry no flow information and have no children worth
            // keeping.
            "interpreted_string_literal" | "raw_string_literal" | "int_literal"
            | "float_literal" | "rune_literal" | "nil" | "true" | "false" | "iota" => {
                Expr::Other(Vec::new(), span)
            }
            _ => {
                // Unknown shape: keep lowered children so nested calls stay
                // discoverable.
                let mut children = Vec::new();
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    children.push(self.lower_expr(child));
                }
                Expr::Other(children, span)
            }
        }
    }
}
