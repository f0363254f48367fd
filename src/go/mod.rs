//! Go front end: parsing, typed AST, package facade and object resolution.

pub mod ast;
pub mod package;
pub mod parser;
pub mod resolver;

pub use ast::{Expr, FuncIdx, FuncNode, GoFile, Position, Span, Stmt, StmtId, TypeRef};
pub use package::PkgInfo;
pub use parser::{parse_file, parse_source};
pub use resolver::{CalleeRef, Object, ObjectId, ObjectKind, Resolution, VarInit};
