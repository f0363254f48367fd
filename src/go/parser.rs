//! Go source parsing.
//!
//! Thin wrapper around `tree-sitter-go` that parses a file, lowers the tree
//! into the typed AST and runs object resolution. Parsers are created per
//! call; tree-sitter parsers are cheap compared to the walk that follows.

use once_cell::sync::Lazy;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Parser, Query, QueryCursor};

use crate::error::{Result, StacklintError};
use crate::go::ast::{GoFile, Lowerer};
use crate::go::resolver::Resolver;

/// Query matching every function-ish node. Used to skip files that cannot
/// contribute functions before paying for lowering.
static FUNCTION_QUERY: Lazy<Query> = Lazy::new(|| {
    Query::new(
        &tree_sitter_go::LANGUAGE.into(),
        r#"
        [
          (function_declaration)
          (method_declaration)
          (func_literal)
        ] @function
        "#,
    )
    .expect("function query is valid")
});

fn new_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| StacklintError::TreeSitter(e.to_string()))?;
    Ok(parser)
}

/// Parse and lower one Go source file given in memory.
pub fn parse_source(file: &str, source: &str) -> Result<GoFile> {
    let mut parser = new_parser()?;
    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| StacklintError::Parse {
            file: file.to_string(),
            message: "failed to parse file".to_string(),
        })?;

    let mut lowered = Lowerer::lower(file, source, &tree);
    lowered.resolution = Resolver::resolve(&lowered);
    Ok(lowered)
}

/// Parse and lower a Go file from disk.
pub fn parse_file(path: &std::path::Path) -> Result<GoFile> {
    let source =
        std::fs::read_to_string(path).map_err(|e| StacklintError::io_with_path(e, path))?;
    parse_source(&path.to_string_lossy(), &source)
}

/// True if the source contains at least one function declaration, method or
/// literal.
pub fn contains_functions(source: &str) -> Result<bool> {
    let mut parser = new_parser()?;
    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| StacklintError::Parse {
            file: "<source>".to_string(),
            message: "failed to parse file".to_string(),
        })?;
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&FUNCTION_QUERY, tree.root_node(), source.as_bytes());
    Ok(matches.next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::go::ast::{Expr, Stmt};

    const SAMPLE: &str = r#"
package main

import (
    "fmt"
    pkgerrors "github.com/pkg/errors"
)

func run(count int) error {
    err := fetch()
    if err != nil {
        return pkgerrors.Wrap(err, "run")
    }
    return fmt.Errorf("count %d", count)
}

func fetch() error {
    return nil
}
"#;

    #[test]
    fn lowers_package_and_imports() {
        let file = parse_source("main.go", SAMPLE).unwrap();
        assert_eq!(file.package_name, "main");
        assert_eq!(file.imports.len(), 2);
        assert_eq!(file.import_path("fmt"), Some("fmt"));
        assert_eq!(file.import_path("pkgerrors"), Some("github.com/pkg/errors"));
    }

    #[test]
    fn lowers_function_declarations() {
        let file = parse_source("main.go", SAMPLE).unwrap();
        assert_eq!(file.decls.len(), 2);
        let run = file.func(file.decls[0]);
        assert_eq!(run.name, "run");
        assert_eq!(run.params.len(), 1);
        assert_eq!(run.results.len(), 1);
        assert!(run.body.is_some());
    }

    #[test]
    fn lowers_if_and_calls() {
        let file = parse_source("main.go", SAMPLE).unwrap();
        let run = file.func(file.decls[0]);
        let body = run.body.as_ref().unwrap();
        assert!(matches!(run.stmt(body[0]), Stmt::Assign(a) if a.define));
        assert!(matches!(run.stmt(body[1]), Stmt::If(_)));
        match run.stmt(body[2]) {
            Stmt::Return(ret) => match &ret.results[0] {
                Expr::Call(call) => assert!(matches!(&call.fun, Expr::Selector(_))),
                other => panic!("expected call, got {other:?}"),
            },
            other => panic!("expected return, got {other:?}"),
        }
    }

    #[test]
    fn resolves_variable_uses_to_definitions() {
        let file = parse_source("main.go", SAMPLE).unwrap();
        let run = file.func(file.decls[0]);
        let body = run.body.as_ref().unwrap();
        let def_pos = match run.stmt(body[0]) {
            Stmt::Assign(a) => match &a.lhs[0] {
                Expr::Ident(id) => id.span.pos.clone(),
                other => panic!("expected ident, got {other:?}"),
            },
            other => panic!("expected assign, got {other:?}"),
        };
        // The `err` inside the wrap call resolves back to the definition.
        let wrap_arg_pos = match run.stmt(body[1]) {
            Stmt::If(stmt) => match run.stmt(stmt.then_body[0]) {
                Stmt::Return(ret) => match &ret.results[0] {
                    Expr::Call(call) => call.args[0].span().pos.clone(),
                    other => panic!("expected call, got {other:?}"),
                },
                other => panic!("expected return, got {other:?}"),
            },
            other => panic!("expected if, got {other:?}"),
        };
        let (_, obj) = file.resolution.object_at(&wrap_arg_pos).unwrap();
        assert_eq!(obj.def_pos, def_pos);
    }

    #[test]
    fn function_query_detects_functions() {
        assert!(contains_functions(SAMPLE).unwrap());
        assert!(!contains_functions("package empty\n\nvar X = 1\n").unwrap());
    }
}
