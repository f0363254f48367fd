//! Per-package read-side facade.
//!
//! Aggregates the lowered files of one package into the lookup tables the
//! call-graph builder and the error-typedness test need: functions by name,
//! methods by `(receiver type, name)`, declared types with their embedded
//! fields, and the `Error() string` method-set check.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::go::ast::{FuncIdx, GoFile, TypeDecl, TypeRef};

/// A preloaded package: files plus aggregated lookup tables.
#[derive(Debug)]
pub struct PkgInfo {
    /// Canonical package path.
    pub path: String,
    pub files: Vec<Arc<GoFile>>,
    funcs_by_name: FxHashMap<String, (usize, FuncIdx)>,
    methods: FxHashMap<(String, String), (usize, FuncIdx)>,
    types: FxHashMap<String, TypeDecl>,
}

impl PkgInfo {
    pub fn from_files(path: impl Into<String>, files: Vec<Arc<GoFile>>) -> Self {
        let mut funcs_by_name = FxHashMap::default();
        let mut methods = FxHashMap::default();
        let mut types = FxHashMap::default();

        for (file_idx, file) in files.iter().enumerate() {
            for &idx in &file.decls {
                let func = file.func(idx);
                match &func.receiver {
                    Some(recv) => {
                        if let Some(base) = recv.ty.base_name() {
                            methods
                                .entry((base.to_string(), func.name.clone()))
                                .or_insert((file_idx, idx));
                        }
                    }
                    None => {
                        funcs_by_name
                            .entry(func.name.clone())
                            .or_insert((file_idx, idx));
                    }
                }
            }
            for decl in &file.types {
                types.entry(decl.name.clone()).or_insert_with(|| decl.clone());
            }
        }

        Self {
            path: path.into(),
            files,
            funcs_by_name,
            methods,
            types,
        }
    }

    /// A top-level function declaration by name.
    pub fn function(&self, name: &str) -> Option<(&Arc<GoFile>, FuncIdx)> {
        let &(file_idx, idx) = self.funcs_by_name.get(name)?;
        Some((&self.files[file_idx], idx))
    }

    /// A method by receiver base type and name, chasing embedded types
    /// (promotion) when there is no direct declaration.
    pub fn find_method(&self, recv: &str, name: &str) -> Option<(&Arc<GoFile>, FuncIdx)> {
        let mut visited = FxHashSet::default();
        self.find_method_inner(recv, name, &mut visited)
    }

    fn find_method_inner<'a>(
        &'a self,
        recv: &str,
        name: &str,
        visited: &mut FxHashSet<String>,
    ) -> Option<(&'a Arc<GoFile>, FuncIdx)> {
        if !visited.insert(recv.to_string()) {
            return None;
        }
        if let Some(&(file_idx, idx)) = self.methods.get(&(recv.to_string(), name.to_string())) {
            return Some((&self.files[file_idx], idx));
        }
        let decl = self.types.get(recv)?;
        decl.embedded
            .iter()
            .find_map(|embedded| self.find_method_inner(embedded, name, visited))
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    /// The declared type of a struct field, chasing embedded types when the
    /// field is promoted.
    pub fn field_type(&self, type_name: &str, field: &str) -> Option<&TypeRef> {
        let mut visited = FxHashSet::default();
        self.field_type_inner(type_name, field, &mut visited)
    }

    fn field_type_inner<'a>(
        &'a self,
        type_name: &str,
        field: &str,
        visited: &mut FxHashSet<String>,
    ) -> Option<&'a TypeRef> {
        if !visited.insert(type_name.to_string()) {
            return None;
        }
        let decl = self.types.get(type_name)?;
        if let Some((_, ty)) = decl.fields.iter().find(|(name, _)| name == field) {
            return Some(ty);
        }
        decl.embedded
            .iter()
            .find_map(|embedded| self.field_type_inner(embedded, field, visited))
    }

    /// The error-typedness test for a type reference: the builtin `error`
    /// interface, or a named type (pointers peeled) whose method set
    /// contains `Error() string`. Unresolvable references are not errors.
    pub fn type_ref_is_error(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Named(name) => self.type_implements_error(name),
            TypeRef::Pointer(inner) => self.type_ref_is_error(inner),
            TypeRef::Qualified { .. } | TypeRef::Other(_) => false,
        }
    }

    /// Whether a declared named type satisfies `interface { Error() string }`,
    /// directly or through embedding.
    pub fn type_implements_error(&self, name: &str) -> bool {
        let mut visited = FxHashSet::default();
        self.type_implements_error_inner(name, &mut visited)
    }

    fn type_implements_error_inner(&self, name: &str, visited: &mut FxHashSet<String>) -> bool {
        if name == "error" {
            return true;
        }
        if !visited.insert(name.to_string()) {
            return false;
        }
        if let Some((file, idx)) = {
            let key = (name.to_string(), "Error".to_string());
            self.methods
                .get(&key)
                .map(|&(file_idx, idx)| (&self.files[file_idx], idx))
        } {
            let func = file.func(idx);
            if func.params.is_empty() && returns_single_string(&func.results) {
                return true;
            }
        }
        let Some(decl) = self.types.get(name) else {
            return false;
        };
        if decl.interface_methods.iter().any(|m| {
            m.name == "Error"
                && m.params == 0
                && m.results.len() == 1
                && matches!(&m.results[0], TypeRef::Named(n) if n == "string")
        }) {
            return true;
        }
        decl.embedded
            .iter()
            .any(|embedded| self.type_implements_error_inner(embedded, visited))
    }
}

fn returns_single_string(results: &[crate::go::ast::Field]) -> bool {
    results.len() == 1 && matches!(&results[0].ty, TypeRef::Named(n) if n == "string")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::go::parser::parse_source;

    fn pkg_of(source: &str) -> PkgInfo {
        let file = Arc::new(parse_source("main.go", source).unwrap());
        PkgInfo::from_files("main", vec![file])
    }

    #[test]
    fn finds_functions_and_methods() {
        let pkg = pkg_of(
            r#"
package main

type Store struct{}

func (s *Store) Get() error { return nil }

func Open() error { return nil }
"#,
        );
        assert!(pkg.function("Open").is_some());
        assert!(pkg.function("Get").is_none());
        assert!(pkg.find_method("Store", "Get").is_some());
        assert!(pkg.find_method("Store", "Put").is_none());
    }

    #[test]
    fn method_promotion_through_embedding() {
        let pkg = pkg_of(
            r#"
package main

type Foo struct{}

func (f Foo) Method() error { return nil }

type Bar struct {
    Foo
}
"#,
        );
        assert!(pkg.find_method("Bar", "Method").is_some());
    }

    #[test]
    fn field_types_resolve_through_chains() {
        let pkg = pkg_of(
            r#"
package main

type Foo struct{}

type Bar struct {
    Foo Foo
}

type Baz struct {
    Bar Bar
}

type Embedding struct {
    Bar
}
"#,
        );
        assert_eq!(
            pkg.field_type("Baz", "Bar"),
            Some(&TypeRef::Named("Bar".to_string()))
        );
        assert_eq!(
            pkg.field_type("Bar", "Foo"),
            Some(&TypeRef::Named("Foo".to_string()))
        );
        // Embedded fields are addressable under the base type name and
        // their own fields are promoted.
        assert_eq!(
            pkg.field_type("Embedding", "Bar"),
            Some(&TypeRef::Named("Bar".to_string()))
        );
        assert_eq!(
            pkg.field_type("Embedding", "Foo"),
            Some(&TypeRef::Named("Foo".to_string()))
        );
        assert!(pkg.field_type("Baz", "Missing").is_none());
    }

    #[test]
    fn error_method_set() {
        let pkg = pkg_of(
            r#"
package main

type codeError struct{ code int }

func (e *codeError) Error() string { return "boom" }

type wrapped struct {
    codeError
}

type plain struct{}
"#,
        );
        assert!(pkg.type_implements_error("codeError"));
        assert!(pkg.type_implements_error("wrapped"));
        assert!(!pkg.type_implements_error("plain"));
        assert!(pkg.type_implements_error("error"));
    }
}
