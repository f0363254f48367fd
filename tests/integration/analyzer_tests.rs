//! End-to-end analyzer scenarios over in-memory sources.

use stacklint::{analyze_sources, Config, Diagnostic};

fn run(source: &str) -> Vec<Diagnostic> {
    run_with(source, Config::default())
}

fn run_with(source: &str, config: Config) -> Vec<Diagnostic> {
    let report = analyze_sources(&[("main.go", source)], config).unwrap();
    assert!(report.error.is_none(), "pass error: {:?}", report.error);
    report.diagnostics
}

fn lines(diagnostics: &[Diagnostic]) -> Vec<usize> {
    diagnostics.iter().map(|d| d.position.line).collect()
}

#[test]
fn wrapping_an_already_wrapped_expression_is_reported() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func doubleWrap() error {
	return errors.Wrap(errors.WithStack(nil), "wrapped")
}

func singleWrap() error {
	return errors.Wrap(nil, "wrapped")
}
"#;
    let diagnostics = run(source);
    assert_eq!(lines(&diagnostics), vec![8]);

    let diag = &diagnostics[0];
    assert_eq!(diag.position.column, 9);
    assert_eq!(
        diag.message,
        "Wrap call unnecessarily wraps error with stacktrace. \
         Replace with WithMessage() or WithMessagef()"
    );
    // The span starts exactly at the offending call expression.
    let expected_start = source.find(r#"errors.Wrap(errors"#).unwrap();
    assert_eq!(diag.start_byte, expected_start);

    assert_eq!(diag.fixes.len(), 1);
    assert_eq!(
        diag.fixes[0].edits[0].new_text,
        r#"errors.WithMessage(errors.WithStack(nil), "wrapped")"#
    );
}

#[test]
fn taint_flows_through_reassignment() {
    let source = r#"package main

import (
	stderrors "errors"

	"github.com/pkg/errors"
)

func reassigned() error {
	err := stderrors.New("e")
	err = errors.Wrap(err, "x")
	return errors.Wrap(err, "x")
}
"#;
    // Only the second wrap sees an already-wrapped value.
    assert_eq!(lines(&run(source)), vec![12]);
}

#[test]
fn clean_sources_do_not_taint() {
    let source = r#"package main

import (
	stderrors "errors"

	"github.com/pkg/errors"
)

func cleanSource() error {
	err := stderrors.New("e")
	return errors.Wrap(err, "x")
}
"#;
    assert!(run(source).is_empty());
}

const CHAIN: &str = r#"package main

import (
	"github.com/pkg/errors"
)

func a() error { return b() }

func b() error { return c() }

func c() error { return d() }

func d() error { return e() }

func e() error {
	return errors.Wrap(errors.WithStack(nil), "wrapped")
}
"#;

#[test]
fn deep_chain_reports_at_the_wrap_site() {
    let config = Config {
        max_depth: 5,
        ..Config::default()
    };
    assert_eq!(lines(&run_with(CHAIN, config)), vec![16]);
}

#[test]
fn depth_bound_keeps_the_direct_report() {
    // Propagation stops well before `a`, but `e` wraps directly, so the
    // report inside `e` still fires.
    let config = Config {
        max_depth: 2,
        ..Config::default()
    };
    assert_eq!(lines(&run_with(CHAIN, config)), vec![16]);
}

#[test]
fn unbounded_depth_behaves_like_a_large_bound() {
    let config = Config {
        max_depth: 0,
        ..Config::default()
    };
    assert_eq!(lines(&run_with(CHAIN, config)), vec![16]);
}

#[test]
fn taint_survives_multi_value_returns() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func source() (int, int, error) {
	return 0, 0, errors.WithStack(nil)
}

func consume() error {
	_, _, err := source()
	return errors.Wrap(err, "x")
}
"#;
    assert_eq!(lines(&run(source)), vec![13]);
}

#[test]
fn shadowed_variables_have_independent_taint() {
    let source = r#"package main

import (
	stderrors "errors"

	"github.com/pkg/errors"
)

func shadowed() error {
	err := errors.WithStack(nil)
	if true {
		err := stderrors.New("inner")
		_ = errors.Wrap(err, "inner")
	}
	return errors.Wrap(err, "outer")
}
"#;
    // The inner `err` is a distinct object; only the outer one is tainted.
    assert_eq!(lines(&run(source)), vec![15]);
}

#[test]
fn method_taint_flows_through_embedding() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

type Foo struct{}

func (f Foo) Method() error {
	return errors.WithStack(nil)
}

type Bar struct {
	Foo
}

func wrapped() error {
	b := Bar{}
	return errors.Wrap(b.Method(), "wrapped")
}
"#;
    assert_eq!(lines(&run(source)), vec![19]);
}

#[test]
fn taint_flows_through_named_field_chains() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

type Foo struct{}

func (f Foo) Method() error {
	return errors.WithStack(nil)
}

type Bar struct {
	Foo Foo
}

func f() error {
	b := Bar{}
	err := b.Foo.Method()
	return errors.Wrap(err, "x")
}
"#;
    // `b.Foo` is a named field, not an embedded type; the receiver chain
    // still types `err` and the wrap is reported.
    assert_eq!(lines(&run(source)), vec![20]);
}

#[test]
fn function_literals_are_analyzed_like_declarations() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func viaLiteral() error {
	f := func() error {
		return errors.WithStack(nil)
	}
	return errors.Wrap(f(), "wrapped")
}
"#;
    assert_eq!(lines(&run(source)), vec![11]);
}

#[test]
fn one_diagnostic_per_call_even_with_multiple_tainted_arguments() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func multi() error {
	return errors.Wrapf(errors.WithStack(nil), "ctx %v", errors.WithStack(nil))
}
"#;
    let diagnostics = run(source);
    assert_eq!(lines(&diagnostics), vec![8]);
    // Format-style call: the fix swaps in the format alternative.
    assert_eq!(diagnostics[0].fixes.len(), 1);
    assert!(diagnostics[0].fixes[0].edits[0]
        .new_text
        .starts_with("errors.WithMessagef("));
}

#[test]
fn single_argument_wrappers_suggest_dropping_the_wrapper() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func stacked() error {
	return errors.WithStack(errors.WithStack(nil))
}
"#;
    let diagnostics = run(source);
    assert_eq!(lines(&diagnostics), vec![8]);
    assert_eq!(diagnostics[0].fixes.len(), 1);
    assert_eq!(
        diagnostics[0].fixes[0].edits[0].new_text,
        "errors.WithStack(nil)"
    );
}

#[test]
fn clean_functions_from_config_silence_reports() {
    let yaml = r#"
wrapperFunctions:
  - pkg: github.com/pkg/errors
    names: [Wrap, WithStack]
    replaceWith: WithMessage
cleanFunctions:
  - pkg: github.com/pkg/errors
    names: [WithStack]
"#;
    // WithStack is listed in both sets; clean wins, so wrapping its result
    // is not a violation.
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func f() error {
	return errors.Wrap(errors.WithStack(nil), "wrapped")
}
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert!(run_with(source, config).is_empty());
}

#[test]
fn diagnostics_follow_declaration_order() {
    let source = r#"package main

import (
	"github.com/pkg/errors"
)

func second() error {
	return errors.Wrap(errors.WithStack(nil), "b")
}

func first() error {
	return errors.Wrap(errors.WithStack(nil), "a")
}
"#;
    assert_eq!(lines(&run(source)), vec![8, 12]);
}
