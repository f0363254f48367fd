//! Fixture runs over the Go packages under testdata/.

use std::path::PathBuf;

use stacklint::{analyze_dir, AnalysisReport, Config};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

fn run_fixture(name: &str) -> AnalysisReport {
    let dir = fixture(name);
    let config_path = dir.join(".stacklint.yaml");
    let config = if config_path.is_file() {
        Config::from_yaml(&std::fs::read_to_string(&config_path).unwrap()).unwrap()
    } else {
        Config::default()
    };
    let report = analyze_dir(&dir, config).unwrap();
    assert!(report.error.is_none(), "pass error: {:?}", report.error);
    report
}

#[test]
fn double_wrap_package() {
    let report = run_fixture("double_wrap");
    let lines: Vec<usize> = report.diagnostics.iter().map(|d| d.position.line).collect();
    assert_eq!(lines, vec![18, 22, 26, 30]);
    for diag in &report.diagnostics {
        assert!(diag
            .message
            .contains("call unnecessarily wraps error with stacktrace"));
        assert_eq!(diag.fixes.len(), 1, "all four sites are fixable");
    }
}

#[test]
fn cross_package_resolution_through_the_index() {
    let report = run_fixture("external_pkg");
    let lines: Vec<usize> = report.diagnostics.iter().map(|d| d.position.line).collect();
    // helper.Fetch wraps internally; helper.Plain does not.
    assert_eq!(lines, vec![10]);
    assert!(report.diagnostics[0].message.starts_with("Wrap call"));
}

#[test]
fn nested_selector_chains_type_the_receiver() {
    let report = run_fixture("nested_selector");
    let lines: Vec<usize> = report.diagnostics.iter().map(|d| d.position.line).collect();
    // `err` comes from `baz.Bar.Foo.Method()`; only the re-wrap of the
    // already-wrapped value is a violation.
    assert_eq!(lines, vec![32]);
    assert!(report.diagnostics[0].message.starts_with("Wrap call"));
}

#[test]
fn custom_wrapper_config() {
    let report = run_fixture("custom_config");
    assert_eq!(report.diagnostics.len(), 1);
    let diag = &report.diagnostics[0];
    assert_eq!(diag.position.line, 6);
    assert_eq!(
        diag.message,
        "Capture call unnecessarily wraps error with stacktrace. \
         Replace with Annotate() or fmt.Errorf()"
    );
    // Single-argument wrapper: drop the call, keep the argument.
    assert_eq!(diag.fixes.len(), 1);
    assert_eq!(diag.fixes[0].edits[0].new_text, "trace.Capture(nil)");
}
