//! Diagnostic types and the reporter sink.
//!
//! A diagnostic pins the byte span of the offending call expression plus a
//! human-readable position; suggested fixes are byte-span text edits taken
//! straight from the file set, never re-parsed. The reporter is a thin trait
//! so drivers can forward diagnostics wherever they like; the collecting
//! implementation is what the built-in driver and the tests use.

use serde::Serialize;

use crate::go::ast::Position;

/// A single byte-span replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub start_byte: usize,
    pub end_byte: usize,
    pub new_text: String,
}

/// A suggested fix: a message plus one or more edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedFix {
    pub message: String,
    pub edits: Vec<TextEdit>,
}

/// One reported violation.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Position of the offending call expression's first byte.
    pub position: Position,
    pub start_byte: usize,
    pub end_byte: usize,
    pub message: String,
    /// Possibly empty; fixes are proposals, application is the driver's job.
    pub fixes: Vec<SuggestedFix>,
}

/// Diagnostic sink.
pub trait Reporter {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics in emission order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub diagnostics: Vec<Diagnostic>,
}

impl Reporter for CollectingReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Render diagnostics in a `path:line:col: message` text form.
pub fn render_text(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diag in diagnostics {
        out.push_str(&format!("{}: {}\n", diag.position, diag.message));
        for fix in &diag.fixes {
            out.push_str(&format!("  fix: {}\n", fix.message));
            for edit in &fix.edits {
                let preview: String = edit.new_text.lines().collect::<Vec<_>>().join(" | ");
                out.push_str(&format!(
                    "    [{}..{}) -> {}\n",
                    edit.start_byte, edit.end_byte, preview
                ));
            }
        }
    }
    out
}
