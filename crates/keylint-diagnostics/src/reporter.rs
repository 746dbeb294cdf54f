use core::time::Duration;

use crate::diagnostics::KeylintDiagnostic;

/// A document that went through the pipeline and the schema it paired with.
#[derive(Debug, Clone)]
pub struct CheckedDocument {
    pub uri: String,
    /// `None` when pairing failed (an `UnknownSchema` diagnostic exists).
    pub schema_id: Option<String>,
    /// Key tuples gathered from this document during phase 1.
    pub tuples_gathered: usize,
}

/// Result of a full validation run.
pub struct CheckResult {
    pub errors: Vec<KeylintDiagnostic>,
    pub checked: Vec<CheckedDocument>,
}

impl CheckResult {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(KeylintDiagnostic::is_error)
    }

    pub fn documents_checked(&self) -> usize {
        self.checked.len()
    }
}

/// Format a verbose line for a checked document.
pub fn format_checked_verbose(doc: &CheckedDocument) -> String {
    let schema = doc.schema_id.as_deref().unwrap_or("<unpaired>");
    format!(
        "  {} ({schema}) [{} tuples]",
        doc.uri, doc.tuples_gathered
    )
}

/// Trait for formatting and outputting check results.
pub trait Reporter {
    /// Called after all checks complete with the full result and elapsed time.
    fn report(&mut self, result: CheckResult, elapsed: Duration);

    /// Called each time a document finishes phase 1 (for streaming progress).
    fn on_document_checked(&mut self, doc: &CheckedDocument);
}
