use core::time::Duration;

use keylint_diagnostics::reporter::{CheckResult, CheckedDocument, Reporter, format_checked_verbose};

/// Text reporter: plain one-line-per-error output suitable for CI pipelines.
pub struct TextReporter {
    pub verbose: bool,
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "error" } else { "errors" }
}

fn print_summary(n: usize, error_count: usize, ms: u128) {
    if error_count > 0 {
        let label = plural(error_count);
        eprintln!("Checked {n} documents in {ms}ms. {error_count} {label} found.");
    } else {
        eprintln!("Checked {n} documents in {ms}ms. No errors.");
    }
}

impl Reporter for TextReporter {
    fn report(&mut self, result: CheckResult, elapsed: Duration) {
        for error in &result.errors {
            if error.is_error() {
                eprintln!("error: {error}");
            } else {
                eprintln!("warning: {error}");
            }
        }

        let n = result.documents_checked();
        let error_count = result.errors.iter().filter(|e| e.is_error()).count();
        print_summary(n, error_count, elapsed.as_millis());
    }

    fn on_document_checked(&mut self, doc: &CheckedDocument) {
        if self.verbose {
            eprintln!("{}", format_checked_verbose(doc));
        }
    }
}
