use core::time::Duration;

use keylint_diagnostics::report::Report;
use keylint_diagnostics::reporter::{CheckResult, CheckedDocument, Reporter};

/// JSON reporter: emits the machine-readable report document on stdout.
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&mut self, result: CheckResult, _elapsed: Duration) {
        let report = Report::from_result(&result);
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("error: failed to serialize report: {e}"),
        }
    }

    fn on_document_checked(&mut self, _doc: &CheckedDocument) {}
}
