//! The machine-readable report: one entry per checked document, errors
//! grouped under the document they belong to, in deterministic order.

use serde::Serialize;
use serde_json::Value;

use crate::diagnostics::{KeylintDiagnostic, OffendingLocation, ReferencedKey};
use crate::reporter::CheckResult;

#[derive(Debug, Serialize)]
pub struct Report {
    pub documents: Vec<DocumentReport>,
    /// Diagnostics not attached to any document (provider failures).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub run_errors: Vec<ReportError>,
}

#[derive(Debug, Serialize)]
pub struct DocumentReport {
    pub document_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    pub errors: Vec<ReportError>,
}

#[derive(Debug, Serialize)]
pub struct ReportError {
    pub kind: &'static str,
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offending_locations: Option<Vec<OffendingLocation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced: Option<ReferencedKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Vec<Value>>,
}

impl ReportError {
    fn from_diagnostic(diag: &KeylintDiagnostic) -> Self {
        let (offending_locations, referenced) = match diag {
            KeylintDiagnostic::Uniqueness {
                offending_locations,
                ..
            } => (Some(offending_locations.clone()), None),
            KeylintDiagnostic::UnresolvedReference { referenced, .. }
            | KeylintDiagnostic::DanglingForeignKey { referenced, .. }
            | KeylintDiagnostic::DanglingJoinKey { referenced, .. } => {
                (None, Some(referenced.clone()))
            }
            _ => (None, None),
        };
        let tuple = referenced.as_ref().and_then(|r| r.tuple.clone());
        Self {
            kind: diag.kind(),
            path: diag.path().to_string(),
            message: diag.to_string(),
            offending_locations,
            referenced,
            tuple,
        }
    }
}

impl Report {
    /// Build a report from a finished check.
    ///
    /// Every checked document appears exactly once, even when clean, so a
    /// consumer can distinguish "valid" from "never validated". Ordering is
    /// the deterministic order of `result` (document URI, then in-document
    /// location).
    pub fn from_result(result: &CheckResult) -> Self {
        let mut documents: Vec<DocumentReport> = result
            .checked
            .iter()
            .map(|doc| DocumentReport {
                document_uri: doc.uri.clone(),
                schema_id: doc.schema_id.clone(),
                errors: Vec::new(),
            })
            .collect();
        let mut run_errors = Vec::new();

        for diag in &result.errors {
            let entry = ReportError::from_diagnostic(diag);
            match documents
                .iter_mut()
                .find(|d| d.document_uri == diag.uri())
            {
                Some(doc) => doc.errors.push(entry),
                None => run_errors.push(entry),
            }
        }

        Self {
            documents,
            run_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CheckedDocument;

    #[test]
    fn clean_documents_are_listed() {
        let result = CheckResult {
            errors: vec![],
            checked: vec![CheckedDocument {
                uri: "a.json".into(),
                schema_id: Some("S1/1.0".into()),
                tuples_gathered: 2,
            }],
        };
        let report = Report::from_result(&result);
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].errors.is_empty());
        assert!(report.run_errors.is_empty());
    }

    #[test]
    fn errors_attach_to_their_document() {
        let result = CheckResult {
            errors: vec![KeylintDiagnostic::MissingMember {
                uri: "a.json".into(),
                schema_id: "S1/1.0".into(),
                path: "/items/0".into(),
                member: "other_id".into(),
            }],
            checked: vec![CheckedDocument {
                uri: "a.json".into(),
                schema_id: Some("S1/1.0".into()),
                tuples_gathered: 0,
            }],
        };
        let report = Report::from_result(&result);
        assert_eq!(report.documents[0].errors.len(), 1);
        assert_eq!(report.documents[0].errors[0].kind, "MissingMember");
        assert_eq!(report.documents[0].errors[0].path, "/items/0");
    }

    #[test]
    fn provider_errors_land_in_run_errors() {
        let result = CheckResult {
            errors: vec![KeylintDiagnostic::ProviderFetch {
                url: "https://keys.example.com/S1".into(),
                schema_id: "S1/1.0".into(),
                message: "HTTP 500".into(),
                served_from_cache: false,
            }],
            checked: vec![],
        };
        let report = Report::from_result(&result);
        assert!(report.documents.is_empty());
        assert_eq!(report.run_errors.len(), 1);
        assert_eq!(report.run_errors[0].kind, "ProviderFetchError");
    }
}
