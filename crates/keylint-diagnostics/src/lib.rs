#![doc = include_str!("../README.md")]
#![allow(unused_assignments)] // thiserror/miette derive macros trigger false positives

pub mod diagnostics;
pub mod report;
pub mod reporter;

pub use diagnostics::{KeylintDiagnostic, OffendingLocation, ReferencedKey};
pub use report::{DocumentReport, Report, ReportError};
pub use reporter::{CheckResult, CheckedDocument, Reporter};
