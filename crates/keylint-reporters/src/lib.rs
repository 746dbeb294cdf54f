#![doc = include_str!("../README.md")]

pub mod reporters;

pub use reporters::json::JsonReporter;
pub use reporters::text::TextReporter;

use keylint_diagnostics::Reporter;

// -----------------------------------------------------------------------
// ReporterKind — CLI-parseable enum
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterKind {
    Text,
    Json,
}

impl core::str::FromStr for ReporterKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown reporter '{s}', expected: text, json")),
        }
    }
}

impl core::fmt::Display for ReporterKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Create a reporter from the kind and verbose flag.
pub fn make_reporter(kind: ReporterKind, verbose: bool) -> Box<dyn Reporter> {
    match kind {
        ReporterKind::Text => Box::new(TextReporter { verbose }),
        ReporterKind::Json => Box::new(JsonReporter),
    }
}
