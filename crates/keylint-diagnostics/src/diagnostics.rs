use serde::Serialize;
use serde_json::Value;

/// One location of a duplicated key tuple, reported alongside a
/// uniqueness violation so that every occurrence is discoverable from
/// any single error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffendingLocation {
    pub document_uri: String,
    /// JSON Pointer to the value inside the document.
    pub path: String,
}

/// The key a foreign-key or join-key record points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencedKey {
    pub schema_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The tuple that was looked up, as plain JSON values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple: Option<Vec<Value>>,
}

impl core::fmt::Display for ReferencedKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} (name: {name})", self.schema_id),
            None => f.write_str(&self.schema_id),
        }
    }
}

/// A validation diagnostic attached to a document (or to the run, for
/// provider failures).
///
/// Variants mirror the error kinds of the relational extension engine:
/// loading, schema pairing, standard JSON Schema errors forwarded from the
/// `jsonschema` crate, and the cross-document checks.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum KeylintDiagnostic {
    #[error("{uri}: failed to load schema: {message}")]
    #[diagnostic(code(keylint::schema_load))]
    SchemaLoad { uri: String, message: String },

    #[error("{uri}: failed to load instance: {message}")]
    #[diagnostic(code(keylint::instance_load))]
    InstanceLoad { uri: String, message: String },

    #[error("{uri}: no schema could be paired with this instance")]
    #[diagnostic(
        code(keylint::unknown_schema),
        help("set a schema id member (e.g. `@schema`), pass --use-schemas, or try --guess-schema")
    )]
    UnknownSchema { uri: String },

    /// Forwarded verbatim from the draft-compliant validator.
    #[error("{uri}: {message} (at {instance_path})")]
    #[diagnostic(code(keylint::standard))]
    Standard {
        uri: String,
        schema_id: String,
        /// JSON Pointer to the failing value.
        instance_path: String,
        /// JSON Schema path that triggered the error.
        schema_path: String,
        message: String,
    },

    #[error("{uri}: member `{member}` required by the key declaration is missing (at {path})")]
    #[diagnostic(code(keylint::missing_member))]
    MissingMember {
        uri: String,
        schema_id: String,
        path: String,
        member: String,
    },

    #[error("{uri}: duplicate key tuple {tuple} (at {path})")]
    #[diagnostic(code(keylint::uniqueness))]
    Uniqueness {
        uri: String,
        schema_id: String,
        path: String,
        /// Human-readable rendering of the duplicated tuple.
        tuple: String,
        /// Every location carrying this tuple, first occurrence included.
        offending_locations: Vec<OffendingLocation>,
    },

    #[error("{uri}: reference target {referenced} is not declared (at {path})")]
    #[diagnostic(code(keylint::unresolved_reference))]
    UnresolvedReference {
        uri: String,
        schema_id: String,
        path: String,
        referenced: ReferencedKey,
    },

    #[error("{uri}: foreign key {tuple} not found in {referenced} (at {path})")]
    #[diagnostic(code(keylint::dangling_foreign_key))]
    DanglingForeignKey {
        uri: String,
        schema_id: String,
        path: String,
        tuple: String,
        referenced: ReferencedKey,
    },

    #[error("{uri}: join key {tuple} not found in {referenced} (at {path})")]
    #[diagnostic(code(keylint::dangling_join_key))]
    DanglingJoinKey {
        uri: String,
        schema_id: String,
        path: String,
        tuple: String,
        referenced: ReferencedKey,
    },

    #[error("provider fetch failed for {url}: {message}")]
    #[diagnostic(code(keylint::provider_fetch))]
    ProviderFetch {
        url: String,
        schema_id: String,
        message: String,
        /// True when a cached copy of the feed was used instead; the
        /// diagnostic is then informational rather than fatal.
        served_from_cache: bool,
    },
}

impl KeylintDiagnostic {
    /// The document (or URL) this diagnostic is attached to.
    pub fn uri(&self) -> &str {
        match self {
            Self::SchemaLoad { uri, .. }
            | Self::InstanceLoad { uri, .. }
            | Self::UnknownSchema { uri }
            | Self::Standard { uri, .. }
            | Self::MissingMember { uri, .. }
            | Self::Uniqueness { uri, .. }
            | Self::UnresolvedReference { uri, .. }
            | Self::DanglingForeignKey { uri, .. }
            | Self::DanglingJoinKey { uri, .. } => uri,
            Self::ProviderFetch { url, .. } => url,
        }
    }

    /// JSON Pointer of the offending value, empty for document-level errors.
    pub fn path(&self) -> &str {
        match self {
            Self::Standard { instance_path, .. } => instance_path,
            Self::MissingMember { path, .. }
            | Self::Uniqueness { path, .. }
            | Self::UnresolvedReference { path, .. }
            | Self::DanglingForeignKey { path, .. }
            | Self::DanglingJoinKey { path, .. } => path,
            _ => "",
        }
    }

    /// Stable machine-readable kind, used in the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SchemaLoad { .. } => "SchemaLoadError",
            Self::InstanceLoad { .. } => "InstanceLoadError",
            Self::UnknownSchema { .. } => "UnknownSchema",
            Self::Standard { .. } => "StandardValidationError",
            Self::MissingMember { .. } => "MissingMember",
            Self::Uniqueness { .. } => "UniquenessViolation",
            Self::UnresolvedReference { .. } => "UnresolvedReference",
            Self::DanglingForeignKey { .. } => "DanglingForeignKey",
            Self::DanglingJoinKey { .. } => "DanglingJoinKey",
            Self::ProviderFetch { .. } => "ProviderFetchError",
        }
    }

    /// The schema id the diagnostic was produced under, if any.
    pub fn schema_id(&self) -> Option<&str> {
        match self {
            Self::Standard { schema_id, .. }
            | Self::MissingMember { schema_id, .. }
            | Self::Uniqueness { schema_id, .. }
            | Self::UnresolvedReference { schema_id, .. }
            | Self::DanglingForeignKey { schema_id, .. }
            | Self::DanglingJoinKey { schema_id, .. }
            | Self::ProviderFetch { schema_id, .. } => Some(schema_id),
            _ => None,
        }
    }

    /// Whether this diagnostic counts as a validation error.
    ///
    /// Provider failures served from a cached copy are demoted to warnings.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::ProviderFetch {
                served_from_cache: true,
                ..
            }
        )
    }
}
