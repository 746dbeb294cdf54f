//! Schema traversal and extension-site discovery.
//!
//! Walks every subschema position of a schema, accumulating the path
//! template an instance value would be found at, and emits an
//! [`ExtensionSite`] for each relational keyword encountered. Keyword
//! placement maps to instance paths as follows: `properties.X` appends a
//! key step, `patternProperties` / `additionalProperties` append a
//! mapping wildcard, `items` appends a sequence wildcard (or a fixed
//! index in the legacy array form), `prefixItems[i]` appends a fixed
//! index, and composition keywords leave the path unchanged. Sites under
//! non-matching branches are harmless: their templates silently fail to
//! resolve.

use serde_json::Value;

use crate::keywords::{
    ExtensionKind, MemberSpec, ProviderDecl, parse_key_decl, parse_reference_decls,
};
use crate::path::{PathStep, PathTemplate};

/// The target of a foreign-key or join-key site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTarget {
    /// Target schema; the declaring schema when absent.
    pub schema_id: Option<String>,
    /// Target key-family name; the anonymous family when absent.
    pub refers_to: Option<String>,
}

/// A position inside a schema carrying one extension keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionSite {
    pub schema_id: String,
    pub host_path: PathTemplate,
    pub kind: ExtensionKind,
    pub members: MemberSpec,
    /// Key-family name for `unique` / `primary_key` / `index` sites.
    pub name: Option<String>,
    /// Partition the uniqueness namespace per document instead of
    /// spanning the corpus.
    pub limit_scope: bool,
    /// Present exactly on reference sites.
    pub target: Option<ReferenceTarget>,
}

/// One `primary_key` declaration with its provider settings, keyed by
/// `(schema_id, name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyDecl {
    pub schema_id: String,
    pub name: Option<String>,
    pub provider: ProviderDecl,
}

/// Everything discovery yields for one schema.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Sites in traversal order.
    pub sites: Vec<ExtensionSite>,
    pub primary_keys: Vec<PrimaryKeyDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{schema_id}: duplicate primary key declaration{}", fmt_name(.name))]
    DuplicatePrimaryKey {
        schema_id: String,
        name: Option<String>,
    },

    #[error("{schema_id}: invalid `{keyword}` at {pointer}: {message}")]
    InvalidKeyword {
        schema_id: String,
        pointer: String,
        keyword: &'static str,
        message: String,
    },
}

fn fmt_name(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" for name `{n}`"),
        None => " (anonymous)".to_string(),
    }
}

/// Discover every extension site of a schema.
///
/// # Errors
///
/// Fails on a malformed keyword value or when two `primary_key` sites
/// share the same `(schema_id, name)`.
pub fn discover(schema_id: &str, schema: &Value) -> Result<Discovery, DiscoveryError> {
    let mut walker = Walker {
        schema_id,
        discovery: Discovery::default(),
    };
    walker.walk(schema, &PathTemplate::root(), "")?;
    tracing::debug!(
        schema_id,
        sites = walker.discovery.sites.len(),
        primary_keys = walker.discovery.primary_keys.len(),
        "discovered extension sites"
    );
    Ok(walker.discovery)
}

struct Walker<'a> {
    schema_id: &'a str,
    discovery: Discovery,
}

impl Walker<'_> {
    fn walk(
        &mut self,
        schema: &Value,
        path: &PathTemplate,
        pointer: &str,
    ) -> Result<(), DiscoveryError> {
        let Some(map) = schema.as_object() else {
            // Boolean schemas carry no keywords.
            return Ok(());
        };

        self.collect_sites(map, path, pointer)?;

        // Object members.
        if let Some(Value::Object(props)) = map.get("properties") {
            for (name, child) in props {
                self.walk(
                    child,
                    &path.child(PathStep::Key(name.clone())),
                    &format!("{pointer}/properties/{name}"),
                )?;
            }
        }
        if let Some(Value::Object(props)) = map.get("patternProperties") {
            for (pattern, child) in props {
                self.walk(
                    child,
                    &path.child(PathStep::AnyKey),
                    &format!("{pointer}/patternProperties/{pattern}"),
                )?;
            }
        }
        if let Some(child @ Value::Object(_)) = map.get("additionalProperties") {
            self.walk(
                child,
                &path.child(PathStep::AnyKey),
                &format!("{pointer}/additionalProperties"),
            )?;
        }

        // Array members.
        match map.get("items") {
            Some(child @ Value::Object(_)) => {
                self.walk(
                    child,
                    &path.child(PathStep::AnyIndex),
                    &format!("{pointer}/items"),
                )?;
            }
            // Legacy positional form (pre-2020-12).
            Some(Value::Array(items)) => {
                for (i, child) in items.iter().enumerate() {
                    self.walk(
                        child,
                        &path.child(PathStep::Index(i)),
                        &format!("{pointer}/items/{i}"),
                    )?;
                }
            }
            _ => {}
        }
        if let Some(Value::Array(items)) = map.get("prefixItems") {
            for (i, child) in items.iter().enumerate() {
                self.walk(
                    child,
                    &path.child(PathStep::Index(i)),
                    &format!("{pointer}/prefixItems/{i}"),
                )?;
            }
        }
        if let Some(child @ Value::Object(_)) = map.get("additionalItems") {
            self.walk(
                child,
                &path.child(PathStep::AnyIndex),
                &format!("{pointer}/additionalItems"),
            )?;
        }

        // Composition keywords apply to the same instance position.
        for keyword in ["allOf", "anyOf", "oneOf"] {
            if let Some(Value::Array(branches)) = map.get(keyword) {
                for (i, child) in branches.iter().enumerate() {
                    self.walk(child, path, &format!("{pointer}/{keyword}/{i}"))?;
                }
            }
        }

        // Definition containers are traversed so that malformed values and
        // duplicate primary keys surface at discovery. Their literal keys
        // join the template; conforming instances do not contain them, so
        // such sites silently yield no tuples.
        for keyword in ["$defs", "definitions"] {
            if let Some(Value::Object(defs)) = map.get(keyword) {
                for (name, child) in defs {
                    self.walk(
                        child,
                        &path
                            .child(PathStep::Key(keyword.to_string()))
                            .child(PathStep::Key(name.clone())),
                        &format!("{pointer}/{keyword}/{name}"),
                    )?;
                }
            }
        }

        Ok(())
    }

    fn collect_sites(
        &mut self,
        map: &serde_json::Map<String, Value>,
        path: &PathTemplate,
        pointer: &str,
    ) -> Result<(), DiscoveryError> {
        for kind in ExtensionKind::ALL {
            let Some(value) = map.get(kind.keyword()) else {
                continue;
            };
            if kind.is_reference() {
                let decls = parse_reference_decls(kind, value).map_err(|message| {
                    DiscoveryError::InvalidKeyword {
                        schema_id: self.schema_id.to_string(),
                        pointer: pointer.to_string(),
                        keyword: kind.keyword(),
                        message,
                    }
                })?;
                for decl in decls {
                    self.discovery.sites.push(ExtensionSite {
                        schema_id: self.schema_id.to_string(),
                        host_path: path.clone(),
                        kind,
                        members: decl.members,
                        name: None,
                        limit_scope: false,
                        target: Some(ReferenceTarget {
                            schema_id: decl.schema_id,
                            refers_to: decl.refers_to,
                        }),
                    });
                }
            } else {
                let Some(decl) =
                    parse_key_decl(kind, value).map_err(|message| DiscoveryError::InvalidKeyword {
                        schema_id: self.schema_id.to_string(),
                        pointer: pointer.to_string(),
                        keyword: kind.keyword(),
                        message,
                    })?
                else {
                    continue;
                };
                if kind == ExtensionKind::PrimaryKey {
                    if self
                        .discovery
                        .primary_keys
                        .iter()
                        .any(|pk| pk.name == decl.name)
                    {
                        return Err(DiscoveryError::DuplicatePrimaryKey {
                            schema_id: self.schema_id.to_string(),
                            name: decl.name,
                        });
                    }
                    self.discovery.primary_keys.push(PrimaryKeyDecl {
                        schema_id: self.schema_id.to_string(),
                        name: decl.name.clone(),
                        provider: decl.provider.clone(),
                    });
                }
                self.discovery.sites.push(ExtensionSite {
                    schema_id: self.schema_id.to_string(),
                    host_path: path.clone(),
                    kind,
                    members: decl.members,
                    name: decl.name,
                    limit_scope: decl.limit_scope,
                    target: None,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn discover_ok(schema: &Value) -> Discovery {
        discover("S1/1.0", schema).expect("discovery should succeed")
    }

    #[test]
    fn site_at_schema_root() {
        let d = discover_ok(&json!({"unique": ["local_id"]}));
        assert_eq!(d.sites.len(), 1);
        let site = &d.sites[0];
        assert_eq!(site.kind, ExtensionKind::Unique);
        assert_eq!(site.host_path, PathTemplate::root());
        assert_eq!(
            site.members,
            MemberSpec::Keys(vec!["local_id".to_string()])
        );
    }

    #[test]
    fn properties_append_key_steps() {
        let d = discover_ok(&json!({
            "properties": {
                "local_id": {"type": "string", "unique": true}
            }
        }));
        assert_eq!(d.sites.len(), 1);
        assert_eq!(d.sites[0].host_path.to_string(), "/local_id");
        assert_eq!(d.sites[0].members, MemberSpec::Whole);
    }

    #[test]
    fn items_appends_sequence_wildcard() {
        let d = discover_ok(&json!({
            "properties": {
                "rows": {
                    "type": "array",
                    "items": {"type": "object", "primary_key": ["id"]}
                }
            }
        }));
        assert_eq!(d.sites.len(), 1);
        assert_eq!(d.sites[0].host_path.to_string(), "/rows/[*]");
        assert_eq!(d.primary_keys.len(), 1);
        assert_eq!(d.primary_keys[0].name, None);
    }

    #[test]
    fn prefix_items_append_fixed_indices() {
        let d = discover_ok(&json!({
            "prefixItems": [
                {"unique": true},
                {"index": true}
            ]
        }));
        assert_eq!(d.sites.len(), 2);
        assert_eq!(d.sites[0].host_path.to_string(), "/0");
        assert_eq!(d.sites[1].host_path.to_string(), "/1");
    }

    #[test]
    fn legacy_items_array_is_positional() {
        let d = discover_ok(&json!({
            "items": [{"unique": true}, {}]
        }));
        assert_eq!(d.sites.len(), 1);
        assert_eq!(d.sites[0].host_path.to_string(), "/0");
    }

    #[test]
    fn pattern_and_additional_properties_append_any_key() {
        let d = discover_ok(&json!({
            "patternProperties": {
                "^x-": {"unique": true}
            },
            "additionalProperties": {"index": {"members": ["id"], "name": "by_id"}}
        }));
        assert_eq!(d.sites.len(), 2);
        assert_eq!(d.sites[0].host_path.to_string(), "/*");
        assert_eq!(d.sites[1].host_path.to_string(), "/*");
        assert_eq!(d.sites[1].name.as_deref(), Some("by_id"));
    }

    #[test]
    fn composition_keywords_keep_the_path() {
        let d = discover_ok(&json!({
            "properties": {
                "v": {
                    "oneOf": [
                        {"type": "string", "unique": true},
                        {"type": "integer"}
                    ]
                }
            }
        }));
        assert_eq!(d.sites.len(), 1);
        assert_eq!(d.sites[0].host_path.to_string(), "/v");
    }

    #[test]
    fn reference_sites_carry_targets() {
        let d = discover_ok(&json!({
            "foreign_keys": [
                {"schema_id": "S2/1.0", "refers_to": "pk", "members": ["ref_id"]}
            ],
            "join_keys": [
                {"members": ["j"]}
            ]
        }));
        assert_eq!(d.sites.len(), 2);
        let fk = &d.sites[0];
        assert_eq!(fk.kind, ExtensionKind::ForeignKey);
        let target = fk.target.as_ref().expect("target");
        assert_eq!(target.schema_id.as_deref(), Some("S2/1.0"));
        assert_eq!(target.refers_to.as_deref(), Some("pk"));
        let jk = &d.sites[1];
        assert_eq!(jk.kind, ExtensionKind::JoinKey);
        assert_eq!(jk.target.as_ref().expect("target").schema_id, None);
    }

    #[test]
    fn duplicate_named_primary_keys_fail() {
        let err = discover(
            "S1/1.0",
            &json!({
                "properties": {
                    "a": {"primary_key": {"members": true, "name": "pk"}},
                    "b": {"primary_key": {"members": true, "name": "pk"}}
                }
            }),
        )
        .expect_err("should fail");
        assert!(matches!(err, DiscoveryError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn duplicate_anonymous_primary_keys_fail() {
        let err = discover(
            "S1/1.0",
            &json!({
                "properties": {
                    "a": {"primary_key": true},
                    "b": {"primary_key": true}
                }
            }),
        )
        .expect_err("should fail");
        assert!(matches!(
            err,
            DiscoveryError::DuplicatePrimaryKey { name: None, .. }
        ));
    }

    #[test]
    fn named_and_anonymous_primary_keys_coexist() {
        let d = discover_ok(&json!({
            "properties": {
                "a": {"primary_key": true},
                "b": {"primary_key": {"members": true, "name": "pk"}}
            }
        }));
        assert_eq!(d.primary_keys.len(), 2);
    }

    #[test]
    fn malformed_keyword_reports_pointer() {
        let err = discover(
            "S1/1.0",
            &json!({"properties": {"a": {"unique": 42}}}),
        )
        .expect_err("should fail");
        match err {
            DiscoveryError::InvalidKeyword {
                pointer, keyword, ..
            } => {
                assert_eq!(pointer, "/properties/a");
                assert_eq!(keyword, "unique");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn defs_are_traversed_for_duplicate_detection() {
        let err = discover(
            "S1/1.0",
            &json!({
                "primary_key": {"members": true, "name": "pk"},
                "$defs": {
                    "row": {"primary_key": {"members": true, "name": "pk"}}
                }
            }),
        )
        .expect_err("should fail");
        assert!(matches!(err, DiscoveryError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn defs_sites_have_unreachable_templates() {
        let d = discover_ok(&json!({
            "$defs": {"row": {"unique": true}}
        }));
        assert_eq!(d.sites.len(), 1);
        assert_eq!(d.sites[0].host_path.to_string(), "/$defs/row");
        // A conforming instance has no `$defs` member, so nothing resolves.
        assert!(d.sites[0].host_path.resolve(&json!({"a": 1})).is_empty());
    }

    #[test]
    fn provider_settings_land_in_the_declaration_table() {
        let d = discover_ok(&json!({
            "properties": {
                "id": {
                    "primary_key": {
                        "members": true,
                        "name": "pk",
                        "provider": ["https://keys.example.com/"],
                        "accept": "text/csv"
                    }
                }
            }
        }));
        assert_eq!(d.primary_keys.len(), 1);
        let decl = &d.primary_keys[0];
        assert_eq!(decl.name.as_deref(), Some("pk"));
        assert_eq!(decl.provider.provider, vec!["https://keys.example.com/"]);
        assert_eq!(decl.provider.accept.as_deref(), Some("text/csv"));
    }
}
