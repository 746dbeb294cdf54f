//! The extension keyword catalogue.
//!
//! Five keywords extend standard JSON Schema with relational semantics.
//! `unique`, `primary_key`, and `index` declare key families gathered in
//! phase 1; `foreign_keys` and `join_keys` declare references resolved in
//! phase 2. This module knows how to recognize each keyword and parse its
//! value into a typed declaration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tuple::{CanonicalValue, KeyTuple};

/// The five relational extension keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExtensionKind {
    Unique,
    PrimaryKey,
    Index,
    ForeignKey,
    JoinKey,
}

impl ExtensionKind {
    pub const ALL: [Self; 5] = [
        Self::Unique,
        Self::PrimaryKey,
        Self::Index,
        Self::ForeignKey,
        Self::JoinKey,
    ];

    /// The schema-level keyword this kind is declared with.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Unique => "unique",
            Self::PrimaryKey => "primary_key",
            Self::Index => "index",
            Self::ForeignKey => "foreign_keys",
            Self::JoinKey => "join_keys",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    /// References are checked in phase 2 against the registries the key
    /// kinds populate in phase 1.
    pub fn is_reference(self) -> bool {
        matches!(self, Self::ForeignKey | Self::JoinKey)
    }
}

impl core::fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Which members of the host value form the key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberSpec {
    /// The value at the site itself is the key (a 1-tuple).
    Whole,
    /// The ordered values at these keys of the host mapping.
    Keys(Vec<String>),
}

impl MemberSpec {
    /// Extract the key tuple from the value at a resolved site location.
    ///
    /// # Errors
    ///
    /// For `Keys`, returns the first member name that is absent (or the
    /// first name when the host is not a mapping); no tuple is recorded
    /// for that location.
    pub fn extract(&self, value: &Value) -> Result<KeyTuple, String> {
        match self {
            Self::Whole => Ok(KeyTuple::single(value)),
            Self::Keys(names) => {
                let Some(map) = value.as_object() else {
                    return Err(names.first().cloned().unwrap_or_default());
                };
                let mut values = Vec::with_capacity(names.len());
                for name in names {
                    match map.get(name) {
                        Some(v) => values.push(CanonicalValue::from(v)),
                        None => return Err(name.clone()),
                    }
                }
                Ok(KeyTuple::new(values))
            }
        }
    }
}

/// Provider settings attached to a `primary_key` declaration in a schema.
///
/// Mirrors the configuration-file block; schema-level settings are merged
/// with (and take precedence over) the file-level ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderDecl {
    /// Literal rows: scalars become 1-tuples, arrays composite tuples.
    pub inline_provider: Vec<Value>,
    pub provider: Vec<String>,
    pub schema_prefix: Option<String>,
    pub accept: Option<String>,
    pub allow_provider_duplicates: bool,
}

impl ProviderDecl {
    pub fn is_empty(&self) -> bool {
        self.inline_provider.is_empty() && self.provider.is_empty()
    }
}

/// A parsed `unique` / `primary_key` / `index` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDecl {
    pub members: MemberSpec,
    pub name: Option<String>,
    pub limit_scope: bool,
    /// Only ever populated for `primary_key`.
    pub provider: ProviderDecl,
}

/// A parsed entry of a `foreign_keys` / `join_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDecl {
    /// Target schema; the declaring schema when absent.
    pub schema_id: Option<String>,
    /// Target key-family name; the anonymous family when absent.
    pub refers_to: Option<String>,
    pub members: MemberSpec,
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    items
        .iter()
        .map(|v| v.as_str().map(String::from))
        .collect()
}

/// Parse the value of a `unique` / `primary_key` / `index` keyword.
///
/// Accepts `true` (whole value is the key), an array of member names, or
/// a mapping with `members` plus optional `name` / `limit_scope` (and
/// provider fields on `primary_key`). `false` means "not declared".
///
/// # Errors
///
/// Returns a message describing the malformed value.
pub fn parse_key_decl(kind: ExtensionKind, value: &Value) -> Result<Option<KeyDecl>, String> {
    debug_assert!(!kind.is_reference());
    match value {
        Value::Bool(true) => Ok(Some(KeyDecl {
            members: MemberSpec::Whole,
            name: None,
            limit_scope: false,
            provider: ProviderDecl::default(),
        })),
        Value::Bool(false) => Ok(None),
        Value::Array(_) => {
            let names = string_array(value)
                .ok_or_else(|| format!("`{kind}` array entries must all be strings"))?;
            Ok(Some(KeyDecl {
                members: MemberSpec::Keys(names),
                name: None,
                limit_scope: false,
                provider: ProviderDecl::default(),
            }))
        }
        Value::Object(map) => parse_key_decl_object(kind, map).map(Some),
        other => Err(format!(
            "`{kind}` must be true, an array of member names, or a mapping, got {}",
            type_name(other)
        )),
    }
}

fn parse_key_decl_object(
    kind: ExtensionKind,
    map: &serde_json::Map<String, Value>,
) -> Result<KeyDecl, String> {
    let mut decl = KeyDecl {
        members: MemberSpec::Whole,
        name: None,
        limit_scope: false,
        provider: ProviderDecl::default(),
    };
    let mut saw_members = false;

    for (field, v) in map {
        match field.as_str() {
            "members" => {
                saw_members = true;
                decl.members = match v {
                    Value::Bool(true) => MemberSpec::Whole,
                    _ => MemberSpec::Keys(string_array(v).ok_or_else(|| {
                        format!("`{kind}.members` must be true or an array of strings")
                    })?),
                };
            }
            "name" => {
                decl.name = Some(
                    v.as_str()
                        .ok_or_else(|| format!("`{kind}.name` must be a string"))?
                        .to_string(),
                );
            }
            "limit_scope" => {
                decl.limit_scope = v
                    .as_bool()
                    .ok_or_else(|| format!("`{kind}.limit_scope` must be a boolean"))?;
            }
            "inline_provider" if kind == ExtensionKind::PrimaryKey => {
                decl.provider.inline_provider = v
                    .as_array()
                    .ok_or_else(|| "`primary_key.inline_provider` must be an array".to_string())?
                    .clone();
            }
            "provider" if kind == ExtensionKind::PrimaryKey => {
                decl.provider.provider = string_array(v).ok_or_else(|| {
                    "`primary_key.provider` must be an array of URL prefixes".to_string()
                })?;
            }
            "schema_prefix" if kind == ExtensionKind::PrimaryKey => {
                decl.provider.schema_prefix = Some(
                    v.as_str()
                        .ok_or_else(|| "`primary_key.schema_prefix` must be a string".to_string())?
                        .to_string(),
                );
            }
            "accept" if kind == ExtensionKind::PrimaryKey => {
                decl.provider.accept = Some(
                    v.as_str()
                        .ok_or_else(|| "`primary_key.accept` must be a string".to_string())?
                        .to_string(),
                );
            }
            "allow_provider_duplicates" if kind == ExtensionKind::PrimaryKey => {
                decl.provider.allow_provider_duplicates = v.as_bool().ok_or_else(|| {
                    "`primary_key.allow_provider_duplicates` must be a boolean".to_string()
                })?;
            }
            other => return Err(format!("unknown field `{other}` in `{kind}` declaration")),
        }
    }

    if !saw_members {
        return Err(format!("`{kind}` mapping form requires a `members` field"));
    }
    Ok(decl)
}

/// Parse the value of a `foreign_keys` / `join_keys` keyword: an array of
/// `{ schema_id?, refers_to?, members }` entries.
///
/// # Errors
///
/// Returns a message describing the malformed value.
pub fn parse_reference_decls(
    kind: ExtensionKind,
    value: &Value,
) -> Result<Vec<ReferenceDecl>, String> {
    debug_assert!(kind.is_reference());
    let entries = value
        .as_array()
        .ok_or_else(|| format!("`{kind}` must be an array of reference declarations"))?;

    let mut decls = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let map = entry
            .as_object()
            .ok_or_else(|| format!("`{kind}[{i}]` must be a mapping"))?;

        let mut schema_id = None;
        let mut refers_to = None;
        let mut members = None;
        for (field, v) in map {
            match field.as_str() {
                "schema_id" => {
                    schema_id = Some(
                        v.as_str()
                            .ok_or_else(|| format!("`{kind}[{i}].schema_id` must be a string"))?
                            .to_string(),
                    );
                }
                "refers_to" => {
                    refers_to = Some(
                        v.as_str()
                            .ok_or_else(|| format!("`{kind}[{i}].refers_to` must be a string"))?
                            .to_string(),
                    );
                }
                "members" => {
                    members = Some(MemberSpec::Keys(string_array(v).ok_or_else(|| {
                        format!("`{kind}[{i}].members` must be an array of strings")
                    })?));
                }
                other => {
                    return Err(format!("unknown field `{other}` in `{kind}[{i}]`"));
                }
            }
        }

        decls.push(ReferenceDecl {
            schema_id,
            refers_to,
            members: members
                .ok_or_else(|| format!("`{kind}[{i}]` requires a `members` field"))?,
        });
    }
    Ok(decls)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_round_trip() {
        for kind in ExtensionKind::ALL {
            assert_eq!(ExtensionKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(ExtensionKind::from_keyword("unique"), Some(ExtensionKind::Unique));
        assert_eq!(ExtensionKind::from_keyword("required"), None);
    }

    #[test]
    fn parse_true_is_whole() {
        let decl = parse_key_decl(ExtensionKind::Unique, &json!(true))
            .expect("parse")
            .expect("declared");
        assert_eq!(decl.members, MemberSpec::Whole);
        assert!(!decl.limit_scope);
        assert!(decl.name.is_none());
    }

    #[test]
    fn parse_false_is_undeclared() {
        assert_eq!(parse_key_decl(ExtensionKind::Unique, &json!(false)), Ok(None));
    }

    #[test]
    fn parse_array_is_keys() {
        let decl = parse_key_decl(ExtensionKind::Index, &json!(["a", "b"]))
            .expect("parse")
            .expect("declared");
        assert_eq!(decl.members, MemberSpec::Keys(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn parse_array_rejects_non_strings() {
        assert!(parse_key_decl(ExtensionKind::Index, &json!(["a", 1])).is_err());
    }

    #[test]
    fn parse_mapping_form() {
        let decl = parse_key_decl(
            ExtensionKind::Unique,
            &json!({"members": ["local_id", "other_id"], "name": "pair", "limit_scope": true}),
        )
        .expect("parse")
        .expect("declared");
        assert_eq!(decl.name.as_deref(), Some("pair"));
        assert!(decl.limit_scope);
        assert_eq!(
            decl.members,
            MemberSpec::Keys(vec!["local_id".into(), "other_id".into()])
        );
    }

    #[test]
    fn parse_mapping_members_true_is_whole() {
        let decl = parse_key_decl(ExtensionKind::PrimaryKey, &json!({"members": true}))
            .expect("parse")
            .expect("declared");
        assert_eq!(decl.members, MemberSpec::Whole);
    }

    #[test]
    fn parse_mapping_requires_members() {
        assert!(parse_key_decl(ExtensionKind::Unique, &json!({"name": "x"})).is_err());
    }

    #[test]
    fn primary_key_absorbs_provider_fields() {
        let decl = parse_key_decl(
            ExtensionKind::PrimaryKey,
            &json!({
                "members": true,
                "name": "pk",
                "inline_provider": ["X", ["a", "b"]],
                "provider": ["https://keys.example.com/"],
                "schema_prefix": "https://schemas.example.com/",
                "accept": "text/csv",
                "allow_provider_duplicates": true
            }),
        )
        .expect("parse")
        .expect("declared");
        assert_eq!(decl.provider.provider, vec!["https://keys.example.com/"]);
        assert_eq!(decl.provider.inline_provider.len(), 2);
        assert_eq!(decl.provider.accept.as_deref(), Some("text/csv"));
        assert!(decl.provider.allow_provider_duplicates);
    }

    #[test]
    fn provider_fields_rejected_on_other_kinds() {
        let err = parse_key_decl(
            ExtensionKind::Unique,
            &json!({"members": true, "provider": ["https://keys.example.com/"]}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn parse_reference_entries() {
        let decls = parse_reference_decls(
            ExtensionKind::ForeignKey,
            &json!([
                {"schema_id": "S1/1.0", "refers_to": "pk", "members": ["ref_id"]},
                {"members": ["other"]}
            ]),
        )
        .expect("parse");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].schema_id.as_deref(), Some("S1/1.0"));
        assert_eq!(decls[0].refers_to.as_deref(), Some("pk"));
        assert!(decls[1].schema_id.is_none());
        assert_eq!(decls[1].members, MemberSpec::Keys(vec!["other".into()]));
    }

    #[test]
    fn reference_requires_members() {
        assert!(parse_reference_decls(ExtensionKind::JoinKey, &json!([{}])).is_err());
    }

    #[test]
    fn reference_must_be_array() {
        assert!(parse_reference_decls(ExtensionKind::ForeignKey, &json!({"members": []})).is_err());
    }

    // --- extraction ---

    #[test]
    fn extract_whole_is_one_tuple() {
        let tuple = MemberSpec::Whole.extract(&json!("X")).expect("tuple");
        assert_eq!(tuple, KeyTuple::single(&json!("X")));
    }

    #[test]
    fn extract_keys_in_declared_order() {
        let spec = MemberSpec::Keys(vec!["b".into(), "a".into()]);
        let tuple = spec.extract(&json!({"a": 1, "b": 2})).expect("tuple");
        assert_eq!(tuple.to_values(), vec![json!(2), json!(1)]);
    }

    #[test]
    fn extract_missing_member_names_the_member() {
        let spec = MemberSpec::Keys(vec!["a".into(), "missing".into()]);
        assert_eq!(spec.extract(&json!({"a": 1})), Err("missing".to_string()));
    }

    #[test]
    fn extract_keys_on_non_mapping_errors() {
        let spec = MemberSpec::Keys(vec!["a".into()]);
        assert_eq!(spec.extract(&json!([1, 2])), Err("a".to_string()));
    }
}
