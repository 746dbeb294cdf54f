//! Phase-2 registries: primary-key and index tuples gathered across the
//! corpus, and the membership checks foreign keys and join keys run
//! against them.

use alloc::collections::BTreeMap;

use crate::tuple::KeyTuple;

/// The namespace key of a registry: named constraints with the same name
/// under different schemas never merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey {
    pub schema_id: String,
    /// `None` addresses the anonymous family of a schema.
    pub name: Option<String>,
}

impl RegistryKey {
    pub fn new(schema_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            name,
        }
    }
}

/// Where a registered tuple came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleOrigin {
    LocalInstance,
    Inline,
    Provider,
}

/// Union of origins a tuple was seen under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginFlags {
    pub local: bool,
    pub inline: bool,
    pub provider: bool,
}

impl OriginFlags {
    pub fn record(&mut self, origin: TupleOrigin) {
        match origin {
            TupleOrigin::LocalInstance => self.local = true,
            TupleOrigin::Inline => self.inline = true,
            TupleOrigin::Provider => self.provider = true,
        }
    }

    /// True when the tuple exists only via a remote provider.
    pub fn provider_only(&self) -> bool {
        self.provider && !self.local && !self.inline
    }
}

/// Outcome of a reference membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceOutcome {
    Found,
    /// No registry is declared for the key at all.
    UnresolvedTarget,
    /// The registry exists but does not contain the tuple.
    Missing,
}

/// Primary-key tuples with per-tuple origin flags. Membership ignores
/// origin: a tuple known only through a provider still satisfies a
/// foreign key.
#[derive(Debug, Default)]
pub struct PkIndex {
    map: BTreeMap<RegistryKey, BTreeMap<KeyTuple, OriginFlags>>,
}

impl PkIndex {
    /// Make a registry exist even before any tuple lands in it, so that a
    /// declared-but-empty primary key dangles instead of reading as
    /// undeclared.
    pub fn declare(&mut self, key: RegistryKey) {
        self.map.entry(key).or_default();
    }

    pub fn register(&mut self, key: RegistryKey, tuple: KeyTuple, origin: TupleOrigin) {
        self.map
            .entry(key)
            .or_default()
            .entry(tuple)
            .or_default()
            .record(origin);
    }

    pub fn origins(&self, key: &RegistryKey, tuple: &KeyTuple) -> Option<OriginFlags> {
        self.map.get(key)?.get(tuple).copied()
    }

    pub fn resolve(&self, key: &RegistryKey, tuple: &KeyTuple) -> ReferenceOutcome {
        match self.map.get(key) {
            None => ReferenceOutcome::UnresolvedTarget,
            Some(tuples) if tuples.contains_key(tuple) => ReferenceOutcome::Found,
            Some(_) => ReferenceOutcome::Missing,
        }
    }
}

/// Index tuples as a multiset; no uniqueness is enforced over them.
#[derive(Debug, Default)]
pub struct TupleIndex {
    map: BTreeMap<RegistryKey, BTreeMap<KeyTuple, usize>>,
}

impl TupleIndex {
    pub fn declare(&mut self, key: RegistryKey) {
        self.map.entry(key).or_default();
    }

    pub fn register(&mut self, key: RegistryKey, tuple: KeyTuple) {
        *self.map.entry(key).or_default().entry(tuple).or_insert(0) += 1;
    }

    pub fn resolve(&self, key: &RegistryKey, tuple: &KeyTuple) -> ReferenceOutcome {
        match self.map.get(key) {
            None => ReferenceOutcome::UnresolvedTarget,
            Some(tuples) if tuples.contains_key(tuple) => ReferenceOutcome::Found,
            Some(_) => ReferenceOutcome::Missing,
        }
    }
}
