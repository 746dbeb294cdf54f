//! The two-phase validation engine.
//!
//! Phase 0 pairs each instance with a schema (declared id member,
//! `--use-schemas` restriction, or trial validation with
//! `--guess-schema`). Phase 1 runs the draft-compliant validator per
//! document and gathers key tuples through the discovered extension
//! sites. Phase 2 resolves uniqueness and referential integrity across
//! the whole corpus, folding in inline-provider, cache, and remote
//! provider tuples. Phase-1 completion is a total barrier before phase 2.

use alloc::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use keylint_config::PrimaryKeyConfig;
use keylint_diagnostics::{
    CheckResult, CheckedDocument, KeylintDiagnostic, OffendingLocation, ReferencedKey,
};
use keylint_key_cache::{CacheMode, EntryKey, KeyCache, LOCAL_ORIGIN};
use keylint_provider::{DEFAULT_ACCEPT, DEFAULT_CONCURRENCY, Feed, ProviderFetcher, compose_url};

use crate::keywords::ExtensionKind;
use crate::path::{Location, PathTemplate};
use crate::resolve::{PkIndex, ReferenceOutcome, RegistryKey, TupleIndex, TupleOrigin};
use crate::store::DocumentStore;
use crate::traverse::{Discovery, discover};
use crate::tuple::{CanonicalValue, KeyTuple};

/// Instance members probed for a schema id when the configuration names none.
pub const DEFAULT_SCHEMA_ID_MEMBERS: [&str; 3] = ["@schema", "_schema", "$schema"];

/// Inputs for one validation run.
pub struct RunArgs {
    /// Schema files, directories, or glob patterns.
    pub schema_paths: Vec<String>,

    /// Instance files, directories, or glob patterns.
    pub instance_paths: Vec<String>,

    /// Exclude instance files matching these globs.
    pub exclude: Vec<String>,

    /// Restrict pairing to these schema ids (empty = all loaded schemas).
    pub use_schemas: Vec<String>,

    /// Pair undeclared instances by trial validation; every schema the
    /// instance is valid under participates.
    pub guess_schema: bool,

    /// Instance members probed for the schema id, in order.
    pub schema_id_path: Vec<String>,

    /// Accumulate all errors instead of returning the first.
    pub continue_on_error: bool,

    pub cache_mode: CacheMode,

    /// Key cache directory; a per-user default when `None`.
    pub cache_dir: Option<PathBuf>,

    /// Provider settings from the configuration file.
    pub primary_key: PrimaryKeyConfig,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            schema_paths: Vec::new(),
            instance_paths: Vec::new(),
            exclude: Vec::new(),
            use_schemas: Vec::new(),
            guess_schema: false,
            schema_id_path: DEFAULT_SCHEMA_ID_MEMBERS.map(String::from).to_vec(),
            continue_on_error: false,
            cache_mode: CacheMode::LazyLoad,
            cache_dir: None,
            primary_key: PrimaryKeyConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// Namespace of a key site: its name, or the site position itself for
/// anonymous sites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SiteKey {
    Named(String),
    Anonymous(PathTemplate),
}

/// Uniqueness partition: the whole corpus, or one document under
/// `limit_scope`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Scope {
    Global,
    Document(String),
}

/// One gathered key tuple (`unique` / `primary_key` / `index`).
struct KeyRecord {
    schema_id: String,
    kind: ExtensionKind,
    site: SiteKey,
    name: Option<String>,
    limit_scope: bool,
    document_uri: String,
    location: Location,
    tuple: KeyTuple,
}

/// One gathered reference tuple (`foreign_keys` / `join_keys`).
struct RefRecord {
    schema_id: String,
    kind: ExtensionKind,
    target_schema: Option<String>,
    refers_to: Option<String>,
    document_uri: String,
    location: Location,
    tuple: KeyTuple,
}

/// A primary-key declaration with schema-level and config-level provider
/// settings merged (schema level wins).
#[derive(Debug, Clone)]
struct EffectiveDecl {
    key: RegistryKey,
    inline_rows: Vec<Value>,
    providers: Vec<String>,
    schema_prefix: Option<String>,
    accept: String,
    allow_provider_duplicates: bool,
}

/// Counts of unlocated (inline / provider) occurrences per tuple, used by
/// the primary-key uniqueness check.
#[derive(Debug, Clone, Copy, Default)]
struct ExternalCounts {
    inline: usize,
    provider: usize,
}

type ExternalMap = BTreeMap<RegistryKey, BTreeMap<KeyTuple, ExternalCounts>>;

/// Per-schema compiled validators, compiled once and shared by every
/// instance paired with the schema.
struct Validators {
    map: BTreeMap<String, Result<jsonschema::Validator, String>>,
}

impl Validators {
    fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    fn get_or_compile(
        &mut self,
        store: &DocumentStore,
        schema_id: &str,
    ) -> &Result<jsonschema::Validator, String> {
        if !self.map.contains_key(schema_id) {
            let compiled = compile_schema(store, schema_id);
            self.map.insert(schema_id.to_string(), compiled);
        }
        self.map.get(schema_id).expect("entry just inserted")
    }
}

fn compile_schema(store: &DocumentStore, schema_id: &str) -> Result<jsonschema::Validator, String> {
    let schema = store
        .schema(schema_id)
        .ok_or_else(|| format!("schema `{schema_id}` is not loaded"))?;
    jsonschema::options()
        .with_retriever(store.retriever())
        .build(&schema.value)
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a validation with default provider transport and no progress callback.
///
/// # Errors
///
/// Returns an error on internal failure: file collection, cache writes, or
/// an unusable cache directory. Validation findings are never `Err`; they
/// land in the returned [`CheckResult`].
pub async fn run(args: &RunArgs) -> Result<CheckResult> {
    run_with(args, None, |_| {}).await
}

/// Like [`run`], but with an injectable provider transport (tests use the
/// memory backend) and a per-document progress callback.
///
/// # Errors
///
/// Returns an error on internal failure: file collection, cache writes, or
/// an unusable cache directory.
#[tracing::instrument(skip_all, name = "validate")]
#[allow(clippy::too_many_lines)]
pub async fn run_with(
    args: &RunArgs,
    fetcher: Option<ProviderFetcher>,
    mut on_check: impl FnMut(&CheckedDocument),
) -> Result<CheckResult> {
    let fetcher = fetcher.unwrap_or_else(|| ProviderFetcher::new(DEFAULT_CONCURRENCY));
    let id_members: Vec<String> = if args.schema_id_path.is_empty() {
        DEFAULT_SCHEMA_ID_MEMBERS.map(String::from).to_vec()
    } else {
        args.schema_id_path.clone()
    };

    // Load the corpus.
    let (store, mut errors) =
        DocumentStore::load(&args.schema_paths, &args.instance_paths, &args.exclude).await?;

    // Discover extension sites per schema. A failing schema is excluded
    // from the run; its documents will pair but carry a load error.
    let mut discoveries: BTreeMap<String, Discovery> = BTreeMap::new();
    for schema in store.schemas() {
        match discover(&schema.id, &schema.value) {
            Ok(d) => {
                discoveries.insert(schema.id.clone(), d);
            }
            Err(e) => errors.push(KeylintDiagnostic::SchemaLoad {
                uri: schema.source_uri.clone(),
                message: e.to_string(),
            }),
        }
    }

    // Key cache.
    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(keylint_key_cache::ensure_cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
    let cache = KeyCache::new(cache_dir, args.cache_mode == CacheMode::ReadOnly);
    if args.cache_mode == CacheMode::Invalidate {
        cache.purge().context("failed to invalidate key cache")?;
    }

    // Registries and external (inline/provider) tuples.
    let decls = effective_decls(&discoveries, &args.primary_key);
    let mut pk_index = PkIndex::default();
    let mut idx_index = TupleIndex::default();
    let mut external: ExternalMap = BTreeMap::new();
    for decl in decls.values() {
        pk_index.declare(decl.key.clone());
        for row in &decl.inline_rows {
            let tuple = KeyTuple::from_row(row);
            pk_index.register(decl.key.clone(), tuple.clone(), TupleOrigin::Inline);
            external
                .entry(decl.key.clone())
                .or_default()
                .entry(tuple)
                .or_default()
                .inline += 1;
        }
    }
    for discovery in discoveries.values() {
        for site in &discovery.sites {
            if site.kind == ExtensionKind::Index {
                idx_index.declare(RegistryKey::new(site.schema_id.clone(), site.name.clone()));
            }
        }
    }

    // Provider feeds, ahead of phase 1 for every mode except lazy.
    let mut providers_loaded: BTreeSet<RegistryKey> = BTreeSet::new();
    if args.cache_mode != CacheMode::LazyLoad {
        load_providers_upfront(
            &decls,
            &cache,
            &fetcher,
            args.cache_mode,
            &mut pk_index,
            &mut external,
            &mut errors,
        )
        .await?;
        providers_loaded.extend(decls.keys().cloned());
    }

    // Phase 0 + phase 1, document by document in source order.
    let candidates: Vec<String> = if args.use_schemas.is_empty() {
        store.schema_ids().map(String::from).collect()
    } else {
        args.use_schemas
            .iter()
            .filter(|id| store.schema(id).is_some())
            .cloned()
            .collect()
    };
    let mut validators = Validators::new();
    let mut checked: Vec<CheckedDocument> = Vec::new();
    let mut key_records: Vec<KeyRecord> = Vec::new();
    let mut ref_records: Vec<RefRecord> = Vec::new();

    for instance in store.instances() {
        if !args.continue_on_error && errors.iter().any(KeylintDiagnostic::is_error) {
            break;
        }

        let declared = extract_schema_id(&instance.value, &id_members);
        let paired: Vec<String> = match declared {
            Some(id) if candidates.contains(&id) => vec![id],
            _ if args.guess_schema => candidates
                .iter()
                .filter(|id| {
                    matches!(
                        validators.get_or_compile(&store, id),
                        Ok(v) if v.is_valid(&instance.value)
                    )
                })
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        if paired.is_empty() {
            errors.push(KeylintDiagnostic::UnknownSchema {
                uri: instance.source_uri.clone(),
            });
            let doc = CheckedDocument {
                uri: instance.source_uri.clone(),
                schema_id: None,
                tuples_gathered: 0,
            };
            on_check(&doc);
            checked.push(doc);
            continue;
        }

        for schema_id in paired {
            let tuples_gathered = check_document(
                &store,
                &mut validators,
                discoveries.get(&schema_id),
                &schema_id,
                instance,
                &mut errors,
                &mut key_records,
                &mut ref_records,
            );
            let doc = CheckedDocument {
                uri: instance.source_uri.clone(),
                schema_id: Some(schema_id),
                tuples_gathered,
            };
            on_check(&doc);
            checked.push(doc);
        }
    }

    // Commit local primary-key tuples to the cache.
    write_local_entries(&cache, &key_records).await?;

    if !args.continue_on_error && errors.iter().any(KeylintDiagnostic::is_error) {
        return Ok(finalize(errors, checked, args.continue_on_error));
    }

    // Phase 2.
    register_key_records(&key_records, &mut pk_index, &mut idx_index);
    check_uniqueness(&key_records, &external, &decls, &mut errors);
    resolve_references(
        &ref_records,
        &decls,
        &cache,
        &fetcher,
        args.cache_mode,
        &mut providers_loaded,
        &mut pk_index,
        &idx_index,
        &mut errors,
    )
    .await?;

    Ok(finalize(errors, checked, args.continue_on_error))
}

// ---------------------------------------------------------------------------
// Phase 0/1 helpers
// ---------------------------------------------------------------------------

/// Probe the configured members for the declared schema id.
fn extract_schema_id(instance: &Value, members: &[String]) -> Option<String> {
    let map = instance.as_object()?;
    members
        .iter()
        .find_map(|m| map.get(m).and_then(Value::as_str).map(String::from))
}

/// Standard validation plus tuple gathering for one (document, schema)
/// pair. Returns the number of tuples gathered.
#[allow(clippy::too_many_arguments)]
fn check_document(
    store: &DocumentStore,
    validators: &mut Validators,
    discovery: Option<&Discovery>,
    schema_id: &str,
    instance: &crate::store::InstanceDocument,
    errors: &mut Vec<KeylintDiagnostic>,
    key_records: &mut Vec<KeyRecord>,
    ref_records: &mut Vec<RefRecord>,
) -> usize {
    match validators.get_or_compile(store, schema_id) {
        Ok(validator) => {
            for error in validator.iter_errors(&instance.value) {
                errors.push(KeylintDiagnostic::Standard {
                    uri: instance.source_uri.clone(),
                    schema_id: schema_id.to_string(),
                    instance_path: error.instance_path().to_string(),
                    schema_path: error.schema_path().to_string(),
                    message: error.to_string(),
                });
            }
        }
        Err(message) => {
            errors.push(KeylintDiagnostic::SchemaLoad {
                uri: instance.source_uri.clone(),
                message: format!("failed to compile schema `{schema_id}`: {message}"),
            });
            return 0;
        }
    }

    let Some(discovery) = discovery else {
        return 0;
    };

    let mut gathered = 0;
    for site in &discovery.sites {
        for (location, value) in site.host_path.resolve(&instance.value) {
            match site.members.extract(value) {
                Ok(tuple) => {
                    gathered += 1;
                    if let Some(target) = &site.target {
                        ref_records.push(RefRecord {
                            schema_id: schema_id.to_string(),
                            kind: site.kind,
                            target_schema: target.schema_id.clone(),
                            refers_to: target.refers_to.clone(),
                            document_uri: instance.source_uri.clone(),
                            location,
                            tuple,
                        });
                    } else {
                        key_records.push(KeyRecord {
                            schema_id: schema_id.to_string(),
                            kind: site.kind,
                            site: site.name.clone().map_or_else(
                                || SiteKey::Anonymous(site.host_path.clone()),
                                SiteKey::Named,
                            ),
                            name: site.name.clone(),
                            limit_scope: site.limit_scope,
                            document_uri: instance.source_uri.clone(),
                            location,
                            tuple,
                        });
                    }
                }
                Err(member) => {
                    errors.push(KeylintDiagnostic::MissingMember {
                        uri: instance.source_uri.clone(),
                        schema_id: schema_id.to_string(),
                        path: location.pointer(),
                        member,
                    });
                }
            }
        }
    }
    gathered
}

// ---------------------------------------------------------------------------
// Provider / cache plumbing
// ---------------------------------------------------------------------------

/// Merge schema-level and config-level provider settings per primary-key
/// declaration. Config inline tuples for schemas with no `primary_key`
/// declaration register under the anonymous family so corpus-external keys
/// stay referenceable.
fn effective_decls(
    discoveries: &BTreeMap<String, Discovery>,
    config: &PrimaryKeyConfig,
) -> BTreeMap<RegistryKey, EffectiveDecl> {
    let mut decls = BTreeMap::new();
    for (schema_id, discovery) in discoveries {
        for pk in &discovery.primary_keys {
            let key = RegistryKey::new(schema_id.clone(), pk.name.clone());
            let mut inline_rows = pk.provider.inline_provider.clone();
            if let Some(rows) = config.inline_provider.get(schema_id) {
                inline_rows.extend(rows.iter().cloned());
            }
            let mut providers = pk.provider.provider.clone();
            for p in &config.provider {
                if !providers.contains(p) {
                    providers.push(p.clone());
                }
            }
            decls.insert(
                key.clone(),
                EffectiveDecl {
                    key,
                    inline_rows,
                    providers,
                    schema_prefix: pk
                        .provider
                        .schema_prefix
                        .clone()
                        .or_else(|| config.schema_prefix.clone()),
                    accept: pk
                        .provider
                        .accept
                        .clone()
                        .or_else(|| config.accept.clone())
                        .unwrap_or_else(|| DEFAULT_ACCEPT.to_string()),
                    allow_provider_duplicates: pk.provider.allow_provider_duplicates
                        || config.allow_provider_duplicates,
                },
            );
        }
    }
    for (schema_id, rows) in &config.inline_provider {
        if decls.keys().any(|k| &k.schema_id == schema_id) {
            continue;
        }
        let key = RegistryKey::new(schema_id.clone(), None);
        decls.insert(
            key.clone(),
            EffectiveDecl {
                key,
                inline_rows: rows.clone(),
                providers: Vec::new(),
                schema_prefix: None,
                accept: DEFAULT_ACCEPT.to_string(),
                allow_provider_duplicates: config.allow_provider_duplicates,
            },
        );
    }
    decls
}

fn rows_to_tuples(rows: &[Vec<Value>]) -> Vec<KeyTuple> {
    rows.iter()
        .map(|row| KeyTuple::new(row.iter().map(CanonicalValue::from).collect()))
        .collect()
}

fn register_provider_tuples(
    key: &RegistryKey,
    tuples: Vec<KeyTuple>,
    pk_index: &mut PkIndex,
    external: &mut ExternalMap,
) {
    for tuple in tuples {
        pk_index.register(key.clone(), tuple.clone(), TupleOrigin::Provider);
        external
            .entry(key.clone())
            .or_default()
            .entry(tuple)
            .or_default()
            .provider += 1;
    }
}

/// Fetch every provider feed not already cached, concurrently under the
/// fetcher's cap, and register the results.
async fn load_providers_upfront(
    decls: &BTreeMap<RegistryKey, EffectiveDecl>,
    cache: &KeyCache,
    fetcher: &ProviderFetcher,
    mode: CacheMode,
    pk_index: &mut PkIndex,
    external: &mut ExternalMap,
    errors: &mut Vec<KeylintDiagnostic>,
) -> Result<()> {
    let mut pending: Vec<Feed> = Vec::new();
    for decl in decls.values() {
        for provider in &decl.providers {
            let url = compose_url(provider, &decl.key.schema_id, decl.schema_prefix.as_deref());
            let entry = EntryKey {
                schema_id: &decl.key.schema_id,
                pk_name: decl.key.name.as_deref(),
                origin: &url,
            };
            if mode != CacheMode::Invalidate {
                if let Some(rows) = cache.lookup(&entry).await {
                    register_provider_tuples(&decl.key, rows_to_tuples(&rows), pk_index, external);
                    continue;
                }
            }
            if mode == CacheMode::ReadOnly {
                continue;
            }
            pending.push(Feed {
                url,
                accept: decl.accept.clone(),
                schema_id: decl.key.schema_id.clone(),
                pk_name: decl.key.name.clone(),
            });
        }
    }
    if pending.is_empty() {
        return Ok(());
    }

    tracing::info!(feeds = pending.len(), "fetching provider feeds");
    for (feed, result) in fetcher.fetch_feeds(pending).await {
        let key = RegistryKey::new(feed.schema_id.clone(), feed.pk_name.clone());
        let entry = EntryKey {
            schema_id: &feed.schema_id,
            pk_name: feed.pk_name.as_deref(),
            origin: &feed.url,
        };
        match result {
            Ok(keys) => {
                let tuples: Vec<KeyTuple> = keys
                    .iter()
                    .map(|k| KeyTuple::single(&Value::String(k.clone())))
                    .collect();
                let rows: Vec<Vec<Value>> = tuples.iter().map(KeyTuple::to_values).collect();
                cache
                    .store(&entry, &rows)
                    .await
                    .context("failed to write key cache")?;
                register_provider_tuples(&key, tuples, pk_index, external);
            }
            Err(e) => {
                // A stale copy is better than nothing; fall back when one
                // survives (never after an invalidate purge).
                if let Some(rows) = cache.lookup(&entry).await {
                    register_provider_tuples(&key, rows_to_tuples(&rows), pk_index, external);
                    errors.push(KeylintDiagnostic::ProviderFetch {
                        url: feed.url.clone(),
                        schema_id: feed.schema_id.clone(),
                        message: e.to_string(),
                        served_from_cache: true,
                    });
                } else {
                    errors.push(KeylintDiagnostic::ProviderFetch {
                        url: feed.url.clone(),
                        schema_id: feed.schema_id.clone(),
                        message: e.to_string(),
                        served_from_cache: false,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Write the primary-key tuples gathered from local instances back to the
/// cache under the local origin.
async fn write_local_entries(cache: &KeyCache, key_records: &[KeyRecord]) -> Result<()> {
    let mut by_registry: BTreeMap<RegistryKey, Vec<Vec<Value>>> = BTreeMap::new();
    for record in key_records {
        if record.kind == ExtensionKind::PrimaryKey {
            by_registry
                .entry(RegistryKey::new(record.schema_id.clone(), record.name.clone()))
                .or_default()
                .push(record.tuple.to_values());
        }
    }
    for (key, rows) in by_registry {
        let entry = EntryKey {
            schema_id: &key.schema_id,
            pk_name: key.name.as_deref(),
            origin: LOCAL_ORIGIN,
        };
        cache
            .store(&entry, &rows)
            .await
            .context("failed to write key cache")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Phase 2
// ---------------------------------------------------------------------------

fn register_key_records(
    key_records: &[KeyRecord],
    pk_index: &mut PkIndex,
    idx_index: &mut TupleIndex,
) {
    for record in key_records {
        let key = RegistryKey::new(record.schema_id.clone(), record.name.clone());
        match record.kind {
            ExtensionKind::PrimaryKey => {
                pk_index.register(key, record.tuple.clone(), TupleOrigin::LocalInstance);
            }
            ExtensionKind::Index => idx_index.register(key, record.tuple.clone()),
            _ => {}
        }
    }
}

/// Uniqueness over `unique` and `primary_key` records: group by
/// `(schema_id, kind, site namespace, scope)` and report every occurrence
/// beyond the first of a duplicated tuple, listing all locations.
///
/// Primary keys additionally fold in unlocated inline/provider tuples
/// (global scope only); with `allow_provider_duplicates`, provider copies
/// drop out of the multiset while inline ones keep counting.
fn check_uniqueness(
    key_records: &[KeyRecord],
    external: &ExternalMap,
    decls: &BTreeMap<RegistryKey, EffectiveDecl>,
    errors: &mut Vec<KeylintDiagnostic>,
) {
    type GroupKey = (String, ExtensionKind, SiteKey, Scope);
    let mut groups: BTreeMap<GroupKey, BTreeMap<KeyTuple, Vec<(String, Location)>>> =
        BTreeMap::new();

    for record in key_records {
        if !matches!(
            record.kind,
            ExtensionKind::Unique | ExtensionKind::PrimaryKey
        ) {
            continue;
        }
        let scope = if record.limit_scope {
            Scope::Document(record.document_uri.clone())
        } else {
            Scope::Global
        };
        groups
            .entry((
                record.schema_id.clone(),
                record.kind,
                record.site.clone(),
                scope,
            ))
            .or_default()
            .entry(record.tuple.clone())
            .or_default()
            .push((record.document_uri.clone(), record.location.clone()));
    }

    for ((schema_id, kind, site, scope), tuples) in &groups {
        for (tuple, occurrences) in tuples {
            let mut occurrences = occurrences.clone();
            occurrences.sort();

            let mut unlocated = 0;
            if *kind == ExtensionKind::PrimaryKey && *scope == Scope::Global {
                let registry = RegistryKey::new(
                    schema_id.clone(),
                    match site {
                        SiteKey::Named(name) => Some(name.clone()),
                        SiteKey::Anonymous(_) => None,
                    },
                );
                let allow = decls
                    .get(&registry)
                    .is_some_and(|d| d.allow_provider_duplicates);
                if let Some(counts) = external.get(&registry).and_then(|m| m.get(tuple)) {
                    unlocated = counts.inline + if allow { 0 } else { counts.provider };
                }
            }

            if occurrences.len() + unlocated < 2 {
                continue;
            }

            let offending: Vec<OffendingLocation> = occurrences
                .iter()
                .map(|(uri, loc)| OffendingLocation {
                    document_uri: uri.clone(),
                    path: loc.pointer(),
                })
                .collect();
            let skip = usize::from(unlocated == 0);
            for (uri, location) in occurrences.iter().skip(skip) {
                errors.push(KeylintDiagnostic::Uniqueness {
                    uri: uri.clone(),
                    schema_id: schema_id.clone(),
                    path: location.pointer(),
                    tuple: tuple.to_string(),
                    offending_locations: offending.clone(),
                });
            }
        }
    }
}

/// Foreign-key and join-key resolution against the registries. In lazy
/// mode, provider feeds load here on the first demand for a registry.
#[allow(clippy::too_many_arguments)]
async fn resolve_references(
    ref_records: &[RefRecord],
    decls: &BTreeMap<RegistryKey, EffectiveDecl>,
    cache: &KeyCache,
    fetcher: &ProviderFetcher,
    mode: CacheMode,
    providers_loaded: &mut BTreeSet<RegistryKey>,
    pk_index: &mut PkIndex,
    idx_index: &TupleIndex,
    errors: &mut Vec<KeylintDiagnostic>,
) -> Result<()> {
    for record in ref_records {
        let target_schema = record
            .target_schema
            .clone()
            .unwrap_or_else(|| record.schema_id.clone());
        let key = RegistryKey::new(target_schema.clone(), record.refers_to.clone());

        let outcome = match record.kind {
            ExtensionKind::ForeignKey => {
                if mode == CacheMode::LazyLoad
                    && !providers_loaded.contains(&key)
                    && let Some(decl) = decls.get(&key)
                {
                    providers_loaded.insert(key.clone());
                    let mut external = ExternalMap::new();
                    load_providers_upfront(
                        &BTreeMap::from([(key.clone(), decl.clone())]),
                        cache,
                        fetcher,
                        mode,
                        pk_index,
                        &mut external,
                        errors,
                    )
                    .await?;
                }
                pk_index.resolve(&key, &record.tuple)
            }
            ExtensionKind::JoinKey => idx_index.resolve(&key, &record.tuple),
            _ => continue,
        };

        match outcome {
            ReferenceOutcome::Found => {}
            ReferenceOutcome::UnresolvedTarget => {
                errors.push(KeylintDiagnostic::UnresolvedReference {
                    uri: record.document_uri.clone(),
                    schema_id: record.schema_id.clone(),
                    path: record.location.pointer(),
                    referenced: ReferencedKey {
                        schema_id: target_schema,
                        name: record.refers_to.clone(),
                        tuple: None,
                    },
                });
            }
            ReferenceOutcome::Missing => {
                let referenced = ReferencedKey {
                    schema_id: target_schema,
                    name: record.refers_to.clone(),
                    tuple: Some(record.tuple.to_values()),
                };
                let diagnostic = if record.kind == ExtensionKind::ForeignKey {
                    KeylintDiagnostic::DanglingForeignKey {
                        uri: record.document_uri.clone(),
                        schema_id: record.schema_id.clone(),
                        path: record.location.pointer(),
                        tuple: record.tuple.to_string(),
                        referenced,
                    }
                } else {
                    KeylintDiagnostic::DanglingJoinKey {
                        uri: record.document_uri.clone(),
                        schema_id: record.schema_id.clone(),
                        path: record.location.pointer(),
                        tuple: record.tuple.to_string(),
                        referenced,
                    }
                };
                errors.push(diagnostic);
            }
        }
    }
    Ok(())
}

/// Sort diagnostics deterministically; under fail-fast, keep only the
/// first error (warnings before it are dropped with it).
fn finalize(
    mut errors: Vec<KeylintDiagnostic>,
    checked: Vec<CheckedDocument>,
    continue_on_error: bool,
) -> CheckResult {
    errors.sort_by(|a, b| {
        a.uri()
            .cmp(b.uri())
            .then_with(|| a.path().cmp(b.path()))
    });
    if !continue_on_error
        && let Some(pos) = errors.iter().position(KeylintDiagnostic::is_error)
    {
        let first = errors.remove(pos);
        return CheckResult {
            errors: vec![first],
            checked,
        };
    }
    CheckResult { errors, checked }
}
