//! The document store: loaded schemas keyed by schema id and instance
//! documents keyed by source path. Read-only once loading finishes.

use alloc::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use serde_json::Value;

use keylint_diagnostics::KeylintDiagnostic;

/// Conservative limit for concurrent file reads to avoid exhausting file
/// descriptors. 128 is well below the default soft limit on macOS (256)
/// and Linux (1024) while still providing good throughput.
const FD_CONCURRENCY_LIMIT: usize = 128;

/// A loaded schema.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    /// `$id` when present, the source path otherwise. Unique within a run.
    pub id: String,
    pub source_uri: String,
    pub value: Value,
}

/// A loaded instance document.
#[derive(Debug, Clone)]
pub struct InstanceDocument {
    pub source_uri: String,
    pub value: Value,
}

/// Schemas and instances for one validation run.
#[derive(Debug, Default)]
pub struct DocumentStore {
    schemas: BTreeMap<String, SchemaDocument>,
    instances: Vec<InstanceDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schemas in id order.
    pub fn schemas(&self) -> impl Iterator<Item = &SchemaDocument> {
        self.schemas.values()
    }

    pub fn schema(&self, id: &str) -> Option<&SchemaDocument> {
        self.schemas.get(id)
    }

    pub fn schema_ids(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Instances in source order.
    pub fn instances(&self) -> &[InstanceDocument] {
        &self.instances
    }

    /// Register a schema, deriving its id from `$id` or the source path.
    ///
    /// # Errors
    ///
    /// Returns the conflicting id when it is already taken.
    pub fn insert_schema(&mut self, source_uri: &str, value: Value) -> Result<String, String> {
        let id = value
            .get("$id")
            .and_then(Value::as_str)
            .map_or_else(|| source_uri.to_string(), str::to_string);
        if self.schemas.contains_key(&id) {
            return Err(id);
        }
        self.schemas.insert(
            id.clone(),
            SchemaDocument {
                id: id.clone(),
                source_uri: source_uri.to_string(),
                value,
            },
        );
        Ok(id)
    }

    pub fn insert_instance(&mut self, source_uri: &str, value: Value) {
        self.instances.push(InstanceDocument {
            source_uri: source_uri.to_string(),
            value,
        });
    }

    /// A `$ref` retriever serving from the loaded schema set.
    pub fn retriever(&self) -> StoreRetriever {
        StoreRetriever {
            schemas: self
                .schemas
                .iter()
                .map(|(id, doc)| (id.clone(), doc.value.clone()))
                .collect(),
        }
    }

    /// Load schemas and instances from the given paths (directories, files,
    /// or glob patterns).
    ///
    /// Per-document failures become diagnostics; only I/O-level failures of
    /// the collection itself (e.g. an invalid glob) abort.
    ///
    /// # Errors
    ///
    /// Returns an error when file collection fails.
    #[tracing::instrument(skip_all, fields(schema_patterns = schema_paths.len(), instance_patterns = instance_paths.len()))]
    pub async fn load(
        schema_paths: &[String],
        instance_paths: &[String],
        excludes: &[String],
    ) -> Result<(Self, Vec<KeylintDiagnostic>)> {
        let mut store = Self::new();
        let mut errors = Vec::new();

        let schema_files = collect_files(schema_paths, excludes)?;
        tracing::info!(count = schema_files.len(), "collected schema files");
        for (path, parsed) in read_and_parse(&schema_files).await {
            match parsed {
                Ok(value) => {
                    if let Err(taken) = store.insert_schema(&path, value) {
                        errors.push(KeylintDiagnostic::SchemaLoad {
                            uri: path,
                            message: format!("schema id `{taken}` is already loaded"),
                        });
                    }
                }
                Err(message) => {
                    errors.push(KeylintDiagnostic::SchemaLoad { uri: path, message });
                }
            }
        }

        let instance_files = collect_files(instance_paths, excludes)?;
        tracing::info!(count = instance_files.len(), "collected instance files");
        for (path, parsed) in read_and_parse(&instance_files).await {
            match parsed {
                Ok(value) => store.insert_instance(&path, value),
                Err(message) => {
                    errors.push(KeylintDiagnostic::InstanceLoad { uri: path, message });
                }
            }
        }

        Ok((store, errors))
    }
}

/// Serves `$ref` targets to the `jsonschema` crate from the loaded set.
pub struct StoreRetriever {
    schemas: BTreeMap<String, Value>,
}

impl jsonschema::Retrieve for StoreRetriever {
    fn retrieve(
        &self,
        uri: &jsonschema::Uri<String>,
    ) -> Result<Value, Box<dyn core::error::Error + Send + Sync>> {
        let key = uri.as_str().trim_end_matches('#');
        match self.schemas.get(key) {
            Some(value) => Ok(value.clone()),
            None => Err(format!("schema not loaded: {key}").into()),
        }
    }
}

/// Collect input files from paths: directories are walked recursively,
/// plain files taken as-is, anything else treated as a glob pattern.
///
/// # Errors
///
/// Returns an error if a glob pattern is invalid or a directory walk fails.
pub fn collect_files(patterns: &[String], excludes: &[String]) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        if path.is_dir() {
            result.extend(discover_files(pattern, excludes)?);
        } else if path.is_file() {
            if !is_excluded(path, excludes) {
                result.push(path.to_path_buf());
            }
        } else {
            for entry in glob(pattern).with_context(|| format!("invalid glob: {pattern}"))? {
                let path = entry?;
                if path.is_file() && !is_excluded(&path, excludes) {
                    result.push(path);
                }
            }
        }
    }
    result.sort();
    result.dedup();
    Ok(result)
}

/// Walk `root` respecting `.gitignore`, returning files with known
/// document extensions.
fn discover_files(root: &str, excludes: &[String]) -> Result<Vec<PathBuf>> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if !has_known_extension(path) {
            continue;
        }
        if is_excluded(path, excludes) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn has_known_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml")
    )
}

fn is_excluded(path: &Path, excludes: &[String]) -> bool {
    let path_str = match path.to_str() {
        Some(s) => s.strip_prefix("./").unwrap_or(s),
        None => return false,
    };
    excludes
        .iter()
        .any(|pattern| glob_match::glob_match(pattern, path_str))
}

/// Read files concurrently, then parse in sorted order so diagnostics are
/// deterministic. Each entry is `(path, Ok(value) | Err(message))`.
#[tracing::instrument(skip_all, fields(file_count = files.len()))]
async fn read_and_parse(files: &[PathBuf]) -> Vec<(String, Result<Value, String>)> {
    let semaphore = alloc::sync::Arc::new(tokio::sync::Semaphore::new(FD_CONCURRENCY_LIMIT));
    let mut read_set = tokio::task::JoinSet::new();
    for path in files {
        let path = path.clone();
        let sem = semaphore.clone();
        read_set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            let result = tokio::fs::read_to_string(&path).await;
            (path, result)
        });
    }

    let mut contents: Vec<(PathBuf, Result<String, String>)> = Vec::with_capacity(files.len());
    while let Some(joined) = read_set.join_next().await {
        match joined {
            Ok((path, Ok(content))) => contents.push((path, Ok(content))),
            Ok((path, Err(e))) => contents.push((path, Err(format!("failed to read: {e}")))),
            Err(e) => tracing::warn!("file read task panicked: {e}"),
        }
    }
    contents.sort_by(|(a, _), (b, _)| a.cmp(b));

    contents
        .into_iter()
        .map(|(path, content)| {
            let display = path.display().to_string();
            let parsed = content.and_then(|text| parse_document(&path, &text));
            (display, parsed)
        })
        .collect()
}

/// Parse file content by extension into a JSON value.
fn parse_document(path: &Path, content: &str) -> Result<Value, String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => {
            // Strip UTF-8 BOM characters that serde_yaml misinterprets as a
            // multi-document separator.
            let clean: alloc::borrow::Cow<'_, str> = if content.contains('\u{FEFF}') {
                content.replace('\u{FEFF}', "").into()
            } else {
                content.into()
            };
            serde_yaml::from_str(&clean).map_err(|e| e.to_string())
        }
        _ => serde_json::from_str(content).map_err(|e| e.to_string()),
    }
}
