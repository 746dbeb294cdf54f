#![doc = include_str!("../README.md")]

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

const CONFIG_FILENAME: &str = "keylint.yaml";

fn default_schema_id_path() -> Vec<String> {
    vec!["@schema".into(), "_schema".into(), "$schema".into()]
}

fn example_provider() -> Vec<String> {
    vec!["https://keys.example.com/registry/".into()]
}

fn example_exclude() -> Vec<String> {
    vec!["vendor/**".into(), "testdata/**".into()]
}

/// Primary-key provider settings.
///
/// Remote providers and inline providers may coexist; their tuples are
/// unioned into the primary-key registry with provider origin.
#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(title = "Primary Key Providers")]
pub struct PrimaryKeyConfig {
    /// Literal key tuples keyed by schema id.
    ///
    /// Each entry is either a scalar (a 1-tuple) or an array of scalars
    /// (a composite tuple).
    #[schemars(title = "Inline Providers")]
    #[serde(default)]
    pub inline_provider: IndexMap<String, Vec<Value>>,

    /// Remote URL prefixes serving primary-key feeds.
    ///
    /// For each schema id using a provider-backed primary key, the feed URL
    /// is `<provider><schema_id minus schema_prefix>`.
    #[schemars(title = "Provider URL Prefixes", example = example_provider())]
    #[serde(default)]
    pub provider: Vec<String>,

    /// Suppress uniqueness violations between provider-fed tuples and
    /// locally declared ones. Duplicates among local/inline tuples are
    /// still reported.
    #[serde(default)]
    pub allow_provider_duplicates: bool,

    /// Prefix stripped from schema ids before appending to a provider URL.
    /// Schema ids not carrying this prefix are appended verbatim.
    #[serde(default)]
    pub schema_prefix: Option<String>,

    /// `Accept` header sent to providers. Defaults to `text/uri-list`;
    /// `text/csv` feeds are also understood (first column per row).
    #[serde(default)]
    pub accept: Option<String>,
}

/// Configuration file for the Keylint cross-document validator.
///
/// Keylint looks for `keylint.yaml` next to the validated instances and in
/// parent directories, or at the path given with `--config`. The nearest
/// file wins; files are not merged.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(title = "keylint.yaml")]
pub struct Config {
    /// Primary-key provider settings.
    #[serde(default)]
    pub primary_key: PrimaryKeyConfig,

    /// Directory for the persistent key cache. Created if absent.
    /// Defaults to the user cache directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Instance members probed (in order) to extract the schema id of a
    /// document.
    #[schemars(title = "Schema Id Members")]
    #[serde(default = "default_schema_id_path")]
    pub schema_id_path: Vec<String>,

    /// Accumulate all validation errors instead of stopping at the first.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Glob patterns for instance files to exclude from validation.
    #[schemars(title = "Exclude Patterns", example = example_exclude())]
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Config {
    /// Parse a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error when the YAML is malformed or contains unknown fields.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Walk up from `start_dir` looking for `keylint.yaml`.
pub fn find_config_path(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(start_dir);
    while let Some(d) = dir {
        let candidate = d.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

/// Load the nearest `keylint.yaml` above `start_dir`.
///
/// Returns `Ok(None)` when no config file exists.
///
/// # Errors
///
/// Returns an error if a found file cannot be read or parsed.
pub fn find_and_load(start_dir: &Path) -> anyhow::Result<Option<Config>> {
    let Some(path) = find_config_path(start_dir) else {
        return Ok(None);
    };
    load_file(&path).map(Some)
}

/// Load a configuration file from an explicit path.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    Config::from_yaml(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Load the config from the current directory, if any.
///
/// # Errors
///
/// Returns an error if a found file cannot be read or parsed.
pub fn load() -> anyhow::Result<Option<Config>> {
    match std::env::current_dir() {
        Ok(cwd) => find_and_load(&cwd),
        Err(_) => Ok(None),
    }
}
