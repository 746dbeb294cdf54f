#![doc = include_str!("../README.md")]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Origin marker for tuples derived from the local instance corpus.
pub const LOCAL_ORIGIN: &str = "local";

/// How the cache participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Purge on startup, then rebuild from providers and local instances.
    Invalidate,
    /// Use cached entries as-is; never fetch, never write.
    ReadOnly,
    /// Fetch all missing provider entries before phase 1.
    WarmUp,
    /// Fetch provider entries on first demand in phase 2.
    #[default]
    LazyLoad,
}

impl core::str::FromStr for CacheMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalidate" => Ok(Self::Invalidate),
            "read-only" => Ok(Self::ReadOnly),
            "warm-up" => Ok(Self::WarmUp),
            "lazy" => Ok(Self::LazyLoad),
            _ => Err(format!(
                "unknown cache mode '{s}', expected: invalidate, read-only, warm-up, lazy"
            )),
        }
    }
}

impl core::fmt::Display for CacheMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Invalidate => f.write_str("invalidate"),
            Self::ReadOnly => f.write_str("read-only"),
            Self::WarmUp => f.write_str("warm-up"),
            Self::LazyLoad => f.write_str("lazy"),
        }
    }
}

/// Whether an entry was served from disk or had to be produced this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl core::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Hit => f.write_str("cached"),
            Self::Miss => f.write_str("rebuilt"),
        }
    }
}

/// Composite key for one cache entry: a primary-key declaration as seen
/// from one tuple source.
pub struct EntryKey<'a> {
    pub schema_id: &'a str,
    /// `None` for the anonymous primary key of a schema.
    pub pk_name: Option<&'a str>,
    /// Provider URL, or [`LOCAL_ORIGIN`] for tuples parsed from instances.
    pub origin: &'a str,
}

#[derive(Serialize, Deserialize)]
struct CachedEntry {
    schema_id: String,
    pk_name: Option<String>,
    origin: String,
    /// Unix seconds at store time. Freshness is recorded but never acted
    /// on automatically; invalidation is user-driven.
    stored_at: u64,
    tuples: Vec<Vec<Value>>,
}

/// A disk-backed tuple cache.
///
/// Entries are stored as `<cache_dir>/<hash>.json` where `<hash>` is a
/// SHA-256 hex digest of the composite key. The cache is single-writer
/// within a run; writes replace atomically so readers always see a
/// complete entry.
#[derive(Clone)]
pub struct KeyCache {
    cache_dir: PathBuf,
    read_only: bool,
}

impl KeyCache {
    pub fn new(cache_dir: PathBuf, read_only: bool) -> Self {
        Self {
            cache_dir,
            read_only,
        }
    }

    pub fn cache_dir(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// Look up the tuples cached for a key, or `None` on miss or when the
    /// entry cannot be decoded (a corrupt entry reads as a miss so a later
    /// store can replace it).
    pub async fn lookup(&self, key: &EntryKey<'_>) -> Option<Vec<Vec<Value>>> {
        let path = self.entry_path(key);
        let data = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<CachedEntry>(&data) {
            Ok(entry) => Some(entry.tuples),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                None
            }
        }
    }

    /// Store tuples for a key, replacing any prior entry atomically.
    ///
    /// A no-op in read-only mode.
    ///
    /// # Errors
    ///
    /// Returns an error when the entry cannot be written; callers treat
    /// this as fatal (a half-working cache corrupts later runs).
    pub async fn store(
        &self,
        key: &EntryKey<'_>,
        tuples: &[Vec<Value>],
    ) -> std::io::Result<()> {
        if self.read_only {
            return Ok(());
        }

        let entry = CachedEntry {
            schema_id: key.schema_id.to_string(),
            pk_name: key.pk_name.map(str::to_string),
            origin: key.origin.to_string(),
            stored_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            tuples: tuples.to_vec(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let path = self.entry_path(key);

        // Write-temp-then-rename keeps the entry atomic on the same filesystem.
        let dir = self.cache_dir.clone();
        let tmp = tokio::task::spawn_blocking(move || {
            let mut file = tempfile::NamedTempFile::new_in(dir)?;
            std::io::Write::write_all(&mut file, json.as_bytes())?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove every entry. A no-op when the directory does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing entry cannot be deleted.
    pub fn purge(&self) -> std::io::Result<()> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn entry_path(&self, key: &EntryKey<'_>) -> PathBuf {
        self.cache_dir.join(format!("{}.json", hash_key(key)))
    }
}

/// Compute the SHA-256 digest naming a cache entry.
///
/// The crate version is included so that upgrading keylint invalidates
/// entries written by an older layout.
pub fn hash_key(key: &EntryKey<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
    hasher.update([0]);
    hasher.update(key.schema_id.as_bytes());
    hasher.update([0]);
    hasher.update(key.pk_name.unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(key.origin.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Return a usable cache directory for key tuples, creating it if necessary.
///
/// Tries `<system_cache>/keylint/keys` first, falling back to
/// `<temp_dir>/keylint/keys` when the preferred path is unwritable.
pub fn ensure_cache_dir() -> PathBuf {
    let candidates = [
        dirs::cache_dir().map(|d| d.join("keylint").join("keys")),
        Some(std::env::temp_dir().join("keylint").join("keys")),
    ];
    for candidate in candidates.into_iter().flatten() {
        if std::fs::create_dir_all(&candidate).is_ok() {
            return candidate;
        }
    }
    std::env::temp_dir().join("keylint").join("keys")
}
