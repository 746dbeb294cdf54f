use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::Bpaf;

use keylint_key_cache::{KeyCache, ensure_cache_dir};

#[derive(Debug, Clone, Bpaf)]
pub enum CacheCommand {
    #[bpaf(command("dir"))]
    /// Print the key cache directory
    Dir {
        /// Key cache directory override
        #[bpaf(long("cache-dir"), argument("DIR"))]
        cache_dir: Option<PathBuf>,
    },

    #[bpaf(command("clear"))]
    /// Remove every cached key entry
    Clear {
        /// Key cache directory override
        #[bpaf(long("cache-dir"), argument("DIR"))]
        cache_dir: Option<PathBuf>,
    },
}

/// # Errors
///
/// Returns an error when the cache directory cannot be cleared.
pub fn run(cmd: &CacheCommand) -> Result<bool> {
    match cmd {
        CacheCommand::Dir { cache_dir } => {
            let dir = cache_dir.clone().unwrap_or_else(ensure_cache_dir);
            println!("{}", dir.display());
        }
        CacheCommand::Clear { cache_dir } => {
            let dir = cache_dir.clone().unwrap_or_else(ensure_cache_dir);
            let cache = KeyCache::new(dir.clone(), false);
            cache
                .purge()
                .with_context(|| format!("failed to clear {}", dir.display()))?;
            println!("cleared {}", dir.display());
        }
    }
    Ok(false)
}
