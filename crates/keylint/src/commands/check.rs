use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use bpaf::{Bpaf, ShellComp};

use keylint_core::engine::{self, RunArgs};
use keylint_diagnostics::Reporter;
use keylint_key_cache::CacheMode;

#[derive(Debug, Clone, Bpaf)]
pub struct CacheOptions {
    /// Key cache directory
    #[bpaf(long("cache-dir"), argument("DIR"))]
    pub cache_dir: Option<PathBuf>,

    /// Purge the key cache, then rebuild from providers and instances
    #[bpaf(long("invalidate"), switch)]
    pub invalidate: bool,

    /// Use the key cache as-is; never fetch, never write
    #[bpaf(long("read-only"), switch)]
    pub read_only: bool,

    /// Fetch all provider feeds before validation
    #[bpaf(long("warm-up"), switch)]
    pub warm_up: bool,
}

impl CacheOptions {
    pub fn mode(&self) -> CacheMode {
        if self.invalidate {
            CacheMode::Invalidate
        } else if self.read_only {
            CacheMode::ReadOnly
        } else if self.warm_up {
            CacheMode::WarmUp
        } else {
            CacheMode::LazyLoad
        }
    }
}

#[derive(Debug, Clone, Bpaf)]
pub struct CheckArgs {
    /// Schema file, directory, or glob (repeatable)
    #[bpaf(long("schema"), short('s'), argument("PATH"))]
    pub schemas: Vec<String>,

    /// Configuration file (default: nearest keylint.yaml)
    #[bpaf(long("config"), argument("PATH"))]
    pub config: Option<PathBuf>,

    /// Restrict pairing to this schema id (repeatable)
    #[bpaf(long("use-schema"), argument("ID"))]
    pub use_schemas: Vec<String>,

    /// Pair undeclared instances by trial validation
    #[bpaf(long("guess-schema"), switch)]
    pub guess_schema: bool,

    /// Accumulate all errors instead of stopping at the first
    #[bpaf(long("continue-on-error"), switch)]
    pub continue_on_error: bool,

    /// Exclude instance files matching PATTERN (repeatable)
    #[bpaf(long("exclude"), argument("PATTERN"))]
    pub exclude: Vec<String>,

    #[bpaf(external(cache_options))]
    pub cache: CacheOptions,

    /// Instance files, directories, or globs
    #[bpaf(positional("PATH"), complete_shell(ShellComp::File { mask: None }))]
    pub instances: Vec<String>,
}

/// Locate and load the configuration: an explicit `--config` path, or the
/// nearest `keylint.yaml` above the first instance directory (falling back
/// to the working directory).
fn load_config(args: &CheckArgs) -> keylint_config::Config {
    if let Some(path) = &args.config {
        match keylint_config::load_file(path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                eprintln!("warning: {e}");
                return keylint_config::Config::default();
            }
        }
    }

    let search_dir = args
        .instances
        .iter()
        .find(|p| Path::new(p).is_dir())
        .map(PathBuf::from);
    let found = match &search_dir {
        Some(dir) => keylint_config::find_and_load(dir),
        None => keylint_config::load(),
    };
    match found {
        Ok(cfg) => cfg.unwrap_or_default(),
        Err(e) => {
            eprintln!("warning: failed to load keylint.yaml: {e}");
            keylint_config::Config::default()
        }
    }
}

/// Merge CLI flags over the configuration file into engine inputs.
fn to_run_args(args: &CheckArgs, config: keylint_config::Config) -> RunArgs {
    // Config excludes first, then CLI excludes.
    let mut exclude = config.exclude;
    exclude.extend(args.exclude.iter().cloned());

    RunArgs {
        schema_paths: args.schemas.clone(),
        instance_paths: args.instances.clone(),
        exclude,
        use_schemas: args.use_schemas.clone(),
        guess_schema: args.guess_schema,
        schema_id_path: config.schema_id_path,
        continue_on_error: args.continue_on_error || config.continue_on_error,
        cache_mode: args.cache.mode(),
        cache_dir: args.cache.cache_dir.clone().or(config.cache_dir),
        primary_key: config.primary_key,
    }
}

/// Run validation and report results via the given reporter.
///
/// Returns `true` if there were validation errors, `false` if clean.
///
/// # Errors
///
/// Returns an error on internal failure (loader, cache, provider transport).
pub async fn run(args: &CheckArgs, reporter: &mut dyn Reporter) -> Result<bool> {
    let config = load_config(args);
    let run_args = to_run_args(args, config);

    let start = Instant::now();
    let result = engine::run_with(&run_args, None, |doc| {
        reporter.on_document_checked(doc);
    })
    .await?;
    let had_errors = result.has_errors();
    let elapsed = start.elapsed();

    reporter.report(result, elapsed);

    Ok(had_errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CheckArgs {
        CheckArgs {
            schemas: vec![],
            config: None,
            use_schemas: vec![],
            guess_schema: false,
            continue_on_error: false,
            exclude: vec!["cli/**".to_string()],
            cache: CacheOptions {
                cache_dir: None,
                invalidate: false,
                read_only: false,
                warm_up: false,
            },
            instances: vec![],
        }
    }

    #[test]
    fn config_excludes_come_first() {
        let config = keylint_config::Config::from_yaml("exclude: [\"vendor/**\"]\n")
            .expect("config parses");
        let run_args = to_run_args(&base_args(), config);
        assert_eq!(run_args.exclude, vec!["vendor/**", "cli/**"]);
    }

    #[test]
    fn config_continue_on_error_applies() {
        let config = keylint_config::Config::from_yaml("continue_on_error: true\n")
            .expect("config parses");
        let run_args = to_run_args(&base_args(), config);
        assert!(run_args.continue_on_error);
    }

    #[test]
    fn cli_cache_dir_wins_over_config() {
        let config = keylint_config::Config::from_yaml("cache_dir: /from/config\n")
            .expect("config parses");
        let mut args = base_args();
        args.cache.cache_dir = Some(PathBuf::from("/from/cli"));
        let run_args = to_run_args(&args, config);
        assert_eq!(run_args.cache_dir.as_deref(), Some(Path::new("/from/cli")));
    }

    #[test]
    fn explicit_config_file_is_loaded() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("keylint.yaml");
        std::fs::write(&path, "continue_on_error: true\n")?;
        let mut args = base_args();
        args.config = Some(path);
        let config = load_config(&args);
        assert!(config.continue_on_error);
        Ok(())
    }
}
