#![doc = include_str!("../README.md")]

use std::process::ExitCode;

use bpaf::Bpaf;
use tracing_subscriber::prelude::*;

use keylint_reporters::{ReporterKind, make_reporter};

mod commands;

use commands::check::{CheckArgs, check_args};
use commands::sites::{SitesArgs, sites_args};

// -----------------------------------------------------------------------
// Global options
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl core::str::FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            _ => Err(format!(
                "unknown log level '{s}', expected: error, warn, info, debug"
            )),
        }
    }
}

#[derive(Debug, Clone, Bpaf)]
pub struct GlobalOptions {
    /// Print each document as it is checked
    #[bpaf(long("verbose"), short('v'), switch)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug)
    #[bpaf(long("log-level"), argument("LEVEL"))]
    pub log_level: Option<LogLevel>,
}

// -----------------------------------------------------------------------
// Command tree
// -----------------------------------------------------------------------

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version, fallback_to_usage, generate(cli))]
/// Validate JSON and YAML corpora against JSON Schema with cross-document
/// relational constraints
struct Cli {
    #[bpaf(external(commands))]
    command: Commands,
}

#[derive(Debug, Clone, Bpaf)]
enum Commands {
    #[bpaf(command("check"))]
    /// Validate instance documents and their cross-document keys
    Check(
        #[bpaf(external(global_options), hide_usage)] GlobalOptions,
        /// Output format
        #[bpaf(long("reporter"), argument("text|json"), fallback(ReporterKind::Text))]
        ReporterKind,
        #[bpaf(external(check_args))] CheckArgs,
    ),

    #[bpaf(command("sites"))]
    /// Show the extension sites discovered in the given schemas
    Sites(
        #[bpaf(external(global_options), hide_usage)] GlobalOptions,
        #[bpaf(external(sites_args))] SitesArgs,
    ),

    #[bpaf(command("cache"), fallback_to_usage)]
    /// Inspect or purge the persistent key cache
    Cache(
        #[bpaf(external(global_options), hide_usage)] GlobalOptions,
        #[bpaf(external(commands::cache::cache_command))] commands::cache::CacheCommand,
    ),

    #[bpaf(command("version"))]
    /// Print version information
    Version,

    #[bpaf(command("man"), hide)]
    /// Generate man page in roff format
    Man,
}

/// Set up tracing from the CLI `--log-level` flag, falling back to the
/// `KEYLINT_LOG` env filter.
fn setup_tracing(global: &GlobalOptions) {
    let filter = match global.log_level {
        None => match tracing_subscriber::EnvFilter::try_from_env("KEYLINT_LOG") {
            Ok(f) => f,
            Err(_) => return,
        },
        Some(LogLevel::Error) => tracing_subscriber::EnvFilter::new("error"),
        Some(LogLevel::Warn) => tracing_subscriber::EnvFilter::new("warn"),
        Some(LogLevel::Info) => tracing_subscriber::EnvFilter::new("info"),
        Some(LogLevel::Debug) => tracing_subscriber::EnvFilter::new("debug"),
    };

    tracing_subscriber::registry()
        .with(
            tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true)
                .with_indent_lines(true)
                .with_timer(tracing_tree::time::Uptime::default())
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn setup_miette() {
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = cli().run();

    let result = match opts.command {
        Commands::Check(global, reporter_kind, args) => {
            setup_tracing(&global);
            setup_miette();
            let mut reporter = make_reporter(reporter_kind, global.verbose);
            commands::check::run(&args, reporter.as_mut()).await
        }
        Commands::Sites(global, args) => {
            setup_tracing(&global);
            setup_miette();
            commands::sites::run(&args).await
        }
        Commands::Cache(global, cmd) => {
            setup_tracing(&global);
            commands::cache::run(&cmd)
        }
        Commands::Version => {
            println!("keylint {}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Commands::Man => {
            let roff = cli().render_manpage(
                "keylint",
                bpaf::doc::Section::General,
                None,
                None,
                Some("Keylint Manual"),
            );
            print!("{roff}");
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(had_errors) => {
            if had_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylint_key_cache::CacheMode;

    #[test]
    fn cli_parses_check_basic_args() -> anyhow::Result<()> {
        let cli = cli()
            .run_inner(&["check", "--schema", "schemas/", "instances/"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match cli.command {
            Commands::Check(_, _, args) => {
                assert_eq!(args.schemas, vec!["schemas/"]);
                assert_eq!(args.instances, vec!["instances/"]);
                assert!(!args.guess_schema);
                assert!(!args.continue_on_error);
                assert_eq!(args.cache.mode(), CacheMode::LazyLoad);
            }
            _ => panic!("expected Check"),
        }
        Ok(())
    }

    #[test]
    fn cli_parses_check_all_options() -> anyhow::Result<()> {
        let cli = cli()
            .run_inner(&[
                "check",
                "--schema",
                "schemas/",
                "--use-schema",
                "https://schemas.example.com/S1/1.0",
                "--guess-schema",
                "--continue-on-error",
                "--exclude",
                "vendor/**",
                "--cache-dir",
                "/tmp/keys",
                "--warm-up",
                "a.json",
                "b.yaml",
            ])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match cli.command {
            Commands::Check(_, _, args) => {
                assert_eq!(
                    args.use_schemas,
                    vec!["https://schemas.example.com/S1/1.0"]
                );
                assert!(args.guess_schema);
                assert!(args.continue_on_error);
                assert_eq!(args.exclude, vec!["vendor/**"]);
                assert_eq!(
                    args.cache.cache_dir.as_deref(),
                    Some(std::path::Path::new("/tmp/keys"))
                );
                assert_eq!(args.cache.mode(), CacheMode::WarmUp);
                assert_eq!(args.instances, vec!["a.json", "b.yaml"]);
            }
            _ => panic!("expected Check"),
        }
        Ok(())
    }

    #[test]
    fn cli_invalidate_wins_over_warm_up() -> anyhow::Result<()> {
        let cli = cli()
            .run_inner(&["check", "--invalidate", "--warm-up"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match cli.command {
            Commands::Check(_, _, args) => {
                assert_eq!(args.cache.mode(), CacheMode::Invalidate);
            }
            _ => panic!("expected Check"),
        }
        Ok(())
    }

    #[test]
    fn cli_check_default_reporter_is_text() -> anyhow::Result<()> {
        let parsed = cli()
            .run_inner(&["check"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match parsed.command {
            Commands::Check(_, reporter_kind, _) => {
                assert_eq!(reporter_kind, ReporterKind::Text);
            }
            _ => panic!("expected Check"),
        }
        Ok(())
    }

    #[test]
    fn cli_check_reporter_json() -> anyhow::Result<()> {
        let parsed = cli()
            .run_inner(&["check", "--reporter", "json"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match parsed.command {
            Commands::Check(_, reporter_kind, _) => {
                assert_eq!(reporter_kind, ReporterKind::Json);
            }
            _ => panic!("expected Check"),
        }
        Ok(())
    }

    #[test]
    fn cli_parses_sites() -> anyhow::Result<()> {
        let parsed = cli()
            .run_inner(&["sites", "schemas/s1.json"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        match parsed.command {
            Commands::Sites(_, args) => {
                assert_eq!(args.schemas, vec!["schemas/s1.json"]);
            }
            _ => panic!("expected Sites"),
        }
        Ok(())
    }

    #[test]
    fn cli_parses_cache_clear() -> anyhow::Result<()> {
        let parsed = cli()
            .run_inner(&["cache", "clear"])
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        assert!(matches!(
            parsed.command,
            Commands::Cache(_, commands::cache::CacheCommand::Clear { .. })
        ));
        Ok(())
    }
}
