use anyhow::Result;
use bpaf::{Bpaf, ShellComp};

use keylint_core::store::DocumentStore;
use keylint_core::traverse::discover;

#[derive(Debug, Clone, Bpaf)]
pub struct SitesArgs {
    /// Schema files, directories, or globs
    #[bpaf(positional("PATH"), complete_shell(ShellComp::File { mask: None }))]
    pub schemas: Vec<String>,
}

/// Print the extension sites discovered in the given schemas.
///
/// Returns `true` when any schema failed to load or discover.
///
/// # Errors
///
/// Returns an error when file collection fails.
pub async fn run(args: &SitesArgs) -> Result<bool> {
    let (store, load_errors) = DocumentStore::load(&args.schemas, &[], &[]).await?;
    let mut had_errors = !load_errors.is_empty();
    for error in &load_errors {
        eprintln!("error: {error}");
    }

    for schema in store.schemas() {
        match discover(&schema.id, &schema.value) {
            Ok(discovery) => {
                println!("{} ({})", schema.id, schema.source_uri);
                if discovery.sites.is_empty() {
                    println!("  no extension sites");
                    continue;
                }
                for site in &discovery.sites {
                    let mut details = Vec::new();
                    if let Some(name) = &site.name {
                        details.push(format!("name={name}"));
                    }
                    if site.limit_scope {
                        details.push("limit_scope".to_string());
                    }
                    if let Some(target) = &site.target {
                        let schema_id = target.schema_id.as_deref().unwrap_or("<self>");
                        match &target.refers_to {
                            Some(name) => details.push(format!("-> {schema_id} ({name})")),
                            None => details.push(format!("-> {schema_id}")),
                        }
                    }
                    let suffix = if details.is_empty() {
                        String::new()
                    } else {
                        format!("  [{}]", details.join(", "))
                    };
                    println!("  {} at {}{suffix}", site.kind, site.host_path);
                }
            }
            Err(e) => {
                had_errors = true;
                eprintln!("error: {e}");
            }
        }
    }

    Ok(had_errors)
}
