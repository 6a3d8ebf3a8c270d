//! `backfill run` and `backfill validate`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::LevelFilter;

use backfill_io::SqliteStore;
use backfill_recon::config::resolve_path;
use backfill_recon::progress::format_time;
use backfill_recon::{run, ImportConfig, ImportError, RunOptions, RunSummary};
use backfill_search::OpenSearchClient;

use crate::run_log::{FlushGuard, RunLog};
use crate::CliError;

/// Used when neither the command line, the environment nor the config names a node.
pub const DEFAULT_SEARCH_NODE: &str = "http://localhost:9200";

pub struct RunArgs {
    pub config: PathBuf,
    pub store: Option<PathBuf>,
    pub search_node: Option<String>,
    pub log_file: PathBuf,
    pub dry_run: bool,
    pub verbose: bool,
}

fn load_config(path: &Path) -> Result<ImportConfig, CliError> {
    ImportConfig::from_file(path).map_err(|e| match e {
        ImportError::Io(msg) => CliError::usage(format!("cannot read config: {msg}")),
        other => CliError::import(other),
    })
}

/// Directory config-relative paths resolve against.
fn config_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

// ============================================================================
// validate
// ============================================================================

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    println!("OK: {}", config_path.display());
    if !config.name.is_empty() {
        println!("  name:       {}", config.name);
    }
    println!("  comments:   {}", config.source.comments);
    println!("  authors:    {}", config.source.authors);
    println!("  index:      {}", config.search.index);
    println!("  batch size: {}", config.import.batch_size);
    if !config.import.enabled {
        println!("  importing is disabled; runs will only derive and plan");
    }
    Ok(())
}

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let run_log = RunLog::install(level).map_err(|e| CliError::general(format!("cannot install logger: {e}")))?;
    let guard = FlushGuard::new(run_log, args.log_file.clone());

    let started = Instant::now();
    let result = execute(&args);
    match &result {
        Ok(()) => log::info!("Finished in {}", format_time(started.elapsed())),
        Err(e) => log::error!("{}", e.message),
    }
    guard.flush();

    result.map_err(CliError::reported)
}

fn execute(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let base_dir = config_dir(&args.config);
    log::info!("Loaded import config {}", args.config.display());

    let store_path = match (&args.store, &config.store.path) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => resolve_path(base_dir, path),
        (None, None) => {
            return Err(CliError::usage("no store database given")
                .with_hint("pass --store, set BACKFILL_STORE, or set store.path in the config"))
        }
    };
    let node = args
        .search_node
        .clone()
        .or_else(|| config.search.node.clone())
        .unwrap_or_else(|| DEFAULT_SEARCH_NODE.to_string());

    let store = SqliteStore::open(&store_path).map_err(|e| CliError::import(e.into()))?;
    log::info!("Opened store {}", store_path.display());
    let search = OpenSearchClient::new(&node).map_err(|e| CliError::import(e.into()))?;
    log::debug!("Search node {}", search.base_url());

    let summary = run(
        &config,
        base_dir,
        &store,
        &search,
        RunOptions { dry_run: args.dry_run },
    )
    .map_err(CliError::import)?;

    report(&summary)
}

fn report(summary: &RunSummary) -> Result<(), CliError> {
    log::info!("----------------------------------------");
    log::info!(
        "{} record(s) read, {} line(s) quarantined",
        summary.records,
        summary.quarantined
    );
    log::info!(
        "Planned {} insert(s), {} update(s), {} skip(s)",
        summary.planned_inserts,
        summary.planned_updates,
        summary.skipped.len()
    );

    match &summary.sink {
        Some(sink) => {
            if sink.failed_insert_batches + sink.failed_update_batches > 0 {
                log::warn!(
                    "{} insert batch(es) and {} update batch(es) failed; see errors above",
                    sink.failed_insert_batches,
                    sink.failed_update_batches
                );
            }
        }
        None => {
            // Nothing written: hand the preview to stdout for inspection
            if let Some(preview) = &summary.preview {
                let pretty = serde_json::to_string_pretty(preview)
                    .map_err(|e| CliError::general(format!("cannot render preview: {e}")))?;
                println!("{pretty}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_defaults_to_cwd() {
        assert_eq!(config_dir(Path::new("import.toml")), Path::new("."));
        assert_eq!(config_dir(Path::new("conf/import.toml")), Path::new("conf"));
    }

    #[test]
    fn unreadable_config_is_a_usage_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert_eq!(err.code, crate::exit_codes::EXIT_USAGE);
    }
}
