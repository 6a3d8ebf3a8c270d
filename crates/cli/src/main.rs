//! `backfill`: import legacy comment exports into the store and the
//! search index.

mod exit_codes;
mod import;
mod run_log;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use backfill_recon::ImportError;
use exit_codes::*;

#[derive(Parser)]
#[command(name = "backfill")]
#[command(about = "Backfill legacy comments into the store and the search index")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an import from a TOML config file
    #[command(after_help = "\
Examples:
  backfill run import.toml --store site.sqlite3
  backfill run import.toml --search-node http://search:9200 --dry-run
  BACKFILL_STORE=site.sqlite3 backfill run import.toml --verbose")]
    Run {
        /// Path to the import config
        config: PathBuf,

        /// SQLite database to import into (overrides store.path)
        #[arg(long, env = "BACKFILL_STORE")]
        store: Option<PathBuf>,

        /// Search node URL (overrides search.node)
        #[arg(long, env = "BACKFILL_SEARCH_NODE")]
        search_node: Option<String>,

        /// Where the run log is written
        #[arg(long, default_value = run_log::DEFAULT_LOG_FILE)]
        log_file: PathBuf,

        /// Derive and plan, but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Log debug lines too
        #[arg(long, short)]
        verbose: bool,
    },

    /// Parse and validate an import config without running it
    #[command(after_help = "\
Examples:
  backfill validate import.toml")]
    Validate {
        /// Path to the import config
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "\nbuild:   debug")
    } else {
        concat!(env!("CARGO_PKG_VERSION"), "\nbuild:   release")
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            store,
            search_node,
            log_file,
            dry_run,
            verbose,
        } => import::cmd_run(import::RunArgs {
            config,
            store,
            search_node,
            log_file,
            dry_run,
            verbose,
        }),
        Commands::Validate { config } => import::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Map an import failure to its exit code, with a hint where one helps.
    pub fn import(err: ImportError) -> Self {
        let (code, hint) = match &err {
            ImportError::ConfigParse(_) | ImportError::ConfigValidation(_) => (EXIT_INVALID_CONFIG, None),
            ImportError::Io(_) => (EXIT_USAGE, None),
            ImportError::MissingTable(_) => (
                EXIT_SETUP,
                Some("check the store.*_table names in the config against the database"),
            ),
            ImportError::IndexUnavailable { .. } => (
                EXIT_SETUP,
                Some("check that the search node is reachable and the index exists and is open"),
            ),
            e if e.is_setup() => (EXIT_SETUP, Some("check --store / BACKFILL_STORE points to an existing database")),
            ImportError::Csv(_) => (
                EXIT_CSV,
                Some("fix or remove the reported line in the CSV export and rerun"),
            ),
            _ => (EXIT_RUN_FAILURE, None),
        };
        Self { code, message: err.to_string(), hint: hint.map(String::from) }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Same code and hint; the message already went to the run log.
    pub fn reported(self) -> Self {
        Self { message: String::new(), ..self }
    }
}
