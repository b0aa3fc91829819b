//! Command-line surface: parses arguments, loads the schema, and drives the
//! orchestrator, turning any error into a log line and a non-zero exit code.

use std::path::PathBuf;

use clap::Parser;

use crate::orchestrator::{self, MergeConfig};
use crate::progress::ConsoleReporter;
use crate::schema_file;

/// Merge N SQLite databases that share a schema into one, preserving
/// referential integrity.
#[derive(Debug, Parser)]
#[command(name = "mergedb", version, about)]
pub struct Cli {
    /// Source database files to merge, in the order they should be
    /// considered (the primary source per model is still picked by row
    /// count, not by this order).
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Path to the JSON schema file describing every model.
    #[arg(long)]
    pub schema: PathBuf,

    /// Where to write the merged database. Must not already exist.
    #[arg(long, default_value = "./merged.db")]
    pub output_path: PathBuf,

    /// Delete the output path first if it already exists, instead of
    /// failing because the destination must not already exist.
    #[arg(long)]
    pub remove: bool,

    /// Rows buffered per model before a batch is committed.
    #[arg(long, default_value_t = 1000)]
    pub min_inserts: usize,

    /// Keep the `<Model>_id_map` tables in the output instead of dropping
    /// them once the merge finishes.
    #[arg(long)]
    pub keep_id_maps: bool,

    /// Increase log verbosity. Repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse arguments from the process environment and run the merge,
/// returning the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_cli(&cli) {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err:#}");
            1
        }
    }
}

fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    let schema = schema_file::load(&cli.schema)?;

    if cli.remove && cli.output_path.exists() {
        std::fs::remove_file(&cli.output_path).map_err(|e| {
            anyhow::anyhow!("failed to remove existing output {}: {e}", cli.output_path.display())
        })?;
    }

    let config = MergeConfig {
        min_inserts: cli.min_inserts,
        keep_id_maps: cli.keep_id_maps,
    };

    let mut reporter = ConsoleReporter::new();
    orchestrator::run(&cli.sources, &cli.output_path, &schema, &config, &mut reporter)?;

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}
