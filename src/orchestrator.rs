//! Top-level entry point: opens every database, clones the schema into the
//! destination, drives each model's merge in dependency order, then
//! verifies and tidies up.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::Connection;

use crate::identity_map;
use crate::merge_driver::{self, Source};
use crate::progress::ProgressReporter;
use crate::schema::Schema;
use crate::scheduler;

/// Knobs that don't belong to the schema itself.
pub struct MergeConfig {
    /// Row count the batcher buffers before flushing a transaction.
    pub min_inserts: usize,
    /// Keep the `<Model>_id_map` tables in the final output instead of
    /// dropping them once every model has merged.
    pub keep_id_maps: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_inserts: 1000,
            keep_id_maps: false,
        }
    }
}

/// Merge every database in `source_paths` into a fresh database at
/// `output_path`, per `schema`. `output_path` must not already exist.
pub fn run(
    source_paths: &[PathBuf],
    output_path: &Path,
    schema: &Schema,
    config: &MergeConfig,
    reporter: &mut dyn ProgressReporter,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        !source_paths.is_empty(),
        "need at least one source database to merge"
    );
    anyhow::ensure!(
        !output_path.exists(),
        "output path {} already exists",
        output_path.display()
    );

    let mut sources = Vec::with_capacity(source_paths.len());
    for path in source_paths {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("opening source database {}", path.display()))?;
        sources.push(Source {
            label: path.display().to_string(),
            conn,
        });
    }

    let dest = Connection::open(output_path)
        .with_context(|| format!("creating destination database {}", output_path.display()))?;

    apply_bulk_load_pragmas(&dest)?;
    clone_schema(&sources[0].conn, &dest)?;

    let order = scheduler::order(schema);
    for model_name in &order {
        let model = schema
            .model(model_name)
            .expect("scheduler only emits models present in the schema");
        merge_driver::merge_model(&dest, &sources, model, config.min_inserts, reporter)
            .with_context(|| format!("merging model {model_name}"))?;
    }

    restore_safety_pragmas(&dest)?;

    for model_name in &order {
        check_foreign_keys(&dest, model_name, reporter)?;
    }

    if !config.keep_id_maps {
        for model_name in &order {
            identity_map::drop(&dest, model_name)?;
        }
    }

    dest.execute_batch("VACUUM;").context("vacuuming destination database")?;

    Ok(())
}

fn apply_bulk_load_pragmas(dest: &Connection) -> anyhow::Result<()> {
    dest.execute_batch(
        "PRAGMA synchronous = OFF;
         PRAGMA journal_mode = OFF;
         PRAGMA temp_store = MEMORY;
         PRAGMA cache_size = -16000;
         PRAGMA foreign_keys = OFF;",
    )
    .context("applying bulk-load pragmas")
}

fn restore_safety_pragmas(dest: &Connection) -> anyhow::Result<()> {
    dest.execute_batch(
        "PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;",
    )
    .context("restoring safety pragmas")
}

/// Recreate every user table and index DDL from the first source's
/// catalog. `sqlite_master` rows with a NULL `sql` (SQLite's implicit
/// indices for `INTEGER PRIMARY KEY` columns, autoindexes for inline
/// `UNIQUE`) are skipped; those come back for free when the real
/// `CREATE TABLE` runs.
fn clone_schema(first_source: &Connection, dest: &Connection) -> anyhow::Result<()> {
    let mut stmt = first_source
        .prepare(
            "SELECT sql FROM sqlite_master
             WHERE type IN ('table', 'index') AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'",
        )
        .context("reading source schema catalog")?;

    let statements = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("reading source schema catalog")?;

    for statement in statements {
        let statement = statement.context("reading a schema row")?;
        dest.execute_batch(&statement)
            .with_context(|| format!("replaying schema statement: {statement}"))?;
    }

    Ok(())
}

fn check_foreign_keys(dest: &Connection, model: &str, reporter: &mut dyn ProgressReporter) -> anyhow::Result<()> {
    let mut stmt = dest
        .prepare(&format!("PRAGMA foreign_key_check(\"{model}\")"))
        .with_context(|| format!("preparing foreign key check for {model}"))?;

    let mut rows = stmt
        .query([])
        .with_context(|| format!("running foreign key check for {model}"))?;

    let mut violations = 0usize;
    while rows.next()?.is_some() {
        violations += 1;
    }

    if violations > 0 {
        reporter.warn(&format!("Table {model} has {violations} foreign key integrity problems"));
    }

    Ok(())
}
