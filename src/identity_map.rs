//! Creates, indexes, and tears down the per-model `old_id -> new_id`
//! mapping tables in the destination database.

use anyhow::Context;
use rusqlite::Connection;

/// The identity-map table name for a given model.
pub fn table_name(model: &str) -> String {
    format!("{model}_id_map")
}

/// Create the (unindexed) map table for `model`. Called at the start of
/// that model's merge, before any rows are inserted.
pub fn create(dest: &Connection, model: &str) -> anyhow::Result<()> {
    let table = table_name(model);
    dest.execute_batch(&format!(
        "CREATE TABLE \"{table}\" (old_id TEXT NOT NULL, new_id TEXT NOT NULL);"
    ))
    .with_context(|| format!("failed to create identity map table {table}"))?;
    Ok(())
}

/// Create the three lookup indices. Must run after the model's bulk
/// inserts, never before — building them incrementally during insertion
/// would slow every single insert down for no benefit mid-merge.
pub fn create_indices(dest: &Connection, model: &str) -> anyhow::Result<()> {
    let table = table_name(model);
    dest.execute_batch(&format!(
        "CREATE INDEX \"{table}_old_id_idx\" ON \"{table}\" (old_id);
         CREATE INDEX \"{table}_new_id_idx\" ON \"{table}\" (new_id);
         CREATE INDEX \"{table}_new_old_idx\" ON \"{table}\" (new_id, old_id);"
    ))
    .with_context(|| format!("failed to create identity map indices for {table}"))?;
    Ok(())
}

/// Drop the map table (and its indices, which SQLite drops along with it).
pub fn drop(dest: &Connection, model: &str) -> anyhow::Result<()> {
    let table = table_name(model);
    dest.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))
        .with_context(|| format!("failed to drop identity map table {table}"))?;
    Ok(())
}
