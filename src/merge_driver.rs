//! Orchestrates the merge of one model: picks the primary source, iterates
//! every source's rows in order, and for each row decides whether to
//! insert it fresh or remap it onto an existing destination row.

use anyhow::Context;
use rusqlite::Connection;
use uuid::Uuid;

use crate::batcher::InsertBatcher;
use crate::identity_map;
use crate::probe::ProbeTemplate;
use crate::progress::ProgressReporter;
use crate::row_iter::{self, SourceRow};
use crate::schema::Model;

/// A single open source database, labeled for diagnostics.
pub struct Source {
    pub label: String,
    pub conn: Connection,
}

/// Merge every row of `model` from `sources` into `dest`, in the order
/// [primary, then secondaries in input order]. `dest` must already have
/// the model's table created (schema is cloned separately by the
/// orchestrator) but not yet the identity-map table for this model.
pub fn merge_model(
    dest: &Connection,
    sources: &[Source],
    model: &Model,
    threshold: usize,
    reporter: &mut dyn ProgressReporter,
) -> anyhow::Result<()> {
    identity_map::create(dest, &model.name)
        .with_context(|| format!("setting up identity map for {}", model.name))?;

    let probe = ProbeTemplate::compile(model);
    let scalar_columns: Vec<&str> = model.scalar_columns().map(|c| c.name.as_str()).collect();

    let counts = count_rows_per_source(sources, model)?;
    let primary_index = pick_primary(&counts);
    let total: usize = counts.iter().sum();

    reporter.start_model(&model.name, total);

    let mut batcher = InsertBatcher::new(dest, threshold);

    let order: Vec<usize> = std::iter::once(primary_index)
        .chain((0..sources.len()).filter(|&i| i != primary_index))
        .collect();

    for &source_index in &order {
        let source = &sources[source_index];
        let is_primary = source_index == primary_index;

        row_iter::for_each_row(&source.conn, model, |row| {
            let flushed = merge_row(dest, model, &scalar_columns, probe.as_ref(), &mut batcher, &row, is_primary)
                .with_context(|| {
                    format!(
                        "merging {} row '{}' from source '{}'",
                        model.name, row.old_pk, source.label
                    )
                })?;
            if flushed > 0 {
                reporter.advance(&model.name, flushed);
            }
            Ok(())
        })
        .with_context(|| format!("iterating {} rows from source '{}'", model.name, source.label))?;

        let flushed = batcher.flush()?;
        if flushed > 0 {
            reporter.advance(&model.name, flushed);
        }
    }

    let flushed = batcher.flush()?;
    if flushed > 0 {
        reporter.advance(&model.name, flushed);
    }

    identity_map::create_indices(dest, &model.name)
        .with_context(|| format!("indexing identity map for {}", model.name))?;
    reporter.finish_model(&model.name);

    Ok(())
}

fn count_rows_per_source(sources: &[Source], model: &Model) -> anyhow::Result<Vec<usize>> {
    sources
        .iter()
        .map(|source| {
            let count: i64 = source
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", model.name), [], |r| r.get(0))
                .with_context(|| format!("counting {} rows in source '{}'", model.name, source.label))?;
            Ok(count as usize)
        })
        .collect()
}

/// The source with the most rows wins; ties favor the earlier source.
fn pick_primary(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[best] {
            best = i;
        }
    }
    best
}

/// Merge a single row, returning the progress credit a batcher flush just
/// reported for it (0 unless this row happened to cross the threshold).
/// The batcher, not this function, decides when a row's credit is actually
/// forwarded — only its `insert`/`insert_supporting` return values count.
fn merge_row(
    dest: &Connection,
    model: &Model,
    scalar_columns: &[&str],
    probe: Option<&ProbeTemplate>,
    batcher: &mut InsertBatcher,
    row: &SourceRow,
    is_primary: bool,
) -> anyhow::Result<usize> {
    let existing_pk = if !is_primary {
        match probe {
            Some(probe) => probe.find_existing(dest, &row.columns)?,
            None => None,
        }
    } else {
        None
    };

    if let Some(existing_pk) = existing_pk {
        let stmt = format!(
            "INSERT INTO \"{}\" (old_id, new_id) VALUES ('{}', {})",
            identity_map::table_name(&model.name),
            escape_literal(&row.old_pk),
            existing_pk,
        );
        return batcher.insert(stmt);
    }

    let new_pk = if is_primary {
        row.old_pk.clone()
    } else {
        Uuid::new_v4().to_string()
    };

    let insert_stmt = build_insert(model, scalar_columns, row, &new_pk);
    let mut flushed = batcher.insert(insert_stmt)?;

    let map_stmt = format!(
        "INSERT INTO \"{}\" (old_id, new_id) VALUES ('{}', '{}')",
        identity_map::table_name(&model.name),
        escape_literal(&row.old_pk),
        escape_literal(&new_pk),
    );
    flushed += batcher.insert_supporting(map_stmt)?;

    Ok(flushed)
}

fn build_insert(model: &Model, scalar_columns: &[&str], row: &SourceRow, new_pk: &str) -> String {
    let pk = &model.primary_key().name;

    let mut column_list = vec![format!("\"{pk}\"")];
    let mut select_list = vec![format!("'{}'", escape_literal(new_pk))];
    let mut joins = Vec::new();

    for column_name in scalar_columns {
        column_list.push(format!("\"{column_name}\""));
        match model.relation_for_field(column_name) {
            Some((column, _)) => {
                let map_table = identity_map::table_name(&column.ty.name);
                let alias = format!("{map_table}_{column_name}");
                let old_value = &row.columns[*column_name];
                // A row whose parent never made it into any source (rather
                // than simply not being merged yet) has no map entry at
                // all. Falling back to the raw old value instead of NULL
                // keeps it a genuine, detectable foreign-key violation
                // instead of a silently nulled-out column.
                select_list.push(format!("COALESCE(\"{alias}\".new_id, {old_value})"));
                joins.push(format!(
                    "LEFT JOIN \"{map_table}\" AS \"{alias}\" ON \"{alias}\".old_id = {old_value}"
                ));
            }
            None => {
                select_list.push(row.columns[*column_name].clone());
            }
        }
    }

    let mut sql = format!(
        "INSERT INTO \"{}\" ({}) SELECT {} FROM (SELECT 1) AS dummy",
        model.name,
        column_list.join(", "),
        select_list.join(", "),
    );
    for join in &joins {
        sql.push('\n');
        sql.push_str(join);
    }
    sql.push_str("\nLIMIT 1");
    sql
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
