//! Streams rows out of a source database, pre-quoting every scalar column
//! with SQLite's own `quote()` so the merge driver can splice values
//! straight into destination SQL without knowing their types.

use std::collections::HashMap;

use anyhow::Context;
use rusqlite::Connection;

use crate::schema::Model;

/// One source row, already quoted for reuse in destination SQL.
pub struct SourceRow {
    /// The raw (unquoted) primary key — used to key identity-map lookups.
    pub old_pk: String,
    /// The primary key, already passed through `quote()`.
    pub quoted_pk: String,
    /// Every other scalar column, by name, already passed through `quote()`.
    pub columns: HashMap<String, String>,
}

/// Build the `SELECT` statement described in the row-iterator design: the
/// raw and quoted primary key, followed by every scalar column quoted.
pub fn build_select(model: &Model) -> String {
    let pk = &model.primary_key().name;
    let mut select = format!("SELECT \"{pk}\" AS unquoted_pk, quote(\"{pk}\") AS \"{pk}\"");
    for column in model.scalar_columns() {
        select.push_str(&format!(", quote(\"{}\") AS \"{}\"", column.name, column.name));
    }
    select.push_str(&format!(" FROM \"{}\"", model.name));
    select
}

/// Stream every row of `model` out of `source`, calling `callback` once per
/// row. Uses `rusqlite`'s cursor-based `Rows` so arbitrarily large tables
/// never get buffered in full.
pub fn for_each_row<F>(source: &Connection, model: &Model, mut callback: F) -> anyhow::Result<()>
where
    F: FnMut(SourceRow) -> anyhow::Result<()>,
{
    let sql = build_select(model);
    let mut stmt = source
        .prepare(&sql)
        .with_context(|| format!("failed to prepare row iterator for {}", model.name))?;

    let column_names: Vec<String> = model.scalar_columns().map(|c| c.name.clone()).collect();

    let mut rows = stmt
        .query([])
        .with_context(|| format!("failed to execute row iterator for {}", model.name))?;

    while let Some(row) = rows
        .next()
        .with_context(|| format!("failed to read row while iterating {}", model.name))?
    {
        let old_pk: String = row.get("unquoted_pk")?;
        let quoted_pk: String = row.get(model.primary_key().name.as_str())?;
        let mut columns = HashMap::with_capacity(column_names.len());
        for name in &column_names {
            let value: String = row.get(name.as_str())?;
            columns.insert(name.clone(), value);
        }
        callback(SourceRow {
            old_pk,
            quoted_pk,
            columns,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, Relation};

    fn todo_list_model() -> Model {
        Model {
            name: "TodoList".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    ty: ColumnType { name: "string".into(), is_collection: false, is_nullable: false },
                    relation: None,
                    is_unique: false,
                    is_primary_key: true,
                },
                Column {
                    name: "name".into(),
                    ty: ColumnType { name: "string".into(), is_collection: false, is_nullable: false },
                    relation: None,
                    is_unique: false,
                    is_primary_key: false,
                },
                Column {
                    name: "ownerId".into(),
                    ty: ColumnType { name: "Owner".into(), is_collection: false, is_nullable: true },
                    relation: Some(Relation { fields: vec!["ownerId".into()], references: vec!["id".into()] }),
                    is_unique: false,
                    is_primary_key: false,
                },
                Column {
                    name: "tags".into(),
                    ty: ColumnType { name: "Tag".into(), is_collection: true, is_nullable: false },
                    relation: None,
                    is_unique: false,
                    is_primary_key: false,
                },
            ],
            unique_fields: Some(vec!["name".into(), "ownerId".into()]),
            primary_key_index: 0,
        }
    }

    #[test]
    fn select_covers_pk_and_scalar_columns_but_skips_collections() {
        let model = todo_list_model();
        let sql = build_select(&model);
        assert!(sql.contains("quote(\"id\")"));
        assert!(sql.contains("quote(\"name\")"));
        assert!(sql.contains("quote(\"ownerId\")"));
        assert!(!sql.contains("tags"));
    }

    #[test]
    fn iterates_rows_with_raw_and_quoted_pk() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE TodoList (id TEXT, name TEXT, ownerId TEXT);
             INSERT INTO TodoList VALUES ('t1', 'Chores', 'o1');
             INSERT INTO TodoList VALUES ('t2', 'Errands', NULL);",
        )
        .unwrap();

        let model = todo_list_model();
        let mut seen = Vec::new();
        for_each_row(&conn, &model, |row| {
            seen.push((row.old_pk.clone(), row.quoted_pk.clone(), row.columns.clone()));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 2);
        let (old_pk, quoted_pk, cols) = &seen[0];
        assert_eq!(old_pk, "t1");
        assert_eq!(quoted_pk, "'t1'");
        assert_eq!(cols["name"], "'Chores'");
        assert_eq!(cols["ownerId"], "'o1'");

        let (_, _, cols2) = &seen[1];
        assert_eq!(cols2["ownerId"], "NULL");
    }
}
