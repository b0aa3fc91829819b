//! Compiles and runs the unique-index existence probe: given a model with
//! a unique constraint, build a destination-side lookup that joins through
//! identity-map tables for any foreign-key member of the constraint.

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};

use crate::identity_map;
use crate::schema::Model;

enum ProbeColumn {
    /// A plain column: matched directly against the textually-substituted
    /// quoted value.
    Plain { column: String },
    /// A foreign-key column: matched by joining through the referenced
    /// model's identity-map table.
    ForeignKey { column: String, target_model: String },
}

/// A compiled probe for one model's unique constraint. Built once per
/// model merge and reused for every secondary-source row.
pub struct ProbeTemplate {
    model: String,
    pk: String,
    columns: Vec<ProbeColumn>,
}

impl ProbeTemplate {
    /// Compile the probe for `model`, or `None` if it has no unique
    /// constraint (in which case no dedup is possible and every row is a
    /// fresh insert).
    pub fn compile(model: &Model) -> Option<Self> {
        let unique = model.unique_constraint()?;
        let columns = unique
            .iter()
            .map(|name| match model.relation_for_field(name) {
                Some((column, _)) => ProbeColumn::ForeignKey {
                    column: name.clone(),
                    target_model: column.ty.name.clone(),
                },
                None => ProbeColumn::Plain { column: name.clone() },
            })
            .collect();
        Some(Self {
            model: model.name.clone(),
            pk: model.primary_key().name.clone(),
            columns,
        })
    }

    /// Render the probe SQL, substituting each `?i` with the already-quoted
    /// source value for that unique-constraint column.
    fn render(&self, quoted_values: &std::collections::HashMap<String, String>) -> String {
        let mut joins = Vec::new();
        let mut wheres = Vec::new();

        for col in &self.columns {
            match col {
                ProbeColumn::Plain { column } => {
                    let value = &quoted_values[column];
                    wheres.push(format!("{column} = {value}"));
                }
                ProbeColumn::ForeignKey { column, target_model } => {
                    let map_table = identity_map::table_name(target_model);
                    let value = &quoted_values[column];
                    joins.push(format!(
                        "JOIN \"{map_table}\" ON \"{model}\".\"{column}\" = \"{map_table}\".new_id",
                        model = self.model,
                    ));
                    wheres.push(format!("\"{map_table}\".old_id = {value}"));
                }
            }
        }

        let mut sql = format!("SELECT quote(\"{}\") AS \"{}\" FROM \"{}\"", self.pk, self.pk, self.model);
        for join in &joins {
            sql.push('\n');
            sql.push_str(join);
        }
        sql.push_str("\nWHERE ");
        sql.push_str(&wheres.join(" AND "));
        sql.push_str("\nLIMIT 1;");
        sql
    }

    /// Run the probe against the destination, returning the matched row's
    /// primary key already in quoted form (suitable for splicing straight
    /// into an identity-map insert), or `None` if no row matched.
    pub fn find_existing(
        &self,
        dest: &Connection,
        quoted_values: &std::collections::HashMap<String, String>,
    ) -> anyhow::Result<Option<String>> {
        let sql = self.render(quoted_values);
        dest.query_row(&sql, [], |r| r.get::<_, String>(0))
            .optional()
            .with_context(|| format!("unique-index probe failed for {}", self.model))
    }
}
