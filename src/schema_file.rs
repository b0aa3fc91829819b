//! Loads a [`crate::schema::Schema`] from the JSON schema-file format
//! described in the design doc. This is a thin structural mapping, not a
//! general-purpose schema DSL: it exists so the CLI has something to point
//! at on disk, since the merge engine itself treats schema construction as
//! an external concern.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::SchemaError;
use crate::schema::{Column, ColumnType, Model, Relation, Schema};

#[derive(Debug, Deserialize)]
struct RawSchema {
    models: HashMap<String, RawModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    columns: Vec<RawColumn>,
    #[serde(default)]
    unique_fields: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    ty: RawColumnType,
    #[serde(default)]
    relation: Option<RawRelation>,
    #[serde(default)]
    is_unique: bool,
    #[serde(default)]
    is_primary_key: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawColumnType {
    name: String,
    #[serde(default)]
    is_collection: bool,
    #[serde(default)]
    is_nullable: bool,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    fields: Vec<String>,
    references: Vec<String>,
}

/// Read and validate a schema file, producing a ready-to-use [`Schema`].
pub fn load(path: &Path) -> anyhow::Result<Schema> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read schema file {}: {e}", path.display()))?;
    parse(&text)
}

/// Parse schema JSON already held in memory (split out from [`load`] for
/// tests that don't want to write a temp file).
pub fn parse(text: &str) -> anyhow::Result<Schema> {
    let raw: RawSchema = serde_json::from_str(text).map_err(SchemaError::Parse)?;

    let mut models = HashMap::with_capacity(raw.models.len());
    for (name, raw_model) in raw.models {
        models.insert(name.clone(), build_model(name, raw_model)?);
    }

    let schema = Schema::new(models);
    schema.validate()?;
    Ok(schema)
}

fn build_model(name: String, raw: RawModel) -> anyhow::Result<Model> {
    let mut columns = Vec::with_capacity(raw.columns.len());
    let mut primary_key_index = None;

    for (index, raw_column) in raw.columns.into_iter().enumerate() {
        if raw_column.is_primary_key {
            primary_key_index = Some(index);
        }
        columns.push(Column {
            name: raw_column.name,
            ty: ColumnType {
                name: raw_column.ty.name,
                is_collection: raw_column.ty.is_collection,
                is_nullable: raw_column.ty.is_nullable,
            },
            relation: raw_column.relation.map(|r| Relation {
                fields: r.fields,
                references: r.references,
            }),
            is_unique: raw_column.is_unique,
            is_primary_key: raw_column.is_primary_key,
        });
    }

    let primary_key_index = primary_key_index.ok_or_else(|| SchemaError::PrimaryKey {
        model: name.clone(),
        count: 0,
    })?;

    // A declared composite constraint wins; otherwise fall back to the
    // first column individually marked unique.
    let unique_fields = raw.unique_fields.into_iter().next().or_else(|| {
        columns
            .iter()
            .find(|c| c.is_unique)
            .map(|c| vec![c.name.clone()])
    });

    Ok(Model {
        name,
        columns,
        unique_fields,
        primary_key_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER_TODO_SCHEMA: &str = r#"
    {
      "models": {
        "Owner": {
          "columns": [
            { "name": "id", "type": { "name": "string" }, "isPrimaryKey": true },
            { "name": "name", "type": { "name": "string" }, "isUnique": true }
          ]
        },
        "TodoList": {
          "columns": [
            { "name": "id", "type": { "name": "string" }, "isPrimaryKey": true },
            { "name": "name", "type": { "name": "string" } },
            {
              "name": "ownerId",
              "type": { "name": "Owner" },
              "relation": { "fields": ["ownerId"], "references": ["id"] }
            }
          ],
          "uniqueFields": [["name", "ownerId"]]
        }
      }
    }
    "#;

    #[test]
    fn parses_owner_todo_schema() {
        let schema = parse(OWNER_TODO_SCHEMA).expect("schema should parse");
        assert_eq!(schema.models.len(), 2);

        let owner = schema.model("Owner").unwrap();
        assert_eq!(owner.primary_key().name, "id");
        assert_eq!(owner.unique_constraint(), Some(&["name".to_string()][..]));

        let todo_list = schema.model("TodoList").unwrap();
        assert_eq!(
            todo_list.unique_constraint(),
            Some(&["name".to_string(), "ownerId".to_string()][..])
        );
        let (_, relation) = todo_list.relation_for_field("ownerId").unwrap();
        assert_eq!(relation.references, vec!["id".to_string()]);
    }

    #[test]
    fn missing_primary_key_fails_to_parse() {
        let bad = r#"{"models":{"Owner":{"columns":[{"name":"id","type":{"name":"string"}}]}}}"#;
        let err = parse(bad).unwrap_err();
        assert!(err.to_string().contains("primary key"));
    }

    #[test]
    fn dangling_relation_target_fails_to_parse() {
        let bad = r#"{
          "models": {
            "TodoList": {
              "columns": [
                { "name": "id", "type": { "name": "string" }, "isPrimaryKey": true },
                { "name": "ownerId", "type": { "name": "Owner" },
                  "relation": { "fields": ["ownerId"], "references": ["id"] } }
              ]
            }
          }
        }"#;
        let err = parse(bad).unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }
}
