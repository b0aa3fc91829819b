//! The in-memory shape of the declarative schema the merge engine consumes.
//!
//! Nothing here parses a file; see [`crate::schema_file`] for that. This
//! module is the external contract described in the design doc: a `Schema`
//! is a bag of `Model`s, each with an ordered column list, an optional
//! composite unique constraint, and a single primary key.

use std::collections::HashMap;

use crate::error::SchemaError;

/// A full schema: every model known to the merge, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub models: HashMap<String, Model>,
}

impl Schema {
    pub fn new(models: HashMap<String, Model>) -> Self {
        Self { models }
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    /// Validate every model in declaration order; the first violation wins.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for model in self.models.values() {
            model.validate(self)?;
        }
        Ok(())
    }
}

/// A single logical table.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub columns: Vec<Column>,
    /// Ordered column names forming the model's unique constraint, if any.
    pub unique_fields: Option<Vec<String>>,
    pub primary_key_index: usize,
}

impl Model {
    pub fn primary_key(&self) -> &Column {
        &self.columns[self.primary_key_index]
    }

    /// A column is regular iff it's not the primary key, not a collection,
    /// carries no relation, and its type doesn't name another model.
    pub fn is_regular(&self, column: &Column) -> bool {
        !column.is_primary_key && !column.ty.is_collection && column.relation.is_none()
    }

    /// A scalar column actually exists as a table column: every regular
    /// column plus every foreign-key column, excluding collections and the
    /// primary key (which row iteration tracks separately).
    pub fn scalar_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| !c.is_primary_key && !c.ty.is_collection)
    }

    pub fn unique_constraint(&self) -> Option<&[String]> {
        self.unique_fields.as_deref()
    }

    /// Find the column carrying a relation whose local fields include `name`.
    pub fn relation_for_field(&self, name: &str) -> Option<(&Column, &Relation)> {
        self.columns.iter().find_map(|c| {
            c.relation
                .as_ref()
                .filter(|r| r.fields.iter().any(|f| f == name))
                .map(|r| (c, r))
        })
    }

    fn validate(&self, schema: &Schema) -> Result<(), SchemaError> {
        let pk_count = self.columns.iter().filter(|c| c.is_primary_key).count();
        if pk_count != 1 {
            return Err(SchemaError::PrimaryKey {
                model: self.name.clone(),
                count: pk_count,
            });
        }

        if let Some(fields) = &self.unique_fields {
            for field in fields {
                if !self.columns.iter().any(|c| &c.name == field) {
                    return Err(SchemaError::UnknownUniqueColumn {
                        model: self.name.clone(),
                        column: field.clone(),
                    });
                }
            }
        }

        for column in &self.columns {
            if let Some(relation) = &column.relation {
                if !schema.models.contains_key(&column.ty.name) {
                    return Err(SchemaError::UnknownRelationTarget {
                        model: self.name.clone(),
                        column: column.name.clone(),
                        target: column.ty.name.clone(),
                    });
                }
                for field in &relation.fields {
                    if !self.columns.iter().any(|c| &c.name == field) {
                        return Err(SchemaError::UnknownRelationField {
                            model: self.name.clone(),
                            column: column.name.clone(),
                            field: field.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// A single column on a model.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub relation: Option<Relation>,
    pub is_unique: bool,
    pub is_primary_key: bool,
}

/// A column's declared type: a name (either a scalar type or another
/// model's name, for relations), plus collection/nullable flags.
#[derive(Debug, Clone)]
pub struct ColumnType {
    pub name: String,
    pub is_collection: bool,
    pub is_nullable: bool,
}

/// A foreign-key relation: local column names paired with the referenced
/// model's column names, both ordered.
#[derive(Debug, Clone)]
pub struct Relation {
    pub fields: Vec<String>,
    pub references: Vec<String>,
}
