//! Error types for the parts of the merge that need to be told apart from
//! an ordinary `anyhow::Error` chain: schema problems are caught before a
//! single row moves, so the CLI reports them distinctly from a mid-merge
//! driver failure.

use thiserror::Error;

/// A schema fails validation before merging begins. Fatal, and always
/// reported on its own rather than buried in a driver-error chain.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("model '{model}' has {count} primary key columns, expected exactly 1")]
    PrimaryKey { model: String, count: usize },

    #[error("model '{model}' declares unique column '{column}' which is not one of its columns")]
    UnknownUniqueColumn { model: String, column: String },

    #[error("model '{model}' column '{column}' relates to unknown model '{target}'")]
    UnknownRelationTarget {
        model: String,
        column: String,
        target: String,
    },

    #[error("model '{model}' column '{column}' relation references unknown field '{field}'")]
    UnknownRelationField {
        model: String,
        column: String,
        field: String,
    },

    #[error("schema file error: {0}")]
    Parse(#[from] serde_json::Error),
}
