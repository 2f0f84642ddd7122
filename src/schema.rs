//! Warehouse table definitions
use crate::s3::S3Location;
use crate::warehouse::WarehouseError;
use std::collections::HashSet;
use thiserror::Error;

/// Maximum length in bytes of a Redshift identifier
const MAX_IDENTIFIER_LEN: usize = 127;

/// Column types supported in table definitions
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub(crate) enum ColumnType {
    Varchar,
    Int,
    Timestamp,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Column {
    name: String,
    ty: ColumnType,
}

impl Column {
    pub(crate) fn new<S: Into<String>>(name: S, ty: ColumnType) -> Column {
        Column {
            name: name.into(),
            ty,
        }
    }
}

/// The name and ordered columns of a warehouse table.  Objects loaded into
/// the table must be CSV files whose fields are in the same order as the
/// columns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub(crate) fn new<S: Into<String>>(name: S, columns: Vec<Column>) -> TableSchema {
        TableSchema {
            name: name.into(),
            columns,
        }
    }

    /// The table of subreddit posts produced by the extraction job
    pub(crate) fn posts() -> TableSchema {
        TableSchema::new(
            "posts",
            vec![
                Column::new("title", ColumnType::Varchar),
                Column::new("id", ColumnType::Varchar),
                Column::new("subreddit", ColumnType::Varchar),
                Column::new("score", ColumnType::Int),
                Column::new("num_comments", ColumnType::Int),
                Column::new("url", ColumnType::Varchar),
                Column::new("created", ColumnType::Timestamp),
            ],
        )
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| &*c.name)
    }

    /// Check that the table and column names are valid identifiers and that
    /// the column list is nonempty and free of duplicates
    pub(crate) fn validate(&self) -> Result<(), SchemaError> {
        check_identifier(&self.name)?;
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns {
                table: self.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for col in &self.columns {
            check_identifier(&col.name)?;
            // Unquoted identifiers are case-insensitive
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Render an idempotent `CREATE TABLE` statement for the table
    pub(crate) fn create_if_absent_sql(&self) -> Result<String, SchemaError> {
        self.validate()?;
        let columns = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.ty))
            .collect::<Vec<_>>()
            .join(",\n");
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{columns}\n);",
            self.name
        ))
    }

    /// Check that the first CSV record in `content` (the header row) lists the
    /// table's column names in order
    pub(crate) fn check_header(&self, url: &S3Location, content: &[u8]) -> Result<(), SchemaError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content);
        let actual = match reader.records().next() {
            Some(Ok(record)) => record.iter().map(str::to_owned).collect::<Vec<_>>(),
            Some(Err(source)) => {
                return Err(SchemaError::HeaderRead {
                    url: url.clone(),
                    source,
                })
            }
            None => Vec::new(),
        };
        if self.column_names().eq(actual.iter().map(String::as_str)) {
            Ok(())
        } else {
            Err(SchemaError::HeaderMismatch {
                url: url.clone(),
                table: self.name.clone(),
                expected: self.column_names().map(str::to_owned).collect(),
                actual,
            })
        }
    }
}

/// Check that `ident` can be used unquoted as a table or column name
pub(crate) fn check_identifier(ident: &str) -> Result<(), SchemaError> {
    let mut chars = ident.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && ident.len() <= MAX_IDENTIFIER_LEN;
    if valid {
        Ok(())
    } else {
        Err(SchemaError::Identifier {
            ident: ident.to_owned(),
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum SchemaError {
    #[error("invalid identifier {ident:?}")]
    Identifier { ident: String },
    #[error("table {table:?} has no columns")]
    NoColumns { table: String },
    #[error("table {table:?} declares column {column:?} more than once")]
    DuplicateColumn { table: String, column: String },
    #[error("failed to create table {table:?}")]
    Create {
        table: String,
        source: WarehouseError,
    },
    #[error("failed to read CSV header of {url}")]
    HeaderRead { url: S3Location, source: csv::Error },
    #[error("CSV header of {url} does not match columns of table {table:?}: expected {expected:?}, got {actual:?}")]
    HeaderMismatch {
        url: S3Location,
        table: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}
