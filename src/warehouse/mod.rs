mod redshift;
pub(crate) use self::redshift::*;
use crate::consts::CSV_HEADER_ROWS;
use crate::s3::S3Location;
use crate::schema::{check_identifier, SchemaError};
use crate::store::BoxError;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;

/// A columnar data warehouse that can bulk-load files from the object store
pub(crate) trait Warehouse: Send + Sync {
    type Connection: WarehouseConnection;

    /// Open a new connection to the warehouse
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, ConnectionError>> + Send;
}

/// An open connection to a [`Warehouse`].  Callers must call
/// [`close()`][WarehouseConnection::close] when done.
pub(crate) trait WarehouseConnection: Send + Sized {
    /// Execute one or more SQL statements and return the number of rows
    /// affected
    fn execute(&mut self, sql: &str) -> impl Future<Output = Result<u64, WarehouseError>> + Send;

    /// Import the full content of an object into a table
    fn bulk_load(
        &mut self,
        instruction: &LoadInstruction<'_>,
    ) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    /// Gracefully close the connection
    fn close(self) -> impl Future<Output = Result<(), WarehouseError>> + Send;
}

/// A reference to an IAM role that authorizes the warehouse to read from the
/// object store
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CredentialRef(String);

impl CredentialRef {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CredentialRef {
    type Err = CredentialRefError;

    fn from_str(s: &str) -> Result<CredentialRef, CredentialRefError> {
        if s.starts_with("arn:") && !s.contains(['\'', '\0']) {
            Ok(CredentialRef(s.to_owned()))
        } else {
            Err(CredentialRefError)
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, Error, PartialEq)]
#[error("invalid IAM role reference; expected an ARN of the form arn:aws:iam::ACCOUNT:role/NAME")]
pub(crate) struct CredentialRefError;

/// File formats that can be bulk-loaded
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub(crate) enum FormatKind {
    #[strum(serialize = "CSV")]
    Csv,
}

/// How the warehouse should parse a source object
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SourceFormat {
    pub(crate) kind: FormatKind,

    /// Number of leading rows to skip
    pub(crate) header_skip: u32,
}

impl SourceFormat {
    /// CSV with a single header row
    pub(crate) fn csv() -> SourceFormat {
        SourceFormat {
            kind: FormatKind::Csv,
            header_skip: CSV_HEADER_ROWS,
        }
    }
}

/// A single request to import an object into a warehouse table
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LoadInstruction<'a> {
    table: &'a str,
    source: &'a S3Location,

    /// A manifest listing `source` as its only entry
    manifest: &'a S3Location,
    credential: &'a CredentialRef,
    format: SourceFormat,
}

impl<'a> LoadInstruction<'a> {
    pub(crate) fn new(
        table: &'a str,
        source: &'a S3Location,
        manifest: &'a S3Location,
        credential: &'a CredentialRef,
        format: SourceFormat,
    ) -> Result<Self, SchemaError> {
        check_identifier(table)?;
        Ok(LoadInstruction {
            table,
            source,
            manifest,
            credential,
            format,
        })
    }

    pub(crate) fn table(&self) -> &str {
        self.table
    }

    pub(crate) fn source(&self) -> &S3Location {
        self.source
    }

    pub(crate) fn manifest(&self) -> &S3Location {
        self.manifest
    }

    /// Render the instruction as a Redshift `COPY` statement that reads the
    /// object through its manifest
    pub(crate) fn to_sql(&self) -> String {
        format!(
            "COPY {} FROM {} IAM_ROLE {} MANIFEST FORMAT AS {} IGNOREHEADER {};",
            self.table,
            quote_literal(&self.manifest.to_string()),
            quote_literal(self.credential.as_str()),
            self.format.kind,
            self.format.header_skip,
        )
    }
}

/// Render `s` as a single-quoted SQL string literal
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Error reported by a warehouse connection
#[derive(Debug, Error)]
#[error(transparent)]
pub(crate) struct WarehouseError(BoxError);

impl WarehouseError {
    pub(crate) fn new<E: Into<BoxError>>(e: E) -> WarehouseError {
        WarehouseError(e.into())
    }
}

/// Error returned when a connection to the warehouse cannot be established
#[derive(Debug, Error)]
#[error("failed to connect to warehouse at {target}")]
pub(crate) struct ConnectionError {
    pub(crate) target: String,
    pub(crate) source: WarehouseError,
}

/// Error returned when a bulk-load command fails
#[derive(Debug, Error)]
#[error("failed to load {url} into table {table:?}")]
pub(crate) struct LoadError {
    pub(crate) table: String,
    pub(crate) url: S3Location,
    pub(crate) source: WarehouseError,
}
