use super::{ConnectionError, LoadInstruction, Warehouse, WarehouseConnection, WarehouseError};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use std::fmt;

/// A Redshift cluster, reached over the PostgreSQL wire protocol
#[derive(Clone)]
pub(crate) struct Redshift {
    options: PgConnectOptions,

    /// `host:port/database`, for log & error messages
    target: String,
}

impl Redshift {
    pub(crate) fn new(
        host: &str,
        port: u16,
        database: &str,
        user: &str,
        password: Option<&str>,
    ) -> Redshift {
        let mut options = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
            .username(user);
        if let Some(password) = password {
            options = options.password(password);
        }
        Redshift {
            options,
            target: format!("{host}:{port}/{database}"),
        }
    }
}

impl fmt::Debug for Redshift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Redshift")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Warehouse for Redshift {
    type Connection = RedshiftConnection;

    async fn connect(&self) -> Result<RedshiftConnection, ConnectionError> {
        tracing::info!(warehouse = %self.target, "Connecting to Redshift ...");
        match PgConnection::connect_with(&self.options).await {
            Ok(conn) => {
                tracing::info!(warehouse = %self.target, "Connected to Redshift");
                Ok(RedshiftConnection { conn })
            }
            Err(e) => Err(ConnectionError {
                target: self.target.clone(),
                source: WarehouseError::new(e),
            }),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RedshiftConnection {
    conn: PgConnection,
}

impl WarehouseConnection for RedshiftConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64, WarehouseError> {
        tracing::debug!(sql, "Executing query");
        // Use the simple query protocol; Redshift's support for prepared
        // statements is limited.
        let result = self
            .conn
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(WarehouseError::new)?;
        Ok(result.rows_affected())
    }

    async fn bulk_load(&mut self, instruction: &LoadInstruction<'_>) -> Result<(), WarehouseError> {
        tracing::info!(
            url = %instruction.source(),
            manifest = %instruction.manifest(),
            table = instruction.table(),
            "Loading object into table"
        );
        self.execute(&instruction.to_sql()).await?;
        Ok(())
    }

    async fn close(self) -> Result<(), WarehouseError> {
        self.conn.close().await.map_err(WarehouseError::new)?;
        tracing::info!("Redshift connection closed");
        Ok(())
    }
}
