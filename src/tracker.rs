use crate::consts::STATUS_TAG;
use crate::manifest::{manifest_location, LoadManifest};
use crate::s3::S3Location;
use crate::schema::{SchemaError, TableSchema};
use crate::store::{list_states, LoadState, ObjectStore, StoreError};
use crate::warehouse::{
    ConnectionError, CredentialRef, LoadError, LoadInstruction, SourceFormat, Warehouse,
    WarehouseConnection,
};
use futures_util::{future, Stream, TryStreamExt};
use std::pin::pin;
use thiserror::Error;

/// Loads objects from an object store into a warehouse table, marking each
/// object with a `status=loaded` tag once its load succeeds so that no
/// object is ever loaded twice.
///
/// An object is tagged only after the warehouse has accepted its load.  If
/// the process dies between the two steps, the object stays untagged and
/// will be loaded again on the next run; the warehouse's own load history is
/// the place to detect such a duplicate.
#[derive(Debug)]
pub(crate) struct LoadTracker<S, W> {
    store: S,
    warehouse: W,

    /// Only consider objects whose keys match the given regex
    key_filter: Option<regex::Regex>,

    /// Check each object's CSV header against the table's columns before
    /// loading it
    verify_header: bool,
}

impl<S: ObjectStore, W: Warehouse> LoadTracker<S, W> {
    pub(crate) fn new(store: S, warehouse: W) -> Self {
        LoadTracker {
            store,
            warehouse,
            key_filter: None,
            verify_header: false,
        }
    }

    pub(crate) fn with_key_filter(mut self, key_filter: Option<regex::Regex>) -> Self {
        self.key_filter = key_filter;
        self
    }

    pub(crate) fn with_verify_header(mut self, verify_header: bool) -> Self {
        self.verify_header = verify_header;
        self
    }

    /// Load every not-yet-loaded object in `namespace` into the table
    /// described by `schema`, one at a time, and return the number of
    /// objects loaded.
    ///
    /// Stops at the first failure.  Objects loaded before the failure stay
    /// tagged; the failing object and everything after it remain untagged
    /// and will be picked up by the next run.
    pub(crate) async fn run(
        &self,
        schema: &TableSchema,
        namespace: &S3Location,
        credential: &CredentialRef,
    ) -> Result<usize, RunError> {
        let mut conn = self.warehouse.connect().await.map_err(|e| RunError {
            loaded: 0,
            cause: e.into(),
        })?;
        let mut loaded = 0;
        let r = self
            .run_with(&mut conn, schema, namespace, credential, &mut loaded)
            .await;
        if let Err(e) = conn.close().await {
            tracing::warn!(error = ?e, "Failed to close warehouse connection");
        }
        match r {
            Ok(()) => {
                tracing::info!(loaded, table = schema.name(), "Finished loading objects");
                Ok(loaded)
            }
            Err(cause) => {
                tracing::error!(loaded, error = ?cause, "Aborting run");
                Err(RunError { loaded, cause })
            }
        }
    }

    async fn run_with(
        &self,
        conn: &mut W::Connection,
        schema: &TableSchema,
        namespace: &S3Location,
        credential: &CredentialRef,
        loaded: &mut usize,
    ) -> Result<(), TrackerError> {
        self.ensure_table_exists(conn, schema).await?;
        let mut unloaded = pin!(self.list_unloaded(namespace));
        while let Some(obj) = unloaded.try_next().await? {
            if self.verify_header {
                let content = self.store.read_object(&obj).await?;
                schema.check_header(&obj, &content)?;
            }
            self.apply_object(conn, schema.name(), namespace, &obj, credential)
                .await?;
            *loaded += 1;
        }
        Ok(())
    }

    /// Stream the objects in `namespace` that are not tagged as loaded
    pub(crate) fn list_unloaded<'a>(
        &'a self,
        namespace: &'a S3Location,
    ) -> impl Stream<Item = Result<S3Location, StoreError>> + Send + 'a {
        list_states(&self.store, namespace, self.key_filter.as_ref()).try_filter_map(
            |(obj, state)| {
                future::ready(Ok(match state {
                    LoadState::Unloaded => Some(obj),
                    LoadState::Loaded => {
                        tracing::debug!(url = %obj, "Object already loaded; skipping");
                        None
                    }
                }))
            },
        )
    }

    /// Create the table described by `schema` if it does not already exist
    pub(crate) async fn ensure_table_exists(
        &self,
        conn: &mut W::Connection,
        schema: &TableSchema,
    ) -> Result<(), SchemaError> {
        let sql = schema.create_if_absent_sql()?;
        tracing::debug!(table = schema.name(), "Ensuring table exists");
        conn.execute(&sql)
            .await
            .map_err(|source| SchemaError::Create {
                table: schema.name().to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Bulk-load `object` into `table`, then tag the object as loaded.
    ///
    /// The load reads through a manifest, written under `namespace`
    /// beforehand, that names `object` and nothing else.
    #[tracing::instrument(skip_all, fields(url = %object))]
    pub(crate) async fn apply_object(
        &self,
        conn: &mut W::Connection,
        table: &str,
        namespace: &S3Location,
        object: &S3Location,
        credential: &CredentialRef,
    ) -> Result<(), TrackerError> {
        let manifest = manifest_location(namespace, object);
        self.store
            .write_object(&manifest, LoadManifest::single(object).to_json()?)
            .await?;
        tracing::debug!(%manifest, "Wrote load manifest");
        let instruction = LoadInstruction::new(
            table,
            object,
            &manifest,
            credential,
            SourceFormat::csv(),
        )?;
        conn.bulk_load(&instruction)
            .await
            .map_err(|source| LoadError {
                table: table.to_owned(),
                url: object.clone(),
                source,
            })?;
        self.store
            .put_tag(object, STATUS_TAG, LoadState::Loaded.as_ref())
            .await?;
        tracing::info!("Object loaded and tagged");
        Ok(())
    }
}

/// Error returned by a single Load Tracker operation
#[derive(Debug, Error)]
pub(crate) enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("failed to serialize load manifest")]
    Manifest(#[from] serde_json::Error),
}

/// Error returned by [`LoadTracker::run()`]
#[derive(Debug, Error)]
#[error("load aborted after {loaded} object(s) were loaded")]
pub(crate) struct RunError {
    /// The number of objects loaded and tagged before the failure
    pub(crate) loaded: usize,

    #[source]
    pub(crate) cause: TrackerError,
}
