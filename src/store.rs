use crate::consts::STATUS_TAG;
use crate::manifest::is_manifest;
use crate::s3::S3Location;
use futures_util::{future, Stream, TryStreamExt};
use std::future::Future;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Operations on an object store that holds the files to load
///
/// Objects are addressed by [`S3Location`]; a "namespace" is an
/// `S3Location` whose key is a (possibly empty) prefix.
pub(crate) trait ObjectStore: Send + Sync {
    /// List every object whose key starts with the namespace's key prefix, in
    /// the store's native order
    fn list_objects(
        &self,
        namespace: &S3Location,
    ) -> impl Stream<Item = Result<S3Location, StoreError>> + Send;

    /// Fetch the value of the tag `name` on `object`, if set
    fn get_tag(
        &self,
        object: &S3Location,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Set the tag `name` on `object` to `value`, leaving any other tags on
    /// the object as they were
    fn put_tag(
        &self,
        object: &S3Location,
        name: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Download the full content of `object`
    fn read_object(
        &self,
        object: &S3Location,
    ) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;

    /// Create or replace `object` with the given content.  The new object has
    /// no tags.
    fn write_object(
        &self,
        object: &S3Location,
        content: Vec<u8>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Whether an object's content has been bulk-loaded into the warehouse
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::AsRefStr, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum LoadState {
    Loaded,
    Unloaded,
}

impl LoadState {
    /// Interpret the value of an object's status tag.
    ///
    /// Only the exact value `"loaded"` marks an object as loaded.  A missing
    /// tag, or any other value (e.g., `"not_loaded"`), means the object still
    /// needs to be loaded.
    pub(crate) fn from_tag(value: Option<&str>) -> LoadState {
        match value {
            Some(v) if v == LoadState::Loaded.as_ref() => LoadState::Loaded,
            _ => LoadState::Unloaded,
        }
    }
}

/// Stream the objects in `namespace` together with their load states.
///
/// "Directory" placeholders (keys ending in `/`) and load manifests are
/// skipped, as are objects whose keys do not match `key_filter` (if set);
/// tags of skipped objects are never fetched.
pub(crate) fn list_states<'a, S: ObjectStore>(
    store: &'a S,
    namespace: &'a S3Location,
    key_filter: Option<&'a regex::Regex>,
) -> impl Stream<Item = Result<(S3Location, LoadState), StoreError>> + Send + 'a {
    store
        .list_objects(namespace)
        .try_filter(move |obj| {
            let keep = if obj.is_dir_marker() {
                tracing::trace!(url = %obj, "Skipping directory placeholder");
                false
            } else if is_manifest(obj) {
                tracing::trace!(url = %obj, "Skipping load manifest");
                false
            } else if key_filter.is_some_and(|rgx| !rgx.is_match(obj.key())) {
                tracing::debug!(url = %obj, "Object key does not match --key-filter; skipping");
                false
            } else {
                true
            };
            future::ready(keep)
        })
        .and_then(move |obj| async move {
            let tag = store.get_tag(&obj, STATUS_TAG).await?;
            let state = LoadState::from_tag(tag.as_deref());
            tracing::trace!(url = %obj, ?tag, %state, "Fetched object load state");
            Ok::<_, StoreError>((obj, state))
        })
}

/// Error returned when an object store operation fails
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("failed to list objects under {url}")]
    List { url: S3Location, source: BoxError },
    #[error("failed to fetch tags of {url}")]
    GetTag { url: S3Location, source: BoxError },
    #[error("failed to set tag {tag:?} on {url}")]
    PutTag {
        url: S3Location,
        tag: String,
        source: BoxError,
    },
    #[error("failed to download {url}")]
    Read { url: S3Location, source: BoxError },
    #[error("failed to upload {url}")]
    Write { url: S3Location, source: BoxError },
}
