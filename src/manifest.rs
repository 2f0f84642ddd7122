use crate::consts::MANIFEST_DIR;
use crate::s3::S3Location;
use serde::{Deserialize, Serialize};

/// A Redshift `COPY` manifest: the exact list of objects a single load
/// reads.  A bare S3 URL in `COPY ... FROM` is treated as a key prefix, so
/// every load goes through a manifest naming exactly one object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) struct LoadManifest {
    pub(crate) entries: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub(crate) struct ManifestEntry {
    pub(crate) url: String,
    pub(crate) mandatory: bool,
}

impl LoadManifest {
    /// A manifest covering only `object`, which must exist when loaded
    pub(crate) fn single(object: &S3Location) -> LoadManifest {
        LoadManifest {
            entries: vec![ManifestEntry {
                url: object.to_string(),
                mandatory: true,
            }],
        }
    }

    pub(crate) fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Return the location of the manifest used to load `object` from
/// `namespace`: `{namespace}.manifests/{key relative to namespace}.manifest`
pub(crate) fn manifest_location(namespace: &S3Location, object: &S3Location) -> S3Location {
    let relative = object
        .key()
        .strip_prefix(namespace.key())
        .unwrap_or(object.key())
        .trim_start_matches('/');
    namespace.join(&format!("{MANIFEST_DIR}/{relative}.manifest"))
}

/// Returns true if `object` lives in a manifest directory
pub(crate) fn is_manifest(object: &S3Location) -> bool {
    object.key().split('/').any(|c| c == MANIFEST_DIR)
}
