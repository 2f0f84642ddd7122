/// The name of the S3 object tag that records whether an object has been
/// loaded into the warehouse
pub(crate) static STATUS_TAG: &str = "status";

/// The number of leading rows skipped when bulk-loading a CSV object
pub(crate) const CSV_HEADER_ROWS: u32 = 1;

/// Name of the "directory" under a namespace in which load manifests are
/// stored.  Objects beneath it are never loaded themselves.
pub(crate) static MANIFEST_DIR: &str = ".manifests";
