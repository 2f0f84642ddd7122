use crate::s3::S3Location;
use crate::store::ObjectStore;
use anyhow::Context;
use std::path::{Path, PathBuf};
use time::{macros::format_description, Date};

/// Return the key (relative to the namespace) at which a file named
/// `filename` produced on `date` is stored, of the form
/// `{yy}/{mm}/{dd}/{filename}`
pub(crate) fn dated_key(date: Date, filename: &str) -> Result<String, time::error::Format> {
    let prefix = date.format(format_description!("[year repr:last_two]/[month]/[day]"))?;
    Ok(format!("{prefix}/{filename}"))
}

/// Upload every regular file directly inside `datadir` to `namespace` under
/// a key derived from `date`, deleting each local file once its upload
/// succeeds.  Returns the number of files uploaded.
///
/// Uploaded objects carry no status tag, so the next load will pick them up.
pub(crate) async fn upload_dir<S: ObjectStore>(
    store: &S,
    datadir: &Path,
    namespace: &S3Location,
    date: Date,
) -> anyhow::Result<usize> {
    let files = list_files(datadir).await?;
    if files.is_empty() {
        tracing::info!(datadir = %datadir.display(), "No files to upload");
    }
    for path in &files {
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            anyhow::bail!("cannot upload file with non-UTF-8 name: {}", path.display());
        };
        let url = namespace.join(&dated_key(date, filename)?);
        let content = fs_err::tokio::read(path).await?;
        store.write_object(&url, content).await?;
        tracing::info!(path = %path.display(), %url, "Uploaded file");
        fs_err::tokio::remove_file(path)
            .await
            .context("uploaded file but failed to remove local copy")?;
    }
    Ok(files.len())
}

/// Return the paths of the regular files directly inside `dir`, sorted
async fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = fs_err::tokio::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
