use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use object_store::{DynObjectStore, path::Path as ObjectPath};
use observability_deps::tracing::{error, info, warn};
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tpcdi_batch::file_utils;

use crate::{Error, Result};

/// Counts of a finished upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub timed_out: usize,
}

#[derive(Debug)]
enum FileOutcome {
    Uploaded,
    TimedOut,
}

/// Object store location of `file`: its path with `root` stripped.
fn target_location(file: &Path, root: &Path) -> Result<ObjectPath> {
    let relative = file
        .strip_prefix(root)
        .map_err(|_| Error::OutsideScratchRoot {
            path: file.to_path_buf(),
            root: root.to_path_buf(),
        })?;
    Ok(ObjectPath::from_iter(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    ))
}

/// Copy every file below `local_dir` into `store`, keyed by its path relative to `root`.
///
/// At most `parallelism` copies run at once and each is bounded by `timeout`. A copy that times
/// out is logged and counted but does not stop the others. Every copy is awaited before the
/// first other failure, if any, is returned.
pub async fn upload_directory(
    store: Arc<DynObjectStore>,
    local_dir: &Path,
    root: &Path,
    parallelism: NonZeroUsize,
    timeout: Duration,
) -> Result<UploadSummary> {
    let files = file_utils::list_files(local_dir)?;
    info!(
        files = files.len(),
        from = %local_dir.display(),
        parallelism = parallelism.get(),
        "uploading generated files"
    );

    let sem = Arc::new(Semaphore::new(parallelism.get()));
    let mut js = JoinSet::new();
    for file in files {
        let location = target_location(&file, root)?;
        let store = Arc::clone(&store);
        let sem = Arc::clone(&sem);
        js.spawn(upload_file(store, sem, file, location, timeout));
    }

    let mut summary = UploadSummary::default();
    let mut first_error = None;
    while let Some(res) = js.join_next().await {
        match res.map_err(Error::from).and_then(|r| r) {
            Ok(FileOutcome::Uploaded) => summary.uploaded += 1,
            Ok(FileOutcome::TimedOut) => summary.timed_out += 1,
            Err(e) => {
                error!(%e, "upload failed");
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    info!(
        uploaded = summary.uploaded,
        timed_out = summary.timed_out,
        "upload finished"
    );
    Ok(summary)
}

async fn upload_file(
    store: Arc<DynObjectStore>,
    sem: Arc<Semaphore>,
    file: PathBuf,
    location: ObjectPath,
    timeout: Duration,
) -> Result<FileOutcome> {
    let _permit = sem.acquire_owned().await;
    match tokio::time::timeout(timeout, file_utils::move_file(store.as_ref(), &file, &location))
        .await
    {
        Ok(Ok(message)) => {
            info!("{message}");
            Ok(FileOutcome::Uploaded)
        }
        Ok(Err(source)) => Err(Error::Upload { path: file, source }),
        Err(_) => {
            warn!(file = %file.display(), ?timeout, "upload timed out");
            Ok(FileOutcome::TimedOut)
        }
    }
}
