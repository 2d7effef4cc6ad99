//! Directory copy/delete helpers over the local mount of the distributed filesystem, plus the
//! single-file copy into an object store used when uploading generated data.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use object_store::{DynObjectStore, ObjectStore, PutPayload, path::Path as ObjectPath};
use observability_deps::tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "the folder you're trying to write to exists, delete it or set overwrite: {}",
        .0.display()
    )]
    TargetExists(PathBuf),

    #[error("the folder you're trying to copy doesn't exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("filesystem error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("unable to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{} is not below {}", .path.display(), .root.display())]
    NotBelowRoot { path: PathBuf, root: PathBuf },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy the directory tree at `source_dir` to `target_dir`.
///
/// With `overwrite` set, an existing `target_dir` is deleted entirely before the copy so the
/// result is a structural copy of the source with nothing left over from the old target.
/// Missing parents of `target_dir` are created. Returns the target directory.
pub fn copy_directory(source_dir: &Path, target_dir: &Path, overwrite: bool) -> Result<PathBuf> {
    if target_dir.exists() {
        if overwrite {
            info!(dir = %target_dir.display(), "overwrite set, deleting existing target");
            fs::remove_dir_all(target_dir).map_err(io_err(target_dir))?;
        } else {
            return Err(Error::TargetExists(target_dir.to_path_buf()));
        }
    }

    if !source_dir.is_dir() {
        return Err(Error::SourceNotFound(source_dir.to_path_buf()));
    }

    info!(
        from = %source_dir.display(),
        to = %target_dir.display(),
        "copying directory"
    );
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    copy_tree(source_dir, target_dir)?;
    info!(
        from = %source_dir.display(),
        to = %target_dir.display(),
        "copied directory"
    );

    Ok(target_dir.to_path_buf())
}

fn relative_to<'a>(path: &'a Path, root: &Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|_| Error::NotBelowRoot {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    })
}

/// Symbolic links are not followed; a link to a file is copied as the file it points to and
/// any other link is skipped.
fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(relative_to(from, source)?);
        if entry.file_type().is_dir() {
            fs::create_dir(&to).map_err(io_err(&to))?;
        } else if from.is_file() {
            debug!(from = %from.display(), to = %to.display(), "copying file");
            fs::copy(from, &to).map_err(io_err(from))?;
        } else {
            warn!(path = %from.display(), "skipping link that does not point to a file");
        }
    }
    Ok(())
}

/// Recursively delete `path` if it exists.
///
/// Returns `true` when something was removed.
pub fn remove_directory(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path).map_err(io_err(path))?;
    info!(path = %path.display(), "cleaned up");
    Ok(true)
}

/// Collect every regular file below `root`, depth first with siblings sorted by name.
///
/// Symbolic links are not followed. A missing `root` yields no files.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(vec![]);
    }
    let mut files = vec![];
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Copy one local file into `store` at `target_location`.
///
/// Returns the completion message that is reported for the file.
pub async fn move_file(
    store: &DynObjectStore,
    source_location: &Path,
    target_location: &ObjectPath,
) -> Result<String> {
    let data = tokio::fs::read(source_location)
        .await
        .map_err(io_err(source_location))?;
    store
        .put(target_location, PutPayload::from(Bytes::from(data)))
        .await?;
    Ok(format!(
        "Finished moving {} to {}",
        source_location.display(),
        target_location
    ))
}
