//! Discovery, staging and cleanup of numbered batch directories.

use std::{fs, io, path::PathBuf};

use observability_deps::tracing::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::file_utils;

/// Directory name prefix of every generated batch, followed by the batch number.
pub const BATCH_DIR_PREFIX: &str = "Batch";

/// Where the distributed filesystem is mounted locally.
pub const DEFAULT_MOUNT_ROOT: &str = "/dbfs";

/// Base path of the per-job ingestion directories, relative to the mount root.
pub const DEFAULT_INGESTION_BASE_PATH: &str = tpcdi_config::BATCH_INGESTION_BASE_PATH;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Batch {batch} not found. Available: {available:?}")]
    BatchNotFound { batch: u32, available: Vec<u32> },

    #[error("Failed to copy batch {batch}")]
    CopyFailed { batch: u32 },

    #[error("unable to list batches in {}: {source}", .path.display())]
    ListBatches { path: PathBuf, source: io::Error },

    #[error(transparent)]
    FileUtils(#[from] file_utils::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A batch staged into a job's ingestion directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedBatch {
    pub batch_number: u32,
    pub batch_path: String,
}

/// Stages numbered batches from a central location into job scoped ingestion directories.
///
/// Paths handed to the manager are paths on the distributed filesystem (for example
/// `/tmp/tpcdi/sf=10`); they are resolved under the local mount root before touching disk.
#[derive(Debug, Clone)]
pub struct BatchManager {
    mount_root: PathBuf,
    ingestion_base: String,
}

impl Default for BatchManager {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_ROOT, DEFAULT_INGESTION_BASE_PATH)
    }
}

impl BatchManager {
    pub fn new(mount_root: impl Into<PathBuf>, ingestion_base: impl Into<String>) -> Self {
        let ingestion_base = ingestion_base.into();
        Self {
            mount_root: mount_root.into(),
            ingestion_base: ingestion_base.trim_end_matches('/').to_owned(),
        }
    }

    /// Resolve a distributed filesystem path under the local mount root.
    pub fn mounted(&self, path: &str) -> PathBuf {
        self.mount_root.join(path.trim_start_matches('/'))
    }

    /// Batch numbers available under `central_path`, ascending.
    ///
    /// Only directories named `Batch<N>` count; a missing `central_path` has no batches.
    pub fn available_batches(&self, central_path: &str) -> Result<Vec<u32>> {
        let dir = self.mounted(central_path);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let list_err = |source| Error::ListBatches {
            path: dir.clone(),
            source,
        };
        let mut batches = vec![];
        for entry in fs::read_dir(&dir).map_err(list_err)? {
            let entry = entry.map_err(list_err)?;
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix(BATCH_DIR_PREFIX))
            else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            match suffix.parse::<u32>() {
                Ok(n) if n > 0 => batches.push(n),
                _ => warn!(
                    entry = %entry.path().display(),
                    "ignoring batch directory without a positive batch number"
                ),
            }
        }

        batches.sort_unstable();
        Ok(batches)
    }

    /// The ingestion directory of `job_name`.
    ///
    /// Every batch of a job is staged below the same directory, so the batch number only
    /// selects the `Batch<N>` child inside it.
    pub fn ingestion_path(&self, job_name: &str, _batch_number: u32) -> String {
        format!("{}/{job_name}", self.ingestion_base)
    }

    fn batch_ingestion_path(&self, job_name: &str, batch_number: u32) -> String {
        format!(
            "{}/{BATCH_DIR_PREFIX}{batch_number}",
            self.ingestion_path(job_name, batch_number)
        )
    }

    /// Copy `Batch<N>` from `central_path` into the job's ingestion directory, replacing any
    /// earlier copy.
    ///
    /// Failures are logged and reported as `false`.
    pub fn copy_batch(&self, central_path: &str, job_name: &str, batch_number: u32) -> bool {
        let source_path = format!(
            "{}/{BATCH_DIR_PREFIX}{batch_number}",
            central_path.trim_end_matches('/')
        );
        let target_path = self.batch_ingestion_path(job_name, batch_number);
        info!(batch_number, %source_path, %target_path, "copying batch");

        match file_utils::copy_directory(
            &self.mounted(&source_path),
            &self.mounted(&target_path),
            true,
        ) {
            Ok(_) => true,
            Err(e) => {
                error!(batch_number, error = %e, "error copying batch");
                false
            }
        }
    }

    /// Stage a batch for a pipeline run and return the job's ingestion path.
    ///
    /// Fails without touching the filesystem when `batch_number` is not one of the
    /// [available batches](Self::available_batches).
    pub fn prepare_batch(
        &self,
        central_path: &str,
        job_name: &str,
        batch_number: u32,
    ) -> Result<String> {
        let available = self.available_batches(central_path)?;
        if !available.contains(&batch_number) {
            return Err(Error::BatchNotFound {
                batch: batch_number,
                available,
            });
        }

        if !self.copy_batch(central_path, job_name, batch_number) {
            return Err(Error::CopyFailed {
                batch: batch_number,
            });
        }

        Ok(self.ingestion_path(job_name, batch_number))
    }

    /// Stage every available batch for `job_name`.
    ///
    /// A batch that fails to stage is logged and left out of the result.
    pub fn prepare_all_batches(
        &self,
        central_path: &str,
        job_name: &str,
    ) -> Result<Vec<PreparedBatch>> {
        let mut prepared = vec![];
        for batch_number in self.available_batches(central_path)? {
            match self.prepare_batch(central_path, job_name, batch_number) {
                Ok(batch_path) => {
                    info!(batch_number, %batch_path, "prepared batch");
                    prepared.push(PreparedBatch {
                        batch_number,
                        batch_path,
                    });
                }
                Err(e) => warn!(batch_number, error = %e, "failed to prepare batch"),
            }
        }
        Ok(prepared)
    }

    /// Remove one staged batch, or the job's whole ingestion directory when `batch_number` is
    /// `None`. Nothing to remove is not an error.
    pub fn cleanup(&self, job_name: &str, batch_number: Option<u32>) -> Result<()> {
        let target_path = match batch_number {
            Some(n) => self.batch_ingestion_path(job_name, n),
            None => format!("{}/{job_name}", self.ingestion_base),
        };
        file_utils::remove_directory(&self.mounted(&target_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CENTRAL: &str = "/tmp/tpcdi/sf=10";

    fn manager(root: &TempDir) -> BatchManager {
        BatchManager::new(root.path(), DEFAULT_INGESTION_BASE_PATH)
    }

    fn make_batch(root: &TempDir, batch: &str, files: &[(&str, &str)]) {
        let dir = root
            .path()
            .join(CENTRAL.trim_start_matches('/'))
            .join(batch);
        fs::create_dir_all(&dir).unwrap();
        for (name, contents) in files {
            fs::write(dir.join(name), contents).unwrap();
        }
    }

    fn ingestion_dir(root: &TempDir, job: &str) -> PathBuf {
        root.path().join("tmp/tpcdi/ingestion").join(job)
    }

    #[test_log::test]
    fn lists_batches_in_numeric_order() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch10", &[]);
        make_batch(&root, "Batch1", &[]);
        make_batch(&root, "Batch3", &[]);
        make_batch(&root, "BatchX", &[]);
        make_batch(&root, "Other", &[]);
        fs::write(
            root.path().join("tmp/tpcdi/sf=10/Batch7"),
            "a file, not a batch",
        )
        .unwrap();

        assert_eq!(manager(&root).available_batches(CENTRAL).unwrap(), vec![1, 3, 10]);
    }

    #[test]
    fn missing_central_path_has_no_batches() {
        let root = TempDir::new().unwrap();
        assert!(manager(&root).available_batches("/nowhere").unwrap().is_empty());
    }

    #[test]
    fn ingestion_path_is_per_job() {
        let m = BatchManager::default();
        assert_eq!(m.ingestion_path("my-job", 1), "/tmp/tpcdi/ingestion/my-job");
        assert_eq!(m.ingestion_path("my-job", 3), "/tmp/tpcdi/ingestion/my-job");
        assert_eq!(m.mounted("/tmp/x"), PathBuf::from("/dbfs/tmp/x"));
        assert_eq!(
            m.ingestion_path("my-job", 1),
            format!("{}/my-job", tpcdi_config::batch_ingestion_base_path())
        );
    }

    #[test_log::test]
    fn prepare_batch_copies_into_ingestion_dir() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch2", &[("Account.txt", "1|x\n"), ("Trade.txt", "2|y\n")]);

        let path = manager(&root).prepare_batch(CENTRAL, "my-job", 2).unwrap();

        assert_eq!(path, "/tmp/tpcdi/ingestion/my-job");
        let staged = ingestion_dir(&root, "my-job").join("Batch2");
        assert_eq!(fs::read_to_string(staged.join("Account.txt")).unwrap(), "1|x\n");
        assert_eq!(fs::read_to_string(staged.join("Trade.txt")).unwrap(), "2|y\n");
    }

    #[test]
    fn prepare_batch_overwrites_previous_copy() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch1", &[("Account.txt", "new\n")]);
        let staged = ingestion_dir(&root, "my-job").join("Batch1");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("leftover.txt"), "old\n").unwrap();

        manager(&root).prepare_batch(CENTRAL, "my-job", 1).unwrap();

        assert!(!staged.join("leftover.txt").exists());
        assert_eq!(fs::read_to_string(staged.join("Account.txt")).unwrap(), "new\n");
    }

    #[test]
    fn prepare_unknown_batch_is_a_validation_error_without_copy() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch1", &[("Account.txt", "1\n")]);

        let err = manager(&root).prepare_batch(CENTRAL, "my-job", 4).unwrap_err();

        assert!(
            matches!(&err, Error::BatchNotFound { batch: 4, available } if available == &[1]),
            "{err}"
        );
        assert_eq!(err.to_string(), "Batch 4 not found. Available: [1]");
        assert!(!ingestion_dir(&root, "my-job").exists());
    }

    #[test_log::test]
    fn prepare_batch_reports_failed_copy() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch1", &[("Account.txt", "1\n")]);
        // the job's ingestion directory cannot be created over a regular file
        let blocker = ingestion_dir(&root, "my-job");
        fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        fs::write(&blocker, "not a directory").unwrap();

        let m = manager(&root);
        assert!(!m.copy_batch(CENTRAL, "my-job", 1));

        let err = m.prepare_batch(CENTRAL, "my-job", 1).unwrap_err();
        assert!(matches!(err, Error::CopyFailed { batch: 1 }), "{err}");
        assert_eq!(err.to_string(), "Failed to copy batch 1");
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }

    #[test]
    fn prepare_all_batches_stages_everything() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch1", &[("a.txt", "1")]);
        make_batch(&root, "Batch2", &[("a.txt", "2")]);

        let prepared = manager(&root)
            .prepare_all_batches(CENTRAL, "my-job")
            .unwrap();

        assert_eq!(
            prepared,
            vec![
                PreparedBatch {
                    batch_number: 1,
                    batch_path: "/tmp/tpcdi/ingestion/my-job".to_owned(),
                },
                PreparedBatch {
                    batch_number: 2,
                    batch_path: "/tmp/tpcdi/ingestion/my-job".to_owned(),
                },
            ]
        );
        assert_eq!(
            serde_json::to_value(&prepared[0]).unwrap(),
            serde_json::json!({"batch_number": 1, "batch_path": "/tmp/tpcdi/ingestion/my-job"})
        );
        assert!(ingestion_dir(&root, "my-job").join("Batch2/a.txt").is_file());
    }

    #[test]
    fn cleanup_single_batch_and_whole_job() {
        let root = TempDir::new().unwrap();
        make_batch(&root, "Batch1", &[("a.txt", "1")]);
        make_batch(&root, "Batch2", &[("a.txt", "2")]);
        let m = manager(&root);
        m.prepare_batch(CENTRAL, "my-job", 1).unwrap();
        m.prepare_batch(CENTRAL, "my-job", 2).unwrap();

        m.cleanup("my-job", Some(1)).unwrap();
        assert!(!ingestion_dir(&root, "my-job").join("Batch1").exists());
        assert!(ingestion_dir(&root, "my-job").join("Batch2").exists());

        m.cleanup("my-job", None).unwrap();
        assert!(!ingestion_dir(&root, "my-job").exists());
    }

    #[test]
    fn cleanup_of_missing_job_is_noop() {
        let root = TempDir::new().unwrap();
        manager(&root).cleanup("never-ran", None).unwrap();
        manager(&root).cleanup("never-ran", Some(3)).unwrap();
    }
}
