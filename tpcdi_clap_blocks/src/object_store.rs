//! CLI handling for the object store that generated data is uploaded to.

use object_store::{
    DynObjectStore,
    local::LocalFileSystem,
    memory::InMemory,
    throttle::{ThrottleConfig, ThrottledStore},
};
use observability_deps::tracing::{info, warn};
use snafu::{ResultExt, Snafu};
use std::{fs, path::PathBuf, sync::Arc, time::Duration};

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ParseError {
    #[snafu(display("Unable to create data directory {:?}: {}", path, source))]
    CreatingDataDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to create local store {:?}: {}", path, source))]
    CreateLocalFileSystem {
        path: PathBuf,
        source: object_store::Error,
    },

    #[snafu(display(
        "Specified {:?} for the object store, required configuration missing for {}",
        object_store,
        missing
    ))]
    MissingObjectStoreConfig {
        object_store: ObjectStoreType,
        missing: String,
    },
}

/// CLI config for the upload target object store.
#[derive(Debug, Clone, clap::Parser)]
pub struct ObjectStoreConfig {
    /// Which object storage to upload generated files to.
    ///
    /// Possible values (case insensitive):
    ///
    /// * memory: Effectively no object persistence.
    /// * memory-throttled: Like `memory` but with latency and throughput that somewhat resemble a
    ///   cloud object store. Useful for testing upload timeouts.
    /// * file: Stores objects in the local filesystem. Must also set `--data-dir`.
    #[clap(
        value_enum,
        long = "object-store",
        env = "TPCDI_OBJECT_STORE",
        ignore_case = true,
        default_value = "file",
        action,
        verbatim_doc_comment
    )]
    pub object_store: ObjectStoreType,

    /// The root directory of the `file` object store, usually the local mount of the
    /// distributed filesystem.
    #[clap(long = "data-dir", env = "TPCDI_DATA_DIR", action)]
    pub data_directory: Option<PathBuf>,
}

impl ObjectStoreConfig {
    /// Create a config for the local filesystem store rooted at `data_directory`.
    pub fn new_file(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            object_store: ObjectStoreType::File,
            data_directory: Some(data_directory.into()),
        }
    }

    /// Create config-dependant object store.
    pub fn make_object_store(&self) -> Result<Arc<DynObjectStore>, ParseError> {
        if let Some(data_dir) = &self.data_directory {
            if !matches!(&self.object_store, ObjectStoreType::File) {
                warn!(?data_dir, object_store_type=?self.object_store,
                      "--data-dir / `TPCDI_DATA_DIR` ignored. It only affects 'file' object stores");
            }
        }

        let object_store: Arc<DynObjectStore> = match &self.object_store {
            ObjectStoreType::Memory => {
                info!(object_store_type = "Memory", "Object Store");
                Arc::new(InMemory::new())
            }
            ObjectStoreType::MemoryThrottled => {
                let config = ThrottleConfig {
                    // for every call: assume a 100ms latency
                    wait_delete_per_call: Duration::from_millis(100),
                    wait_get_per_call: Duration::from_millis(100),
                    wait_list_per_call: Duration::from_millis(100),
                    wait_list_with_delimiter_per_call: Duration::from_millis(100),
                    wait_put_per_call: Duration::from_millis(100),

                    // for list operations: assume we need 1 call per 1k entries at 100ms
                    wait_list_per_entry: Duration::from_millis(100) / 1_000,
                    wait_list_with_delimiter_per_entry: Duration::from_millis(100) / 1_000,

                    // for upload/download: assume 1GByte/s
                    wait_get_per_byte: Duration::from_secs(1) / 1_000_000_000,
                };

                info!(?config, object_store_type = "Memory", "Object Store");
                Arc::new(ThrottledStore::new(InMemory::new(), config))
            }
            ObjectStoreType::File => self.new_local_file_system()?,
        };

        Ok(object_store)
    }

    fn new_local_file_system(&self) -> Result<Arc<LocalFileSystem>, ParseError> {
        match self.data_directory.as_ref() {
            Some(data_dir) => {
                info!(?data_dir, object_store_type = "Directory", "Object Store");
                fs::create_dir_all(data_dir)
                    .context(CreatingDataDirectorySnafu { path: data_dir })?;

                let store = LocalFileSystem::new_with_prefix(data_dir)
                    .context(CreateLocalFileSystemSnafu { path: data_dir })?
                    // Clean up intermediate directories automatically.
                    .with_automatic_cleanup(true);
                Ok(Arc::new(store))
            }
            None => MissingObjectStoreConfigSnafu {
                object_store: ObjectStoreType::File,
                missing: "data-dir",
            }
            .fail()?,
        }
    }
}

/// Object-store type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum ObjectStoreType {
    /// In-memory.
    Memory,

    /// In-memory with additional throttling applied for testing
    MemoryThrottled,

    /// Filesystem.
    File,
}
