//! Drives the external DIGen tool to produce the raw benchmark files and publishes them to the
//! target object store.
//!
//! The generator is treated as an opaque executable: it is copied to local scratch space, fed the
//! answers of its interactive prompts over stdin, and its output directory is uploaded file by
//! file with bounded parallelism.
mod generate;
mod protocol;
mod runner;
mod upload;

pub use generate::{
    DEFAULT_SCRATCH_ROOT, DEFAULT_UPLOAD_TIMEOUT, GenerationOutcome, GenerationPaths,
    GeneratorConfig, STANDALONE_MESSAGE, generate_data,
};
pub use protocol::{PromptExchange, PromptProtocol};
pub use runner::{GeneratorCommand, run_generator};
pub use upload::{UploadSummary, upload_directory};

use std::{path::PathBuf, process::ExitStatus};

use tpcdi_batch::file_utils;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to read prompt protocol {}: {source}", .path.display())]
    ReadProtocol {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid prompt protocol: {0}")]
    ParseProtocol(#[from] serde_json::Error),

    #[error("unable to start generator `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("generator process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("error reading generator output: {0}")]
    Output(#[source] std::io::Error),

    #[error("generator exited with {status}")]
    GeneratorFailed { status: ExitStatus },

    #[error("failed to upload {}: {source}", .path.display())]
    Upload {
        path: PathBuf,
        source: file_utils::Error,
    },

    #[error("{} is not below the scratch root {}", .path.display(), .root.display())]
    OutsideScratchRoot { path: PathBuf, root: PathBuf },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    FileUtils(#[from] file_utils::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
