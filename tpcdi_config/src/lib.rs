//! Shared configuration for the TPC-DI workflow components.
//!
//! Everything a component needs (scale factor, directories, cluster sizing) is carried by an
//! explicit [`WorkflowContext`] handed over by the workflow driver, instead of being looked up
//! from whatever happens to be defined in the surrounding session.
mod context;
mod dag_args;

pub use context::{NodeType, WorkflowContext};
pub use dag_args::{
    BATCH_INGESTION_BASE_PATH, BatchDagArgs, DagArgs, DataGenerationConfig, batch_ingestion_base_path, build_batch_dag_args,
    build_dag_args, data_generation_config, shuffle_partitions,
};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to read workflow context {}: {source}", .path.display())]
    ReadContext {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid workflow context {}: {source}", .path.display())]
    ParseContext {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("node type '{0}' is not in the node type catalogue")]
    UnknownNodeType(String),

    #[error("node type '{0}' reports no memory")]
    NoMemory(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
