use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Memory and core count of one cluster node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeType {
    pub memory_mb: u64,
    pub num_cores: u32,
}

/// The parameters the workflow driver resolved for this run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowContext {
    /// Target warehouse (catalog/schema) the pipeline writes to
    pub wh_target: String,
    /// Root of the raw data on the distributed filesystem, with a trailing `/`
    pub tpcdi_directory: String,
    pub scale_factor: u32,
    pub job_name: String,
    /// Checkout of this repository on the workflow platform
    pub repo_src_path: String,
    pub cloud_provider: String,
    pub worker_node_type: String,
    pub driver_node_type: String,
    /// Zero means a single node cluster where the driver does the work
    pub worker_node_count: u32,
    #[serde(alias = "dbr")]
    pub dbr_version_id: String,
    /// Multiplier applied to the scale factor when sizing shuffle partitions
    pub shuffle_part_mult: u32,
    /// Catalogue of node types available to the cluster, keyed by name
    pub node_types: IndexMap<String, NodeType>,
}

impl WorkflowContext {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadContext {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| Error::ParseContext {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn worker_node(&self) -> Result<NodeType> {
        self.node_types
            .get(&self.worker_node_type)
            .copied()
            .ok_or_else(|| Error::UnknownNodeType(self.worker_node_type.clone()))
    }
}
