//! Argument maps consumed when rendering the workflow and pipeline templates.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, WorkflowContext};

/// Base path of the per-job batch ingestion directories on the distributed filesystem.
pub const BATCH_INGESTION_BASE_PATH: &str = "/tmp/tpcdi/ingestion";

/// Shuffle partition count for the cluster described by `ctx`.
///
/// Scales the total core count by how far the data volume (scale factor times the multiplier)
/// exceeds the total worker memory, never going below one partition per core. A cluster without
/// workers is sized from the single worker node type.
pub fn shuffle_partitions(ctx: &WorkflowContext) -> Result<u32> {
    let node = ctx.worker_node()?;
    let (total_memory_mb, total_cores) = match ctx.worker_node_count {
        0 => (node.memory_mb, u64::from(node.num_cores)),
        n => (
            node.memory_mb * u64::from(n),
            u64::from(node.num_cores) * u64::from(n),
        ),
    };
    if total_memory_mb == 0 {
        return Err(Error::NoMemory(ctx.worker_node_type.clone()));
    }

    let volume = f64::from(ctx.shuffle_part_mult) * f64::from(ctx.scale_factor);
    let factor = f64::max(1.0, volume / total_memory_mb as f64);
    Ok((total_cores as f64 * factor) as u32)
}

/// Template arguments for generating the workflow of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagArgs {
    pub wh_target: String,
    pub tpcdi_directory: String,
    pub scale_factor: u32,
    pub job_name: String,
    pub repo_src_path: String,
    pub cloud_provider: String,
    pub worker_node_type: String,
    pub driver_node_type: String,
    pub worker_node_count: u32,
    pub dbr: String,
    pub shuffle_partitions: u32,
}

/// Template arguments for the pipeline of a single incremental batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDagArgs {
    #[serde(flatten)]
    pub base: DagArgs,
    pub current_batch_number: u32,
    pub batch_ingestion_path: String,
}

pub fn build_dag_args(ctx: &WorkflowContext) -> Result<DagArgs> {
    Ok(DagArgs {
        wh_target: ctx.wh_target.clone(),
        tpcdi_directory: ctx.tpcdi_directory.clone(),
        scale_factor: ctx.scale_factor,
        job_name: ctx.job_name.clone(),
        repo_src_path: ctx.repo_src_path.clone(),
        cloud_provider: ctx.cloud_provider.clone(),
        worker_node_type: ctx.worker_node_type.clone(),
        driver_node_type: ctx.driver_node_type.clone(),
        worker_node_count: ctx.worker_node_count,
        dbr: ctx.dbr_version_id.clone(),
        shuffle_partitions: shuffle_partitions(ctx)?,
    })
}

/// [`build_dag_args`] for one batch; the job name gets a `-batch-<N>` suffix so every batch
/// pipeline is distinct.
pub fn build_batch_dag_args(
    ctx: &WorkflowContext,
    batch_number: u32,
    batch_ingestion_path: impl Into<String>,
) -> Result<BatchDagArgs> {
    let mut base = build_dag_args(ctx)?;
    base.job_name = format!("{}-batch-{batch_number}", ctx.job_name);
    Ok(BatchDagArgs {
        base,
        current_batch_number: batch_number,
        batch_ingestion_path: batch_ingestion_path.into(),
    })
}

/// The subset of the context data generation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGenerationConfig {
    pub tpcdi_directory: String,
    pub scale_factor: u32,
}

pub fn data_generation_config(ctx: &WorkflowContext) -> DataGenerationConfig {
    DataGenerationConfig {
        tpcdi_directory: ctx.tpcdi_directory.clone(),
        scale_factor: ctx.scale_factor,
    }
}

/// Base path of the per-job batch ingestion directories.
pub fn batch_ingestion_base_path() -> &'static str {
    BATCH_INGESTION_BASE_PATH
}
