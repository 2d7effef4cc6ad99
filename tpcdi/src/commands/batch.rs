//! Entry points of the batch staging steps of an incremental workflow.

use std::path::PathBuf;

use observability_deps::tracing::info;
use tpcdi_batch::{
    BatchManager,
    batch_manager::{DEFAULT_INGESTION_BASE_PATH, DEFAULT_MOUNT_ROOT},
};

use super::common::Status;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

impl Config {
    pub(crate) fn logging_config(&self) -> &trogging::cli::LoggingConfig {
        let common = match &self.command {
            SubCommand::List(c) => &c.common,
            SubCommand::Prepare(c) => &c.common,
            SubCommand::PrepareAll(c) => &c.common,
            SubCommand::Cleanup(c) => &c.common,
        };
        &common.logging_config
    }
}

#[derive(Debug, clap::Parser)]
struct ManagerConfig {
    /// Where the distributed filesystem is mounted locally
    #[clap(
        long = "dbfs-root",
        env = "TPCDI_DBFS_ROOT",
        default_value = DEFAULT_MOUNT_ROOT,
        action
    )]
    dbfs_root: PathBuf,

    /// Base path of the per-job ingestion directories
    #[clap(
        long = "ingestion-base",
        env = "TPCDI_INGESTION_BASE",
        default_value = DEFAULT_INGESTION_BASE_PATH,
        action
    )]
    ingestion_base: String,

    #[clap(flatten)]
    logging_config: trogging::cli::LoggingConfig,
}

impl ManagerConfig {
    fn manager(&self) -> BatchManager {
        BatchManager::new(&self.dbfs_root, &self.ingestion_base)
    }
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// List the batches available under a central path
    List(ListConfig),

    /// Copy one batch into the ingestion directory of a job
    Prepare(PrepareConfig),

    /// Copy every available batch into the ingestion directory of a job
    PrepareAll(PrepareAllConfig),

    /// Remove the ingestion directory of a job, or of one of its batches
    Cleanup(CleanupConfig),
}

#[derive(Debug, clap::Parser)]
struct ListConfig {
    /// Directory holding the generated `Batch<N>` directories
    #[clap(long = "central-path", action)]
    central_path: String,

    #[clap(flatten)]
    common: ManagerConfig,
}

#[derive(Debug, clap::Parser)]
struct PrepareConfig {
    /// Directory holding the generated `Batch<N>` directories
    #[clap(long = "central-path", action)]
    central_path: String,

    #[clap(long = "job-name", action)]
    job_name: String,

    #[clap(long = "batch-number", action)]
    batch_number: u32,

    #[clap(flatten)]
    common: ManagerConfig,
}

#[derive(Debug, clap::Parser)]
struct PrepareAllConfig {
    /// Directory holding the generated `Batch<N>` directories
    #[clap(long = "central-path", action)]
    central_path: String,

    #[clap(long = "job-name", action)]
    job_name: String,

    #[clap(flatten)]
    common: ManagerConfig,
}

#[derive(Debug, clap::Parser)]
struct CleanupConfig {
    #[clap(long = "job-name", action)]
    job_name: String,

    /// Only remove this batch; the whole job directory otherwise
    #[clap(long = "batch-number", action)]
    batch_number: Option<u32>,

    #[clap(flatten)]
    common: ManagerConfig,
}

/// Run a batch step; the outcome is reported, never returned as an error.
pub(crate) async fn command(config: Config) -> Status {
    // the batch manager works on the local mount with blocking filesystem calls
    match tokio::task::spawn_blocking(move || run(config.command)).await {
        Ok(status) => status,
        Err(e) => Status::Failed(format!("batch task failed: {e}")),
    }
}

fn run(command: SubCommand) -> Status {
    match command {
        SubCommand::List(config) => {
            match config.common.manager().available_batches(&config.central_path) {
                Ok(batches) => Status::Success(format!("Available batches: {batches:?}")),
                Err(e) => Status::Failed(format!("Error listing batches: {e}")),
            }
        }
        SubCommand::Prepare(config) => {
            let PrepareConfig {
                central_path,
                job_name,
                batch_number,
                common,
            } = config;
            info!(batch_number, %job_name, %central_path, "preparing batch");
            match common
                .manager()
                .prepare_batch(&central_path, &job_name, batch_number)
            {
                Ok(path) => Status::Success(format!("Batch {batch_number} prepared at {path}")),
                Err(e) => Status::Failed(format!("Error preparing batch {batch_number}: {e}")),
            }
        }
        SubCommand::PrepareAll(config) => {
            match config
                .common
                .manager()
                .prepare_all_batches(&config.central_path, &config.job_name)
            {
                Ok(prepared) => {
                    let numbers: Vec<_> = prepared.iter().map(|b| b.batch_number).collect();
                    Status::Success(format!(
                        "Prepared batches {numbers:?} for {}",
                        config.job_name
                    ))
                }
                Err(e) => Status::Failed(format!("Error preparing batches: {e}")),
            }
        }
        SubCommand::Cleanup(config) => {
            info!(job_name = %config.job_name, "cleaning up ingestion directory");
            match config
                .common
                .manager()
                .cleanup(&config.job_name, config.batch_number)
            {
                Ok(()) => Status::Success(match config.batch_number {
                    Some(n) => format!("Cleaned up batch {n} for {}", config.job_name),
                    None => format!("Cleaned up ingestion directory for {}", config.job_name),
                }),
                Err(e) => Status::Failed(format!("Error cleaning up ingestion directory: {e}")),
            }
        }
    }
}
