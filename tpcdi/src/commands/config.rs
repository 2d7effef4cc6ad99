use std::path::PathBuf;

use serde::Serialize;
use tpcdi_config::{
    batch_ingestion_base_path, build_batch_dag_args, build_dag_args, data_generation_config,
};

use super::common::load_context;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    command: SubCommand,
}

#[derive(Debug, clap::Parser)]
enum SubCommand {
    /// Print the arguments the workflow templates are rendered with
    DagArgs(DagArgsConfig),

    /// Print the data generation settings of the workflow
    Datagen(DatagenConfig),
}

#[derive(Debug, clap::Parser)]
struct DagArgsConfig {
    /// Workflow context written by the workflow builder
    #[clap(long = "context", env = "TPCDI_WORKFLOW_CONTEXT", action)]
    context: PathBuf,

    /// Render the arguments of one batch pipeline instead of the full workflow
    #[clap(long = "batch-number", action)]
    batch_number: Option<u32>,

    /// Where the batch is staged; `<ingestion base>/<job name>` by default
    #[clap(long = "batch-ingestion-path", requires = "batch_number", action)]
    batch_ingestion_path: Option<String>,
}

#[derive(Debug, clap::Parser)]
struct DatagenConfig {
    /// Workflow context written by the workflow builder
    #[clap(long = "context", env = "TPCDI_WORKFLOW_CONTEXT", action)]
    context: PathBuf,
}

pub(crate) fn command(config: Config) -> anyhow::Result<()> {
    match config.command {
        SubCommand::DagArgs(config) => {
            let context = load_context(&config.context)?;
            match config.batch_number {
                Some(batch_number) => {
                    let path = config.batch_ingestion_path.unwrap_or_else(|| {
                        format!("{}/{}", batch_ingestion_base_path(), context.job_name)
                    });
                    print_json(&build_batch_dag_args(&context, batch_number, path)?)
                }
                None => print_json(&build_dag_args(&context)?),
            }
        }
        SubCommand::Datagen(config) => {
            let context = load_context(&config.context)?;
            print_json(&data_generation_config(&context))
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
