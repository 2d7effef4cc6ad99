use std::{num::NonZeroUsize, path::PathBuf, time::Duration};

use anyhow::Context;
use observability_deps::tracing::info;
use tpcdi_batch::batch_manager::DEFAULT_MOUNT_ROOT;
use tpcdi_clap_blocks::object_store::{ObjectStoreConfig, ObjectStoreType};
use tpcdi_config::{data_generation_config, shuffle_partitions};
use tpcdi_datagen::{
    DEFAULT_SCRATCH_ROOT, GenerationOutcome, GeneratorCommand, GeneratorConfig, PromptProtocol,
    STANDALONE_MESSAGE, generate_data,
};

use super::common::load_context;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// Workflow context written by the workflow builder
    #[clap(long = "context", env = "TPCDI_WORKFLOW_CONTEXT", action)]
    context: Option<PathBuf>,

    /// Directory holding DIGen.jar; `<repo_src_path>/tools/datagen` of the context by default
    #[clap(long = "tool-dir", env = "TPCDI_DATAGEN_TOOL_DIR", action)]
    tool_dir: Option<PathBuf>,

    /// Local disk the generator runs on before the files are uploaded
    #[clap(
        long = "scratch-root",
        env = "TPCDI_SCRATCH_ROOT",
        default_value = DEFAULT_SCRATCH_ROOT,
        action
    )]
    scratch_root: PathBuf,

    /// Generate even when data for this scale factor already exists
    #[clap(long = "force-rewrite", env = "TPCDI_FORCE_REWRITE", action)]
    force_rewrite: bool,

    /// Maximum number of files uploaded at once, defaults to the number of cores
    #[clap(long = "upload-parallelism", env = "TPCDI_UPLOAD_PARALLELISM", action)]
    upload_parallelism: Option<NonZeroUsize>,

    /// Time allowed for uploading a single file
    #[clap(
        long = "upload-timeout",
        env = "TPCDI_UPLOAD_TIMEOUT",
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    upload_timeout: Duration,

    /// JSON prompt protocol to answer the generator with instead of the built-in one
    #[clap(long = "prompt-protocol", env = "TPCDI_PROMPT_PROTOCOL", action)]
    prompt_protocol: Option<PathBuf>,

    /// Program started instead of `java -jar DIGen.jar`
    #[clap(long = "generator-program", action)]
    generator_program: Option<String>,

    /// Arguments of `--generator-program`, before the scale factor and output arguments
    #[clap(
        long = "generator-arg",
        requires = "generator_program",
        allow_hyphen_values = true,
        action = clap::ArgAction::Append
    )]
    generator_args: Vec<String>,

    #[clap(flatten)]
    object_store: ObjectStoreConfig,

    #[clap(flatten)]
    pub(crate) logging_config: trogging::cli::LoggingConfig,
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let Some(context_path) = &config.context else {
        anyhow::bail!(STANDALONE_MESSAGE);
    };
    let context = load_context(context_path)?;
    let data_config = data_generation_config(&context);
    let partitions = shuffle_partitions(&context).context("sizing the cluster")?;
    info!(
        tpcdi_directory = %data_config.tpcdi_directory,
        scale_factor = data_config.scale_factor,
        shuffle_partitions = partitions,
        "raw files location"
    );

    let tool_dir = config
        .tool_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&context.repo_src_path).join("tools/datagen"));
    let mut generator = GeneratorConfig::new(tool_dir);
    generator.scratch_root = config.scratch_root.clone();
    generator.force_rewrite = config.force_rewrite;
    generator.upload_timeout = config.upload_timeout;
    if let Some(n) = config.upload_parallelism {
        generator.upload_parallelism = n;
    }
    if let Some(path) = &config.prompt_protocol {
        generator.protocol = PromptProtocol::from_path(path)?;
    }
    if let Some(program) = &config.generator_program {
        generator.command = GeneratorCommand {
            program: program.clone(),
            args: config.generator_args.clone(),
        };
    }

    let mut store_config = config.object_store.clone();
    if matches!(store_config.object_store, ObjectStoreType::File)
        && store_config.data_directory.is_none()
    {
        store_config.data_directory = Some(PathBuf::from(DEFAULT_MOUNT_ROOT));
    }
    let store = store_config
        .make_object_store()
        .context("creating upload object store")?;

    match generate_data(&data_config, &generator, store).await? {
        GenerationOutcome::Skipped => println!(
            "Data generation skipped since raw data/directory already exists for this scale factor"
        ),
        GenerationOutcome::Generated(summary) => println!(
            "Data generation for scale factor={} completed: {} files uploaded, {} timed out",
            data_config.scale_factor, summary.uploaded, summary.timed_out
        ),
    }
    Ok(())
}
