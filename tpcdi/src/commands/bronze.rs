//! Entry point of the bronze pipeline.

use std::path::PathBuf;

use anyhow::Context;
use datafusion::prelude::SessionContext;
use observability_deps::tracing::info;
use tpcdi_bronze::{BronzePipeline, PipelineSettings, declare_tables, filename_groups};
use tpcdi_clap_blocks::datafusion::DataFusionConfig;

use super::common::SeparatedKeyValue;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// JSON file with the pipeline settings
    #[clap(long = "settings", env = "TPCDI_PIPELINE_SETTINGS", action)]
    settings: PathBuf,

    /// Override a pipeline setting, e.g. `--conf scale_factor=10`
    #[clap(long = "conf", action = clap::ArgAction::Append)]
    overrides: Vec<SeparatedKeyValue<String, String>>,

    /// Directory the bronze tables are written to, one subdirectory per table
    #[clap(
        long = "output-dir",
        env = "TPCDI_BRONZE_OUTPUT_DIR",
        required_unless_present = "dry_run",
        action
    )]
    output_dir: Option<PathBuf>,

    /// Print the file name groups and table declarations without reading any file
    #[clap(long = "dry-run", action)]
    dry_run: bool,

    #[clap(flatten)]
    datafusion_config: DataFusionConfig,

    #[clap(flatten)]
    pub(crate) logging_config: trogging::cli::LoggingConfig,
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let settings = PipelineSettings::from_path(&config.settings)?
        .with_overrides(config.overrides.into_iter().map(|kv| kv.0));

    let groups = filename_groups(&settings)?;
    for (filename, tables) in &groups {
        info!(%filename, ?tables, "file name group");
    }
    let declarations = declare_tables(&settings, &groups)?;

    if config.dry_run {
        let plan = serde_json::json!({
            "groups": groups,
            "declarations": declarations,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let Some(output_dir) = config.output_dir else {
        anyhow::bail!("--output-dir is required unless --dry-run is given");
    };
    let session_config = config
        .datafusion_config
        .session_config()
        .context("invalid DataFusion configuration")?;
    let pipeline = BronzePipeline::new(SessionContext::new_with_config(session_config), settings);

    let summaries = pipeline.run(&declarations, &output_dir).await?;
    for summary in &summaries {
        println!(
            "{}: {} rows written to {}",
            summary.name,
            summary.rows,
            summary.output.display()
        );
    }
    Ok(())
}
