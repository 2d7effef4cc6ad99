use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures::StreamExt;
use object_store::{DynObjectStore, ObjectStore, path::Path as ObjectPath};
use observability_deps::tracing::info;
use tpcdi_batch::file_utils;
use tpcdi_config::DataGenerationConfig;

use crate::{
    GeneratorCommand, PromptProtocol, Result, UploadSummary, run_generator, upload_directory,
};

/// Local scratch disk the generator runs on before its output is uploaded.
pub const DEFAULT_SCRATCH_ROOT: &str = "/local_disk0";

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Reported when data generation is requested without a workflow context.
pub const STANDALONE_MESSAGE: &str =
    "This command cannot be executed standalone and MUST be called from the workflow builder!";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub scratch_root: PathBuf,
    /// Directory holding the generator distribution (`DIGen.jar` and its resources)
    pub tool_src_dir: PathBuf,
    /// Generate even when the target already holds data for this scale factor
    pub force_rewrite: bool,
    pub upload_parallelism: NonZeroUsize,
    pub upload_timeout: Duration,
    pub command: GeneratorCommand,
    pub protocol: PromptProtocol,
}

impl GeneratorConfig {
    pub fn new(tool_src_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
            tool_src_dir: tool_src_dir.into(),
            force_rewrite: false,
            upload_parallelism: NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            command: GeneratorCommand::digen(),
            protocol: PromptProtocol::digen_v1(),
        }
    }
}

/// Where a generation run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPaths {
    /// Generator directory on the target filesystem, `<tpcdi_directory>datagen/`
    pub datagen: String,
    /// Scratch copy of the generator the process runs from
    pub tool_dir: PathBuf,
    /// Output directory on the target filesystem, `<tpcdi_directory>sf=<scale_factor>`
    pub output: String,
    /// Scratch directory the generator writes to
    pub scratch_output: PathBuf,
}

impl GenerationPaths {
    pub fn new(config: &DataGenerationConfig, scratch_root: &Path) -> Self {
        let datagen = format!("{}datagen/", config.tpcdi_directory);
        let output = format!("{}sf={}", config.tpcdi_directory, config.scale_factor);
        Self {
            tool_dir: scratch_root.join(datagen.trim_start_matches('/')),
            scratch_output: scratch_root.join(output.trim_start_matches('/')),
            datagen,
            output,
        }
    }

    pub fn output_prefix(&self) -> ObjectPath {
        ObjectPath::from(self.output.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The target already held data and no rewrite was forced
    Skipped,
    Generated(UploadSummary),
}

async fn output_exists(store: &DynObjectStore, prefix: &ObjectPath) -> Result<bool> {
    match store.list(Some(prefix)).next().await {
        Some(meta) => meta.map(|_| true).map_err(Into::into),
        None => Ok(false),
    }
}

/// Generate the raw files for `data_config` and upload them to `store`.
///
/// Nothing is generated when `store` already has objects below the output path, unless
/// `force_rewrite` is set.
pub async fn generate_data(
    data_config: &DataGenerationConfig,
    config: &GeneratorConfig,
    store: Arc<DynObjectStore>,
) -> Result<GenerationOutcome> {
    let paths = GenerationPaths::new(data_config, &config.scratch_root);
    info!(
        tpcdi_directory = %data_config.tpcdi_directory,
        scale_factor = data_config.scale_factor,
        "data generation"
    );

    let exists = output_exists(store.as_ref(), &paths.output_prefix()).await?;
    match (exists, config.force_rewrite) {
        (true, false) => {
            info!(
                output = %paths.output,
                "data generation skipped since raw data already exists for this scale factor, \
                 force a rewrite to regenerate it"
            );
            return Ok(GenerationOutcome::Skipped);
        }
        (true, true) => info!(
            output = %paths.output,
            "raw data directory exists but is overwritten with newly generated data"
        ),
        (false, _) => info!(
            output = %paths.output,
            "raw data directory does not exist yet, generating"
        ),
    }

    let tool_src = config.tool_src_dir.clone();
    let tool_dir = paths.tool_dir.clone();
    let scratch_output = paths.scratch_output.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        file_utils::copy_directory(&tool_src, &tool_dir, true)?;
        file_utils::remove_directory(&scratch_output)?;
        Ok(())
    })
    .await??;

    run_generator(
        &config.command,
        &config.protocol,
        &paths.tool_dir,
        data_config.scale_factor,
        &paths.scratch_output,
    )
    .await?;
    info!(
        scale_factor = data_config.scale_factor,
        dir = %paths.scratch_output.display(),
        "data generation completed"
    );

    let summary = upload_directory(
        store,
        &paths.scratch_output,
        &config.scratch_root,
        config.upload_parallelism,
        config.upload_timeout,
    )
    .await?;

    Ok(GenerationOutcome::Generated(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::{PutPayload, memory::InMemory};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn data_config() -> DataGenerationConfig {
        DataGenerationConfig {
            tpcdi_directory: "/tmp/tpcdi/".to_owned(),
            scale_factor: 10,
        }
    }

    #[test]
    fn paths_follow_directory_layout() {
        let paths = GenerationPaths::new(&data_config(), Path::new(DEFAULT_SCRATCH_ROOT));
        assert_eq!(
            paths,
            GenerationPaths {
                datagen: "/tmp/tpcdi/datagen/".to_owned(),
                tool_dir: PathBuf::from("/local_disk0/tmp/tpcdi/datagen/"),
                output: "/tmp/tpcdi/sf=10".to_owned(),
                scratch_output: PathBuf::from("/local_disk0/tmp/tpcdi/sf=10"),
            }
        );
        assert_eq!(paths.output_prefix().as_ref(), "tmp/tpcdi/sf=10");
    }

    #[tokio::test]
    async fn skips_existing_output() {
        let dir = TempDir::new().unwrap();
        let store: Arc<DynObjectStore> = Arc::new(InMemory::new());
        store
            .put(
                &ObjectPath::from("tmp/tpcdi/sf=10/Batch1/Account.txt"),
                PutPayload::from_static(b"1|a\n"),
            )
            .await
            .unwrap();

        // the tool directory does not exist, so any attempt to generate would fail
        let mut config = GeneratorConfig::new(dir.path().join("no-tool"));
        config.scratch_root = dir.path().join("scratch");

        let outcome = generate_data(&data_config(), &config, store).await.unwrap();
        assert_eq!(outcome, GenerationOutcome::Skipped);
        assert!(!config.scratch_root.exists());
    }

    #[cfg(unix)]
    mod with_fake_generator {
        use super::*;

        const FAKE_DIGEN: &str = r#"
echo "Press ENTER to continue"
read first
echo "Type YES to accept"
read answer
[ "$answer" = "YES" ] || exit 3
mkdir -p "$4/Batch1" "$4/Batch2"
echo "1|a" > "$4/Batch1/Account.txt"
echo "2|b" > "$4/Batch2/Account.txt"
"#;

        fn config(dir: &Path) -> GeneratorConfig {
            let tool = dir.join("tools/datagen");
            std::fs::create_dir_all(&tool).unwrap();
            std::fs::write(tool.join("fake_digen.sh"), FAKE_DIGEN).unwrap();

            let mut config = GeneratorConfig::new(tool);
            config.scratch_root = dir.join("scratch");
            config.command = GeneratorCommand {
                program: "sh".to_owned(),
                args: vec!["fake_digen.sh".to_owned()],
            };
            config
        }

        #[test_log::test(tokio::test)]
        async fn generates_and_uploads() {
            let dir = TempDir::new().unwrap();
            let config = config(dir.path());
            let store: Arc<DynObjectStore> = Arc::new(InMemory::new());

            let outcome = generate_data(&data_config(), &config, Arc::clone(&store))
                .await
                .unwrap();

            assert_eq!(
                outcome,
                GenerationOutcome::Generated(UploadSummary {
                    uploaded: 2,
                    timed_out: 0
                })
            );
            let data = store
                .get(&ObjectPath::from("tmp/tpcdi/sf=10/Batch2/Account.txt"))
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            assert_eq!(&data[..], b"2|b\n");
            assert!(
                config
                    .scratch_root
                    .join("tmp/tpcdi/datagen/fake_digen.sh")
                    .exists()
            );

            // a second run finds the uploaded data
            let outcome = generate_data(&data_config(), &config, Arc::clone(&store))
                .await
                .unwrap();
            assert_eq!(outcome, GenerationOutcome::Skipped);
        }

        #[test_log::test(tokio::test)]
        async fn force_rewrite_regenerates() {
            let dir = TempDir::new().unwrap();
            let mut config = config(dir.path());
            config.force_rewrite = true;
            let store: Arc<DynObjectStore> = Arc::new(InMemory::new());
            store
                .put(
                    &ObjectPath::from("tmp/tpcdi/sf=10/Batch1/Account.txt"),
                    PutPayload::from_static(b"stale\n"),
                )
                .await
                .unwrap();

            let outcome = generate_data(&data_config(), &config, Arc::clone(&store))
                .await
                .unwrap();

            assert!(matches!(outcome, GenerationOutcome::Generated(_)));
            let data = store
                .get(&ObjectPath::from("tmp/tpcdi/sf=10/Batch1/Account.txt"))
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            assert_eq!(&data[..], b"1|a\n");
        }
    }
}
