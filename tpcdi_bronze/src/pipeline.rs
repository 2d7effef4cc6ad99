//! Materialization of the declared tables on a DataFusion session.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, AsArray, StringArray},
    datatypes::{DataType, Field, Schema, UInt64Type},
    record_batch::RecordBatch,
};
use datafusion::{
    common::{ScalarValue, TableReference},
    dataframe::DataFrameWriteOptions,
    functions::expr_fn::{coalesce, substring},
    logical_expr::{cast, ident, lit},
    prelude::{CsvReadOptions, DataFrame, SessionContext},
};
use indexmap::IndexMap;
use observability_deps::tracing::{debug, info, warn};
use serde::Serialize;
use tpcdi_batch::file_utils;

use crate::{
    BATCH_ID_COLUMN, Error, FINWIRE, PipelineSettings, Result, TableDeclaration, TableDescriptor,
    files::{FileFilter, batch_id_from_path},
    schema::parse_schema,
    settings::{FILES_DIRECTORY, SCALE_FACTOR},
    tables::FINWIRE_PARTITION_COLUMN,
};

/// Column holding each line of a fixed-width file.
pub const VALUE_COLUMN: &str = "value";

/// 1-based position and length of the record type in a FinWire line.
const RECTYPE_POSITION: i64 = 16;
const RECTYPE_LENGTH: i64 = 3;

/// Result of writing one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub output: PathBuf,
}

/// Builds the declared bronze tables from the raw files on one session.
#[derive(Debug)]
pub struct BronzePipeline {
    ctx: SessionContext,
    settings: PipelineSettings,
}

impl BronzePipeline {
    pub fn new(ctx: SessionContext, settings: PipelineSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// `<files_directory>/sf=<scale_factor>/<path>`
    fn source_dir(&self, path: &str) -> Result<PathBuf> {
        Ok(Path::new(self.settings.get(FILES_DIRECTORY)?)
            .join(format!("sf={}", self.settings.get(SCALE_FACTOR)?))
            .join(path))
    }

    async fn list_files(&self, path: &str, filename_glob: &str) -> Result<Vec<PathBuf>> {
        let filter = FileFilter::new(&self.source_dir(path)?, filename_glob)?;
        let files = tokio::task::spawn_blocking(move || filter.list()).await??;
        debug!(path, filename_glob, files = files.len(), "discovered files");
        Ok(files)
    }

    async fn read_delimited(
        &self,
        descriptor: &TableDescriptor,
        schema: &Schema,
        files: Vec<String>,
    ) -> Result<DataFrame> {
        if files.is_empty() {
            return Ok(self
                .ctx
                .read_batch(RecordBatch::new_empty(Arc::new(schema.clone())))?);
        }
        let options = CsvReadOptions::new()
            .schema(schema)
            .has_header(descriptor.header)
            .delimiter(descriptor.delimiter)
            // the file name glob already selected the files
            .file_extension("");
        Ok(self.ctx.read_csv(files, options).await?)
    }

    /// All rows of the delimited files of `table`, with the configured schema and no inference.
    pub async fn file_stream(&self, table: &str) -> Result<DataFrame> {
        let descriptor = TableDescriptor::from_settings(&self.settings, table)?;
        let schema = parse_schema(&descriptor.schema)?;
        let files = self
            .list_files(&descriptor.path, &descriptor.filename)
            .await?;
        let files = files.iter().map(|f| f.display().to_string()).collect();
        self.read_delimited(&descriptor, &schema, files).await
    }

    /// A raw table; tables in `tables_with_batchid` get the batch of each file as `batchid`.
    pub async fn raw_table(&self, table: &str) -> Result<DataFrame> {
        let descriptor = TableDescriptor::from_settings(&self.settings, table)?;
        if !descriptor.with_batchid {
            return self.file_stream(table).await;
        }

        let schema = parse_schema(&descriptor.schema)?;
        let mut by_batch: BTreeMap<Option<i32>, Vec<String>> = BTreeMap::new();
        for file in self
            .list_files(&descriptor.path, &descriptor.filename)
            .await?
        {
            let file = file.display().to_string();
            by_batch
                .entry(batch_id_from_path(&file))
                .or_default()
                .push(file);
        }
        if by_batch.is_empty() {
            by_batch.insert(None, vec![]);
        }

        let mut frames = Vec::with_capacity(by_batch.len());
        for (batch, files) in by_batch {
            let df = self.read_delimited(&descriptor, &schema, files).await?;
            frames.push(df.with_column(BATCH_ID_COLUMN, lit(ScalarValue::Int32(batch)))?);
        }
        union_all(frames)
    }

    /// Union of the file streams of `members`, with `batchid` defaulted to 1.
    ///
    /// A member whose stream cannot be built is left out; it is an error only when no member
    /// can be read.
    pub async fn unified_table(&self, members: &[String]) -> Result<DataFrame> {
        let mut streams = vec![];
        for table in members {
            match self.file_stream(table).await {
                Ok(df) => streams.push(df),
                Err(e) => warn!(%table, %e, "could not create stream for table"),
            }
        }
        if streams.is_empty() {
            return Err(Error::NoStreams {
                tables: members.to_vec(),
            });
        }

        let unified = union_by_name(streams)?;
        let batch_id = if unified
            .schema()
            .has_column_with_unqualified_name(BATCH_ID_COLUMN)
        {
            coalesce(vec![ident(BATCH_ID_COLUMN), lit(1_i32)])
        } else {
            lit(1_i32)
        };
        Ok(unified.with_column(BATCH_ID_COLUMN, batch_id)?)
    }

    /// FinWire lines as `value`, with the record type at characters 16 to 18 as `rectype`.
    pub async fn finwire_table(&self) -> Result<DataFrame> {
        let path = self.settings.get(&format!("{FINWIRE}.path"))?;
        let filename = self.settings.get(&format!("{FINWIRE}.filename"))?;
        let files = self.list_files(path, filename).await?;

        let schema = Arc::new(Schema::new(vec![Field::new(
            VALUE_COLUMN,
            DataType::Utf8,
            false,
        )]));
        let mut batches = Vec::with_capacity(files.len());
        for file in files {
            let data = tokio::fs::read(&file)
                .await
                .map_err(|source| Error::ReadFile {
                    path: file.clone(),
                    source,
                })?;
            let text = String::from_utf8_lossy(&data);
            let lines: ArrayRef = Arc::new(StringArray::from_iter_values(text.lines()));
            batches.push(RecordBatch::try_new(Arc::clone(&schema), vec![lines])?);
        }

        let df = if batches.is_empty() {
            self.ctx.read_batch(RecordBatch::new_empty(schema))?
        } else {
            self.ctx.read_batches(batches)?
        };
        Ok(df.with_column(
            FINWIRE_PARTITION_COLUMN,
            substring(
                ident(VALUE_COLUMN),
                lit(RECTYPE_POSITION),
                lit(RECTYPE_LENGTH),
            ),
        )?)
    }

    /// Build `declaration` and register it in the session under its name.
    pub async fn materialize(&self, declaration: &TableDeclaration) -> Result<DataFrame> {
        let df = match declaration {
            TableDeclaration::Raw { name } => self.raw_table(name).await?,
            TableDeclaration::Unified { members, .. } => self.unified_table(members).await?,
            TableDeclaration::FinWire { .. } => self.finwire_table().await?,
        };
        self.ctx.register_table(
            TableReference::bare(declaration.name().to_owned()),
            df.clone().into_view(),
        )?;
        Ok(df)
    }

    /// Materialize every declaration in order and write it as Parquet below `output_dir`,
    /// replacing whatever an earlier run wrote for the table.
    pub async fn run(
        &self,
        declarations: &[TableDeclaration],
        output_dir: &Path,
    ) -> Result<Vec<TableSummary>> {
        let mut summaries = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            let name = declaration.name();
            info!(table = name, "materializing table");
            let df = self.materialize(declaration).await?;

            let output = output_dir.join(name);
            let previous = output.clone();
            if tokio::task::spawn_blocking(move || file_utils::remove_directory(&previous))
                .await??
            {
                debug!(table = name, "removed previous output");
            }

            let options =
                DataFrameWriteOptions::new().with_partition_by(declaration.partition_by());
            let written = df
                .write_parquet(&format!("{}/", output.display()), options, None)
                .await?;
            let rows: u64 = written
                .iter()
                .filter_map(|b| b.column(0).as_primitive_opt::<UInt64Type>())
                .flat_map(|counts| counts.values().iter().copied())
                .sum();

            info!(table = name, rows, output = %output.display(), "wrote table");
            summaries.push(TableSummary {
                name: name.to_owned(),
                rows,
                output,
            });
        }
        Ok(summaries)
    }
}

fn union_all(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut frames = frames.into_iter();
    let first = frames.next().ok_or(Error::NothingToUnion)?;
    frames.try_fold(first, |acc, df| Ok(acc.union(df)?))
}

/// Union `frames` by column name. Columns are ordered by first appearance; a frame lacking a
/// column contributes typed nulls, and a column typed differently is cast to its first type.
pub fn union_by_name(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut columns: IndexMap<String, DataType> = IndexMap::new();
    for df in &frames {
        for field in df.schema().fields() {
            columns
                .entry(field.name().clone())
                .or_insert_with(|| field.data_type().clone());
        }
    }

    let aligned = frames
        .into_iter()
        .map(|df| {
            let exprs = columns
                .iter()
                .map(|(name, data_type)| {
                    Ok(match df.schema().field_with_unqualified_name(name) {
                        Ok(field) if field.data_type() == data_type => ident(name),
                        Ok(_) => cast(ident(name), data_type.clone()).alias(name),
                        Err(_) => lit(ScalarValue::try_from(data_type)?).alias(name),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(df.select(exprs)?)
        })
        .collect::<Result<Vec<_>>>()?;
    union_all(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{declare_tables, filename_groups};
    use datafusion::assert_batches_sorted_eq;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        pipeline: BronzePipeline,
    }

    fn write(root: &Path, name: &str, contents: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let sf = dir.path().join("raw/sf=1");
        write(
            &sf,
            "Batch1/DailyMarket.txt",
            "2017-07-07|AAA|10.5\n2017-07-08|BBB|11.25\n",
        );
        write(&sf, "Batch2/DailyMarket.txt", "I|1|2017-07-09|AAA|10.75\n");
        write(&sf, "Batch2/DailyMarket_audit.csv", "ignored\n");
        write(&sf, "Batch3/DailyMarket.txt", "I|2|2017-07-10|AAA|10.5\n");
        write(
            &sf,
            "Batch1/HR.csv",
            "employeeid,managerid,employeefirstname\n1,2,Jane\n3,1,John\n",
        );
        write(
            &sf,
            "Batch1/FINWIRE1967Q1",
            "19670101-000000CMPAcme Corp\n19670102-000000SECAAA\n",
        );
        write(&sf, "Batch1/FINWIRE1967Q1_audit.csv", "ignored\n");

        let settings = PipelineSettings::default().with_overrides([
            (
                "raw_tables",
                "DailyMarketHistorical, DailyMarketIncremental, HR".to_owned(),
            ),
            (
                "files_directory",
                dir.path().join("raw").display().to_string(),
            ),
            ("scale_factor", "1".to_owned()),
            ("tables_with_batchid", "DailyMarketIncremental".to_owned()),
            ("DailyMarketHistorical.path", "Batch1".to_owned()),
            ("DailyMarketHistorical.filename", "DailyMarket.txt".to_owned()),
            (
                "DailyMarketHistorical.schema",
                "dm_date DATE, dm_s_symb STRING, dm_close DOUBLE".to_owned(),
            ),
            ("DailyMarketHistorical.sep", "|".to_owned()),
            ("DailyMarketHistorical.header", "False".to_owned()),
            ("DailyMarketIncremental.path", "Batch[23]".to_owned()),
            (
                "DailyMarketIncremental.filename",
                "DailyMarket.txt".to_owned(),
            ),
            (
                "DailyMarketIncremental.schema",
                "cdc_flag STRING, cdc_dsn BIGINT, dm_date DATE, dm_s_symb STRING, dm_close DOUBLE"
                    .to_owned(),
            ),
            ("DailyMarketIncremental.sep", "|".to_owned()),
            ("DailyMarketIncremental.header", "False".to_owned()),
            ("HR.path", "Batch1".to_owned()),
            ("HR.filename", "HR.csv".to_owned()),
            (
                "HR.schema",
                "employeeid BIGINT, managerid BIGINT, employeefirstname STRING".to_owned(),
            ),
            ("HR.sep", ",".to_owned()),
            ("HR.header", "True".to_owned()),
            ("FinWire.path", "Batch1".to_owned()),
            (
                "FinWire.filename",
                "FINWIRE[0-9][0-9][0-9][0-9]Q[1-4]".to_owned(),
            ),
        ]);

        Fixture {
            dir,
            pipeline: BronzePipeline::new(SessionContext::new(), settings),
        }
    }

    #[test_log::test(tokio::test)]
    async fn raw_table_batch_ids() {
        let f = fixture();
        let batches = f
            .pipeline
            .raw_table("DailyMarketIncremental")
            .await
            .unwrap()
            .select_columns(&["dm_date", "dm_close", "batchid"])
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_batches_sorted_eq!(
            [
                "+------------+----------+---------+",
                "| dm_date    | dm_close | batchid |",
                "+------------+----------+---------+",
                "| 2017-07-09 | 10.75    | 2       |",
                "| 2017-07-10 | 10.5     | 3       |",
                "+------------+----------+---------+",
            ],
            &batches
        );

        let hr = f.pipeline.raw_table("HR").await.unwrap();
        assert!(!hr.schema().has_column_with_unqualified_name(BATCH_ID_COLUMN));
        assert_eq!(hr.count().await.unwrap(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn unified_table_unions_by_name() {
        let f = fixture();
        let members = vec![
            "DailyMarketHistorical".to_owned(),
            "DailyMarketIncremental".to_owned(),
        ];

        let unified = f.pipeline.unified_table(&members).await.unwrap();

        let names: Vec<_> = unified
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "dm_date",
                "dm_s_symb",
                "dm_close",
                "cdc_flag",
                "cdc_dsn",
                "batchid"
            ]
        );
        let batches = unified.collect().await.unwrap();
        assert_batches_sorted_eq!(
            [
                "+------------+-----------+----------+----------+---------+---------+",
                "| dm_date    | dm_s_symb | dm_close | cdc_flag | cdc_dsn | batchid |",
                "+------------+-----------+----------+----------+---------+---------+",
                "| 2017-07-07 | AAA       | 10.5     |          |         | 1       |",
                "| 2017-07-08 | BBB       | 11.25    |          |         | 1       |",
                "| 2017-07-09 | AAA       | 10.75    | I        | 1       | 1       |",
                "| 2017-07-10 | AAA       | 10.5     | I        | 2       | 1       |",
                "+------------+-----------+----------+----------+---------+---------+",
            ],
            &batches
        );
    }

    #[test_log::test(tokio::test)]
    async fn unified_table_tolerates_broken_members() {
        let f = fixture();
        let members = vec!["DailyMarketHistorical".to_owned(), "Missing".to_owned()];
        let unified = f.pipeline.unified_table(&members).await.unwrap();
        assert_eq!(unified.count().await.unwrap(), 2);

        let err = f
            .pipeline
            .unified_table(&["Missing".to_owned(), "AlsoMissing".to_owned()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoStreams { .. }), "{err}");
    }

    #[test_log::test(tokio::test)]
    async fn finwire_record_types() {
        let f = fixture();
        let batches = f.pipeline.finwire_table().await.unwrap().collect().await.unwrap();
        assert_batches_sorted_eq!(
            [
                "+-----------------------------+---------+",
                "| value                       | rectype |",
                "+-----------------------------+---------+",
                "| 19670101-000000CMPAcme Corp | CMP     |",
                "| 19670102-000000SECAAA       | SEC     |",
                "+-----------------------------+---------+",
            ],
            &batches
        );
    }

    #[test_log::test(tokio::test)]
    async fn run_writes_and_registers_every_table() {
        let f = fixture();
        let settings = f.pipeline.settings().clone();
        let declarations =
            declare_tables(&settings, &filename_groups(&settings).unwrap()).unwrap();
        let output = f.dir.path().join("bronze");
        write(&output, "HR/stale.parquet", "not parquet");

        let summaries = f.pipeline.run(&declarations, &output).await.unwrap();

        let rows: Vec<_> = summaries
            .iter()
            .map(|s| (s.name.as_str(), s.rows))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("DailyMarketHistorical", 2),
                ("DailyMarketIncremental", 2),
                ("HR", 2),
                ("unified_DailyMarket", 4),
                ("FinWire", 2),
            ]
        );
        assert!(!output.join("HR/stale.parquet").exists());
        assert!(output.join("FinWire/rectype=CMP").is_dir());

        let unified = f
            .pipeline
            .session()
            .table(TableReference::bare("unified_DailyMarket"))
            .await
            .unwrap();
        let null_batches = unified
            .filter(ident(BATCH_ID_COLUMN).is_null())
            .unwrap()
            .count()
            .await
            .unwrap();
        assert_eq!(null_batches, 0);
    }
}
