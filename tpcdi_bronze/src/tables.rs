//! Which bronze tables exist and where their data comes from, derived from the pipeline
//! settings alone.

use indexmap::IndexMap;
use observability_deps::tracing::{debug, info};
use serde::Serialize;

use crate::{Error, PipelineSettings, Result};

/// Name of the fixed-width FinWire table.
pub const FINWIRE: &str = "FinWire";

/// Column FinWire is partitioned by when written.
pub const FINWIRE_PARTITION_COLUMN: &str = "rectype";

/// Column holding the batch a row was loaded from.
pub const BATCH_ID_COLUMN: &str = "batchid";

/// How one raw table is read, resolved from its `<table>.*` settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    /// Source directory below `<files_directory>/sf=<scale_factor>/`
    pub path: String,
    /// DDL column list
    pub schema: String,
    pub delimiter: u8,
    pub header: bool,
    /// Glob the file names must match
    pub filename: String,
    /// Whether rows get a `batchid` taken from the file path
    pub with_batchid: bool,
}

impl TableDescriptor {
    pub fn from_settings(settings: &PipelineSettings, table: &str) -> Result<Self> {
        let key = |suffix: &str| format!("{table}.{suffix}");
        let sep_key = key("sep");
        Ok(Self {
            name: table.to_owned(),
            path: settings.get(&key("path"))?.to_owned(),
            schema: settings.get(&key("schema"))?.to_owned(),
            delimiter: parse_delimiter(&sep_key, settings.get(&sep_key)?)?,
            header: settings.get_bool(&key("header"))?,
            filename: settings.get(&key("filename"))?.to_owned(),
            with_batchid: settings.tables_with_batchid().iter().any(|t| t == table),
        })
    }
}

fn parse_delimiter(key: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] => Ok(*b),
        b"\\t" => Ok(b'\t'),
        _ => Err(Error::InvalidSetting {
            key: key.to_owned(),
            value: value.to_owned(),
            reason: "the delimiter must be a single byte".to_owned(),
        }),
    }
}

/// Suffix of the group key of a table that has no `<table>.filename` setting.
const INDIVIDUAL_SUFFIX: &str = "_individual";

/// Partition the raw tables by their `<table>.filename` setting, in first-seen order.
///
/// A table without a filename setting gets a group of its own keyed `<table>_individual`. Any
/// other problem with the setting, such as an empty pattern, is an error.
pub fn filename_groups(settings: &PipelineSettings) -> Result<IndexMap<String, Vec<String>>> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for table in settings.raw_tables()? {
        let key = format!("{table}.filename");
        match settings.get(&key) {
            Ok(filename) if filename.trim().is_empty() => {
                return Err(Error::InvalidSetting {
                    key,
                    value: filename.to_owned(),
                    reason: "the file name pattern is empty".to_owned(),
                });
            }
            Ok(filename) => groups.entry(filename.to_owned()).or_default().push(table),
            Err(Error::MissingKey(_)) => {
                groups.insert(format!("{table}{INDIVIDUAL_SUFFIX}"), vec![table]);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(groups)
}

/// `unified_<stem>`, where the stem is the filename pattern without its extension, glob
/// characters and one trailing underscore.
pub fn unified_table_name(filename: &str) -> String {
    let mut stem = filename.replace(".txt", "").replace(".csv", "");
    stem.retain(|c| !matches!(c, '*' | '[' | ']' | '(' | ')'));
    if stem.ends_with('_') {
        stem.pop();
    }
    format!("unified_{stem}")
}

/// A table the pipeline materializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableDeclaration {
    /// One raw table read from its own files
    Raw { name: String },
    /// Union by column name of the raw files of several tables sharing one filename pattern
    Unified {
        name: String,
        filename: String,
        members: Vec<String>,
    },
    /// Fixed-width FinWire records, one `value` per line
    FinWire { name: String, partition_by: String },
}

impl TableDeclaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Raw { name } | Self::Unified { name, .. } | Self::FinWire { name, .. } => name,
        }
    }

    /// Columns the written output is partitioned by.
    pub fn partition_by(&self) -> Vec<String> {
        match self {
            Self::FinWire { partition_by, .. } => vec![partition_by.clone()],
            _ => vec![],
        }
    }
}

/// The unified declaration of one filename group, or `None` for a group with a single member.
pub fn unified_declaration(filename: &str, tables: &[String]) -> Option<TableDeclaration> {
    if tables.len() < 2 {
        info!(?tables, "skipping table");
        return None;
    }
    Some(TableDeclaration::Unified {
        name: unified_table_name(filename),
        filename: filename.to_owned(),
        members: tables.to_vec(),
    })
}

/// Every table of the pipeline in materialization order: the raw tables, one unified table per
/// filename group with several members, then FinWire when `FinWire.path` is configured.
pub fn declare_tables(
    settings: &PipelineSettings,
    groups: &IndexMap<String, Vec<String>>,
) -> Result<Vec<TableDeclaration>> {
    let mut declarations: Vec<_> = settings
        .raw_tables()?
        .into_iter()
        .map(|name| TableDeclaration::Raw { name })
        .collect();

    declarations.extend(
        groups
            .iter()
            .filter_map(|(filename, tables)| unified_declaration(filename, tables)),
    );

    if settings.contains(&format!("{FINWIRE}.path")) {
        declarations.push(TableDeclaration::FinWire {
            name: FINWIRE.to_owned(),
            partition_by: FINWIRE_PARTITION_COLUMN.to_owned(),
        });
    } else {
        debug!("no FinWire source configured");
    }
    Ok(declarations)
}
