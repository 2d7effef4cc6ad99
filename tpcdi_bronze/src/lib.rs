//! Bronze ingestion: declares the raw benchmark tables from pipeline settings and builds them
//! from the generated files with DataFusion.
//!
//! Tables sharing a source file name pattern are additionally unioned by column name into one
//! `unified_<stem>` table, and the fixed-width FinWire files are loaded as text records split
//! by record type.
mod files;
mod pipeline;
mod schema;
mod settings;
mod tables;

pub use files::{FileFilter, batch_id_from_path, parse_glob};
pub use pipeline::{BronzePipeline, TableSummary, VALUE_COLUMN, union_by_name};
pub use schema::{COMMENT_METADATA_KEY, parse_schema};
pub use settings::{
    FILES_DIRECTORY, PipelineSettings, RAW_TABLES, SCALE_FACTOR, TABLES_WITH_BATCHID,
};
pub use tables::{
    BATCH_ID_COLUMN, FINWIRE, FINWIRE_PARTITION_COLUMN, TableDeclaration, TableDescriptor,
    declare_tables, filename_groups, unified_declaration, unified_table_name,
};

use std::path::PathBuf;

use datafusion::error::DataFusionError;
use tpcdi_batch::file_utils;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pipeline setting '{0}' is not set")]
    MissingKey(String),

    #[error("invalid value '{value}' for pipeline setting '{key}': {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unable to read pipeline settings {}: {source}", .path.display())]
    ReadSettings {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid pipeline settings: {0}")]
    ParseSettings(#[from] serde_json::Error),

    #[error("pipeline settings must be a JSON object")]
    SettingsNotAnObject,

    #[error("invalid column definition '{column}': {reason}")]
    InvalidSchema { column: String, reason: String },

    #[error("invalid file name pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("No valid streams created for tables: {tables:?}")]
    NoStreams { tables: Vec<String> },

    #[error("no tables to union")]
    NothingToUnion,

    #[error("unable to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("query engine error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    FileUtils(#[from] file_utils::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
