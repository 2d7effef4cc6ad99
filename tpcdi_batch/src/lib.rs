//! Batch directory bookkeeping for incremental TPC-DI loads.
//!
//! The generator lays every load cycle out as a numbered `Batch<N>` directory under a central
//! path. A job works on its own copy of one batch at a time: [`BatchManager::prepare_batch`]
//! stages it into the job's ingestion directory and [`BatchManager::cleanup`] removes it again.
pub mod batch_manager;
pub mod file_utils;

pub use batch_manager::{BatchManager, PreparedBatch};
