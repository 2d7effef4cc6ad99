//! Building blocks for [`clap`]-driven configuration of the TPC-DI tooling.
//!
//! Each module holds one flattenable argument group so the binary can compose
//! the options every command needs without repeating them.
pub mod datafusion;
pub mod object_store;
pub mod tokio;
