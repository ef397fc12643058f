//! Core library for normalizing the monster stat sheet into relational tables.

pub mod config;
pub mod database;
pub mod error;
pub mod file_utils;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod queries;
pub mod table;

pub use config::PipelineConfig;
pub use database::{Database, MemorySink, TableSink};
pub use error::{BestiaryError, Result};
pub use pipeline::{RunReport, run, run_with_progress};
