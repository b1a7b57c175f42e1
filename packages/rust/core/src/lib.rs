//! Pipeline orchestration and export for FOA Intel.
//!
//! This crate wires connectors and taggers into end-to-end workflows
//! ([`FoaPipeline::process_url`], [`FoaPipeline::process_search`]) and
//! writes the resulting records to disk.

pub mod export;
pub mod pipeline;

pub use export::{CSV_FILE_NAME, ExportPaths, JSON_FILE_NAME, export_all, export_csv, export_json, read_csv};
pub use pipeline::{FoaPipeline, PipelineConfig, ProgressReporter, SilentProgress};
