//! Shared types, error model, and configuration for FOA Intel.
//!
//! This crate is the foundation depended on by all other FOA Intel crates.
//! It provides:
//! - [`FoaError`]: the unified error type
//! - Domain types ([`FoaRecord`], [`NormalizedFields`], [`SemanticTag`], [`Source`])
//! - Configuration ([`AppConfig`], [`IngestConfig`], [`TaggingConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EmbeddingConfig, EndpointsConfig, IngestConfig, IngestionConfig,
    TaggingConfig, TaggingSection, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{FoaError, Result};
pub use types::{
    DEFAULT_MAX_TAGS, FlatRecord, FoaRecord, NormalizedFields, SemanticTag, Source, TagMethod,
    format_flat_tags, parse_flat_tags, sort_by_confidence,
};
