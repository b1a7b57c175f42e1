//! Application configuration for FOA Intel.
//!
//! User config lives at `~/.foaintel/foaintel.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FoaError, Result};
use crate::types::{DEFAULT_MAX_TAGS, Source};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "foaintel.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".foaintel";

// ---------------------------------------------------------------------------
// Config structs (matching foaintel.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upstream request behaviour.
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Upstream API endpoints.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    /// Tagging strategy settings.
    #[serde(default)]
    pub tagging: TaggingSection,

    /// Embedding backend settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory that receives `foa.json` / `foa.csv`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default number of search results to ingest.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Maximum semantic tags kept per record.
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,

    /// Source searched when none is given.
    #[serde(default = "default_source")]
    pub source: Source,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_results: default_max_results(),
            max_tags: default_max_tags(),
            source: default_source(),
        }
    }
}

fn default_output_dir() -> String {
    "./out".into()
}
fn default_max_results() -> usize {
    10
}
fn default_max_tags() -> usize {
    DEFAULT_MAX_TAGS
}
fn default_source() -> Source {
    Source::GrantsGov
}

/// `[ingestion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per fetch tier before giving up on it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between paginated requests; also the unit of retry backoff.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Upper bound on rows requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_ms: default_rate_limit(),
            page_size: default_page_size(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_rate_limit() -> u64 {
    1000
}
fn default_page_size() -> usize {
    25
}

/// `[endpoints]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_grants_search_url")]
    pub grants_search_url: Url,

    #[serde(default = "default_grants_fetch_url")]
    pub grants_fetch_url: Url,

    #[serde(default = "default_awards_url")]
    pub awards_url: Url,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            grants_search_url: default_grants_search_url(),
            grants_fetch_url: default_grants_fetch_url(),
            awards_url: default_awards_url(),
        }
    }
}

fn default_grants_search_url() -> Url {
    Url::parse("https://api.grants.gov/v1/api/search2").expect("static URL")
}
fn default_grants_fetch_url() -> Url {
    Url::parse("https://api.grants.gov/v1/api/fetchOpportunity").expect("static URL")
}
fn default_awards_url() -> Url {
    Url::parse("https://api.nsf.gov/services/v1/awards.json").expect("static URL")
}

/// `[tagging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingSection {
    /// Path to the ontology YAML document.
    #[serde(default = "default_ontology_path")]
    pub ontology_path: PathBuf,

    /// Minimum normalized score for a rule-based tag to be emitted.
    #[serde(default = "default_rule_min_confidence")]
    pub rule_min_confidence: f64,

    /// Weight of a title hit relative to a body hit (1.0).
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,

    /// Minimum cosine similarity for an embedding tag.
    #[serde(default = "default_embedding_threshold")]
    pub embedding_threshold: f64,
}

impl Default for TaggingSection {
    fn default() -> Self {
        Self {
            ontology_path: default_ontology_path(),
            rule_min_confidence: default_rule_min_confidence(),
            title_weight: default_title_weight(),
            embedding_threshold: default_embedding_threshold(),
        }
    }
}

fn default_ontology_path() -> PathBuf {
    PathBuf::from("config/ontology.yaml")
}
fn default_rule_min_confidence() -> f64 {
    0.15
}
fn default_title_weight() -> f64 {
    2.0
}
fn default_embedding_threshold() -> f64 {
    0.35
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint. Unset means the strategy is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,

    /// Model identifier sent with each request.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    /// An empty name means the endpoint needs no key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".into()
}
fn default_api_key_env() -> String {
    "FOAINTEL_EMBEDDING_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime connector configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub grants_search_url: Url,
    pub grants_fetch_url: Url,
    pub awards_url: Url,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Pause between paginated requests and the unit of linear retry backoff.
    pub rate_limit_delay: Duration,
    pub page_size: usize,
}

impl From<&AppConfig> for IngestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            grants_search_url: config.endpoints.grants_search_url.clone(),
            grants_fetch_url: config.endpoints.grants_fetch_url.clone(),
            awards_url: config.endpoints.awards_url.clone(),
            timeout: Duration::from_secs(config.ingestion.timeout_secs),
            max_retries: config.ingestion.max_retries.max(1),
            rate_limit_delay: Duration::from_millis(config.ingestion.rate_limit_ms),
            page_size: config.ingestion.page_size.max(1),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// Runtime tagging configuration.
#[derive(Debug, Clone)]
pub struct TaggingConfig {
    pub ontology_path: PathBuf,
    pub rule_min_confidence: f64,
    pub title_weight: f64,
    pub embedding_threshold: f64,
    pub max_tags: usize,
    /// Whether the embedding strategy runs alongside the rule-based one.
    pub use_embeddings: bool,
    pub embedding: EmbeddingConfig,
}

impl From<&AppConfig> for TaggingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ontology_path: config.tagging.ontology_path.clone(),
            rule_min_confidence: config.tagging.rule_min_confidence,
            title_weight: config.tagging.title_weight,
            embedding_threshold: config.tagging.embedding_threshold,
            max_tags: config.defaults.max_tags,
            use_embeddings: false,
            embedding: config.embedding.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.foaintel/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FoaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.foaintel/foaintel.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FoaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FoaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FoaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| FoaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FoaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
