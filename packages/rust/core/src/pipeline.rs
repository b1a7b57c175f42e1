//! Ingestion pipeline: URL or keyword → connector → extraction → tagging → records.

use std::sync::Arc;
use std::time::Instant;

use foaintel_ingestion::{RawPayload, RawRecord, SourceConnector, connector_for, detect_source};
use foaintel_shared::{
    AppConfig, FoaError, FoaRecord, IngestConfig, NormalizedFields, Result, SemanticTag, Source,
    TaggingConfig,
};
use foaintel_tagging::{EmbeddingTagger, Ontology, RuleBasedTagger, Tagger, merge_tags};
use tracing::{debug, info, instrument, warn};

/// Title connectors fall back to when the source has none.
const UNKNOWN_TITLE: &str = "Unknown";

/// Runtime configuration for [`FoaPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub tagging: TaggingConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            ingest: IngestConfig::from(config),
            tagging: TaggingConfig::from(config),
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a search result became a record.
    fn item_processed(&self, title: &str, current: usize, total: usize);
    /// Called when a search result was skipped.
    fn item_skipped(&self, reason: &str, current: usize, total: usize);
    /// Called once with the final records.
    fn done(&self, records: &[FoaRecord]);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_processed(&self, _title: &str, _current: usize, _total: usize) {}
    fn item_skipped(&self, _reason: &str, _current: usize, _total: usize) {}
    fn done(&self, _records: &[FoaRecord]) {}
}

/// Coordinates connectors and taggers. Connectors and taggers never see each other.
pub struct FoaPipeline {
    config: PipelineConfig,
    rule_tagger: RuleBasedTagger,
    embedding_tagger: Option<EmbeddingTagger>,
}

impl FoaPipeline {
    /// Load the ontology from `config.tagging.ontology_path` and build the taggers.
    ///
    /// The embedding tagger, when enabled, is only configured here; call
    /// [`prepare`](Self::prepare) to make it ready.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let ontology = Arc::new(Ontology::load(&config.tagging.ontology_path)?);
        Ok(Self::with_ontology(config, ontology))
    }

    /// Build around an already loaded ontology.
    pub fn with_ontology(config: PipelineConfig, ontology: Arc<Ontology>) -> Self {
        let rule_tagger = RuleBasedTagger::from_config(Arc::clone(&ontology), &config.tagging);
        let embedding_tagger = config
            .tagging
            .use_embeddings
            .then(|| EmbeddingTagger::from_config(ontology, &config.tagging));

        Self {
            config,
            rule_tagger,
            embedding_tagger,
        }
    }

    /// Replace the embedding strategy, e.g. with a custom [`foaintel_tagging::Embedder`] backend.
    pub fn with_embedding_tagger(mut self, tagger: EmbeddingTagger) -> Self {
        self.embedding_tagger = Some(tagger);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether the embedding strategy will run.
    pub fn embeddings_enabled(&self) -> bool {
        self.embedding_tagger.is_some()
    }

    /// Ready the embedding strategy. On failure it is disabled for this pipeline's lifetime.
    pub async fn prepare(&mut self) {
        let Some(tagger) = self.embedding_tagger.as_mut() else {
            return;
        };

        let result = tagger.ensure_ready().await;
        if let Err(e) = result {
            warn!(error = %e, "embedding tagging unavailable, continuing with rule-based tags only");
            self.embedding_tagger = None;
        }
    }

    fn strategies(&self) -> Vec<&dyn Tagger> {
        let mut strategies: Vec<&dyn Tagger> = vec![&self.rule_tagger];
        if let Some(embedding) = &self.embedding_tagger {
            strategies.push(embedding);
        }
        strategies
    }

    /// Run every enabled strategy, then merge by tag path and truncate to `max_tags`.
    ///
    /// A failing strategy is logged and skipped; the others still contribute.
    pub async fn apply_tags(&self, title: &str, description: &str) -> Vec<SemanticTag> {
        let mut all = Vec::new();
        for strategy in self.strategies() {
            match strategy.tag(title, description).await {
                Ok(tags) => {
                    debug!(method = %strategy.method(), count = tags.len(), "strategy produced tags");
                    all.extend(tags);
                }
                Err(e) => {
                    warn!(method = %strategy.method(), error = %e, "tagging strategy skipped");
                }
            }
        }
        merge_tags(all, self.config.tagging.max_tags)
    }

    async fn build_record(&self, connector: &dyn SourceConnector, raw: &RawRecord) -> Result<FoaRecord> {
        let fields = connector.extract_fields(raw);
        ensure_not_blank(&fields)?;

        let description = fields.program_description.clone().unwrap_or_default();
        let tags = self.apply_tags(&fields.title, &description).await;
        FoaRecord::try_new(fields, tags, self.config.tagging.max_tags)
    }

    /// Ingest a single opportunity by URL.
    ///
    /// An unresolvable URL or a source with no record becomes [`FoaError::Ingestion`].
    #[instrument(skip_all, fields(url = %url))]
    pub async fn process_url(&self, url: &str, progress: &dyn ProgressReporter) -> Result<FoaRecord> {
        let start = Instant::now();

        progress.phase("Detecting source");
        let source = detect_source(url);
        let connector = connector_for(source, &self.config.ingest)?;
        info!(%source, "processing URL");

        progress.phase("Fetching opportunity");
        let raw = match connector.fetch_by_url(url).await? {
            RawPayload::Found(raw) => raw,
            RawPayload::Empty => {
                return Err(FoaError::Ingestion(format!("{source} has no record for {url}")));
            }
            RawPayload::Failed { error, .. } => {
                return Err(FoaError::Ingestion(error));
            }
        };

        progress.phase("Tagging");
        let record = self.build_record(connector.as_ref(), &raw).await?;

        info!(
            foa_id = %record.foa_id,
            tags = record.semantic_tags.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "processed opportunity"
        );
        progress.done(std::slice::from_ref(&record));
        Ok(record)
    }

    /// Search `source` for `keyword` and ingest up to `max_results` opportunities.
    ///
    /// Results that fail extraction or validation are logged and skipped.
    #[instrument(skip_all, fields(keyword = %keyword, source = %source, max_results = max_results))]
    pub async fn process_search(
        &self,
        keyword: &str,
        source: Source,
        max_results: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<FoaRecord>> {
        let start = Instant::now();
        let connector = connector_for(source, &self.config.ingest)?;

        progress.phase("Searching");
        let raws = connector.search(keyword, max_results).await?;
        info!(found = raws.len(), "search returned results");

        progress.phase("Tagging");
        let total = raws.len();
        let mut records = Vec::with_capacity(total);
        for (i, raw) in raws.iter().enumerate() {
            match self.build_record(connector.as_ref(), raw).await {
                Ok(record) => {
                    progress.item_processed(&record.title, i + 1, total);
                    records.push(record);
                }
                Err(e) => {
                    warn!(item = i + 1, total, error = %e, "skipping search result");
                    progress.item_skipped(&e.to_string(), i + 1, total);
                }
            }
        }

        info!(
            records = records.len(),
            skipped = total - records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search ingestion complete"
        );
        progress.done(&records);
        Ok(records)
    }
}

/// Reject a payload that carried nothing usable. A missing identifier alone is
/// fine: the record gets a generated `foa_id`.
fn ensure_not_blank(fields: &NormalizedFields) -> Result<()> {
    let title = fields.title.trim();
    let blank = fields.foa_id.trim().is_empty()
        && (title.is_empty() || title == UNKNOWN_TITLE)
        && fields.program_description.is_none()
        && fields.eligibility.is_none()
        && fields.open_date.is_none()
        && fields.close_date.is_none()
        && fields.award_range_min.is_none()
        && fields.award_range_max.is_none();
    if blank {
        return Err(FoaError::validation(format!("{} result has no usable fields", fields.source)));
    }
    Ok(())
}
