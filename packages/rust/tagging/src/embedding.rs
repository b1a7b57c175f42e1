//! Embedding-similarity tagging.
//!
//! [`EmbeddingTagger`] is built in two phases. Construction is cheap and does
//! no I/O; [`EmbeddingTagger::ensure_ready`] builds the embedder and embeds
//! one reference text per ontology tag. Until that succeeds, [`Tagger::tag`]
//! returns [`FoaError::EmbeddingUnavailable`], which the pipeline treats as
//! "strategy skipped".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foaintel_shared::{
    EmbeddingConfig, FoaError, Result, SemanticTag, TagMethod, TaggingConfig, sort_by_confidence,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::Tagger;
use crate::ontology::Ontology;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.35;

/// A dense embedding vector.
pub type Embedding = Vec<f32>;

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

/// Text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `texts`, returning one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    /// Build from config. Fails with `EmbeddingUnavailable` when no endpoint is set.
    ///
    /// The API key is read from the env var named by `api_key_env`; when that
    /// var is unset no `Authorization` header is sent.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            FoaError::EmbeddingUnavailable("no embedding endpoint configured".into())
        })?;

        let api_key = match config.api_key_env.trim() {
            "" => None,
            var => std::env::var(var).ok().filter(|k| !k.trim().is_empty()),
        };
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "no embedding API key set; sending unauthenticated requests");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FoaError::EmbeddingUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.endpoint.as_str()).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FoaError::Network(format!("{}: {e}", self.endpoint)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FoaError::Network(format!("{}: HTTP {status}", self.endpoint)));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FoaError::parse(format!("embedding response: {e}")))?;

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        if data.len() != texts.len() {
            return Err(FoaError::parse(format!(
                "embedding response has {} vectors for {} inputs",
                data.len(),
                texts.len()
            )));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tagger
// ---------------------------------------------------------------------------

/// Reference vectors, one per ontology tag, L2-normalised.
struct ReferenceIndex {
    paths: Vec<String>,
    vectors: Vec<Embedding>,
}

/// Cosine-similarity tagger over ontology reference embeddings.
pub struct EmbeddingTagger {
    ontology: Arc<Ontology>,
    threshold: f64,
    config: EmbeddingConfig,
    embedder: Option<Box<dyn Embedder>>,
    index: Option<ReferenceIndex>,
}

impl EmbeddingTagger {
    /// Configured but not ready; the HTTP embedder is built by `ensure_ready`.
    pub fn new(ontology: Arc<Ontology>, threshold: f64, config: EmbeddingConfig) -> Self {
        Self {
            ontology,
            threshold,
            config,
            embedder: None,
            index: None,
        }
    }

    pub fn from_config(ontology: Arc<Ontology>, config: &TaggingConfig) -> Self {
        Self::new(ontology, config.embedding_threshold, config.embedding.clone())
    }

    /// Use a caller-supplied backend instead of the HTTP embedder.
    pub fn with_embedder(ontology: Arc<Ontology>, threshold: f64, embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder: Some(embedder),
            ..Self::new(ontology, threshold, EmbeddingConfig::default())
        }
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    /// Build the embedder (if needed) and the reference index.
    ///
    /// Idempotent once it has succeeded. A failure leaves the tagger
    /// unready, so a later call tries again.
    pub async fn ensure_ready(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }

        if self.embedder.is_none() {
            self.embedder = Some(Box::new(HttpEmbedder::from_config(&self.config)?));
        }
        let Some(embedder) = self.embedder.as_deref() else {
            return Err(FoaError::EmbeddingUnavailable("no embedder".into()));
        };

        let (paths, texts): (Vec<String>, Vec<String>) = self
            .ontology
            .tags()
            .iter()
            .map(|tag| (tag.full_path(), tag.all_terms().join(" ")))
            .unzip();

        info!(model = embedder.model_name(), tags = texts.len(), "building reference embeddings");
        let vectors = embedder.embed_batch(&texts).await.map_err(|e| match e {
            FoaError::EmbeddingUnavailable(_) => e,
            other => FoaError::EmbeddingUnavailable(other.to_string()),
        })?;
        if vectors.len() != paths.len() {
            return Err(FoaError::EmbeddingUnavailable(format!(
                "expected {} reference embeddings, got {}",
                paths.len(),
                vectors.len()
            )));
        }

        self.index = Some(ReferenceIndex {
            paths,
            vectors: vectors.into_iter().map(normalize).collect(),
        });
        info!("embedding tagger ready");
        Ok(())
    }
}

#[async_trait]
impl Tagger for EmbeddingTagger {
    fn method(&self) -> TagMethod {
        TagMethod::Embedding
    }

    async fn tag(&self, title: &str, description: &str) -> Result<Vec<SemanticTag>> {
        let (Some(index), Some(embedder)) = (&self.index, &self.embedder) else {
            return Err(FoaError::EmbeddingUnavailable(
                "embedding tagger used before ensure_ready".into(),
            ));
        };

        let text = if description.trim().is_empty() {
            title.to_string()
        } else {
            format!("{title}. {description}")
        };

        let query = embedder
            .embed_batch(&[text])
            .await?
            .pop()
            .map(normalize)
            .ok_or_else(|| FoaError::parse("embedding response is empty"))?;

        if let Some(reference) = index.vectors.first() {
            if reference.len() != query.len() {
                return Err(FoaError::parse(format!(
                    "query embedding has {} dimensions, reference index has {}",
                    query.len(),
                    reference.len()
                )));
            }
        }

        let mut tags: Vec<SemanticTag> = index
            .paths
            .iter()
            .zip(&index.vectors)
            .filter_map(|(path, reference)| {
                let similarity = dot(&query, reference);
                (similarity >= self.threshold)
                    .then(|| SemanticTag::new(path.clone(), round4(similarity), TagMethod::Embedding))
            })
            .collect();

        sort_by_confidence(&mut tags);
        debug!(count = tags.len(), threshold = self.threshold, "embedding tagging done");
        Ok(tags)
    }
}

fn normalize(mut v: Embedding) -> Embedding {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Dot product of two normalised vectors, i.e. their cosine similarity.
fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum()
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
