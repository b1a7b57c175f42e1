//! Semantic tagging against a controlled vocabulary.
//!
//! This crate provides:
//! - [`Ontology`]: the vocabulary, loaded once and shared via `Arc`
//! - [`Tagger`]: the strategy contract
//! - [`RuleBasedTagger`] and [`EmbeddingTagger`]: the two strategies
//! - [`merge_tags`]: cross-strategy dedup, ranking, and truncation

pub mod aggregate;
pub mod embedding;
pub mod ontology;
pub mod rule_based;

use async_trait::async_trait;
use foaintel_shared::{Result, SemanticTag, TagMethod};

pub use aggregate::merge_tags;
pub use embedding::{Embedder, Embedding, EmbeddingTagger, HttpEmbedder};
pub use ontology::{Ontology, OntologyTag};
pub use rule_based::RuleBasedTagger;

/// A tagging strategy.
///
/// Returned tags have confidence in `[0, 1]` and are sorted highest first.
#[async_trait]
pub trait Tagger: Send + Sync {
    fn method(&self) -> TagMethod;

    async fn tag(&self, title: &str, description: &str) -> Result<Vec<SemanticTag>>;
}
