//! Deterministic keyword scoring against the ontology.
//!
//! For each tag, every term is checked against the title and against the
//! combined title and description. A title hit scores `title_weight`, a body
//! hit scores 1.0, and the sum is normalised by the best achievable score
//! `(title_weight + 1) * term_count`.

use std::sync::Arc;

use async_trait::async_trait;
use foaintel_shared::{Result, SemanticTag, TagMethod, TaggingConfig, sort_by_confidence};
use regex::Regex;
use tracing::debug;

use crate::Tagger;
use crate::ontology::Ontology;

pub const DEFAULT_TITLE_WEIGHT: f64 = 2.0;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.15;

/// Terms of at most this many characters must match on word boundaries.
const SHORT_TERM_CHARS: usize = 3;

enum TermMatcher {
    /// Whole-word, case-insensitive.
    Word(Regex),
    /// Substring of lowercased text.
    Substring(String),
}

impl TermMatcher {
    fn new(term: &str) -> Self {
        let lower = term.to_lowercase();
        if lower.chars().count() <= SHORT_TERM_CHARS {
            if let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&lower))) {
                return Self::Word(re);
            }
        }
        Self::Substring(lower)
    }

    fn is_match(&self, lower_text: &str) -> bool {
        match self {
            Self::Word(re) => re.is_match(lower_text),
            Self::Substring(term) => lower_text.contains(term.as_str()),
        }
    }
}

struct TagMatcher {
    path: String,
    terms: Vec<TermMatcher>,
}

/// Keyword tagger. Matchers are compiled once at construction.
pub struct RuleBasedTagger {
    ontology: Arc<Ontology>,
    title_weight: f64,
    min_confidence: f64,
    matchers: Vec<TagMatcher>,
}

impl RuleBasedTagger {
    pub fn new(ontology: Arc<Ontology>) -> Self {
        Self::with_weights(ontology, DEFAULT_TITLE_WEIGHT, DEFAULT_MIN_CONFIDENCE)
    }

    pub fn from_config(ontology: Arc<Ontology>, config: &TaggingConfig) -> Self {
        Self::with_weights(ontology, config.title_weight, config.rule_min_confidence)
    }

    pub fn with_weights(ontology: Arc<Ontology>, title_weight: f64, min_confidence: f64) -> Self {
        let matchers = ontology
            .tags()
            .iter()
            .map(|tag| TagMatcher {
                path: tag.full_path(),
                terms: tag.all_terms().iter().map(|t| TermMatcher::new(t)).collect(),
            })
            .collect();

        debug!(tags = ontology.len(), "rule-based tagger ready");
        Self {
            ontology,
            title_weight,
            min_confidence,
            matchers,
        }
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Score `title` and `description` against every tag.
    pub fn tag_text(&self, title: &str, description: &str) -> Vec<SemanticTag> {
        let title_lower = title.to_lowercase();
        let combined = format!("{title} {description}").to_lowercase();
        let max_per_term = self.title_weight + 1.0;

        let mut tags: Vec<SemanticTag> = self
            .matchers
            .iter()
            .filter(|m| !m.terms.is_empty())
            .filter_map(|m| {
                let score: f64 = m
                    .terms
                    .iter()
                    .map(|term| {
                        let mut s = 0.0;
                        if term.is_match(&title_lower) {
                            s += self.title_weight;
                        }
                        if term.is_match(&combined) {
                            s += 1.0;
                        }
                        s
                    })
                    .sum();

                let confidence = score / (max_per_term * m.terms.len() as f64);
                (confidence >= self.min_confidence)
                    .then(|| SemanticTag::new(m.path.clone(), confidence.min(1.0), TagMethod::RuleBased))
            })
            .collect();

        sort_by_confidence(&mut tags);
        debug!(count = tags.len(), title = %truncate(title, 60), "rule-based tagging done");
        tags
    }
}

#[async_trait]
impl Tagger for RuleBasedTagger {
    fn method(&self) -> TagMethod {
        TagMethod::RuleBased
    }

    async fn tag(&self, title: &str, description: &str) -> Result<Vec<SemanticTag>> {
        Ok(self.tag_text(title, description))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger(yaml: &str) -> RuleBasedTagger {
        RuleBasedTagger::new(Arc::new(Ontology::from_yaml_str(yaml).unwrap()))
    }

    fn confidence_of(tags: &[SemanticTag], path: &str) -> Option<f64> {
        tags.iter().find(|t| t.tag == path).map(|t| t.confidence)
    }

    #[test]
    fn single_term_in_title_scores_full_confidence() {
        let t = tagger("domains:\n  - robotics\n");
        let tags = t.tag_text("Robotics Frontiers", "");
        assert_eq!(confidence_of(&tags, "domains/robotics"), Some(1.0));
        assert_eq!(tags[0].method, TagMethod::RuleBased);
    }

    #[test]
    fn body_only_match_scores_one_third() {
        let t = tagger("domains:\n  - robotics\n");
        let tags = t.tag_text("Frontiers", "advanced robotics platforms");
        let c = confidence_of(&tags, "domains/robotics").unwrap();
        assert!((c - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn short_terms_require_word_boundaries() {
        let t = tagger("domains:\n  - name: ai\n");
        assert!(t.tag_text("Workforce training programs", "retraining").is_empty());

        let tags = t.tag_text("AI for Science", "");
        assert_eq!(confidence_of(&tags, "domains/ai"), Some(1.0));
    }

    #[test]
    fn long_terms_match_as_substrings() {
        let t = tagger("domains:\n  - name: ecology\n");
        let tags = t.tag_text("Paleoecology Collections", "");
        assert_eq!(confidence_of(&tags, "domains/ecology"), Some(1.0));
    }

    #[test]
    fn below_minimum_is_dropped() {
        // one body hit out of four terms: 1 / 12
        let t = tagger("domains:\n  - name: oceans\n    synonyms: [marine, coastal, tidal]\n");
        assert!(t.tag_text("Unrelated", "coastal").is_empty());
    }

    #[test]
    fn weights_come_from_config() {
        let ontology = Arc::new(Ontology::from_yaml_str("domains:\n  - robotics\n").unwrap());
        let config = TaggingConfig {
            rule_min_confidence: 0.5,
            ..foaintel_shared::TaggingConfig::from(&foaintel_shared::AppConfig::default())
        };
        let t = RuleBasedTagger::from_config(ontology, &config);
        assert!(t.tag_text("Frontiers", "robotics").is_empty());
    }

    #[test]
    fn output_is_sorted_and_bounded() {
        let t = tagger(
            "domains:\n  - name: climate_science\n    synonyms: [climate adaptation]\n  - name: artificial_intelligence\n    synonyms: [AI, machine learning]\n",
        );
        let tags = t.tag_text(
            "AI for Climate Resilience",
            "machine learning applications in climate adaptation",
        );
        assert_eq!(tags.len(), 2);
        assert!(tags.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(tags.iter().all(|t| (0.0..=1.0).contains(&t.confidence)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("résumé", 2), "ré");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
