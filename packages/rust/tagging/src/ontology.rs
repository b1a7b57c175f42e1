//! Controlled vocabulary loaded from a YAML document.
//!
//! The document maps category names to lists of tag entries. An entry is a
//! bare name or a mapping with `name`, optional `synonyms`, and optional
//! `children`. Category order and entry order are preserved.

use std::path::{Path, PathBuf};

use foaintel_shared::{FoaError, Result};
use serde::Deserialize;
use tracing::{info, warn};

/// A single controlled-vocabulary node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologyTag {
    pub category: String,
    pub name: String,
    pub synonyms: Vec<String>,
    pub children: Vec<String>,
}

impl OntologyTag {
    /// `<category>/<name>`.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Terms matched against text: the name with underscores as spaces, then the synonyms.
    pub fn all_terms(&self) -> Vec<String> {
        std::iter::once(self.name.replace('_', " "))
            .chain(self.synonyms.iter().cloned())
            .collect()
    }
}

/// Read-only vocabulary. Construct once and share via `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    source: Option<PathBuf>,
    tags: Vec<OntologyTag>,
    /// Category name and indices into `tags`, in document order.
    categories: Vec<(String, Vec<usize>)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        synonyms: Vec<String>,
        #[serde(default)]
        children: Vec<String>,
    },
    Other(serde_yaml::Value),
}

impl Ontology {
    /// Load and parse the vocabulary at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FoaError::io(path, e))?;
        let mut ontology = Self::from_yaml_str(&content)
            .map_err(|e| FoaError::Ontology(format!("{}: {e}", path.display())))?;
        ontology.source = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            tags = ontology.tags.len(),
            categories = ontology.categories.len(),
            "loaded ontology"
        );
        Ok(ontology)
    }

    /// Parse a vocabulary document from a string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let document: serde_yaml::Mapping = serde_yaml::from_str(yaml).map_err(|e| {
            FoaError::Ontology(format!("expected a mapping of category to tag list: {e}"))
        })?;

        let mut ontology = Self::default();
        for (key, value) in document {
            let Some(category) = key.as_str().map(str::to_string) else {
                warn!(?key, "skipping non-string category key");
                continue;
            };

            let entries: Vec<RawEntry> = match value {
                serde_yaml::Value::Null => Vec::new(),
                other => match serde_yaml::from_value(other) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(%category, error = %e, "skipping category that is not a list");
                        continue;
                    }
                },
            };

            let mut indices = Vec::with_capacity(entries.len());
            for entry in entries {
                let (name, synonyms, children) = match entry {
                    RawEntry::Name(name) => (name, Vec::new(), Vec::new()),
                    RawEntry::Detailed {
                        name,
                        synonyms,
                        children,
                    } => (name, synonyms, children),
                    RawEntry::Other(value) => {
                        warn!(%category, ?value, "skipping unrecognised tag entry");
                        continue;
                    }
                };

                let name = name.trim().to_string();
                if name.is_empty() {
                    warn!(%category, "skipping tag entry with empty name");
                    continue;
                }

                indices.push(ontology.tags.len());
                ontology.tags.push(OntologyTag {
                    category: category.clone(),
                    name,
                    synonyms: synonyms.into_iter().filter(|s| !s.trim().is_empty()).collect(),
                    children,
                });
            }
            ontology.categories.push((category, indices));
        }

        Ok(ontology)
    }

    /// Path the vocabulary was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Every tag, in document order.
    pub fn tags(&self) -> &[OntologyTag] {
        &self.tags
    }

    /// Tags in `category`; empty for an unknown category.
    pub fn tags_by_category(&self, category: &str) -> Vec<&OntologyTag> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, indices)| indices.iter().map(|&i| &self.tags[i]).collect())
            .unwrap_or_default()
    }

    /// Case-insensitive exact match on the bare name. Synonyms are not consulted.
    pub fn tag_by_name(&self, name: &str) -> Option<&OntologyTag> {
        self.tags.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Ontology {
        Ontology::load(Path::new("../../../fixtures/ontology/ontology.yaml")).unwrap()
    }

    #[test]
    fn loads_fixture_in_document_order() {
        let ontology = fixture();
        assert_eq!(ontology.len(), 6);
        assert_eq!(
            ontology.category_names().collect::<Vec<_>>(),
            vec!["research_domains", "funding_mechanisms", "applicant_types"]
        );
        assert_eq!(ontology.tags()[0].full_path(), "research_domains/artificial_intelligence");
        assert!(ontology.source().is_some());
    }

    #[test]
    fn bare_and_detailed_entries() {
        let ontology = fixture();
        let health = ontology.tag_by_name("public_health").unwrap();
        assert!(health.synonyms.is_empty());
        assert_eq!(health.all_terms(), vec!["public health"]);

        let ai = ontology.tag_by_name("artificial_intelligence").unwrap();
        assert_eq!(ai.children, vec!["natural_language_processing", "computer_vision"]);
        assert_eq!(
            ai.all_terms(),
            vec!["artificial intelligence", "AI", "machine learning", "deep learning"]
        );

        let climate = ontology.tag_by_name("climate_science").unwrap();
        assert_eq!(climate.all_terms(), vec!["climate science", "climate adaptation"]);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let ontology = fixture();
        let applicants = ontology.tags_by_category("applicant_types");
        assert_eq!(applicants.len(), 1);
        assert_eq!(applicants[0].name, "tribal_nations");
        assert!(ontology.tags_by_category("unknown").is_empty());
    }

    #[test]
    fn lookup_is_case_insensitive_on_name_only() {
        let ontology = fixture();
        assert!(ontology.tag_by_name("CLIMATE_SCIENCE").is_some());
        assert!(ontology.tag_by_name("machine learning").is_none());
    }

    #[test]
    fn empty_category_is_kept() {
        let ontology = Ontology::from_yaml_str("empty:\nother:\n  - thing\n").unwrap();
        assert_eq!(ontology.category_names().count(), 2);
        assert_eq!(ontology.len(), 1);
    }

    #[test]
    fn non_mapping_document_is_error() {
        let err = Ontology::from_yaml_str("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, FoaError::Ontology(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Ontology::load(Path::new("/nonexistent/ontology.yaml")).unwrap_err();
        assert!(matches!(err, FoaError::Io { .. }));
    }
}
