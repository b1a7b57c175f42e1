//! Core domain types for FOA Intel records and tags.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FoaError, Result};

/// Default cap on semantic tags attached to a single record.
pub const DEFAULT_MAX_TAGS: usize = 10;

/// Separator between tag entries in the flattened export form.
const FLAT_TAG_SEPARATOR: &str = "; ";

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Upstream system an opportunity was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Grants-search API (grants.gov).
    GrantsGov,
    /// Research-award registry (NSF awards API).
    Nsf,
}

impl Source {
    /// All known sources, in detection priority order.
    pub const ALL: [Source; 2] = [Source::GrantsGov, Source::Nsf];

    /// Stable identifier used in records and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GrantsGov => "grants_gov",
            Self::Nsf => "nsf",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = FoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grants_gov" => Ok(Self::GrantsGov),
            "nsf" => Ok(Self::Nsf),
            other => Err(FoaError::validation(format!(
                "unknown source '{other}': expected 'grants_gov' or 'nsf'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SemanticTag
// ---------------------------------------------------------------------------

/// Strategy that produced a semantic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMethod {
    RuleBased,
    Embedding,
    Llm,
}

impl TagMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::Embedding => "embedding",
            Self::Llm => "llm",
        }
    }
}

impl std::fmt::Display for TagMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TagMethod {
    type Err = FoaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "rule_based" => Ok(Self::RuleBased),
            "embedding" => Ok(Self::Embedding),
            "llm" => Ok(Self::Llm),
            other => Err(FoaError::parse(format!("unknown tag method '{other}'"))),
        }
    }
}

/// A controlled-vocabulary label applied to an FOA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTag {
    /// Hierarchical path, `<category>/<name>`.
    pub tag: String,
    /// Strategy certainty in `[0, 1]`.
    pub confidence: f64,
    pub method: TagMethod,
}

impl SemanticTag {
    /// Build a tag, clamping confidence into `[0, 1]` (NaN becomes 0).
    pub fn new(tag: impl Into<String>, confidence: f64, method: TagMethod) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            tag: tag.into(),
            confidence,
            method,
        }
    }
}

/// Sort tags by confidence, highest first. Ties keep their input order.
pub fn sort_by_confidence(tags: &mut [SemanticTag]) {
    tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

// ---------------------------------------------------------------------------
// NormalizedFields
// ---------------------------------------------------------------------------

/// Source-independent field set produced by a connector's extraction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFields {
    /// Source-native identifier; may be empty when the source provided none.
    pub foa_id: String,
    pub title: String,
    pub agency: String,
    pub open_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub eligibility: Option<String>,
    pub program_description: Option<String>,
    pub award_range_min: Option<f64>,
    pub award_range_max: Option<f64>,
    pub source_url: String,
    pub source: Source,
}

// ---------------------------------------------------------------------------
// FoaRecord
// ---------------------------------------------------------------------------

/// Canonical output entity: normalized fields plus semantic tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoaRecord {
    /// Source identifier, or a generated UUID v7 when the source had none.
    pub foa_id: String,
    pub title: String,
    pub agency: String,
    pub open_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub eligibility: Option<String>,
    pub program_description: Option<String>,
    pub award_range_min: Option<f64>,
    pub award_range_max: Option<f64>,
    pub source_url: String,
    pub source: Source,
    /// Ordered by confidence, highest first.
    pub semantic_tags: Vec<SemanticTag>,
    pub ingested_at: DateTime<Utc>,
}

impl FoaRecord {
    /// Build a record from extracted fields and merged tags.
    ///
    /// Tags are re-sorted and truncated to `max_tags`; an empty `foa_id` is
    /// replaced with a generated identifier.
    pub fn try_new(
        fields: NormalizedFields,
        mut tags: Vec<SemanticTag>,
        max_tags: usize,
    ) -> Result<Self> {
        if let Some(bad) = tags
            .iter()
            .find(|t| !(0.0..=1.0).contains(&t.confidence))
        {
            return Err(FoaError::validation(format!(
                "tag {} has confidence {} outside [0, 1]",
                bad.tag, bad.confidence
            )));
        }

        sort_by_confidence(&mut tags);
        tags.truncate(max_tags);

        let foa_id = match fields.foa_id.trim() {
            "" => Uuid::now_v7().to_string(),
            id => id.to_string(),
        };

        Ok(Self {
            foa_id,
            title: fields.title,
            agency: fields.agency,
            open_date: fields.open_date,
            close_date: fields.close_date,
            eligibility: fields.eligibility,
            program_description: fields.program_description,
            award_range_min: fields.award_range_min,
            award_range_max: fields.award_range_max,
            source_url: fields.source_url,
            source: fields.source,
            semantic_tags: tags,
            ingested_at: Utc::now(),
        })
    }

    /// Flatten into the string-only form used by CSV export.
    pub fn to_flat(&self) -> FlatRecord {
        FlatRecord {
            foa_id: self.foa_id.clone(),
            title: self.title.clone(),
            agency: self.agency.clone(),
            open_date: format_date(self.open_date),
            close_date: format_date(self.close_date),
            eligibility: self.eligibility.clone().unwrap_or_default(),
            program_description: self.program_description.clone().unwrap_or_default(),
            award_range_min: format_amount(self.award_range_min),
            award_range_max: format_amount(self.award_range_max),
            source_url: self.source_url.clone(),
            source: self.source.as_str().to_string(),
            semantic_tags: format_flat_tags(&self.semantic_tags),
            ingested_at: self.ingested_at.to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// FlatRecord
// ---------------------------------------------------------------------------

/// Key-value form of a record: dates as ISO strings, tags as one joined string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub foa_id: String,
    pub title: String,
    pub agency: String,
    pub open_date: String,
    pub close_date: String,
    pub eligibility: String,
    pub program_description: String,
    pub award_range_min: String,
    pub award_range_max: String,
    pub source_url: String,
    pub source: String,
    pub semantic_tags: String,
    pub ingested_at: String,
}

impl TryFrom<FlatRecord> for FoaRecord {
    type Error = FoaError;

    fn try_from(flat: FlatRecord) -> Result<Self> {
        let ingested_at = DateTime::parse_from_rfc3339(&flat.ingested_at)
            .map_err(|e| FoaError::parse(format!("ingested_at '{}': {e}", flat.ingested_at)))?
            .with_timezone(&Utc);

        Ok(Self {
            foa_id: flat.foa_id,
            title: flat.title,
            agency: flat.agency,
            open_date: parse_flat_date(&flat.open_date)?,
            close_date: parse_flat_date(&flat.close_date)?,
            eligibility: non_empty(flat.eligibility),
            program_description: non_empty(flat.program_description),
            award_range_min: parse_flat_amount(&flat.award_range_min)?,
            award_range_max: parse_flat_amount(&flat.award_range_max)?,
            source_url: flat.source_url,
            source: flat.source.parse()?,
            semantic_tags: parse_flat_tags(&flat.semantic_tags)?,
            ingested_at,
        })
    }
}

/// Join tags as `"<path> (<confidence>, <method>)"` entries.
pub fn format_flat_tags(tags: &[SemanticTag]) -> String {
    tags.iter()
        .map(|t| format!("{} ({:.2}, {})", t.tag, t.confidence, t.method))
        .collect::<Vec<_>>()
        .join(FLAT_TAG_SEPARATOR)
}

/// Inverse of [`format_flat_tags`]. Confidence precision is limited to what was written.
pub fn parse_flat_tags(s: &str) -> Result<Vec<SemanticTag>> {
    s.split(FLAT_TAG_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let malformed = || FoaError::parse(format!("malformed tag entry '{entry}'"));

            let (path, rest) = entry.rsplit_once(" (").ok_or_else(malformed)?;
            let inner = rest.strip_suffix(')').ok_or_else(malformed)?;
            let (confidence, method) = inner.split_once(", ").ok_or_else(malformed)?;
            let confidence: f64 = confidence.trim().parse().map_err(|_| malformed())?;

            Ok(SemanticTag::new(path, confidence, method.parse()?))
        })
        .collect()
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn format_amount(amount: Option<f64>) -> String {
    amount.map(|a| a.to_string()).unwrap_or_default()
}

fn parse_flat_date(s: &str) -> Result<Option<NaiveDate>> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|e| FoaError::parse(format!("date '{s}': {e}")))
}

fn parse_flat_amount(s: &str) -> Result<Option<f64>> {
    if s.trim().is_empty() {
        return Ok(None);
    }
    s.trim()
        .parse()
        .map(Some)
        .map_err(|e| FoaError::parse(format!("amount '{s}': {e}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> NormalizedFields {
        NormalizedFields {
            foa_id: "HHS-2025-ACF-0001".into(),
            title: "AI for Climate Resilience".into(),
            agency: "National Science Foundation".into(),
            open_date: NaiveDate::from_ymd_opt(2025, 1, 15),
            close_date: None,
            eligibility: Some("Awardee: Example University".into()),
            program_description: Some("machine learning applications in climate adaptation".into()),
            award_range_min: Some(50_000.0),
            award_range_max: Some(250_000.0),
            source_url: "https://www.grants.gov/search-results-detail/123456".into(),
            source: Source::GrantsGov,
        }
    }

    #[test]
    fn source_roundtrip() {
        for source in Source::ALL {
            let parsed: Source = source.as_str().parse().expect("parse source");
            assert_eq!(parsed, source);
        }
        assert!("sam_gov".parse::<Source>().is_err());
    }

    #[test]
    fn semantic_tag_clamps_confidence() {
        assert_eq!(SemanticTag::new("a/b", 1.7, TagMethod::RuleBased).confidence, 1.0);
        assert_eq!(SemanticTag::new("a/b", -0.2, TagMethod::Embedding).confidence, 0.0);
        assert_eq!(SemanticTag::new("a/b", f64::NAN, TagMethod::Llm).confidence, 0.0);
    }

    #[test]
    fn record_sorts_and_truncates_tags() {
        let tags = vec![
            SemanticTag::new("a/low", 0.2, TagMethod::RuleBased),
            SemanticTag::new("a/high", 0.9, TagMethod::Embedding),
            SemanticTag::new("a/mid", 0.5, TagMethod::RuleBased),
        ];
        let record = FoaRecord::try_new(sample_fields(), tags, 2).expect("record");
        let paths: Vec<&str> = record.semantic_tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(paths, vec!["a/high", "a/mid"]);
    }

    #[test]
    fn record_generates_id_when_missing() {
        let mut fields = sample_fields();
        fields.foa_id = "  ".into();
        let record = FoaRecord::try_new(fields, vec![], DEFAULT_MAX_TAGS).expect("record");
        assert!(!record.foa_id.trim().is_empty());
        assert!(record.foa_id.parse::<Uuid>().is_ok());
    }

    #[test]
    fn record_rejects_out_of_range_confidence() {
        let bad = SemanticTag {
            tag: "a/b".into(),
            confidence: 1.5,
            method: TagMethod::Llm,
        };
        assert!(FoaRecord::try_new(sample_fields(), vec![bad], DEFAULT_MAX_TAGS).is_err());
    }

    #[test]
    fn flat_tags_format() {
        let tags = vec![
            SemanticTag::new("research_domains/artificial_intelligence", 0.4444, TagMethod::RuleBased),
            SemanticTag::new("research_domains/climate_science", 0.51, TagMethod::Embedding),
        ];
        assert_eq!(
            format_flat_tags(&tags),
            "research_domains/artificial_intelligence (0.44, rule_based); \
             research_domains/climate_science (0.51, embedding)"
        );
    }

    #[test]
    fn flat_record_reparses() {
        let tags = vec![
            SemanticTag::new("research_domains/climate_science", 0.51, TagMethod::Embedding),
            SemanticTag::new("funding_types/research_grant", 0.25, TagMethod::RuleBased),
        ];
        let record = FoaRecord::try_new(sample_fields(), tags, DEFAULT_MAX_TAGS).expect("record");
        let flat = record.to_flat();
        assert_eq!(flat.open_date, "2025-01-15");
        assert_eq!(flat.close_date, "");

        let parsed = FoaRecord::try_from(flat).expect("reparse");
        assert_eq!(parsed.foa_id, record.foa_id);
        assert_eq!(parsed.title, record.title);
        assert_eq!(parsed.agency, record.agency);
        assert_eq!(parsed.semantic_tags.len(), 2);
        assert_eq!(parsed.open_date, record.open_date);
        assert_eq!(parsed.award_range_max, Some(250_000.0));
        assert_eq!(parsed.source, Source::GrantsGov);
    }

    #[test]
    fn malformed_flat_tags_error() {
        assert!(parse_flat_tags("research_domains/ai").is_err());
        assert!(parse_flat_tags("a/b (high, rule_based)").is_err());
        assert!(parse_flat_tags("").expect("empty").is_empty());
    }

    #[test]
    fn record_json_roundtrip() {
        let record = FoaRecord::try_new(sample_fields(), vec![], DEFAULT_MAX_TAGS).expect("record");
        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains(r#""source":"grants_gov""#));
        assert!(json.contains(r#""open_date":"2025-01-15""#));
        let parsed: FoaRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, record);
    }
}
