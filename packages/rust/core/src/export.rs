//! JSON and CSV writers for FOA records.

use std::path::{Path, PathBuf};

use foaintel_shared::{FlatRecord, FoaError, FoaRecord, Result};
use tracing::{info, warn};

/// File name for the JSON export inside the output directory.
pub const JSON_FILE_NAME: &str = "foa.json";

/// File name for the CSV export inside the output directory.
pub const CSV_FILE_NAME: &str = "foa.csv";

/// Paths written by [`export_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub json: PathBuf,
    /// `None` when there were no records to write.
    pub csv: Option<PathBuf>,
}

/// Write `records` as a pretty-printed JSON array.
pub fn export_json(records: &[FoaRecord], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| FoaError::parse(format!("failed to serialize records: {e}")))?;
    std::fs::write(path, json).map_err(|e| FoaError::io(path, e))?;

    info!(count = records.len(), path = %path.display(), "exported JSON");
    Ok(())
}

/// Write `records` in flattened form with a header row.
///
/// Returns `false` without creating the file when `records` is empty.
pub fn export_csv(records: &[FoaRecord], path: &Path) -> Result<bool> {
    ensure_parent(path)?;
    if records.is_empty() {
        warn!(path = %path.display(), "no records to export to CSV");
        return Ok(false);
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for record in records {
        writer.serialize(record.to_flat()).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| FoaError::io(path, e))?;

    info!(count = records.len(), path = %path.display(), "exported CSV");
    Ok(true)
}

/// Read a CSV written by [`export_csv`] back into records.
pub fn read_csv(path: &Path) -> Result<Vec<FoaRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    reader
        .deserialize::<FlatRecord>()
        .map(|row| row.map_err(|e| csv_error(path, e)).and_then(FoaRecord::try_from))
        .collect()
}

/// Write `foa.json` and `foa.csv` into `out_dir`.
pub fn export_all(records: &[FoaRecord], out_dir: &Path) -> Result<ExportPaths> {
    let json = out_dir.join(JSON_FILE_NAME);
    let csv = out_dir.join(CSV_FILE_NAME);

    export_json(records, &json)?;
    let wrote_csv = export_csv(records, &csv)?;

    Ok(ExportPaths {
        json,
        csv: wrote_csv.then_some(csv),
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| FoaError::io(parent, e))
        }
        _ => Ok(()),
    }
}

fn csv_error(path: &Path, e: csv::Error) -> FoaError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => FoaError::io(path, io),
            other => FoaError::parse(format!("{}: {other:?}", path.display())),
        }
    } else {
        FoaError::parse(format!("{}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use foaintel_shared::{NormalizedFields, SemanticTag, Source, TagMethod};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("foaintel-export-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn record(foa_id: &str, source: Source) -> FoaRecord {
        let fields = NormalizedFields {
            foa_id: foa_id.into(),
            title: format!("Opportunity {foa_id}, with \"quotes\""),
            agency: "Department of Energy".into(),
            open_date: NaiveDate::from_ymd_opt(2025, 1, 15),
            close_date: None,
            eligibility: Some("Universities; nonprofits".into()),
            program_description: Some("Line one.\n\nLine two.".into()),
            award_range_min: Some(100_000.0),
            award_range_max: Some(2_500_000.0),
            source_url: format!("https://www.grants.gov/search-results-detail/{foa_id}"),
            source,
        };
        let tags = vec![
            SemanticTag::new("research_domains/climate_science", 0.1667, TagMethod::RuleBased),
            SemanticTag::new("research_domains/artificial_intelligence", 0.4444, TagMethod::Embedding),
        ];
        FoaRecord::try_new(fields, tags, 10).unwrap()
    }

    #[test]
    fn json_export_is_array_of_records() {
        let dir = temp_dir();
        let path = dir.join("nested").join(JSON_FILE_NAME);
        export_json(&[record("A-1", Source::GrantsGov)], &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let first = &value[0];
        assert_eq!(first["foa_id"], "A-1");
        assert_eq!(first["source"], "grants_gov");
        assert_eq!(first["open_date"], "2025-01-15");
        assert_eq!(first["semantic_tags"][0]["method"], "embedding");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn csv_round_trip_preserves_identity_and_tags() {
        let dir = temp_dir();
        let path = dir.join(CSV_FILE_NAME);
        let records = vec![record("A-1", Source::GrantsGov), record("2345678", Source::Nsf)];
        assert!(export_csv(&records, &path).unwrap());

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("foa_id,title,agency,open_date,close_date,"));

        let back = read_csv(&path).unwrap();
        assert_eq!(back.len(), 2);
        for (original, parsed) in records.iter().zip(&back) {
            assert_eq!(parsed.foa_id, original.foa_id);
            assert_eq!(parsed.title, original.title);
            assert_eq!(parsed.agency, original.agency);
            assert_eq!(parsed.source, original.source);
            assert_eq!(parsed.program_description, original.program_description);
            assert_eq!(parsed.semantic_tags.len(), original.semantic_tags.len());
        }
        assert_eq!(back[0].semantic_tags[0].tag, "research_domains/artificial_intelligence");
        assert_eq!(back[0].semantic_tags[0].confidence, 0.44);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_csv_is_not_written() {
        let dir = temp_dir();
        let path = dir.join(CSV_FILE_NAME);
        assert!(!export_csv(&[], &path).unwrap());
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn export_all_writes_both_files() {
        let dir = temp_dir();
        let paths = export_all(&[record("A-1", Source::GrantsGov)], &dir).unwrap();
        assert_eq!(paths.json, dir.join("foa.json"));
        assert_eq!(paths.csv.as_deref(), Some(dir.join("foa.csv").as_path()));
        assert!(paths.json.exists());

        let empty = export_all(&[], &dir.join("empty")).unwrap();
        assert!(empty.json.exists());
        assert_eq!(empty.csv, None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
