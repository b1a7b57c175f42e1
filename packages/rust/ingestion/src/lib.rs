//! Multi-source FOA ingestion: connectors, field mapping, and source detection.
//!
//! This crate provides:
//! - [`SourceConnector`]: the common fetch/search/extract contract
//! - [`GrantsGovConnector`] and [`NsfConnector`]: the built-in sources
//! - [`detect_source`] and [`connector_for`]: URL routing

pub mod connectors;
pub mod fields;
mod http;

pub use connectors::{
    GrantsGovConnector, NsfConnector, RawPayload, RawRecord, SourceConnector, connector_for,
    detect_source,
};


#[cfg(test)]
mod tests {
    use super::*;
    use foaintel_shared::{IngestConfig, Source};

    #[test]
    fn detects_grants_urls() {
        assert_eq!(detect_source("https://www.grants.gov/search-results-detail/1"), Source::GrantsGov);
        assert_eq!(detect_source("https://apply07.grants.gov/x?oppId=1"), Source::GrantsGov);
    }

    #[test]
    fn detects_nsf_urls() {
        assert_eq!(
            detect_source("https://www.nsf.gov/awardsearch/showAward?AWD_ID=2345678"),
            Source::Nsf
        );
        assert_eq!(detect_source("WWW.NSF.GOV/awards/2345678"), Source::Nsf);
    }

    #[test]
    fn unknown_hosts_default_to_grants() {
        assert_eq!(detect_source("https://example.org/funding/1"), Source::GrantsGov);
    }

    #[test]
    fn registry_builds_matching_connector() {
        let config = IngestConfig::default();
        for source in Source::ALL {
            let connector = connector_for(source, &config).unwrap();
            assert_eq!(connector.source(), source);
            assert_eq!(connector.source_name(), source.as_str());
        }
    }
}
