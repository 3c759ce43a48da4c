/// Data structures and traits for series catalog retrieval.
///
/// This module provides structures to represent a series, its episodes and the
/// per-resolution download descriptors of each episode, as well as the trait
/// for implementing site clients that can produce them.
mod kisskh;
mod kisskh_types;

pub use kisskh::KissKhClient;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while talking to the site or building the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Request to the site API failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// Failed to parse the site's JSON or playlist response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// The site returned nothing usable for the series
    #[error("Could not fetch series details for id {0}.")]
    MetadataUnavailable(String),

    /// The series exists but lists no episodes
    #[error("No episodes found for '{0}'.")]
    NoEpisodes(String),
}

/// Series-level metadata as reported by the site, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetadata {
    pub title: String,
    /// Release date as sent by the site, e.g. `2023-04-01T00:00:00`
    pub release_date: String,
    pub country: Option<String>,
    pub series_type: Option<String>,
    pub status: Option<String>,
}

/// A resolved series. Created once after the metadata fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRef {
    /// Identifier taken from the series page URL
    pub id: String,
    pub title: String,
    pub year: String,
    pub country: String,
    pub series_type: String,
    pub status: String,
}

impl SeriesRef {
    /// Builds the reference from raw metadata, filling absent fields with "Unknown".
    pub fn from_metadata(id: &str, metadata: SeriesMetadata) -> Self {
        let unknown = || "Unknown".to_string();
        let year = metadata
            .release_date
            .split('-')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            id: id.to_string(),
            title: metadata.title,
            year,
            country: metadata.country.unwrap_or_else(unknown),
            series_type: metadata.series_type.unwrap_or_else(unknown),
            status: metadata.status.unwrap_or_else(unknown),
        }
    }
}

/// One entry of a series' episode list.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    /// The episode number as shown to the user
    pub episode_number: u32,
    /// The episode title
    pub episode_name: String,
    /// Site-internal identifier used to resolve the episode's stream
    pub source_id: String,
}

/// Strategy needed to fetch one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadType {
    /// A single media file fetched over HTTP
    Progressive,
    /// An HLS playlist whose segments are fetched and assembled
    Segmented,
    /// A type the site reported that no strategy handles
    Unsupported(String),
}

impl From<&str> for DownloadType {
    fn from(raw: &str) -> Self {
        match raw {
            "mp4" => DownloadType::Progressive,
            "hls" => DownloadType::Segmented,
            other => DownloadType::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadType::Progressive => f.write_str("mp4"),
            DownloadType::Segmented => f.write_str("hls"),
            DownloadType::Unsupported(raw) => f.write_str(raw),
        }
    }
}

/// A resolution label such as `"720"`.
///
/// Labels order by their numeric value, so `"1080"` sorts after `"720"`.
/// Non-numeric labels sort below every numeric one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolution(String);

impl Resolution {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl From<&str> for Resolution {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl Ord for Resolution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric()
            .cmp(&other.numeric())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Resolution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Describes one downloadable (episode, resolution) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionDescriptor {
    pub download_type: DownloadType,
    /// Media file URL or playlist URL, depending on the type
    pub uri: String,
    /// Duration in seconds, 0 when the site does not tell
    pub duration: f64,
    /// Size in bytes, possibly an estimate
    pub size_bytes: u64,
    pub size_mb_hint: Option<f64>,
}

/// All descriptors of one episode, keyed by resolution.
pub type ResolutionMap = BTreeMap<Resolution, ResolutionDescriptor>;

/// What the site reported for one episode.
#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeLinks {
    /// Stream variants keyed by resolution (may still be empty)
    Available(ResolutionMap),
    /// No usable stream information at all
    Unavailable,
}

/// Per-episode link information keyed by canonical episode number.
pub type EpisodeLinkMap = BTreeMap<u32, EpisodeLinks>;

/// The span of episodes a link resolution request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRange {
    pub start: u32,
    pub end: u32,
    /// When non-empty, only these numbers are requested
    pub specific_numbers: Vec<u32>,
}

impl EpisodeRange {
    /// Builds a range covering exactly the given episode numbers.
    ///
    /// Returns `None` for an empty selection.
    pub fn covering(numbers: &BTreeSet<u32>) -> Option<Self> {
        let start = *numbers.first()?;
        let end = *numbers.last()?;
        Some(Self {
            start,
            end,
            specific_numbers: numbers.iter().copied().collect(),
        })
    }

    /// Whether the given episode number falls into this range.
    pub fn contains(&self, episode_number: u32) -> bool {
        if self.specific_numbers.is_empty() {
            (self.start..=self.end).contains(&episode_number)
        } else {
            self.specific_numbers.contains(&episode_number)
        }
    }
}

/// Trait for site clients that can fetch series catalogs and stream links.
///
/// Implementors talk to a concrete streaming site; the pipeline only relies on
/// this contract, which keeps it testable without network access.
pub trait SiteClient {
    /// Fetches series-level metadata, `None` when the site returns nothing.
    fn fetch_series_metadata(
        &self,
        series_id: &str,
    ) -> Result<Option<SeriesMetadata>, CatalogError>;

    /// Fetches the raw episode list of a series in source order.
    fn fetch_episode_list(&self, series: &SeriesRef) -> Result<Vec<EpisodeSummary>, CatalogError>;

    /// Resolves the per-resolution descriptors of every episode in `range`.
    ///
    /// Episodes without stream variants are reported as
    /// [`EpisodeLinks::Unavailable`] or an empty map rather than an error.
    fn resolve_links(
        &self,
        episodes: &[EpisodeSummary],
        range: &EpisodeRange,
    ) -> Result<EpisodeLinkMap, CatalogError>;
}

/// Fetches and normalizes the metadata of a series.
pub fn fetch_series_metadata<C: SiteClient>(
    client: &C,
    series_id: &str,
) -> Result<SeriesRef, CatalogError> {
    let metadata = client
        .fetch_series_metadata(series_id)?
        .filter(|metadata| !metadata.title.is_empty())
        .ok_or_else(|| CatalogError::MetadataUnavailable(series_id.to_string()))?;

    Ok(SeriesRef::from_metadata(series_id, metadata))
}

/// Fetches the episode list of a series, failing when it is empty.
pub fn fetch_episode_list<C: SiteClient>(
    client: &C,
    series: &SeriesRef,
) -> Result<Vec<EpisodeSummary>, CatalogError> {
    let episodes = client.fetch_episode_list(series)?;
    if episodes.is_empty() {
        return Err(CatalogError::NoEpisodes(series.title.clone()));
    }
    debug!(series = %series.title, count = episodes.len(), "fetched episode list");
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeSiteClient;

    fn metadata(title: &str) -> SeriesMetadata {
        SeriesMetadata {
            title: title.to_string(),
            release_date: "2021-09-17T00:00:00".to_string(),
            country: Some("South Korea".to_string()),
            series_type: None,
            status: Some("Completed".to_string()),
        }
    }

    #[test]
    fn test_series_ref_from_metadata() {
        let series = SeriesRef::from_metadata("4271", metadata("Squid Game"));
        assert_eq!(series.id, "4271");
        assert_eq!(series.year, "2021");
        assert_eq!(series.country, "South Korea");
        assert_eq!(series.series_type, "Unknown");
        assert_eq!(series.status, "Completed");
    }

    #[test]
    fn test_resolution_orders_numerically() {
        let mut labels: Vec<Resolution> = ["1080", "360", "720", "480"]
            .into_iter()
            .map(Resolution::from)
            .collect();
        labels.sort();
        let sorted: Vec<&str> = labels.iter().map(Resolution::as_str).collect();
        assert_eq!(sorted, vec!["360", "480", "720", "1080"]);
        assert!(Resolution::from("auto") < Resolution::from("144"));
    }

    #[test]
    fn test_download_type_from_wire() {
        assert_eq!(DownloadType::from("mp4"), DownloadType::Progressive);
        assert_eq!(DownloadType::from("hls"), DownloadType::Segmented);
        assert_eq!(
            DownloadType::from("dash"),
            DownloadType::Unsupported("dash".to_string())
        );
    }

    #[test]
    fn test_episode_range() {
        let numbers: BTreeSet<u32> = [4, 2, 9].into_iter().collect();
        let range = EpisodeRange::covering(&numbers).unwrap();
        assert_eq!(range.start, 2);
        assert_eq!(range.end, 9);
        assert!(range.contains(4));
        assert!(!range.contains(5));
        assert!(EpisodeRange::covering(&BTreeSet::new()).is_none());

        let span = EpisodeRange {
            start: 3,
            end: 5,
            specific_numbers: Vec::new(),
        };
        assert!(span.contains(4));
        assert!(!span.contains(6));
    }

    #[test]
    fn test_fetch_series_metadata_missing() {
        let client = FakeSiteClient::without_metadata();
        let result = fetch_series_metadata(&client, "42");
        assert!(matches!(result, Err(CatalogError::MetadataUnavailable(id)) if id == "42"));
    }

    #[test]
    fn test_fetch_episode_list_empty() {
        let client = FakeSiteClient::new("Empty Show", 0);
        let series = fetch_series_metadata(&client, "1").unwrap();
        let result = fetch_episode_list(&client, &series);
        assert!(matches!(result, Err(CatalogError::NoEpisodes(_))));
    }
}
