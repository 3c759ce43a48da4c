/// KissKh site client implementation.
use super::kisskh_types::{KissKhDrama, KissKhStream, id_to_string};
use super::{
    CatalogError, DownloadType, EpisodeLinkMap, EpisodeLinks, EpisodeRange, EpisodeSummary,
    Resolution, ResolutionDescriptor, ResolutionMap, SeriesMetadata, SeriesRef, SiteClient,
};
use crate::config::SiteConfig;
use m3u8_rs::Playlist;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

/// Matches resolution tokens like `720p` in media file URLs.
static RESOLUTION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{3,4})p").expect("resolution pattern is valid"));

/// Site client for the KissKh drama API.
///
/// Series and episode data come from the JSON API; stream variants are read
/// from the HLS master playlist each episode points at.
pub struct KissKhClient {
    client: Client,
    base_url: String,
    fallback_resolution: Resolution,
}

impl KissKhClient {
    /// Creates a new client using the given HTTP client and site settings.
    pub fn new(client: Client, site: &SiteConfig) -> Self {
        Self {
            client,
            base_url: site.base_url.trim_end_matches('/').to_string(),
            fallback_resolution: Resolution::new(site.fallback_resolution.clone()),
        }
    }

    fn series_url(&self, series_id: &str) -> String {
        format!("{}/api/DramaList/Drama/{}?isq=false", self.base_url, series_id)
    }

    fn stream_url(&self, episode_id: &str) -> String {
        format!(
            "{}/api/DramaList/Episode/{}.png?err=false&ts=&time=",
            self.base_url, episode_id
        )
    }

    /// Issues a GET and returns the successful response.
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, CatalogError> {
        let response = self
            .client
            .get(url)
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .map_err(|e| CatalogError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CatalogError::RequestError(format!(
                "HTTP {} {} for {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown"),
                url
            )));
        }

        Ok(response)
    }

    /// Fetches and parses a JSON document; a 404 or a JSON `null` yields `None`.
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, CatalogError> {
        let response = self
            .client
            .get(url)
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .map_err(|e| CatalogError::RequestError(e.to_string()))?;

        if response.status() == 404 {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(CatalogError::RequestError(format!(
                "HTTP {} {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<Option<T>>()
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }

    fn fetch_drama(&self, series_id: &str) -> Result<Option<KissKhDrama>, CatalogError> {
        self.get_json(&self.series_url(series_id))
    }

    /// Resolves the stream variants of a single episode.
    fn resolve_episode(&self, episode: &EpisodeSummary) -> Result<EpisodeLinks, CatalogError> {
        let stream: Option<KissKhStream> = self.get_json(&self.stream_url(&episode.source_id))?;
        let Some(video) = stream
            .and_then(|s| s.video)
            .filter(|video| !video.trim().is_empty())
        else {
            return Ok(EpisodeLinks::Unavailable);
        };

        let video_url =
            Url::parse(video.trim()).map_err(|e| CatalogError::ParseError(e.to_string()))?;

        if video_url.path().ends_with(".m3u8") {
            self.playlist_variants(&video_url).map(EpisodeLinks::Available)
        } else {
            let (resolution, descriptor) = self.progressive_descriptor(&video_url);
            Ok(EpisodeLinks::Available(ResolutionMap::from([(
                resolution, descriptor,
            )])))
        }
    }

    /// Reads an HLS playlist and returns one descriptor per resolution.
    ///
    /// A master playlist yields one entry per variant height, keeping the
    /// highest bandwidth for duplicate heights. A plain media playlist is
    /// filed under the configured fallback resolution.
    fn playlist_variants(&self, playlist_url: &Url) -> Result<ResolutionMap, CatalogError> {
        let bytes = self
            .get(playlist_url.as_str())?
            .bytes()
            .map_err(|e| CatalogError::RequestError(e.to_string()))?;

        let mut variants = ResolutionMap::new();
        match m3u8_rs::parse_playlist_res(&bytes) {
            Ok(Playlist::MasterPlaylist(master)) => {
                let mut best_bandwidth = std::collections::HashMap::new();
                for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
                    let Some(resolution) = variant.resolution.as_ref() else {
                        continue;
                    };
                    let label = Resolution::new(resolution.height.to_string());
                    let bandwidth = variant.average_bandwidth.unwrap_or(variant.bandwidth);
                    if best_bandwidth.get(&label).is_some_and(|best| *best >= bandwidth) {
                        continue;
                    }

                    let uri = playlist_url
                        .join(&variant.uri)
                        .map_err(|e| CatalogError::ParseError(e.to_string()))?;
                    let duration = self.playlist_duration(&uri);
                    let size_bytes = (bandwidth as f64 * duration / 8.0).round() as u64;

                    best_bandwidth.insert(label.clone(), bandwidth);
                    variants.insert(
                        label,
                        ResolutionDescriptor {
                            download_type: DownloadType::Segmented,
                            uri: uri.to_string(),
                            duration,
                            size_bytes,
                            size_mb_hint: (size_bytes > 0)
                                .then(|| size_bytes as f64 / (1024.0 * 1024.0)),
                        },
                    );
                }
            }
            Ok(Playlist::MediaPlaylist(media)) => {
                let duration: f64 = media.segments.iter().map(|s| s.duration as f64).sum();
                variants.insert(
                    self.fallback_resolution.clone(),
                    ResolutionDescriptor {
                        download_type: DownloadType::Segmented,
                        uri: playlist_url.to_string(),
                        duration,
                        size_bytes: 0,
                        size_mb_hint: None,
                    },
                );
            }
            Err(e) => {
                return Err(CatalogError::ParseError(format!(
                    "invalid playlist at {}: {}",
                    playlist_url, e
                )));
            }
        }

        Ok(variants)
    }

    /// Sums the segment durations of a media playlist, 0 when unreadable.
    fn playlist_duration(&self, media_url: &Url) -> f64 {
        let bytes = match self.get(media_url.as_str()).and_then(|r| {
            r.bytes()
                .map_err(|e| CatalogError::RequestError(e.to_string()))
        }) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(%media_url, error = %e, "could not read media playlist");
                return 0.0;
            }
        };

        match m3u8_rs::parse_media_playlist_res(&bytes) {
            Ok(media) => media.segments.iter().map(|s| s.duration as f64).sum(),
            Err(_) => 0.0,
        }
    }

    /// Builds the descriptor of a plain media file link.
    fn progressive_descriptor(&self, video_url: &Url) -> (Resolution, ResolutionDescriptor) {
        let resolution = resolution_label(video_url.path(), &self.fallback_resolution);

        let size_bytes = self
            .client
            .head(video_url.as_str())
            .header(REFERER, format!("{}/", self.base_url))
            .send()
            .ok()
            .filter(|r| r.status().is_success())
            .and_then(|r| r.content_length())
            .unwrap_or(0);

        (
            resolution,
            ResolutionDescriptor {
                download_type: DownloadType::Progressive,
                uri: video_url.to_string(),
                duration: 0.0,
                size_bytes,
                size_mb_hint: (size_bytes > 0).then(|| size_bytes as f64 / (1024.0 * 1024.0)),
            },
        )
    }
}

/// Reads the resolution out of a media file path like `/ep1_720p.mp4`.
fn resolution_label(path: &str, fallback: &Resolution) -> Resolution {
    RESOLUTION_TOKEN
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| Resolution::new(m.as_str()))
        .unwrap_or_else(|| fallback.clone())
}

impl SiteClient for KissKhClient {
    fn fetch_series_metadata(
        &self,
        series_id: &str,
    ) -> Result<Option<SeriesMetadata>, CatalogError> {
        Ok(self.fetch_drama(series_id)?.map(|drama| SeriesMetadata {
            title: drama.title,
            release_date: drama.release_date.unwrap_or_default(),
            country: drama.country,
            series_type: drama.series_type,
            status: drama.status,
        }))
    }

    fn fetch_episode_list(&self, series: &SeriesRef) -> Result<Vec<EpisodeSummary>, CatalogError> {
        let Some(drama) = self.fetch_drama(&series.id)? else {
            return Ok(Vec::new());
        };

        let episodes = drama
            .episodes
            .into_iter()
            .filter_map(|episode| {
                let Some(number) = episode.number else {
                    debug!(id = %episode.id, "skipping episode without a whole episode number");
                    return None;
                };
                Some(EpisodeSummary {
                    episode_number: number,
                    episode_name: format!("Episode {}", number),
                    source_id: id_to_string(&episode.id),
                })
            })
            .collect();

        Ok(episodes)
    }

    fn resolve_links(
        &self,
        episodes: &[EpisodeSummary],
        range: &EpisodeRange,
    ) -> Result<EpisodeLinkMap, CatalogError> {
        let mut links = EpisodeLinkMap::new();

        for episode in episodes.iter().filter(|e| range.contains(e.episode_number)) {
            let entry = match self.resolve_episode(episode) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(episode = episode.episode_number, error = %e, "could not resolve stream");
                    EpisodeLinks::Unavailable
                }
            };
            links.insert(episode.episode_number, entry);
        }

        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockSite;
    use serde_json::json;
    use std::collections::BTreeSet;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn client(base_url: &str) -> KissKhClient {
        let site = SiteConfig {
            base_url: base_url.to_string(),
            fallback_resolution: "720".to_string(),
        };
        KissKhClient::new(Client::new(), &site)
    }

    #[test]
    fn test_endpoint_urls() {
        let client = client("https://kisskh.co/");
        assert_eq!(
            client.series_url("7981"),
            "https://kisskh.co/api/DramaList/Drama/7981?isq=false"
        );
        assert_eq!(
            client.stream_url("120455"),
            "https://kisskh.co/api/DramaList/Episode/120455.png?err=false&ts=&time="
        );
    }

    #[test]
    fn test_resolution_label() {
        let fallback = Resolution::from("720");
        assert_eq!(
            resolution_label("/videos/moving_ep1_1080P.mp4", &fallback).as_str(),
            "1080"
        );
        assert_eq!(resolution_label("/videos/480p/ep1.mp4", &fallback).as_str(), "480");
        assert_eq!(resolution_label("/videos/ep1.mp4", &fallback).as_str(), "720");
    }

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1000,RESOLUTION=1280x720
low.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=3000,RESOLUTION=1280x720
high.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=5000,RESOLUTION=1920x1080
full.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXTINF:10.0,
seg0.ts
#EXTINF:10.0,
seg1.ts
#EXT-X-ENDLIST
";

    fn serve(site: &MockSite, route: &str, response: ResponseTemplate) {
        site.mount(Mock::given(method("GET")).and(path(route)).respond_with(response));
    }

    fn episode(number: u32, source_id: &str) -> EpisodeSummary {
        EpisodeSummary {
            episode_number: number,
            episode_name: format!("Episode {}", number),
            source_id: source_id.to_string(),
        }
    }

    fn all_of(episodes: &[EpisodeSummary]) -> EpisodeRange {
        let numbers: BTreeSet<u32> = episodes.iter().map(|e| e.episode_number).collect();
        EpisodeRange::covering(&numbers).unwrap()
    }

    #[test]
    fn test_master_playlist_keeps_best_variant_per_height() {
        let site = MockSite::start();
        serve(
            &site,
            "/api/DramaList/Episode/501.png",
            ResponseTemplate::new(200)
                .set_body_json(json!({ "Video": site.url("/hls/master.m3u8") })),
        );
        serve(&site, "/hls/master.m3u8", ResponseTemplate::new(200).set_body_string(MASTER));
        for media in ["/hls/low.m3u8", "/hls/high.m3u8", "/hls/full.m3u8"] {
            serve(&site, media, ResponseTemplate::new(200).set_body_string(MEDIA));
        }

        let client = client(&site.uri());
        let episodes = [episode(1, "501")];
        let links = client.resolve_links(&episodes, &all_of(&episodes)).unwrap();

        let EpisodeLinks::Available(variants) = &links[&1] else {
            panic!("episode 1 should have links");
        };
        let labels: Vec<&str> = variants.keys().map(Resolution::as_str).collect();
        assert_eq!(labels, vec!["720", "1080"]);

        let hd = &variants[&Resolution::from("720")];
        assert_eq!(hd.download_type, DownloadType::Segmented);
        assert!(hd.uri.ends_with("/hls/high.m3u8"));
        assert_eq!(hd.duration, 20.0);
        assert_eq!(hd.size_bytes, 3000 * 20 / 8);
    }

    #[test]
    fn test_missing_video_is_unavailable() {
        let site = MockSite::start();
        serve(
            &site,
            "/api/DramaList/Episode/601.png",
            ResponseTemplate::new(200).set_body_json(json!({ "Video": null })),
        );
        serve(
            &site,
            "/api/DramaList/Episode/602.png",
            ResponseTemplate::new(500),
        );

        let client = client(&site.uri());
        let episodes = [episode(1, "601"), episode(2, "602")];
        let links = client.resolve_links(&episodes, &all_of(&episodes)).unwrap();

        assert_eq!(links[&1], EpisodeLinks::Unavailable);
        assert_eq!(links[&2], EpisodeLinks::Unavailable);
    }

    #[test]
    fn test_progressive_link_is_labelled_from_url() {
        let site = MockSite::start();
        serve(
            &site,
            "/api/DramaList/Episode/701.png",
            ResponseTemplate::new(200).set_body_json(json!({ "Video": site.url("/v/ep1_480p.mp4") })),
        );
        site.mount(
            Mock::given(method("HEAD"))
                .and(path("/v/ep1_480p.mp4"))
                .respond_with(ResponseTemplate::new(200).insert_header("content-length", "1048576")),
        );

        let client = client(&site.uri());
        let episodes = [episode(1, "701")];
        let links = client.resolve_links(&episodes, &all_of(&episodes)).unwrap();

        let EpisodeLinks::Available(variants) = &links[&1] else {
            panic!("episode 1 should have links");
        };
        let sd = &variants[&Resolution::from("480")];
        assert_eq!(sd.download_type, DownloadType::Progressive);
        assert_eq!(sd.size_bytes, 1_048_576);
    }

    #[test]
    fn test_series_and_episode_list() {
        let site = MockSite::start();
        serve(
            &site,
            "/api/DramaList/Drama/7981",
            ResponseTemplate::new(200).set_body_json(json!({
                "title": "Moving",
                "releaseDate": "2023-08-09T00:00:00",
                "country": "South Korea",
                "episodes": [
                    {"id": 3, "number": 2},
                    {"id": "2", "number": 1.5},
                    {"id": 1, "number": "1"}
                ]
            })),
        );

        let client = client(&site.uri());
        let metadata = client.fetch_series_metadata("7981").unwrap().unwrap();
        assert_eq!(metadata.title, "Moving");

        let series = SeriesRef::from_metadata("7981", metadata);
        let episodes = client.fetch_episode_list(&series).unwrap();
        let numbers: Vec<(u32, &str)> = episodes
            .iter()
            .map(|e| (e.episode_number, e.source_id.as_str()))
            .collect();
        assert_eq!(numbers, vec![(2, "3"), (1, "1")]);
    }

    #[test]
    fn test_unknown_series_has_no_metadata() {
        let site = MockSite::start();
        serve(&site, "/api/DramaList/Drama/404", ResponseTemplate::new(404));

        let client = client(&site.uri());
        assert!(client.fetch_series_metadata("404").unwrap().is_none());
    }
}
