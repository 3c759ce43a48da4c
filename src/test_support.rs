//! In-memory collaborators shared by the unit tests

use crate::catalog::{
    CatalogError, DownloadType, EpisodeLinkMap, EpisodeLinks, EpisodeRange, EpisodeSummary,
    Resolution, ResolutionDescriptor, SeriesMetadata, SeriesRef, SiteClient,
};
use crate::download::{DownloadError, DownloadJob, ProgressiveTransport, SegmentedDownloader};
use crate::prompt::{PromptRequest, Prompter};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::Path;
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer};

pub(crate) fn descriptor(download_type: DownloadType, label: &str) -> ResolutionDescriptor {
    ResolutionDescriptor {
        download_type,
        uri: format!("https://cdn.example/{}/video", label),
        duration: 2700.0,
        size_bytes: 300 * 1024 * 1024,
        size_mb_hint: Some(300.0),
    }
}

pub(crate) fn series(title: &str) -> SeriesRef {
    SeriesRef {
        id: "7981".to_string(),
        title: title.to_string(),
        year: "2023".to_string(),
        country: "South Korea".to_string(),
        series_type: "TVSeries".to_string(),
        status: "Completed".to_string(),
    }
}

/// Site client serving a generated catalog
///
/// Every episode offers progressive `480` and `720` links unless overridden
/// with [`FakeSiteClient::with_links`].
pub(crate) struct FakeSiteClient {
    title: Option<String>,
    episode_count: u32,
    overrides: BTreeMap<u32, EpisodeLinks>,
    requested: RefCell<Vec<EpisodeRange>>,
}

impl FakeSiteClient {
    pub(crate) fn new(title: &str, episode_count: u32) -> Self {
        Self {
            title: Some(title.to_string()),
            episode_count,
            overrides: BTreeMap::new(),
            requested: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn without_metadata() -> Self {
        Self {
            title: None,
            ..Self::new("", 0)
        }
    }

    pub(crate) fn with_links(mut self, episode_number: u32, links: EpisodeLinks) -> Self {
        self.overrides.insert(episode_number, links);
        self
    }

    pub(crate) fn requested_ranges(&self) -> Vec<EpisodeRange> {
        self.requested.borrow().clone()
    }
}

impl SiteClient for FakeSiteClient {
    fn fetch_series_metadata(
        &self,
        _series_id: &str,
    ) -> Result<Option<SeriesMetadata>, CatalogError> {
        Ok(self.title.as_ref().map(|title| SeriesMetadata {
            title: title.clone(),
            release_date: "2023-08-09T00:00:00".to_string(),
            country: None,
            series_type: None,
            status: None,
        }))
    }

    fn fetch_episode_list(&self, _series: &SeriesRef) -> Result<Vec<EpisodeSummary>, CatalogError> {
        // Newest first, the way the site lists them
        Ok((1..=self.episode_count)
            .rev()
            .map(|n| EpisodeSummary {
                episode_number: n,
                episode_name: format!("Episode {}", n),
                source_id: (1000 + n).to_string(),
            })
            .collect())
    }

    fn resolve_links(
        &self,
        episodes: &[EpisodeSummary],
        range: &EpisodeRange,
    ) -> Result<EpisodeLinkMap, CatalogError> {
        self.requested.borrow_mut().push(range.clone());

        Ok(episodes
            .iter()
            .filter(|e| range.contains(e.episode_number))
            .map(|e| {
                let links = self.overrides.get(&e.episode_number).cloned().unwrap_or_else(|| {
                    EpisodeLinks::Available(
                        ["480", "720"]
                            .into_iter()
                            .map(|l| (Resolution::from(l), descriptor(DownloadType::Progressive, l)))
                            .collect(),
                    )
                });
                (e.episode_number, links)
            })
            .collect())
    }
}

/// Prompter replaying canned answers and recording the questions
pub(crate) struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<PromptRequest>,
}

impl ScriptedPrompter {
    pub(crate) fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    pub(crate) fn asked(&self) -> &[PromptRequest] {
        &self.asked
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, request: &PromptRequest) -> io::Result<String> {
        self.asked.push(request.clone());
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer left"))
    }
}

/// Progressive transport writing a small placeholder file
#[derive(Default)]
pub(crate) struct FakeTransport {
    fetched: RefCell<Vec<(String, Option<String>)>>,
}

impl FakeTransport {
    pub(crate) fn fetched(&self) -> Vec<(String, Option<String>)> {
        self.fetched.borrow().clone()
    }
}

impl ProgressiveTransport for FakeTransport {
    fn fetch(
        &self,
        uri: &str,
        referer: Option<&str>,
        destination: &Path,
    ) -> Result<u64, DownloadError> {
        self.fetched
            .borrow_mut()
            .push((uri.to_string(), referer.map(str::to_string)));
        fs::write(destination, b"mp4 data")?;
        Ok(8)
    }
}

/// Segmented downloader that either writes a placeholder or always fails
#[derive(Default)]
pub(crate) struct FakeSegmented {
    fail: bool,
    downloaded: RefCell<Vec<u32>>,
}

impl FakeSegmented {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn downloaded(&self) -> Vec<u32> {
        self.downloaded.borrow().clone()
    }
}

impl SegmentedDownloader for FakeSegmented {
    fn download(&self, job: &DownloadJob) -> Result<(), DownloadError> {
        if self.fail {
            return Err(DownloadError::DownloadFailed(
                "playlist unavailable".to_string(),
            ));
        }
        fs::write(job.output_path(), b"ts data")?;
        self.downloaded.borrow_mut().push(job.episode_number);
        Ok(())
    }
}

/// HTTP mock server driven from blocking tests
///
/// The server runs on its own runtime so that the blocking reqwest client
/// under test is never called from inside an async context.
pub(crate) struct MockSite {
    server: MockServer,
    runtime: Runtime,
}

impl MockSite {
    pub(crate) fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    pub(crate) fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub(crate) fn uri(&self) -> String {
        self.server.uri()
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }
}
