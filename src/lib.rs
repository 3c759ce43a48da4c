//! kisskh_dl - Download series episodes from KissKh
//!
//! This library provides the selection and download pipeline: it resolves a
//! series from its page URL, lets the user pick episodes and a resolution, and
//! downloads every picked episode with the strategy its stream requires.

mod catalog;
mod config;
mod download;
mod file_operations;
mod links;
mod prompt;
mod selection;
mod series_url;
mod temp;

#[cfg(test)]
mod test_support;

use catalog::{fetch_episode_list, fetch_series_metadata};
use links::{filter_valid, resolve_links, selected_in_catalog};
use selection::{confirm_download, select_episodes, select_resolution};
use series_url::resolve_series_id;

// Re-export error types
pub use catalog::CatalogError;
pub use config::ConfigError;
pub use download::DownloadError;
pub use selection::SelectionError;
pub use series_url::SeriesUrlError;

// Re-export pipeline types
pub use catalog::{
    DownloadType, EpisodeLinkMap, EpisodeLinks, EpisodeRange, EpisodeSummary, KissKhClient,
    Resolution, ResolutionDescriptor, ResolutionMap, SeriesMetadata, SeriesRef, SiteClient,
};
pub use config::{Config, DownloaderConfig, SiteConfig};
pub use download::{
    BatchReport, DownloadJob, DownloadPlan, Downloaders, EpisodeOutcome, HlsDownloader,
    HttpTransport, JobOutcome, ProgressiveTransport, SegmentedDownloader, format_elapsed,
};
pub use file_operations::{episode_file_name, sanitize_title};
pub use prompt::{PromptRequest, Prompter, TerminalPrompter};

use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Why an episode is left out of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The site reported no stream variants for the episode
    NoResolutionInfo,
    /// The episode does not offer the chosen resolution
    MissingResolution(Resolution),
}

/// Progress event emitted while preparing and running a batch
///
/// These events allow library users to show progress and warnings without the
/// pipeline writing to the terminal itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Pipeline started for the given page URL
    Started { url: String },

    /// Fetching series metadata
    FetchingMetadata { series_id: String },

    /// Series metadata fetched
    MetadataFetched { series: SeriesRef },

    /// Episode list fetched, in the site's order
    EpisodesListed { episodes: Vec<EpisodeSummary> },

    /// Resolving stream links of the selected episodes
    FetchingLinks { count: usize },

    /// An episode is left out of the batch
    EpisodeSkipped {
        episode_number: u32,
        reason: SkipReason,
    },

    /// Resolution picked for the batch
    ResolutionChosen {
        resolution: Resolution,
        fell_back: bool,
    },

    /// An episode is queued for download
    Queued {
        episode_number: u32,
        resolution: Resolution,
        uri: String,
        size_bytes: u64,
    },

    /// The user declined the download
    Aborted,

    /// An episode download started
    DownloadStarted {
        episode_number: u32,
        file_name: String,
    },

    /// An episode download finished
    DownloadCompleted {
        episode_number: u32,
        file_name: String,
        elapsed: Duration,
    },

    /// An episode download failed; the batch continues
    DownloadFailed {
        episode_number: u32,
        file_name: String,
        error: String,
    },

    /// Batch finished
    Complete {
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Top-level error type for kisskh_dl operations
#[derive(Debug, Error)]
pub enum KissKhError {
    /// The page URL does not identify a series
    #[error(transparent)]
    SeriesUrl(#[from] SeriesUrlError),

    /// Error while fetching the catalog or links
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Error while selecting episodes or resolution
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// Error while loading the configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to set up the HTTP client
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Resolves a series and asks the user what to download
///
/// Runs URL resolution, metadata and episode fetching, the episode prompt,
/// link resolution, validation and the resolution prompt. Every error returned
/// here is fatal for the run; nothing has been downloaded yet.
///
/// # Arguments
///
/// * `url` - The series page URL, which must carry an `id` query parameter
/// * `client` - The site client used for catalog and link requests
/// * `prompter` - Answers the episode and resolution questions
/// * `progress_callback` - Receives progress events and warnings
pub fn prepare_download<C, P, F>(
    url: &str,
    client: &C,
    prompter: &mut P,
    progress_callback: &mut F,
) -> Result<DownloadPlan, KissKhError>
where
    C: SiteClient,
    P: Prompter,
    F: FnMut(ProgressEvent),
{
    progress_callback(ProgressEvent::Started {
        url: url.to_string(),
    });

    let series_id = resolve_series_id(url)?;

    progress_callback(ProgressEvent::FetchingMetadata {
        series_id: series_id.clone(),
    });
    let series = fetch_series_metadata(client, &series_id)?;
    progress_callback(ProgressEvent::MetadataFetched {
        series: series.clone(),
    });

    let episodes = fetch_episode_list(client, &series)?;
    progress_callback(ProgressEvent::EpisodesListed {
        episodes: episodes.clone(),
    });

    let max_episode = u32::try_from(episodes.len()).unwrap_or(u32::MAX);
    let selection = select_episodes(prompter, max_episode)?;
    let selected = selected_in_catalog(&episodes, &selection);

    progress_callback(ProgressEvent::FetchingLinks {
        count: selected.len(),
    });
    let link_map = resolve_links(client, &episodes, &selected)?;
    let valid = filter_valid(&link_map, &selected);

    for &episode_number in &valid.skipped {
        warn!(episode = episode_number, "no resolution info available");
        progress_callback(ProgressEvent::EpisodeSkipped {
            episode_number,
            reason: SkipReason::NoResolutionInfo,
        });
    }
    valid.ensure_downloadable()?;

    let choice = select_resolution(prompter, &valid.available_resolutions)?;
    progress_callback(ProgressEvent::ResolutionChosen {
        resolution: choice.resolution.clone(),
        fell_back: choice.fell_back,
    });

    let plan = DownloadPlan {
        series,
        resolution: choice.resolution,
        episodes: valid.episodes,
        referer: url.to_string(),
    };

    for (episode_number, descriptor) in plan.queued() {
        progress_callback(ProgressEvent::Queued {
            episode_number,
            resolution: plan.resolution.clone(),
            uri: descriptor.uri.clone(),
            size_bytes: descriptor.size_bytes,
        });
    }

    Ok(plan)
}

/// Runs the whole pipeline for one series page URL
///
/// Prepares the plan, asks for confirmation and downloads the episodes into
/// `<download_root>/<title> (<year>)`. Episode failures are reported through
/// the callback and in the returned report; they do not abort the batch.
///
/// # Returns
///
/// `Ok(None)` when the user declined the download, otherwise the batch report
///
/// # Examples
///
/// ```no_run
/// use kisskh_dl::{
///     Config, Downloaders, HlsDownloader, HttpTransport, KissKhClient, TerminalPrompter,
///     download_series,
/// };
///
/// let config = Config::load(None)?;
/// let http = config.downloader.http_client()?;
/// let client = KissKhClient::new(http.clone(), &config.site);
/// let transport = HttpTransport::new(http.clone());
/// let hls = HlsDownloader::new(http, &config.downloader);
/// let downloaders = Downloaders { progressive: &transport, segmented: &hls };
///
/// let report = download_series(
///     "https://kisskh.co/Drama/Moving?id=7981",
///     &client,
///     &mut TerminalPrompter::default(),
///     &config.downloader.download_dir,
///     &downloaders,
///     |event| println!("{:?}", event),
/// )?;
/// # Ok::<(), kisskh_dl::KissKhError>(())
/// ```
pub fn download_series<C, P, F>(
    url: &str,
    client: &C,
    prompter: &mut P,
    download_root: &Path,
    downloaders: &Downloaders<'_>,
    mut progress_callback: F,
) -> Result<Option<BatchReport>, KissKhError>
where
    C: SiteClient,
    P: Prompter,
    F: FnMut(ProgressEvent),
{
    let plan = prepare_download(url, client, prompter, &mut progress_callback)?;

    if !confirm_download(prompter)? {
        progress_callback(ProgressEvent::Aborted);
        return Ok(None);
    }

    let output_dir = file_operations::prepare_output_dir(download_root, &plan.series)?;
    let report = download::run_batch(&plan, &output_dir, downloaders, &mut progress_callback);

    progress_callback(ProgressEvent::Complete {
        succeeded: report.succeeded(),
        skipped: report.skipped(),
        failed: report.failed(),
    });

    Ok(Some(report))
}
