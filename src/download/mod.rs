//! Download orchestration
//!
//! Turns a confirmed [`DownloadPlan`] into one [`DownloadJob`] per episode and
//! dispatches each job to the strategy its descriptor asks for. A failing
//! episode never stops the batch.

mod hls;
mod progressive;

pub use hls::HlsDownloader;
pub use progressive::HttpTransport;

use crate::{ProgressEvent, SkipReason};
use crate::catalog::{DownloadType, Resolution, ResolutionDescriptor, ResolutionMap, SeriesRef};
use crate::file_operations::episode_file_name;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors scoped to a single episode download
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The transport or stream download failed
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The descriptor names a type no strategy handles
    #[error("Unknown download type '{0}'")]
    UnknownType(String),

    /// Writing the output failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One episode ready to be downloaded
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub episode_number: u32,
    pub output_file_name: String,
    pub output_dir: PathBuf,
    pub descriptor: ResolutionDescriptor,
}

impl DownloadJob {
    /// Full path of the file this job produces
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file_name)
    }
}

/// Fetches a single media file over HTTP
pub trait ProgressiveTransport {
    /// Streams `uri` into `destination`, returning the number of bytes written
    ///
    /// `referer` is sent as the `Referer` header when given. A non-2xx status
    /// is an error.
    fn fetch(&self, uri: &str, referer: Option<&str>, destination: &Path)
    -> Result<u64, DownloadError>;
}

/// Downloads and assembles a segmented stream
pub trait SegmentedDownloader {
    /// Blocks until `job.output_path()` holds the assembled stream
    fn download(&self, job: &DownloadJob) -> Result<(), DownloadError>;
}

/// The strategies available to a batch
pub struct Downloaders<'a> {
    pub progressive: &'a dyn ProgressiveTransport,
    pub segmented: &'a dyn SegmentedDownloader,
}

/// Terminal state of one episode
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded { path: PathBuf, elapsed: Duration },
    /// The chosen resolution is not offered for this episode
    SkippedNoLink,
    Failed { reason: String },
}

/// Outcome of one episode of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeOutcome {
    pub episode_number: u32,
    pub outcome: JobOutcome,
}

/// Result of running a whole batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<EpisodeOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::SkippedNoLink))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&JobOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.outcome)).count()
    }
}

/// Everything needed to run a batch once the user confirmed it
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadPlan {
    pub series: SeriesRef,
    pub resolution: Resolution,
    /// Validated descriptors per episode, in download order
    pub episodes: BTreeMap<u32, ResolutionMap>,
    /// Page URL sent as `Referer` with progressive downloads
    pub referer: String,
}

impl DownloadPlan {
    /// Episodes that offer the chosen resolution, with their descriptor
    pub fn queued(&self) -> impl Iterator<Item = (u32, &ResolutionDescriptor)> {
        self.episodes
            .iter()
            .filter_map(|(number, links)| links.get(&self.resolution).map(|d| (*number, d)))
    }

    /// Builds the job of one episode, `None` when the resolution is missing
    pub fn job(&self, episode_number: u32, output_dir: &Path) -> Option<DownloadJob> {
        let descriptor = self.episodes.get(&episode_number)?.get(&self.resolution)?;
        Some(DownloadJob {
            episode_number,
            output_file_name: episode_file_name(
                &self.series.title,
                episode_number,
                &self.resolution,
            ),
            output_dir: output_dir.to_path_buf(),
            descriptor: descriptor.clone(),
        })
    }
}

/// Runs a single job with the strategy its descriptor names
pub fn run_job(
    job: &DownloadJob,
    referer: Option<&str>,
    downloaders: &Downloaders<'_>,
) -> Result<(), DownloadError> {
    match &job.descriptor.download_type {
        DownloadType::Progressive => {
            let bytes = downloaders
                .progressive
                .fetch(&job.descriptor.uri, referer, &job.output_path())?;
            info!(episode = job.episode_number, bytes, "progressive download finished");
            Ok(())
        }
        DownloadType::Segmented => downloaders.segmented.download(job),
        DownloadType::Unsupported(raw) => Err(DownloadError::UnknownType(raw.clone())),
    }
}

/// Downloads every episode of the plan into `output_dir`, one after another
///
/// Each episode ends up in exactly one [`JobOutcome`]; failures are reported
/// through `progress_callback` and the batch moves on.
pub fn run_batch<F>(
    plan: &DownloadPlan,
    output_dir: &Path,
    downloaders: &Downloaders<'_>,
    progress_callback: &mut F,
) -> BatchReport
where
    F: FnMut(ProgressEvent),
{
    let mut report = BatchReport::default();

    for &episode_number in plan.episodes.keys() {
        let Some(job) = plan.job(episode_number, output_dir) else {
            warn!(
                episode = episode_number,
                resolution = %plan.resolution,
                "no link for chosen resolution"
            );
            progress_callback(ProgressEvent::EpisodeSkipped {
                episode_number,
                reason: SkipReason::MissingResolution(plan.resolution.clone()),
            });
            report.outcomes.push(EpisodeOutcome {
                episode_number,
                outcome: JobOutcome::SkippedNoLink,
            });
            continue;
        };

        progress_callback(ProgressEvent::DownloadStarted {
            episode_number,
            file_name: job.output_file_name.clone(),
        });

        let start = Instant::now();
        let outcome = match run_job(&job, Some(&plan.referer), downloaders) {
            Ok(()) => {
                let elapsed = start.elapsed();
                progress_callback(ProgressEvent::DownloadCompleted {
                    episode_number,
                    file_name: job.output_file_name.clone(),
                    elapsed,
                });
                JobOutcome::Succeeded {
                    path: job.output_path(),
                    elapsed,
                }
            }
            Err(e) => {
                error!(episode = episode_number, error = %e, "episode download failed");
                progress_callback(ProgressEvent::DownloadFailed {
                    episode_number,
                    file_name: job.output_file_name.clone(),
                    error: e.to_string(),
                });
                JobOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        report.outcomes.push(EpisodeOutcome {
            episode_number,
            outcome,
        });
    }

    report
}

/// Formats an elapsed duration as `1h 02m 03s`, `4m 05s` or `9s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
