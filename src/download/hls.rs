//! HLS (segmented stream) downloads
//!
//! Segments of a media playlist are fetched one after another and appended to
//! a temporary transport stream next to the destination. The finished stream
//! is remuxed to MP4 with ffmpeg when available, otherwise it is moved into
//! place as is.

use super::{DownloadError, DownloadJob, SegmentedDownloader};
use crate::config::DownloaderConfig;
use crate::temp::create_temp_file;
use ffmpeg_sidecar::command::{FfmpegCommand, ffmpeg_is_installed};
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use indicatif::{ProgressBar, ProgressStyle};
use m3u8_rs::{KeyMethod, MediaPlaylist, Playlist};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Downloader for HLS playlists
pub struct HlsDownloader {
    client: Client,
    max_retries: u32,
    remux_to_mp4: bool,
}

impl HlsDownloader {
    /// Creates a downloader using the tuning parameters from the config
    pub fn new(client: Client, config: &DownloaderConfig) -> Self {
        Self {
            client,
            max_retries: config.max_retries.max(1),
            remux_to_mp4: config.remux_to_mp4,
        }
    }

    /// GETs a URL, retrying up to `max_retries` times with a growing pause
    fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, DownloadError> {
        let mut attempt = 1;
        loop {
            let result = self
                .client
                .get(url.as_str())
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes());

            match result {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(e) if attempt < self.max_retries => {
                    warn!(%url, attempt, error = %e, "request failed, retrying");
                    thread::sleep(Duration::from_secs(attempt as u64));
                    attempt += 1;
                }
                Err(e) => {
                    return Err(DownloadError::DownloadFailed(format!(
                        "{} after {} attempt(s): {}",
                        url, attempt, e
                    )));
                }
            }
        }
    }

    /// Loads the media playlist behind `playlist_url`
    ///
    /// A master playlist is followed to its best non-iframe variant, preferring
    /// the largest picture and then the highest bandwidth. Returns the
    /// playlist together with the URL its segment URIs are relative to.
    fn media_playlist(&self, playlist_url: &Url) -> Result<(MediaPlaylist, Url), DownloadError> {
        let bytes = self.get_bytes(playlist_url)?;

        match m3u8_rs::parse_playlist_res(&bytes) {
            Ok(Playlist::MediaPlaylist(media)) => Ok((media, playlist_url.clone())),
            Ok(Playlist::MasterPlaylist(master)) => {
                let variant = master
                    .variants
                    .iter()
                    .filter(|v| !v.is_i_frame)
                    .max_by_key(|v| {
                        let pixels = v.resolution.as_ref().map(|r| r.width * r.height).unwrap_or(0);
                        (pixels, v.average_bandwidth.unwrap_or(v.bandwidth))
                    })
                    .ok_or_else(|| {
                        DownloadError::DownloadFailed(
                            "could not find any media playlists".to_string(),
                        )
                    })?;

                let media_url = join(playlist_url, &variant.uri)?;
                debug!(%media_url, "following master playlist variant");
                let media_bytes = self.get_bytes(&media_url)?;
                let media = m3u8_rs::parse_media_playlist_res(&media_bytes).map_err(|_| {
                    DownloadError::DownloadFailed("failed to parse m3u8 media playlist".to_string())
                })?;
                Ok((media, media_url))
            }
            Err(_) => Err(DownloadError::DownloadFailed(
                "failed to parse m3u8".to_string(),
            )),
        }
    }

    /// Remuxes a transport stream into MP4 without re-encoding
    fn remux(source: &Path, destination: &Path) -> Result<(), DownloadError> {
        let mut child = FfmpegCommand::new()
            .args(["-loglevel", "error", "-nostats"])
            .input(source)
            .args(["-c", "copy", "-bsf:a", "aac_adtstoasc"])
            .overwrite()
            .output(destination)
            .spawn()?;

        // Drain the piped output so ffmpeg never blocks on a full pipe
        if let Ok(events) = child.iter() {
            for event in events {
                if let FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, message) = event {
                    warn!(%message, "ffmpeg");
                }
            }
        }
        let status = child.wait()?;

        if !status.success() {
            return Err(DownloadError::DownloadFailed(format!(
                "ffmpeg exited with {}",
                status
            )));
        }
        Ok(())
    }

    fn progress_bar(segments: usize, name: &str) -> ProgressBar {
        let bar = ProgressBar::new(segments as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {pos}/{len} segments ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
        );
        bar.set_message(name.to_string());
        bar
    }
}

fn join(base: &Url, uri: &str) -> Result<Url, DownloadError> {
    base.join(uri)
        .map_err(|e| DownloadError::DownloadFailed(format!("invalid playlist uri {}: {}", uri, e)))
}

impl SegmentedDownloader for HlsDownloader {
    fn download(&self, job: &DownloadJob) -> Result<(), DownloadError> {
        let playlist_url = Url::parse(&job.descriptor.uri)
            .map_err(|e| DownloadError::DownloadFailed(format!("invalid playlist url: {}", e)))?;

        let (media, base_url) = self.media_playlist(&playlist_url)?;
        if media.i_frames_only {
            return Err(DownloadError::DownloadFailed(
                "is iframe media playlist".to_string(),
            ));
        }
        if media.segments.is_empty() {
            return Err(DownloadError::DownloadFailed(
                "media playlist has no segments".to_string(),
            ));
        }
        let encrypted = media
            .segments
            .iter()
            .filter_map(|s| s.key.as_ref())
            .any(|key| !matches!(key.method, KeyMethod::None));
        if encrypted {
            return Err(DownloadError::DownloadFailed(
                "encrypted streams are not supported".to_string(),
            ));
        }

        let temp = create_temp_file(&job.output_dir, "stream", "ts")?;
        let bar = Self::progress_bar(media.segments.len(), &job.output_file_name);

        {
            let mut writer = BufWriter::new(File::create(temp.path())?);
            for segment in &media.segments {
                let segment_url = join(&base_url, &segment.uri)?;
                let bytes = match self.get_bytes(&segment_url) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        bar.abandon();
                        return Err(e);
                    }
                };
                writer.write_all(&bytes)?;
                bar.inc(1);
            }
            writer.flush()?;
        }
        bar.finish_and_clear();

        let destination = job.output_path();
        if self.remux_to_mp4 && ffmpeg_is_installed() {
            match Self::remux(temp.path(), &destination) {
                Ok(()) => return Ok(()),
                Err(e) => warn!(error = %e, "remux failed, keeping the transport stream"),
            }
        }

        temp.persist(&destination)?;
        Ok(())
    }
}
