//! Progressive (single file) HTTP downloads

use super::DownloadError::{self, DownloadFailed};
use super::ProgressiveTransport;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Streams a media file over HTTP straight into the destination path
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn progress_bar(total: Option<u64>, destination: &Path) -> ProgressBar {
        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let bar = match total {
            Some(total) if total > 0 => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
                );
                bar
            }
            _ => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {msg} {bytes} ({bytes_per_sec})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(name);
        bar
    }
}

impl ProgressiveTransport for HttpTransport {
    fn fetch(
        &self,
        uri: &str,
        referer: Option<&str>,
        destination: &Path,
    ) -> Result<u64, DownloadError> {
        let mut request = self.client.get(uri);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let mut response = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| DownloadFailed(e.to_string()))?;

        let write_failed = |e: std::io::Error| {
            DownloadFailed(format!("cannot write {}: {}", destination.display(), e))
        };

        let mut file = BufWriter::new(File::create(destination).map_err(write_failed)?);
        let bar = Self::progress_bar(response.content_length(), destination);

        let mut downloaded: u64 = 0;
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    bar.abandon();
                    return Err(DownloadFailed(e.to_string()));
                }
            };

            if let Err(e) = file.write_all(&buffer[..bytes_read]) {
                bar.abandon();
                return Err(write_failed(e));
            }
            downloaded += bytes_read as u64;
            bar.inc(bytes_read as u64);
        }

        file.flush().map_err(write_failed)?;
        bar.finish_and_clear();

        Ok(downloaded)
    }
}
