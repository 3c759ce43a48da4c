use clap::Parser;
use humansize::{BINARY, format_size};
use kisskh_dl::{
    Config, Downloaders, HlsDownloader, HttpTransport, KissKhClient, KissKhError, ProgressEvent,
    SkipReason, TerminalPrompter, download_series, format_elapsed,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Download series from kisskh
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// KissKh series page URL, e.g. https://kisskh.co/Drama/Moving?id=7981
    url: String,

    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { .. } => {}
        ProgressEvent::FetchingMetadata { series_id } => {
            println!("Fetching series details for id {}...", series_id);
        }
        ProgressEvent::MetadataFetched { series } => {
            println!(
                "\n{} ({}) | {} | {} | {}",
                series.title, series.year, series.country, series.series_type, series.status
            );
            println!("\nFetching episode list...");
        }
        ProgressEvent::EpisodesListed { episodes } => {
            println!("\nAvailable Episodes:");
            for episode in episodes {
                println!("Episode {}: {}", episode.episode_number, episode.episode_name);
            }
        }
        ProgressEvent::FetchingLinks { count } => {
            println!("\nFetching available resolutions for {} episode(s):", count);
        }
        ProgressEvent::EpisodeSkipped {
            episode_number,
            reason,
        } => match reason {
            SkipReason::NoResolutionInfo => {
                println!(
                    "⚠️ Skipping Episode {}: No resolution info available.",
                    episode_number
                );
            }
            SkipReason::MissingResolution(resolution) => {
                println!(
                    "⚠️ Skipping Episode {}: No link for {}P",
                    episode_number, resolution
                );
            }
        },
        ProgressEvent::ResolutionChosen {
            resolution,
            fell_back,
        } => {
            if fell_back {
                println!("Resolution not available, using {}P instead.", resolution);
            }
            println!("\nReady to download the following episodes:");
        }
        ProgressEvent::Queued {
            episode_number,
            resolution,
            uri,
            size_bytes,
        } => {
            let size = if size_bytes > 0 {
                format_size(size_bytes, BINARY)
            } else {
                "unknown size".to_string()
            };
            println!(
                "Episode {} | {}P | {} | Link found [{}]",
                episode_number, resolution, size, uri
            );
        }
        ProgressEvent::Aborted => {
            println!("Aborted.");
        }
        ProgressEvent::DownloadStarted { file_name, .. } => {
            println!("\nDownloading {}...", file_name);
        }
        ProgressEvent::DownloadCompleted {
            file_name, elapsed, ..
        } => {
            println!(
                "Download completed for {} in {}!",
                file_name,
                format_elapsed(elapsed)
            );
        }
        ProgressEvent::DownloadFailed {
            episode_number,
            file_name,
            error,
        } => {
            println!(
                "❌ Episode {} ({}) failed: {}",
                episode_number, file_name, error
            );
        }
        ProgressEvent::Complete {
            succeeded,
            skipped,
            failed,
        } => {
            println!(
                "\nAll downloads complete! {} downloaded, {} skipped, {} failed.",
                succeeded, skipped, failed
            );
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "kisskh_dl=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), KissKhError> {
    let config = Config::load(args.config.as_deref())?;
    let http = config.downloader.http_client()?;

    let client = KissKhClient::new(http.clone(), &config.site);
    let transport = HttpTransport::new(http.clone());
    let hls = HlsDownloader::new(http, &config.downloader);
    let downloaders = Downloaders {
        progressive: &transport,
        segmented: &hls,
    };

    let mut prompter = TerminalPrompter::default();
    download_series(
        &args.url,
        &client,
        &mut prompter,
        &config.downloader.download_dir,
        &downloaders,
        handle_progress_event,
    )?;

    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("\n❌ {}", e);
        process::exit(1);
    }
}
