use crate::catalog::{Resolution, SeriesRef};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sanitizes a title for use in file and directory names
///
/// Keeps alphanumeric characters, spaces, hyphens and underscores; everything
/// else is dropped. Trailing whitespace is trimmed. Applying it twice gives
/// the same result as applying it once.
pub fn sanitize_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();

    sanitized.trim_end().to_string()
}

/// Formats the output file name of an episode
///
/// `"<title> Episode <NN> - <resolution>P.mp4"` with the episode number
/// zero-padded to two digits.
///
/// # Examples
///
/// ```
/// use kisskh_dl::{Resolution, episode_file_name};
///
/// let name = episode_file_name("Moving: Part 1", 3, &Resolution::from("720"));
/// assert_eq!(name, "Moving Part 1 Episode 03 - 720P.mp4");
/// ```
pub fn episode_file_name(title: &str, episode_number: u32, resolution: &Resolution) -> String {
    format!(
        "{} Episode {:02} - {}P.mp4",
        sanitize_title(title),
        episode_number,
        resolution
    )
}

/// Name of the directory a series is downloaded into: `"<title> (<year>)"`
pub fn series_directory_name(series: &SeriesRef) -> String {
    format!("{} ({})", sanitize_title(&series.title), series.year)
}

/// Creates the output directory of a series below `download_root`
pub fn prepare_output_dir(download_root: &Path, series: &SeriesRef) -> io::Result<PathBuf> {
    let output_dir = download_root.join(series_directory_name(series));
    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}
