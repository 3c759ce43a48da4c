//! Series page URL handling

use thiserror::Error;
use url::{Url, form_urlencoded};

/// Errors that can occur while reading a series page URL
#[derive(Debug, Error)]
pub enum SeriesUrlError {
    /// The URL carries no usable `id` query parameter
    #[error(
        "Series ID not found in the URL '{0}'. Please provide a link with '?id=####' at the end."
    )]
    MissingIdentifier(String),
}

/// Extracts the series identifier from the `id` query parameter of a URL
///
/// Links without a scheme, like `kisskh.co/Drama/Moving?id=7981`, are
/// accepted as well.
pub fn resolve_series_id(url: &str) -> Result<String, SeriesUrlError> {
    let trimmed = url.trim();
    let query = match Url::parse(trimmed) {
        Ok(parsed) => parsed.query().map(str::to_string),
        Err(_) => trimmed.split_once('?').map(|(_, rest)| {
            let query = rest.split_once('#').map_or(rest, |(query, _)| query);
            query.to_string()
        }),
    };

    query
        .as_deref()
        .and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "id")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SeriesUrlError::MissingIdentifier(url.to_string()))
}
