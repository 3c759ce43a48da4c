/// KissKh API response types for deserialization.
///
/// These structures mirror the JSON response format of the KissKh drama API.
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The response of the `DramaList/Drama/{id}` endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct KissKhDrama {
    /// The title of the series
    pub title: String,
    /// Release date, e.g. `2023-04-01T00:00:00`
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, rename = "type")]
    pub series_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Episode list, usually in descending order
    #[serde(default)]
    pub episodes: Vec<KissKhEpisode>,
}

/// A single episode entry of a drama response.
#[derive(Debug, Deserialize)]
pub(super) struct KissKhEpisode {
    /// Site-internal episode id
    pub id: Value,
    /// Episode number; sent as `1`, `1.0` or `"1"` depending on the title.
    /// `None` when the number is not a whole number (specials like `10.5`).
    #[serde(default, deserialize_with = "episode_number")]
    pub number: Option<u32>,
}

/// The response of the `DramaList/Episode/{id}.png` endpoint.
#[derive(Debug, Deserialize)]
pub(super) struct KissKhStream {
    /// Stream URL, either an `.m3u8` playlist or a media file
    #[serde(rename = "Video", default)]
    pub video: Option<String>,
}

/// Canonicalizes a JSON episode number into an integer.
pub(super) fn canonical_episode_number(value: &Value) -> Option<u32> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if number.fract() != 0.0 || number < 0.0 || number > u32::MAX as f64 {
        return None;
    }
    Some(number as u32)
}

fn episode_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(canonical_episode_number(&value))
}

/// Renders a JSON id as the string used in request paths.
pub(super) fn id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_episode_number() {
        assert_eq!(canonical_episode_number(&json!(3)), Some(3));
        assert_eq!(canonical_episode_number(&json!(3.0)), Some(3));
        assert_eq!(canonical_episode_number(&json!("12")), Some(12));
        assert_eq!(canonical_episode_number(&json!(10.5)), None);
        assert_eq!(canonical_episode_number(&json!("special")), None);
        assert_eq!(canonical_episode_number(&json!(null)), None);
    }

    #[test]
    fn test_drama_deserialization() {
        let drama: KissKhDrama = serde_json::from_value(json!({
            "title": "Moving",
            "releaseDate": "2023-08-09T00:00:00",
            "type": "TVSeries",
            "episodes": [
                {"id": 120455, "number": 2.0, "sub": 1},
                {"id": "120454", "number": "1"}
            ]
        }))
        .unwrap();

        assert_eq!(drama.title, "Moving");
        assert_eq!(drama.series_type.as_deref(), Some("TVSeries"));
        assert!(drama.country.is_none());
        assert_eq!(drama.episodes[0].number, Some(2));
        assert_eq!(id_to_string(&drama.episodes[0].id), "120455");
        assert_eq!(id_to_string(&drama.episodes[1].id), "120454");
    }
}
