//! Link resolution and validation
//!
//! Resolves the stream descriptors of the selected episodes and filters out
//! the ones that cannot be downloaded at all.

use crate::catalog::{
    CatalogError, EpisodeLinkMap, EpisodeLinks, EpisodeRange, EpisodeSummary, Resolution,
    ResolutionMap, SiteClient,
};
use crate::selection::{EpisodeSelection, SelectionError};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Selected episodes that have at least one downloadable resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLinks {
    /// Descriptors per episode, in ascending episode order
    pub episodes: BTreeMap<u32, ResolutionMap>,
    /// Union of the resolutions of all retained episodes
    pub available_resolutions: BTreeSet<Resolution>,
    /// Selected episodes that were dropped for lack of stream information
    pub skipped: Vec<u32>,
}

impl ValidatedLinks {
    /// Fails when nothing downloadable is left
    ///
    /// Kept apart from [`filter_valid`] so the skipped episodes can be
    /// reported before the run aborts.
    pub fn ensure_downloadable(&self) -> Result<(), SelectionError> {
        if self.episodes.is_empty() {
            return Err(SelectionError::NoValidEpisodes);
        }
        if self.available_resolutions.is_empty() {
            return Err(SelectionError::NoResolutions);
        }
        Ok(())
    }
}

/// Narrows a selection down to the episode numbers the catalog lists
pub fn selected_in_catalog(
    episodes: &[EpisodeSummary],
    selection: &EpisodeSelection,
) -> BTreeSet<u32> {
    episodes
        .iter()
        .map(|e| e.episode_number)
        .filter(|n| selection.contains(*n))
        .collect()
}

/// Resolves the link map of the selected episodes
///
/// Only episodes present in the catalog are requested. Returns an empty map
/// when none of the selected numbers exists.
pub fn resolve_links<C: SiteClient>(
    client: &C,
    episodes: &[EpisodeSummary],
    selected: &BTreeSet<u32>,
) -> Result<EpisodeLinkMap, CatalogError> {
    let present: BTreeSet<u32> = episodes
        .iter()
        .map(|e| e.episode_number)
        .filter(|n| selected.contains(n))
        .collect();

    let Some(range) = EpisodeRange::covering(&present) else {
        return Ok(EpisodeLinkMap::new());
    };

    let links = client.resolve_links(episodes, &range)?;
    debug!(keys = ?links.keys().collect::<Vec<_>>(), ?selected, "resolved episode links");
    Ok(links)
}

/// Keeps the selected episodes that have a non-empty resolution map
///
/// `selected` should only hold numbers the catalog knows (see
/// [`selected_in_catalog`]); every one of them without usable links is
/// reported in [`ValidatedLinks::skipped`]. Call
/// [`ValidatedLinks::ensure_downloadable`] on the result.
pub fn filter_valid(link_map: &EpisodeLinkMap, selected: &BTreeSet<u32>) -> ValidatedLinks {
    let mut episodes = BTreeMap::new();
    let mut skipped = Vec::new();

    for &episode_number in selected {
        match link_map.get(&episode_number) {
            Some(EpisodeLinks::Available(resolutions)) if !resolutions.is_empty() => {
                episodes.insert(episode_number, resolutions.clone());
            }
            _ => skipped.push(episode_number),
        }
    }

    let available_resolutions = episodes
        .values()
        .flat_map(|resolutions| resolutions.keys().cloned())
        .collect();

    ValidatedLinks {
        episodes,
        available_resolutions,
        skipped,
    }
}
