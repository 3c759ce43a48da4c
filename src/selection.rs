//! Episode and resolution selection
//!
//! Parsing is done by pure functions over the raw answer; the `select_*`
//! functions only drive the prompt loop around them.

use crate::catalog::Resolution;
use crate::prompt::{PromptRequest, Prompter};
use std::collections::BTreeSet;
use std::io;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while interpreting the user's selection
#[derive(Debug, Error)]
pub enum SelectionError {
    /// An episode range like `3-x` could not be read; the user is asked again
    #[error("Malformed episode range '{0}', expected 'start-end' or a comma separated list")]
    MalformedRange(String),

    /// None of the selected episodes has any stream information
    #[error("No valid episodes found for the selected range.")]
    NoValidEpisodes,

    /// The selected episodes expose no resolution at all
    #[error("No available resolutions found for the selected episodes.")]
    NoResolutions,

    /// Reading the user's answer failed
    #[error("Failed to read user input: {0}")]
    Input(#[from] io::Error),
}

/// The resolution picked for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionChoice {
    pub resolution: Resolution,
    /// True when the answer was not a candidate and the highest one was used
    pub fell_back: bool,
}

/// The episodes a user asked for
///
/// A range stays a range; it is only narrowed down against the catalog, so
/// an answer like `1-4294967295` costs nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeSelection {
    Range(RangeInclusive<u32>),
    List(BTreeSet<u32>),
}

impl EpisodeSelection {
    pub fn contains(&self, episode_number: u32) -> bool {
        match self {
            EpisodeSelection::Range(range) => range.contains(&episode_number),
            EpisodeSelection::List(numbers) => numbers.contains(&episode_number),
        }
    }
}

/// Parses an episode selection
///
/// - empty input selects `1..=max_episode`
/// - `start-end` selects the inclusive range
/// - anything else is a comma separated list; non-numeric tokens are dropped
///
/// Numbers are not checked against `max_episode`.
pub fn parse_episode_range(
    input: &str,
    max_episode: u32,
) -> Result<EpisodeSelection, SelectionError> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(EpisodeSelection::Range(1..=max_episode));
    }

    if let Some((start, end)) = input.split_once('-') {
        let malformed = || SelectionError::MalformedRange(input.to_string());
        let start: u32 = start.trim().parse().map_err(|_| malformed())?;
        let end: u32 = end.trim().parse().map_err(|_| malformed())?;
        return Ok(EpisodeSelection::Range(start..=end));
    }

    Ok(EpisodeSelection::List(
        input
            .split(',')
            .filter_map(|token| {
                let token = token.trim();
                if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
                    token.parse().ok()
                } else {
                    None
                }
            })
            .collect(),
    ))
}

/// Picks a resolution from the candidates
///
/// Empty input and unknown labels both select the highest candidate; the
/// latter is flagged in [`ResolutionChoice::fell_back`].
/// Returns `None` only when there are no candidates.
pub fn choose_resolution(input: &str, candidates: &BTreeSet<Resolution>) -> Option<ResolutionChoice> {
    let highest = candidates.last()?.clone();
    let input = input.trim();

    if input.is_empty() {
        return Some(ResolutionChoice {
            resolution: highest,
            fell_back: false,
        });
    }

    let requested = Resolution::from(input);
    if candidates.contains(&requested) {
        Some(ResolutionChoice {
            resolution: requested,
            fell_back: false,
        })
    } else {
        Some(ResolutionChoice {
            resolution: highest,
            fell_back: true,
        })
    }
}

/// Asks for the episodes to download until the answer can be parsed
pub fn select_episodes<P: Prompter>(
    prompter: &mut P,
    max_episode: u32,
) -> Result<EpisodeSelection, SelectionError> {
    let request = PromptRequest::EpisodeRange { max_episode };
    loop {
        let answer = prompter.ask(&request)?;
        match parse_episode_range(&answer, max_episode) {
            Ok(selection) => return Ok(selection),
            Err(e) => warn!("{}", e),
        }
    }
}

/// Asks for the download resolution
pub fn select_resolution<P: Prompter>(
    prompter: &mut P,
    candidates: &BTreeSet<Resolution>,
) -> Result<ResolutionChoice, SelectionError> {
    let request = PromptRequest::Resolution {
        candidates: candidates.iter().cloned().collect(),
    };
    let answer = prompter.ask(&request)?;
    let choice = choose_resolution(&answer, candidates).ok_or(SelectionError::NoResolutions)?;

    if choice.fell_back {
        warn!(
            requested = %answer.trim(),
            chosen = %choice.resolution,
            "resolution not available, using the highest one"
        );
    }

    Ok(choice)
}

/// Asks whether to start the downloads; only `y` confirms
pub fn confirm_download<P: Prompter>(prompter: &mut P) -> Result<bool, SelectionError> {
    let answer = prompter.ask(&PromptRequest::ConfirmDownload)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
