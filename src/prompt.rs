//! Interactive prompt seam
//!
//! The pipeline never reads the terminal directly. It hands a [`PromptRequest`]
//! to a [`Prompter`] and gets the raw answer back, which keeps every parsing
//! decision in pure functions.

use crate::catalog::Resolution;
use dialoguer::Input;
use dialoguer::theme::ColorfulTheme;
use std::io;

/// A question the pipeline needs answered
#[derive(Debug, Clone, PartialEq)]
pub enum PromptRequest {
    /// Which episodes to download, out of `1..=max_episode`
    EpisodeRange { max_episode: u32 },
    /// Which resolution to download; candidates are sorted ascending
    Resolution { candidates: Vec<Resolution> },
    /// Whether to start downloading the listed episodes
    ConfirmDownload,
}

impl PromptRequest {
    /// The text shown to the user
    pub fn message(&self) -> String {
        match self {
            PromptRequest::EpisodeRange { max_episode } => format!(
                "Enter episodes to download (ex: 1-5) [default=1-{}]",
                max_episode
            ),
            PromptRequest::Resolution { candidates } => {
                let labels: Vec<&str> = candidates.iter().map(Resolution::as_str).collect();
                format!(
                    "Enter download resolution {:?} [default={}]",
                    labels,
                    labels.last().copied().unwrap_or_default()
                )
            }
            PromptRequest::ConfirmDownload => "Proceed to download (y|n)?".to_string(),
        }
    }
}

/// Answers prompt requests with the user's raw input
pub trait Prompter {
    /// Returns the raw answer, empty when the user just pressed enter
    fn ask(&mut self, request: &PromptRequest) -> io::Result<String>;
}

/// Prompter reading answers from the terminal
#[derive(Default)]
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, request: &PromptRequest) -> io::Result<String> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(request.message())
            .allow_empty(true)
            .interact_text()
            .map(|answer| answer.trim().to_string())
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_messages() {
        assert_eq!(
            PromptRequest::EpisodeRange { max_episode: 16 }.message(),
            "Enter episodes to download (ex: 1-5) [default=1-16]"
        );

        let request = PromptRequest::Resolution {
            candidates: vec![Resolution::from("480"), Resolution::from("1080")],
        };
        assert_eq!(
            request.message(),
            r#"Enter download resolution ["480", "1080"] [default=1080]"#
        );
    }
}
