use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelFlag;
use crate::error::UploadError;

/// How long a finished operation keeps showing its terminal state before
/// the controls revert to idle.
pub const TERMINAL_DISPLAY_DELAY: Duration = Duration::from_secs(2);

/// Lifecycle of one long-running operation as the controller sees it.
///
/// Idle -> Running -> {Completed | Cancelled | Failed} -> (after
/// [`TERMINAL_DISPLAY_DELAY`]) -> Idle. Triggers are only accepted from
/// Idle; a cancel request is only accepted while Running.
#[derive(Debug, Clone)]
pub enum OperationState {
    Idle,
    Running,
    Completed { summary: String, since: Instant },
    Cancelled { since: Instant },
    Failed { message: String, since: Instant },
}

impl OperationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, OperationState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, OperationState::Running)
    }

    /// When the state entered a terminal phase, if it did.
    pub fn terminal_since(&self) -> Option<Instant> {
        match self {
            OperationState::Completed { since, .. }
            | OperationState::Cancelled { since }
            | OperationState::Failed { since, .. } => Some(*since),
            _ => None,
        }
    }

    /// Reverts a terminal state to Idle once its display delay elapsed.
    pub fn tick(&mut self, now: Instant) {
        if let Some(since) = self.terminal_since() {
            if now.duration_since(since) >= TERMINAL_DISPLAY_DELAY {
                *self = OperationState::Idle;
            }
        }
    }
}

/// One user-initiated download. Immutable once submitted; the embedded
/// cancel flag is the only channel through which the controller can still
/// influence the run.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format_selector: String,
    pub output_dir: PathBuf,
    pub cancel: CancelFlag,
}

/// Terminal result of a download. Cancellation is a first-class outcome,
/// deliberately not an error, so callers can never confuse a user cancel
/// with a pipeline failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Final file path, normalized to the canonical container extension.
    Completed(PathBuf),
    Cancelled,
}

/// Visibility of an uploaded video on the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub const ALL: [Visibility; 3] =
        [Visibility::Public, Visibility::Unlisted, Visibility::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

/// One user-initiated upload, validated before any network activity.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub visibility: Visibility,
}

impl UploadRequest {
    /// Synchronous precondition check; must pass before a single byte goes
    /// on the wire. Zero side effects on failure.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.title.trim().is_empty() {
            return Err(UploadError::EmptyTitle);
        }
        let is_file = self
            .file_path
            .metadata()
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(UploadError::MissingFile(self.file_path.clone()));
        }
        Ok(())
    }
}

/// Identifier of a successfully created remote video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub video_id: String,
}

impl UploadReceipt {
    /// Shareable URL for the uploaded video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

/// Title and preview image location for a probed URL. Fetched on demand,
/// never persisted.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail_url: Option<String>,
}

/// UI quality labels and the extractor format expressions they stand for.
pub const QUALITY_PRESETS: [(&str, &str); 5] = [
    (
        "1080p",
        "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
    ),
    ("720p", "bestvideo[height<=720]+bestaudio/best[height<=720]"),
    ("480p", "bestvideo[height<=480]+bestaudio/best[height<=480]"),
    ("360p", "bestvideo[height<=360]+bestaudio/best[height<=360]"),
    ("Audio Only", "bestaudio"),
];

/// Looks up the format selector for a quality label, defaulting to the
/// generic best-available expression for unknown labels.
pub fn selector_for_quality(label: &str) -> &'static str {
    QUALITY_PRESETS
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, selector)| *selector)
        .unwrap_or("best")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_revert_after_delay() {
        let start = Instant::now();
        let mut state = OperationState::Cancelled { since: start };
        state.tick(start + Duration::from_millis(300));
        assert!(matches!(state, OperationState::Cancelled { .. }));
        state.tick(start + TERMINAL_DISPLAY_DELAY);
        assert!(state.is_idle());
    }

    #[test]
    fn running_never_reverts_on_its_own() {
        let mut state = OperationState::Running;
        state.tick(Instant::now() + Duration::from_secs(60));
        assert!(state.is_running());
    }

    #[test]
    fn quality_lookup_covers_presets_and_strangers() {
        assert_eq!(selector_for_quality("Audio Only"), "bestaudio");
        assert!(selector_for_quality("1080p").contains("height<=1080"));
        assert_eq!(selector_for_quality("8K HDR"), "best");
    }

    #[test]
    fn watch_url_embeds_the_id() {
        let receipt = UploadReceipt {
            video_id: "dQw4w9WgXcQ".to_string(),
        };
        assert_eq!(
            receipt.watch_url(),
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        );
    }
}
