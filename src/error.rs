use std::path::PathBuf;
use thiserror::Error;

/// Failures locating or materializing the extractor binary.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("yt-dlp was not found (no embedded copy, nothing on PATH)")]
    Missing,

    #[error("failed to materialize the embedded yt-dlp binary: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while probing a URL for title/thumbnail. The controller
/// degrades these to a neutral "no preview" placeholder.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("invalid video url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to launch yt-dlp: {0}")]
    Launch(std::io::Error),

    #[error("yt-dlp rejected the url: {0}")]
    Rejected(String),

    #[error("failed to parse yt-dlp probe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of the download pipeline. A user cancellation is NOT one of
/// these; it is reported as `DownloadOutcome::Cancelled` so it can never be
/// mistaken for a failure.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to launch yt-dlp: {0}")]
    Launch(std::io::Error),

    #[error("io error while driving the download: {0}")]
    Io(#[from] std::io::Error),

    #[error("yt-dlp failed: {0}")]
    Pipeline(String),

    #[error("download finished but no output file could be located")]
    OutputMissing,
}

/// Failures obtaining or refreshing an upload credential.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("client secrets file not found at {0}")]
    MissingClientSecrets(PathBuf),

    #[error("invalid client secrets: {0}")]
    InvalidClientSecrets(String),

    #[error("token endpoint returned status {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("interactive consent failed: {0}")]
    Consent(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the upload path, precondition violations included.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("video file does not exist or is not a regular file: {0}")]
    MissingFile(PathBuf),

    #[error("title must not be empty")]
    EmptyTitle,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upload api returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("upload initiation response carried no session uri")]
    NoSessionUri,

    #[error("final upload response carried no video id")]
    NoVideoId,

    #[error("io error reading the video file: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures loading or saving persisted settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write settings at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}
