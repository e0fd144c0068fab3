//! Orchestration library for the tubeporter desktop app: metadata probing,
//! yt-dlp driven downloads with progress and cooperative cancellation, and
//! OAuth-authenticated resumable uploads. The egui shell lives in the
//! binary; everything here is headless and testable.

pub mod auth;
pub mod cancel;
pub mod config;
pub mod downloader;
mod error;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod progress;
pub mod thumbnail;
pub mod tool;
pub mod uploader;

pub use error::{
    AuthError, ConfigError, DownloadError, MetadataError, ToolError, UploadError,
};
