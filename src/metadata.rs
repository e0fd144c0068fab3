use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use url::Url;

use crate::error::MetadataError;
use crate::model::VideoMetadata;

// Only the fields the preview needs; the probe payload carries dozens more.
#[derive(Debug, Deserialize)]
struct ProbePayload {
    title: Option<String>,
    thumbnail: Option<String>,
}

/// Checks that a pasted link is something the extractor could plausibly
/// handle before any process is spawned for it.
pub fn validate_source_url(raw: &str) -> Result<Url, MetadataError> {
    let trimmed = raw.trim();
    let parsed =
        Url::parse(trimmed).map_err(|_| MetadataError::InvalidUrl(trimmed.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(MetadataError::InvalidUrl(trimmed.to_string()));
    }
    Ok(parsed)
}

/// Fetches title and thumbnail URL for a link without downloading media.
///
/// Blocking; the controller runs it on the worker pool and debounces
/// keystrokes before calling. Safe to invoke repeatedly for the same URL.
pub fn fetch_metadata(bin: &Path, url: &str) -> Result<VideoMetadata, MetadataError> {
    let source = validate_source_url(url)?;

    let output = Command::new(bin)
        .arg("-J")
        .arg("--skip-download")
        .arg("--no-playlist")
        .arg("--no-warnings")
        .arg(source.as_str())
        .output()
        .map_err(MetadataError::Launch)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
            .unwrap_or("yt-dlp failed")
            .to_string();
        return Err(MetadataError::Rejected(detail));
    }

    parse_probe_payload(&output.stdout)
}

fn parse_probe_payload(bytes: &[u8]) -> Result<VideoMetadata, MetadataError> {
    let payload: ProbePayload = serde_json::from_slice(bytes)?;
    Ok(VideoMetadata {
        title: payload
            .title
            .unwrap_or_else(|| "Untitled video".to_string()),
        thumbnail_url: payload.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_https_links() {
        let url = validate_source_url("  https://example.com/watch?v=ABC  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/watch?v=ABC");
    }

    #[test]
    fn rejects_non_http_schemes_and_garbage() {
        assert!(matches!(
            validate_source_url("ftp://example.com/video"),
            Err(MetadataError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_source_url("definitely not a url"),
            Err(MetadataError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_source_url(""),
            Err(MetadataError::InvalidUrl(_))
        ));
    }

    #[test]
    fn parses_title_and_thumbnail() {
        let meta = parse_probe_payload(
            br#"{"title":"My clip","thumbnail":"https://i.example/hq.jpg","duration":12}"#,
        )
        .unwrap();
        assert_eq!(meta.title, "My clip");
        assert_eq!(
            meta.thumbnail_url.as_deref(),
            Some("https://i.example/hq.jpg")
        );
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let meta = parse_probe_payload(br#"{"id":"abc"}"#).unwrap();
        assert_eq!(meta.title, "Untitled video");
        assert!(meta.thumbnail_url.is_none());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_probe_payload(b"WARNING: not json"),
            Err(MetadataError::Parse(_))
        ));
    }
}
