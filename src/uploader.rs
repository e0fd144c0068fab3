use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::UploadError;
use crate::model::{UploadReceipt, UploadRequest};
use crate::progress::ProgressSink;

/// Resumable-upload initiation endpoint of the hosting platform.
pub const UPLOAD_ENDPOINT: &str =
    "https://www.googleapis.com/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status";

/// Bytes per chunk; a multiple of the API's 256 KiB granule.
pub const UPLOAD_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Chunked resumable uploader for the hosting platform's video API.
///
/// The endpoint is injectable so the transfer loop can be exercised
/// against a loopback server in tests.
pub struct Uploader {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new()
    }
}

impl Uploader {
    pub fn new() -> Self {
        Self::with_endpoint(UPLOAD_ENDPOINT.to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            endpoint,
        }
    }

    /// Uploads a local file, reporting `fraction_complete x 100` through
    /// the sink after every transferred chunk.
    ///
    /// Preconditions are checked synchronously before any socket opens;
    /// a violation produces zero network activity. No retry policy beyond
    /// what the HTTP client does internally.
    pub fn upload(
        &self,
        request: &UploadRequest,
        access_token: &str,
        sink: &ProgressSink,
    ) -> Result<UploadReceipt, UploadError> {
        request.validate()?;

        let total = request.file_path.metadata()?.len();
        let mime = mime_guess::from_path(&request.file_path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let session_uri = self.initiate(request, access_token, total, &mime)?;
        log::info!(
            "resumable session opened for {} ({total} bytes)",
            request.file_path.display()
        );
        self.transfer(&session_uri, request, access_token, total, &mime, sink)
    }

    // Step 1: POST the metadata body; the session URI comes back in the
    // Location header.
    fn initiate(
        &self,
        request: &UploadRequest,
        access_token: &str,
        total: u64,
        mime: &str,
    ) -> Result<String, UploadError> {
        let metadata = serde_json::json!({
            "snippet": {
                "title": request.title.trim(),
                "description": request.description,
                "tags": request.tags,
                "categoryId": request.category_id,
            },
            "status": {
                "privacyStatus": request.visibility.as_str(),
            },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .header("X-Upload-Content-Type", mime)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Api {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(UploadError::NoSessionUri)
    }

    // Step 2: PUT the bytes chunk by chunk until the API answers with the
    // final resource instead of 308.
    fn transfer(
        &self,
        session_uri: &str,
        request: &UploadRequest,
        access_token: &str,
        total: u64,
        mime: &str,
        sink: &ProgressSink,
    ) -> Result<UploadReceipt, UploadError> {
        let mut file = File::open(&request.file_path)?;
        let mut offset: u64 = 0;

        loop {
            let chunk_len = ((total - offset) as usize).min(UPLOAD_CHUNK_BYTES);
            let mut chunk = vec![0_u8; chunk_len];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut chunk)?;

            let content_range = if total == 0 {
                "bytes */0".to_string()
            } else {
                format!(
                    "bytes {}-{}/{}",
                    offset,
                    offset + chunk_len as u64 - 1,
                    total
                )
            };

            let response = self
                .client
                .put(session_uri)
                .bearer_auth(access_token)
                .header("Content-Type", mime)
                .header("Content-Range", content_range)
                .body(chunk)
                .send()?;

            let status = response.status();
            if status.as_u16() == 308 {
                // Resume where the server says it stands, not where we
                // think we are.
                let acknowledged = response
                    .headers()
                    .get("Range")
                    .and_then(|value| value.to_str().ok())
                    .and_then(next_offset_from_range)
                    .unwrap_or(offset + chunk_len as u64);
                if acknowledged <= offset {
                    return Err(UploadError::Api {
                        status: 308,
                        body: "server did not advance the upload offset".to_string(),
                    });
                }
                offset = acknowledged;
                sink.emit((offset as f64 / total.max(1) as f64 * 100.0) as f32);
                continue;
            }

            if status.is_success() {
                sink.emit(100.0);
                let body: serde_json::Value = response.json()?;
                let video_id = body
                    .get("id")
                    .and_then(|value| value.as_str())
                    .ok_or(UploadError::NoVideoId)?
                    .to_string();
                log::info!("upload finished: {video_id}");
                return Ok(UploadReceipt { video_id });
            }

            return Err(UploadError::Api {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
    }
}

// "bytes=0-8388607" -> 8388608, the next byte the server wants.
fn next_offset_from_range(header: &str) -> Option<u64> {
    let (_, end) = header.trim().strip_prefix("bytes=")?.split_once('-')?;
    end.trim().parse::<u64>().ok().map(|last| last + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_acknowledgments_advance_the_offset() {
        assert_eq!(next_offset_from_range("bytes=0-8388607"), Some(8388608));
        assert_eq!(next_offset_from_range("bytes=0-0"), Some(1));
        assert_eq!(next_offset_from_range("garbage"), None);
        assert_eq!(next_offset_from_range("bytes=0-"), None);
    }
}
