use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use crate::error::DownloadError;
use crate::model::{DownloadOutcome, DownloadRequest};
use crate::progress::{self, ProgressSink};

/// Canonical container every finished download is normalized to,
/// regardless of what format negotiation produced.
pub const CANONICAL_EXTENSION: &str = "mp4";

/// Generic selector used for the single retry after the requested format
/// expression was rejected by the extractor.
pub const FALLBACK_FORMAT_SELECTOR: &str = "best";

// The extractor prints this when a format expression is unsatisfiable.
const FORMAT_REJECTED_MARKER: &str = "Requested format is not available";

// How many trailing stderr lines are kept for error messages.
const STDERR_TAIL_LINES: usize = 8;

enum PipelineEnd {
    Completed(PathBuf),
    Cancelled,
    FormatRejected(String),
}

/// Drives the extractor to completion for one request.
///
/// Progress percentages flow through `sink`, monotonically non-decreasing,
/// with a final `100` always emitted on success. The cancel flag inside the
/// request is consulted once per extractor output line; observing it kills
/// the pipeline and yields [`DownloadOutcome::Cancelled`]. A rejected
/// format selector is retried exactly once with
/// [`FALLBACK_FORMAT_SELECTOR`] before failing.
pub async fn download(
    bin: &Path,
    request: &DownloadRequest,
    sink: &ProgressSink,
) -> Result<DownloadOutcome, DownloadError> {
    // A cancel that arrives before the first checkpoint must win without
    // the extractor ever being spawned (and without a fallback retry).
    if request.cancel.is_requested() {
        return Ok(DownloadOutcome::Cancelled);
    }

    std::fs::create_dir_all(&request.output_dir)?;
    log::info!(
        "downloading {} -> {}",
        request.url,
        request.output_dir.display()
    );

    let mut last_percent = 0.0_f32;
    match run_pipeline(bin, request, &request.format_selector, sink, &mut last_percent).await? {
        PipelineEnd::Completed(path) => finish(path, sink),
        PipelineEnd::Cancelled => Ok(DownloadOutcome::Cancelled),
        PipelineEnd::FormatRejected(detail) => {
            log::warn!(
                "format selector {:?} rejected ({detail}); retrying once with {:?}",
                request.format_selector,
                FALLBACK_FORMAT_SELECTOR
            );
            match run_pipeline(bin, request, FALLBACK_FORMAT_SELECTOR, sink, &mut last_percent)
                .await?
            {
                PipelineEnd::Completed(path) => finish(path, sink),
                PipelineEnd::Cancelled => Ok(DownloadOutcome::Cancelled),
                PipelineEnd::FormatRejected(second) => Err(DownloadError::Pipeline(second)),
            }
        }
    }
}

fn finish(reported: PathBuf, sink: &ProgressSink) -> Result<DownloadOutcome, DownloadError> {
    let final_path = normalize_container(&reported)?;
    // Finished: report completion even when byte counts never arrived.
    sink.emit(100.0);
    log::info!("download finished: {}", final_path.display());
    Ok(DownloadOutcome::Completed(final_path))
}

async fn run_pipeline(
    bin: &Path,
    request: &DownloadRequest,
    selector: &str,
    sink: &ProgressSink,
    last_percent: &mut f32,
) -> Result<PipelineEnd, DownloadError> {
    let template = request
        .output_dir
        .join("%(title).120B [%(id)s].%(ext)s");

    let mut child = Command::new(bin)
        .arg("--no-playlist")
        .arg("--newline")
        .arg("--no-warnings")
        .arg("--progress")
        .arg("--progress-template")
        .arg(format!(
            "download:{}%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s",
            progress::PROGRESS_TAG
        ))
        .arg("--print")
        .arg(format!("after_move:{}%(filepath)s", progress::OUTPUT_TAG))
        .arg("-f")
        .arg(selector)
        .arg("--merge-output-format")
        .arg(CANONICAL_EXTENSION)
        .arg("--restrict-filenames")
        .arg("-o")
        .arg(&template)
        .arg(&request.url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(DownloadError::Launch)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Launch(io::Error::other("failed to capture stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Launch(io::Error::other("failed to capture stderr")))?;

    // stderr drains on its own task; only a short tail is kept.
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: Vec<String> = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if tail.len() >= STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(trimmed.to_string());
        }
        tail
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut output_candidates: Vec<PathBuf> = Vec::new();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                abort_child(&mut child).await;
                stderr_task.abort();
                return Err(DownloadError::Io(err));
            }
        };

        // Checkpoint: the flag is consulted before any further work on
        // this callback.
        if request.cancel.is_requested() {
            abort_child(&mut child).await;
            stderr_task.abort();
            return Ok(PipelineEnd::Cancelled);
        }

        if let Some(path) = progress::parse_output_line(&line) {
            output_candidates.push(PathBuf::from(path));
            continue;
        }

        if let Some(percent) = progress::parse_progress_line(&line).and_then(|p| p.percentage()) {
            // The bridge does no reordering; out-of-order values stop here.
            if percent >= *last_percent {
                *last_percent = percent;
                sink.emit(percent);
            }
        }
    }

    let status = child.wait().await?;
    let tail = stderr_task.await.unwrap_or_default();

    // Final checkpoint: a cancel that raced process exit still wins, and in
    // particular must suppress the fallback retry.
    if request.cancel.is_requested() {
        return Ok(PipelineEnd::Cancelled);
    }

    if status.success() {
        let path = output_candidates
            .into_iter()
            .rev()
            .find(|candidate| candidate.is_file())
            .ok_or(DownloadError::OutputMissing)?;
        return Ok(PipelineEnd::Completed(path));
    }

    let detail = tail
        .last()
        .cloned()
        .unwrap_or_else(|| format!("yt-dlp exited with status {status}"));
    if tail
        .iter()
        .any(|line| line.contains(FORMAT_REJECTED_MARKER))
    {
        Ok(PipelineEnd::FormatRejected(detail))
    } else {
        Err(DownloadError::Pipeline(detail))
    }
}

async fn abort_child(child: &mut Child) {
    if let Err(err) = child.kill().await {
        log::warn!("failed to kill extractor process: {err}");
    }
}

/// Bounds a title-derived stem and strips characters that are unsafe on
/// common filesystems. Falls back to "video" when nothing survives.
pub fn sanitize_file_stem(value: &str) -> String {
    let trimmed = value.trim();
    let mut normalized = String::with_capacity(trimmed.len().min(96));
    for ch in trimmed.chars().take(96) {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            normalized.push(ch);
        } else if ch.is_whitespace() {
            normalized.push('-');
        }
    }
    while normalized.contains("--") {
        normalized = normalized.replace("--", "-");
    }
    let normalized = normalized.trim_matches(['-', '.']).to_string();
    if normalized.is_empty() {
        "video".to_string()
    } else {
        normalized
    }
}

/// Renames the reported file so its stem is sanitized and its extension is
/// the canonical container, leaving it alone when it already complies.
fn normalize_container(reported: &Path) -> Result<PathBuf, DownloadError> {
    let dir = reported.parent().unwrap_or(Path::new("")).to_path_buf();
    let raw_stem = reported
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("video");
    let stem = sanitize_file_stem(raw_stem);

    let desired = dir.join(format!("{stem}.{CANONICAL_EXTENSION}"));
    if desired == reported {
        return Ok(desired);
    }

    let target = unique_target(&dir, &stem);
    std::fs::rename(reported, &target)?;
    Ok(target)
}

// First free "<stem>.mp4", "<stem>-2.mp4", ... in `dir`.
fn unique_target(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.{CANONICAL_EXTENSION}"));
    if !first.exists() {
        return first;
    }
    for n in 2..100 {
        let candidate = dir.join(format!("{stem}-{n}.{CANONICAL_EXTENSION}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    first
}
