use eframe::egui;
use tokio::sync::mpsc::UnboundedSender;

/// Tag prefix for structured progress lines requested from the extractor
/// via `--progress-template`.
pub const PROGRESS_TAG: &str = "PROGRESS|";
/// Tag prefix for the `after_move` filepath print.
pub const OUTPUT_TAG: &str = "OUTPUT|";

/// Extractor progress as observed at the subprocess boundary, decoded from
/// the dynamic template fields into a closed set of shapes before any
/// percentage math happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPayload {
    Downloading {
        downloaded_bytes: u64,
        /// `None` when neither a total nor an estimate was reported.
        total_bytes: Option<u64>,
    },
    Finished,
}

impl ProgressPayload {
    /// Converts a payload into the percentage contract: `None` when the
    /// total is unknown (no update is emitted for that phase), a clamped
    /// value in `[0, 100]` otherwise, and exactly `100` for `Finished`.
    pub fn percentage(&self) -> Option<f32> {
        match *self {
            ProgressPayload::Downloading {
                downloaded_bytes,
                total_bytes: Some(total),
            } if total > 0 => {
                let pct = downloaded_bytes as f64 / total as f64 * 100.0;
                Some(pct.clamp(0.0, 100.0) as f32)
            }
            ProgressPayload::Downloading { .. } => None,
            ProgressPayload::Finished => Some(100.0),
        }
    }
}

/// Parses one stdout line of the extractor into a progress payload.
///
/// Lines look like `PROGRESS|<downloaded>|<total>|<estimate>`, where any
/// field the extractor does not know yet renders as `NA`. The estimate is
/// only consulted when the exact total is missing.
pub fn parse_progress_line(line: &str) -> Option<ProgressPayload> {
    let rest = line.trim().strip_prefix(PROGRESS_TAG)?;
    let mut fields = rest.split('|');
    let downloaded_bytes = parse_byte_field(fields.next()?)?;
    let total = fields.next().and_then(parse_byte_field);
    let estimate = fields.next().and_then(parse_byte_field);
    Some(ProgressPayload::Downloading {
        downloaded_bytes,
        total_bytes: total.or(estimate),
    })
}

/// Parses an `after_move` filepath print, returning the reported path.
pub fn parse_output_line(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(OUTPUT_TAG)?;
    let trimmed = rest.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

// The extractor reports estimates as floats; accept both shapes.
fn parse_byte_field(token: &str) -> Option<u64> {
    let value: f64 = token.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// One half of the progress bridge: the worker-side handle.
///
/// `emit` hands a percentage to the interactive side without ever blocking
/// the worker. If the receiving side has been torn down the value is
/// dropped silently; delivery is fire-and-forget by contract.
#[derive(Clone)]
pub struct ProgressSink {
    tx: UnboundedSender<f32>,
    repaint: Option<egui::Context>,
}

impl ProgressSink {
    pub fn new(tx: UnboundedSender<f32>) -> Self {
        Self { tx, repaint: None }
    }

    /// Attaches a UI context so each delivery also requests a repaint.
    pub fn with_repaint(tx: UnboundedSender<f32>, ctx: egui::Context) -> Self {
        Self {
            tx,
            repaint: Some(ctx),
        }
    }

    pub fn emit(&self, percent: f32) {
        if self.tx.send(percent).is_err() {
            // Receiver is gone; nothing to deliver to and nothing to repaint.
            return;
        }
        if let Some(ctx) = &self.repaint {
            ctx.request_repaint();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn parses_known_total() {
        let payload = parse_progress_line("PROGRESS|2500|10000|NA").unwrap();
        assert_eq!(
            payload,
            ProgressPayload::Downloading {
                downloaded_bytes: 2500,
                total_bytes: Some(10000),
            }
        );
        assert_eq!(payload.percentage(), Some(25.0));
    }

    #[test]
    fn falls_back_to_estimate() {
        let payload = parse_progress_line("PROGRESS|512|NA|2048.0").unwrap();
        assert_eq!(
            payload,
            ProgressPayload::Downloading {
                downloaded_bytes: 512,
                total_bytes: Some(2048),
            }
        );
        assert_eq!(payload.percentage(), Some(25.0));
    }

    #[test]
    fn unknown_total_yields_no_percentage() {
        let payload = parse_progress_line("PROGRESS|512|NA|NA").unwrap();
        assert_eq!(payload.percentage(), None);
    }

    #[test]
    fn finished_is_exactly_one_hundred() {
        assert_eq!(ProgressPayload::Finished.percentage(), Some(100.0));
    }

    #[test]
    fn over_shot_totals_are_clamped() {
        let payload = ProgressPayload::Downloading {
            downloaded_bytes: 300,
            total_bytes: Some(200),
        };
        assert_eq!(payload.percentage(), Some(100.0));
    }

    #[test]
    fn non_progress_lines_are_ignored() {
        assert_eq!(parse_progress_line("[download] 12% of ~3MiB"), None);
        assert_eq!(parse_progress_line("PROGRESS|NA|NA|NA"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn output_lines_round_trip() {
        assert_eq!(
            parse_output_line("OUTPUT|/tmp/out/video.webm"),
            Some("/tmp/out/video.webm")
        );
        assert_eq!(parse_output_line("OUTPUT|  "), None);
        assert_eq!(parse_output_line("something else"), None);
    }

    #[test]
    fn sink_is_a_no_op_after_teardown() {
        let (tx, rx) = unbounded_channel();
        let sink = ProgressSink::new(tx);
        drop(rx);
        // Must not panic or error into the worker.
        sink.emit(42.0);
    }

    #[test]
    fn sink_delivers_in_order() {
        let (tx, mut rx) = unbounded_channel();
        let sink = ProgressSink::new(tx);
        sink.emit(10.0);
        sink.emit(55.5);
        sink.emit(100.0);
        assert_eq!(rx.try_recv().unwrap(), 10.0);
        assert_eq!(rx.try_recv().unwrap(), 55.5);
        assert_eq!(rx.try_recv().unwrap(), 100.0);
    }
}
