//! Main application for the tubeporter downloader & uploader GUI

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::{App, Frame, egui};
use egui::{TextureOptions, Visuals};
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use tubeporter::auth::{self, Authenticator};
use tubeporter::cancel::CancelFlag;
use tubeporter::config::{self, AppSettings};
use tubeporter::model::{
    DownloadOutcome, DownloadRequest, OperationState, QUALITY_PRESETS, UploadReceipt,
    UploadRequest, VideoMetadata, Visibility, selector_for_quality,
};
use tubeporter::paths::AppPaths;
use tubeporter::progress::ProgressSink;
use tubeporter::uploader::Uploader;
use tubeporter::{DownloadError, MetadataError, UploadError};
use tubeporter::{downloader, metadata, thumbnail, tool};

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Quiet time after the last keystroke before the URL is probed.
const METADATA_DEBOUNCE: Duration = Duration::from_millis(600);

/// Program entry point: initializes logging and the runtime, launches GUI
fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let rt = Arc::new(Runtime::new().unwrap());
    RUNTIME.set(rt).unwrap();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 760.0]),
        ..Default::default()
    };
    eframe::run_native(
        "tubeporter",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(PorterApp::new())
        }),
    )
}

fn runtime() -> &'static Arc<Runtime> {
    RUNTIME.get().expect("runtime initialized in main")
}

/// Outcome of one preview probe, tagged with the URL it belongs to so
/// stale answers can be discarded.
struct PreviewMessage {
    url: String,
    result: Result<(VideoMetadata, Option<egui::ColorImage>), MetadataError>,
}

enum PreviewState {
    Empty,
    Loading,
    Ready {
        title: String,
        texture: Option<egui::TextureHandle>,
    },
    Unavailable,
}

/// Application state: the interactive controller for both pipelines.
struct PorterApp {
    paths: AppPaths,
    settings: AppSettings,

    // Download pane
    url_input: String,
    download_folder: String,
    selected_quality: String,
    download_state: OperationState,
    download_percent: Option<f32>,
    download_progress_rx: Option<UnboundedReceiver<f32>>,
    download_result_rx: Option<UnboundedReceiver<Result<DownloadOutcome, DownloadError>>>,
    cancel_flag: CancelFlag,
    cancel_used: bool,
    last_download_path: Option<PathBuf>,

    // URL preview
    url_edited_at: Option<Instant>,
    preview_for_url: Option<String>,
    preview: PreviewState,
    preview_tx: UnboundedSender<PreviewMessage>,
    preview_rx: UnboundedReceiver<PreviewMessage>,

    // Upload pane
    upload_file: Option<PathBuf>,
    upload_title: String,
    upload_description: String,
    upload_tags: String,
    upload_visibility: Visibility,
    upload_state: OperationState,
    upload_percent: Option<f32>,
    upload_progress_rx: Option<UnboundedReceiver<f32>>,
    upload_result_rx: Option<UnboundedReceiver<Result<UploadReceipt, UploadError>>>,
    last_upload_url: Option<String>,
}

impl PorterApp {
    fn new() -> Self {
        let paths = AppPaths::from_env();
        let settings = match config::load_settings(&paths) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("could not load settings, using defaults: {err}");
                AppSettings::default()
            }
        };

        let upload_visibility = Visibility::ALL
            .into_iter()
            .find(|v| v.as_str() == settings.upload_visibility)
            .unwrap_or(Visibility::Private);

        let (preview_tx, preview_rx) = unbounded_channel();

        Self {
            url_input: String::new(),
            download_folder: settings.download_dir.clone(),
            selected_quality: settings.quality.clone(),
            download_state: OperationState::Idle,
            download_percent: None,
            download_progress_rx: None,
            download_result_rx: None,
            cancel_flag: CancelFlag::new(),
            cancel_used: false,
            last_download_path: None,
            url_edited_at: None,
            preview_for_url: None,
            preview: PreviewState::Empty,
            preview_tx,
            preview_rx,
            upload_file: None,
            upload_title: String::new(),
            upload_description: String::new(),
            upload_tags: String::new(),
            upload_visibility,
            upload_state: OperationState::Idle,
            upload_percent: None,
            upload_progress_rx: None,
            upload_result_rx: None,
            last_upload_url: None,
            paths,
            settings,
        }
    }

    fn persist_settings(&mut self) {
        self.settings.download_dir = self.download_folder.clone();
        self.settings.quality = self.selected_quality.clone();
        self.settings.upload_visibility = self.upload_visibility.as_str().to_string();
        if let Err(err) = config::save_settings(&self.paths, &self.settings) {
            log::warn!("could not persist settings: {err}");
        }
    }

    // ---- channel pumping ------------------------------------------------

    fn pump_channels(&mut self, ctx: &egui::Context) {
        // Latest percentage overwrites; nothing older is kept.
        if let Some(rx) = self.download_progress_rx.as_mut() {
            while let Ok(percent) = rx.try_recv() {
                self.download_percent = Some(percent);
            }
        }
        if let Some(rx) = self.upload_progress_rx.as_mut() {
            while let Ok(percent) = rx.try_recv() {
                self.upload_percent = Some(percent);
            }
        }

        if let Some(mut rx) = self.download_result_rx.take() {
            let now = Instant::now();
            match rx.try_recv() {
                Ok(result) => {
                    self.download_state = match result {
                        Ok(DownloadOutcome::Completed(path)) => {
                            let summary = path
                                .file_name()
                                .map(|name| name.to_string_lossy().into_owned())
                                .unwrap_or_else(|| path.display().to_string());
                            self.last_download_path = Some(path);
                            self.download_percent = Some(100.0);
                            OperationState::Completed { summary, since: now }
                        }
                        Ok(DownloadOutcome::Cancelled) => OperationState::Cancelled { since: now },
                        Err(err) => {
                            log::error!("download failed: {err}");
                            OperationState::Failed {
                                message: err.to_string(),
                                since: now,
                            }
                        }
                    };
                    self.download_progress_rx = None;
                }
                Err(TryRecvError::Empty) => {
                    self.download_result_rx = Some(rx);
                }
                Err(TryRecvError::Disconnected) => {
                    self.download_state = OperationState::Failed {
                        message: "download worker vanished".to_string(),
                        since: now,
                    };
                    self.download_progress_rx = None;
                }
            }
        }

        if let Some(mut rx) = self.upload_result_rx.take() {
            let now = Instant::now();
            match rx.try_recv() {
                Ok(result) => {
                    self.upload_state = match result {
                        Ok(receipt) => {
                            self.upload_percent = Some(100.0);
                            self.last_upload_url = Some(receipt.watch_url());
                            OperationState::Completed {
                                summary: receipt.video_id,
                                since: now,
                            }
                        }
                        Err(err) => {
                            log::error!("upload failed: {err}");
                            OperationState::Failed {
                                message: err.to_string(),
                                since: now,
                            }
                        }
                    };
                    self.upload_progress_rx = None;
                }
                Err(TryRecvError::Empty) => {
                    self.upload_result_rx = Some(rx);
                }
                Err(TryRecvError::Disconnected) => {
                    self.upload_state = OperationState::Failed {
                        message: "upload worker vanished".to_string(),
                        since: now,
                    };
                    self.upload_progress_rx = None;
                }
            }
        }

        // Preview answers for anything but the current URL are stale.
        while let Ok(message) = self.preview_rx.try_recv() {
            if Some(&message.url) != self.preview_for_url.as_ref() {
                continue;
            }
            self.preview = match message.result {
                Ok((meta, image)) => PreviewState::Ready {
                    title: meta.title,
                    texture: image.map(|img| {
                        ctx.load_texture(&message.url, img, TextureOptions::default())
                    }),
                },
                Err(err) => {
                    log::warn!("preview unavailable for {}: {err}", message.url);
                    PreviewState::Unavailable
                }
            };
        }
    }

    fn tick_states(&mut self) {
        let now = Instant::now();
        self.download_state.tick(now);
        self.upload_state.tick(now);
        if self.download_state.is_idle() && self.download_result_rx.is_none() {
            self.download_percent = None;
        }
        if self.upload_state.is_idle() && self.upload_result_rx.is_none() {
            self.upload_percent = None;
        }
    }

    // ---- metadata preview ----------------------------------------------

    fn maybe_probe_url(&mut self, ctx: &egui::Context) {
        let Some(edited_at) = self.url_edited_at else {
            return;
        };
        if edited_at.elapsed() < METADATA_DEBOUNCE {
            return;
        }
        self.url_edited_at = None;

        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            self.preview = PreviewState::Empty;
            self.preview_for_url = None;
            return;
        }
        if self.preview_for_url.as_deref() == Some(url.as_str()) {
            return;
        }

        self.preview = PreviewState::Loading;
        self.preview_for_url = Some(url.clone());

        let tx = self.preview_tx.clone();
        let repaint = ctx.clone();
        runtime().spawn_blocking(move || {
            let result = tool::resolve_ytdlp()
                .map_err(MetadataError::from)
                .and_then(|bin| metadata::fetch_metadata(&bin, &url))
                .map(|meta| {
                    let image = meta
                        .thumbnail_url
                        .as_deref()
                        .and_then(thumbnail::fetch_thumbnail);
                    (meta, image)
                });
            let _ = tx.send(PreviewMessage { url, result });
            repaint.request_repaint();
        });
    }

    // ---- operations -----------------------------------------------------

    fn start_download(&mut self, ctx: &egui::Context) {
        if !self.download_state.is_idle() {
            return;
        }
        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            return;
        }

        self.persist_settings();
        self.cancel_flag.reset();
        self.cancel_used = false;

        let request = DownloadRequest {
            url,
            format_selector: selector_for_quality(&self.selected_quality).to_string(),
            output_dir: PathBuf::from(self.download_folder.clone()),
            cancel: self.cancel_flag.clone(),
        };

        let (progress_tx, progress_rx) = unbounded_channel();
        let (result_tx, result_rx) = unbounded_channel();
        self.download_progress_rx = Some(progress_rx);
        self.download_result_rx = Some(result_rx);
        self.download_percent = Some(0.0);
        self.download_state = OperationState::Running;

        let sink = ProgressSink::with_repaint(progress_tx, ctx.clone());
        let repaint = ctx.clone();
        runtime().spawn(async move {
            let result = match tool::resolve_ytdlp() {
                Ok(bin) => downloader::download(&bin, &request, &sink).await,
                Err(err) => Err(DownloadError::from(err)),
            };
            let _ = result_tx.send(result);
            repaint.request_repaint();
        });
    }

    fn cancel_download(&mut self) {
        if !self.download_state.is_running() || self.cancel_used {
            return;
        }
        // At most one cancellation per run; the button greys out with it.
        self.cancel_flag.request();
        self.cancel_used = true;
    }

    fn start_upload(&mut self, ctx: &egui::Context) {
        if !self.upload_state.is_idle() {
            return;
        }
        let Some(file_path) = self.upload_file.clone() else {
            return;
        };

        self.persist_settings();

        let request = UploadRequest {
            file_path,
            title: self.upload_title.clone(),
            description: self.upload_description.clone(),
            tags: self
                .upload_tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(String::from)
                .collect(),
            category_id: self.settings.upload_category_id.clone(),
            visibility: self.upload_visibility,
        };

        let (progress_tx, progress_rx) = unbounded_channel();
        let (result_tx, result_rx) = unbounded_channel();
        self.upload_progress_rx = Some(progress_rx);
        self.upload_result_rx = Some(result_rx);
        self.upload_percent = Some(0.0);
        self.upload_state = OperationState::Running;

        let sink = ProgressSink::with_repaint(progress_tx, ctx.clone());
        let repaint = ctx.clone();
        let paths = self.paths.clone();
        runtime().spawn_blocking(move || {
            let result = run_upload(&paths, &request, &sink);
            let _ = result_tx.send(result);
            repaint.request_repaint();
        });
    }

    // ---- panes ----------------------------------------------------------

    fn download_pane(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Download");
        ui.separator();

        // Preview area
        match &self.preview {
            PreviewState::Ready { title, texture } => {
                if let Some(texture) = texture {
                    ui.add(egui::Image::new(texture).max_height(180.0));
                }
                ui.label(egui::RichText::new(title).strong());
            }
            PreviewState::Loading => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Fetching preview…");
                });
            }
            PreviewState::Unavailable => {
                ui.label("No preview available");
            }
            PreviewState::Empty => {
                ui.weak("Paste a link to see a preview");
            }
        }
        ui.add_space(8.0);

        ui.label("Video URL:");
        if ui.text_edit_singleline(&mut self.url_input).changed() {
            self.url_edited_at = Some(Instant::now());
        }

        ui.horizontal(|ui| {
            ui.label("Download folder:");
            ui.text_edit_singleline(&mut self.download_folder);
            if ui.button("Browse…").clicked() {
                if let Some(folder) = FileDialog::new()
                    .set_directory(&self.download_folder)
                    .pick_folder()
                {
                    self.download_folder = folder.display().to_string();
                }
            }
        });

        ui.label("Quality:");
        egui::ComboBox::from_id_source("quality")
            .selected_text(&self.selected_quality)
            .show_ui(ui, |ui| {
                for (label, _) in QUALITY_PRESETS {
                    ui.selectable_value(&mut self.selected_quality, label.to_string(), label);
                }
            });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let can_start = self.download_state.is_idle() && !self.url_input.trim().is_empty();
            if ui
                .add_enabled(can_start, egui::Button::new("⬇ Download"))
                .clicked()
            {
                self.start_download(ctx);
            }

            let can_cancel = self.download_state.is_running() && !self.cancel_used;
            if ui
                .add_enabled(can_cancel, egui::Button::new("❌ Cancel"))
                .clicked()
            {
                self.cancel_download();
            }
        });

        match &self.download_state {
            OperationState::Running => {
                let fraction = self.download_percent.unwrap_or(0.0) / 100.0;
                ui.add(egui::ProgressBar::new(fraction).show_percentage());
            }
            OperationState::Completed { summary, .. } => {
                ui.label(format!("✅ Saved {summary}"));
            }
            OperationState::Cancelled { .. } => {
                ui.label("🚫 Cancelled");
            }
            OperationState::Failed { message, .. } => {
                ui.label(format!("❌ {message}"));
            }
            OperationState::Idle => {}
        }

        if let Some(path) = self.last_download_path.clone() {
            ui.add_space(4.0);
            if ui.button("Open Folder").clicked() {
                let folder = path
                    .parent()
                    .map(|parent| parent.to_path_buf())
                    .unwrap_or(path);
                open_in_file_manager(folder);
            }
        }
    }

    fn upload_pane(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.heading("Upload");
        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Choose video…").clicked() {
                if let Some(file) = FileDialog::new()
                    .add_filter(
                        "Video",
                        &["mp4", "mov", "mkv", "webm", "m4v", "avi", "wmv", "mpeg", "mpg"],
                    )
                    .pick_file()
                {
                    self.set_upload_file(file);
                }
            }
            match &self.upload_file {
                Some(file) => {
                    ui.label(
                        file.file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or_else(|| file.display().to_string()),
                    );
                }
                None => {
                    ui.weak("…or drop a video file anywhere in the window");
                }
            }
        });

        ui.label("Title:");
        ui.text_edit_singleline(&mut self.upload_title);
        ui.label("Description:");
        ui.add(
            egui::TextEdit::multiline(&mut self.upload_description)
                .desired_rows(4)
                .desired_width(f32::INFINITY),
        );
        ui.label("Tags (comma separated):");
        ui.text_edit_singleline(&mut self.upload_tags);

        ui.label("Visibility:");
        egui::ComboBox::from_id_source("visibility")
            .selected_text(self.upload_visibility.as_str())
            .show_ui(ui, |ui| {
                for visibility in Visibility::ALL {
                    ui.selectable_value(
                        &mut self.upload_visibility,
                        visibility,
                        visibility.as_str(),
                    );
                }
            });

        ui.add_space(8.0);
        let can_upload = self.upload_state.is_idle() && self.upload_file.is_some();
        if ui
            .add_enabled(can_upload, egui::Button::new("⬆ Upload"))
            .clicked()
        {
            self.start_upload(ctx);
        }

        match &self.upload_state {
            OperationState::Running => {
                let fraction = self.upload_percent.unwrap_or(0.0) / 100.0;
                ui.add(egui::ProgressBar::new(fraction).show_percentage());
            }
            OperationState::Completed { summary, .. } => {
                ui.label(format!("✅ Uploaded ({summary})"));
            }
            OperationState::Failed { message, .. } => {
                ui.label(format!("❌ {message}"));
            }
            OperationState::Cancelled { .. } | OperationState::Idle => {}
        }

        if let Some(url) = &self.last_upload_url {
            ui.hyperlink_to("Watch on YouTube", url);
        }
    }

    fn set_upload_file(&mut self, file: PathBuf) {
        if self.upload_title.trim().is_empty() {
            if let Some(stem) = file.file_stem().and_then(|stem| stem.to_str()) {
                self.upload_title = stem.to_string();
            }
        }
        self.upload_file = Some(file);
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for PorterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.pump_channels(ctx);
        self.tick_states();
        self.maybe_probe_url(ctx);

        // Files dropped anywhere select the upload source.
        let dropped = ctx.input(|input| {
            input
                .raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .next()
        });
        if let Some(file) = dropped {
            self.set_upload_file(file);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                self.download_pane(&mut columns[0], ctx);
                self.upload_pane(&mut columns[1], ctx);
            });
        });

        // Keep progress bars moving even without input events.
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

// Worker-side body of the upload operation: preconditions first, then
// credentials, then the transfer.
fn run_upload(
    paths: &AppPaths,
    request: &UploadRequest,
    sink: &ProgressSink,
) -> Result<UploadReceipt, UploadError> {
    request.validate()?;
    let secrets = auth::load_client_secrets(&paths.client_secrets_path())?;
    let authenticator = Authenticator::new(secrets, paths.token_path());
    let token = authenticator.access_token()?;
    Uploader::new().upload(request, &token, sink)
}

fn open_in_file_manager(folder: PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("explorer").arg(&folder).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&folder).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let _ = std::process::Command::new("xdg-open").arg(&folder).spawn();
    });
}
