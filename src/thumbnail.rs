use eframe::egui::ColorImage;

/// Fetches and decodes a preview image for display in the UI.
///
/// Any failure (network, decode) collapses to `None`; the preview pane
/// shows its placeholder instead and the error never reaches the user.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Blocking HTTP GET; runs on the worker pool, never the UI thread.
    let bytes = reqwest::blocking::get(url).ok()?.bytes().ok()?;
    let img = image::load_from_memory(&bytes).ok()?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
