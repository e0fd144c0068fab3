use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::AppPaths;

/// User-tunable settings, persisted as pretty JSON under the config dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Destination directory for finished downloads.
    pub download_dir: String,
    /// Quality preset label last chosen in the UI.
    pub quality: String,
    /// Default visibility for uploads ("public" / "unlisted" / "private").
    pub upload_visibility: String,
    /// Default category id for uploads (YouTube numeric category).
    pub upload_category_id: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            quality: "720p".to_string(),
            upload_visibility: "private".to_string(),
            upload_category_id: "22".to_string(),
        }
    }
}

/// Loads settings, treating a missing file as defaults. A malformed file
/// is an error; the caller decides whether to fall back.
pub fn load_settings(paths: &AppPaths) -> Result<AppSettings, ConfigError> {
    let path = paths.settings_path();
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

pub fn save_settings(paths: &AppPaths, settings: &AppSettings) -> Result<(), ConfigError> {
    paths.ensure_dirs().map_err(|source| ConfigError::Write {
        path: paths.config_dir(),
        source,
    })?;
    let path = paths.settings_path();
    let payload = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, format!("{payload}\n"))
        .map_err(|source| ConfigError::Write { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        let settings = load_settings(&paths).unwrap();
        assert_eq!(settings.quality, "720p");
        assert_eq!(settings.upload_visibility, "private");
    }

    #[test]
    fn settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        let mut settings = AppSettings::default();
        settings.download_dir = "/media/videos".to_string();
        settings.quality = "1080p".to_string();
        save_settings(&paths, &settings).unwrap();

        let loaded = load_settings(&paths).unwrap();
        assert_eq!(loaded.download_dir, "/media/videos");
        assert_eq!(loaded.quality, "1080p");
    }

    #[test]
    fn unknown_fields_do_not_break_loading() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        std::fs::write(
            paths.settings_path(),
            r#"{"download_dir":"/tmp/dl","someFutureKnob":true}"#,
        )
        .unwrap();
        let loaded = load_settings(&paths).unwrap();
        assert_eq!(loaded.download_dir, "/tmp/dl");
        assert_eq!(loaded.quality, "720p");
    }

    #[test]
    fn malformed_settings_surface_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        std::fs::write(paths.settings_path(), "{not json").unwrap();
        let err = load_settings(&paths).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
