use std::path::{Path, PathBuf};

/// Filesystem layout of everything the application persists.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Platform base directory: `%APPDATA%\tubeporter` on Windows,
    /// `$HOME/.config/tubeporter` elsewhere, with the working directory as
    /// a last resort when the environment is bare.
    pub fn from_env() -> Self {
        let root = if cfg!(target_os = "windows") {
            std::env::var_os("APPDATA").map(PathBuf::from)
        } else {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .map(|home| home.join(".config"))
        };
        let base = root
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubeporter");
        Self::new(base)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir().join("settings.json")
    }

    pub fn client_secrets_path(&self) -> PathBuf {
        self.config_dir().join("client_secrets.json")
    }

    pub fn token_path(&self) -> PathBuf {
        self.config_dir().join("upload_token.json")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())
    }
}

impl AsRef<Path> for AppPaths {
    fn as_ref(&self) -> &Path {
        &self.base_dir
    }
}
