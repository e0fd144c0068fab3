use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use rust_embed::RustEmbed;

use crate::error::ToolError;

/// Optional bundled copy of the extractor. The folder may be empty, in
/// which case resolution falls through to PATH.
#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

fn platform_bin() -> &'static str {
    if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    }
}

/// Resolves a runnable yt-dlp: an embedded copy is materialized into the
/// temp directory once and reused; otherwise whatever PATH offers wins.
pub fn resolve_ytdlp() -> Result<PathBuf, ToolError> {
    let bin = platform_bin();

    if let Some(data) = Asset::get(bin) {
        let target = std::env::temp_dir().join(bin);
        if !target.exists() {
            let mut file = File::create(&target)?;
            file.write_all(&data.data)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
            }
        }
        return Ok(target);
    }

    which::which(bin).map_err(|_| ToolError::Missing)
}
