// Hands rendered images to whatever desktop viewer is installed.
// The first viewer found on PATH wins.

use std::path::Path;
use std::process::{Command, Stdio};
use which::which;

#[cfg(target_os = "macos")]
const VIEWERS: &[&str] = &["open"];
#[cfg(target_os = "windows")]
const VIEWERS: &[&str] = &["explorer"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const VIEWERS: &[&str] = &["xdg-open", "eog", "feh", "display"];

/// Open an image file in an external viewer.
///
/// Returns `Ok(false)` when no viewer is available; the image stays on disk
/// either way.
pub fn show_image(path: &Path) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(viewer) = VIEWERS.iter().find_map(|name| which(name).ok()) else {
        log::warn!(
            "No image viewer found (tried {}); image left at {}",
            VIEWERS.join(", "),
            path.display()
        );
        return Ok(false);
    };
    log::info!("Opening {} with {}", path.display(), viewer.display());
    Command::new(&viewer)
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(true)
}
