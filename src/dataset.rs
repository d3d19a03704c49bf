//! Dataset helpers for a MIDI corpus laid out as `<root>/<artist>/*.mid`.
//!
//! Copies are flat: every file lands directly in the target directory, and a
//! later file with the same name overwrites an earlier one.

use std::fs;
use std::io;
use std::path::Path;

pub const MIDI_EXTENSION: &str = ".mid";

/// Create `dir` (and parents) if needed. Returns `true` when it was created.
pub fn create_directory(dir: &Path) -> io::Result<bool> {
    if dir.exists() {
        log::info!("Directory already exists: {}", dir.display());
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    log::info!("Created directory: {}", dir.display());
    Ok(true)
}

/// Subdirectory names of `root`, in directory-listing order, optionally
/// keeping only names that contain `filter` (case-insensitive).
///
/// A missing `root` is logged and yields an empty list.
pub fn list_artist_folders(root: &Path, filter: Option<&str>) -> Vec<String> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("Directory '{}' does not exist ({})", root.display(), e);
            return Vec::new();
        }
    };
    let filter = filter.filter(|f| !f.is_empty()).map(str::to_lowercase);
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| match &filter {
            Some(keyword) => name.to_lowercase().contains(keyword.as_str()),
            None => true,
        })
        .collect()
}

/// Names of regular `.mid` files directly inside `dir`, in listing order.
pub fn midi_files_in(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(MIDI_EXTENSION) && entry.path().is_file() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Copy `.mid` files into `target_dir`: from `source_dir/<artist>` when an
/// artist is given, otherwise from every subfolder of `source_dir`.
///
/// Returns the number of files copied. A missing source or artist folder is
/// logged and copies nothing.
pub fn copy_midi_files(
    source_dir: &Path,
    target_dir: &Path,
    artist: Option<&str>,
) -> io::Result<usize> {
    if let Some(artist) = artist {
        let artist_path = source_dir.join(artist);
        if !artist_path.is_dir() {
            log::error!(
                "Artist '{}' does not exist in {}.",
                artist,
                source_dir.display()
            );
            return Ok(0);
        }
        let files = midi_files_in(&artist_path)?;
        for name in &files {
            log::info!("Copying {}...", name);
            fs::copy(artist_path.join(name), target_dir.join(name))?;
        }
        log::info!("Copied {} files for artist '{}'.", files.len(), artist);
        return Ok(files.len());
    }

    if !source_dir.is_dir() {
        log::error!("Directory '{}' does not exist.", source_dir.display());
        return Ok(0);
    }
    let mut total = 0;
    for folder in list_artist_folders(source_dir, None) {
        let folder_path = source_dir.join(&folder);
        for name in midi_files_in(&folder_path)? {
            log::info!("Copying {} from folder {}...", name, folder);
            fs::copy(folder_path.join(&name), target_dir.join(&name))?;
            total += 1;
        }
    }
    log::info!("Copied {} files from all artist folders.", total);
    Ok(total)
}
