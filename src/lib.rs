use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

pub mod archive;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod pianoroll;
pub mod visualize;
#[cfg(test)]
mod testing;

pub use archive::{load_pianoroll, save_pianoroll, ArchiveError};
pub use error::{Error, Result};
pub use extract::{extract_notes, instrument_info};
pub use midi_pianoroll_shared::{
    note_number_to_name, parse_midi_bytes, parse_midi_file, Instrument, InstrumentInfo,
    MidiLoadError, MidiNote, MidiSong, NoteEvent,
};
pub use pianoroll::{notes_to_pianoroll, PianoRoll, PianoRollError, PianoRollOptions};

// Global shutdown flag for graceful Ctrl+C handling
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

pub fn set_shutdown_flag() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn should_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Where and how a directory of MIDI files gets converted
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: PianoRollOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Archives written
    pub converted: Vec<PathBuf>,
    /// Inputs that could not be loaded
    pub skipped: Vec<PathBuf>,
}

/// Read piano-roll options from a JSON file; missing fields take defaults.
pub fn load_options(path: &Path) -> Result<PianoRollOptions> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&text).map_err(|source| Error::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a MIDI file, logging and returning `None` when it cannot be read.
pub fn load_midi(path: &Path) -> Option<MidiSong> {
    match parse_midi_file(path) {
        Ok(song) => Some(song),
        Err(e) => {
            log::error!("Error loading {}: {}", path.display(), e);
            None
        }
    }
}

/// `<output_dir>/<input stem>.npz`
pub fn archive_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    name.push(".");
    name.push(archive::ARCHIVE_EXTENSION);
    output_dir.join(name)
}

/// Convert one MIDI file to an archive at `output`.
///
/// `Ok(None)` means the file could not be loaded and nothing was written.
/// A file that loads but holds no notes is an error.
pub fn convert_file(
    input: &Path,
    output: &Path,
    options: &PianoRollOptions,
) -> Result<Option<PianoRoll>> {
    let Some(song) = load_midi(input) else {
        return Ok(None);
    };
    let notes = extract_notes(&song);
    let roll = notes_to_pianoroll(&notes, options).map_err(|source| Error::PianoRoll {
        path: input.to_path_buf(),
        source,
    })?;
    save_pianoroll(output, &roll)?;
    Ok(Some(roll))
}

/// Convert every `.mid` file in `input_dir`, one at a time in listing order.
pub fn convert_directory(config: &ConvertConfig) -> Result<ConvertSummary> {
    fs::create_dir_all(&config.output_dir).map_err(|e| Error::io(&config.output_dir, e))?;

    let mut summary = ConvertSummary::default();
    let entries = fs::read_dir(&config.input_dir).map_err(|e| Error::io(&config.input_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(&config.input_dir, e))?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(dataset::MIDI_EXTENSION) {
            continue;
        }
        if should_shutdown() {
            log::warn!("Shutdown requested, stopping conversion");
            break;
        }
        let input = entry.path();
        let output = archive_path_for(&input, &config.output_dir);
        log::info!("Processing {}...", file_name);
        match convert_file(&input, &output, &config.options)? {
            Some(_) => summary.converted.push(output),
            None => summary.skipped.push(input),
        }
    }
    Ok(summary)
}

/// Load an archive, print its shape, and render it to `save_path` or a viewer.
pub fn visualize_pianoroll_file(path: &Path, save_path: Option<&Path>) -> Result<PianoRoll> {
    let roll = load_pianoroll(path)?;
    println!("Pianoroll shape: {:?}", roll.shape());
    if let Some(bars) = &roll.bars {
        println!("Bars: {}", bars.len());
    }
    visualize::visualize_pianoroll(roll.grid.view(), save_path)?;
    Ok(roll)
}

/// What `inspect` reports about one MIDI file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MidiReport {
    pub filename: String,
    pub duration: f64,
    pub tempo_bpm: f64,
    pub instruments: Vec<InstrumentInfo>,
    pub note_count: usize,
    /// The first notes, up to the requested limit
    pub notes: Vec<NoteEvent>,
}

pub fn inspect_midi(song: &MidiSong, limit: usize) -> MidiReport {
    let notes = extract_notes(song);
    MidiReport {
        filename: song.filename.clone(),
        duration: song.end_time(),
        tempo_bpm: song.initial_bpm(),
        instruments: instrument_info(song),
        note_count: notes.len(),
        notes: notes.into_iter().take(limit).collect(),
    }
}
