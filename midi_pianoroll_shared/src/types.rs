use serde::{Deserialize, Serialize};
use std::fmt;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Convert a MIDI note number to its scientific pitch name (60 -> "C4").
pub fn note_number_to_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

/// A note as stored on an instrument, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
}

impl MidiNote {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Track name, empty when the track carries none
    pub name: String,
    pub program: u8,
    pub is_drum: bool,
    pub notes: Vec<MidiNote>,
}

impl Instrument {
    pub fn new(name: impl Into<String>, program: u8, is_drum: bool) -> Self {
        Self {
            name: name.into(),
            program,
            is_drum,
            notes: Vec::new(),
        }
    }

    /// Display label: the track name, or the program number when unnamed.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("Program {}", self.program)
        } else {
            self.name.clone()
        }
    }
}

/// Tempo change event, positioned in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoChange {
    pub time: f64,
    pub bpm: f64,
}

/// A parsed MIDI file: everything downstream stages need, nothing tick-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiSong {
    pub filename: String,
    pub name: String,
    /// Ticks per quarter note; `None` for SMPTE timecode files
    pub resolution: Option<u16>,
    pub instruments: Vec<Instrument>,
    pub tempo_changes: Vec<TempoChange>,
}

impl MidiSong {
    /// Time in seconds at which the last note ends.
    pub fn end_time(&self) -> f64 {
        self.instruments
            .iter()
            .flat_map(|i| i.notes.iter())
            .map(|n| n.end)
            .fold(0.0, f64::max)
    }

    pub fn note_count(&self) -> usize {
        self.instruments.iter().map(|i| i.notes.len()).sum()
    }

    /// First tempo in the file, or the MIDI default of 120 BPM.
    pub fn initial_bpm(&self) -> f64 {
        self.tempo_changes.first().map(|t| t.bpm).unwrap_or(120.0)
    }
}

/// Flat note record, one per note across all instruments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
    pub instrument: String,
}

impl NoteEvent {
    pub fn new(pitch: u8, start: f64, end: f64, velocity: u8) -> Self {
        Self {
            pitch,
            start,
            end,
            velocity,
            instrument: String::new(),
        }
    }

    pub fn note_name(&self) -> String {
        note_number_to_name(self.pitch)
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4} (pitch {:>3}) {:>8.3}s - {:>8.3}s vel {:>3} [{}]",
            self.note_name(),
            self.pitch,
            self.start,
            self.end,
            self.velocity,
            self.instrument
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub name: String,
    pub program: u8,
    pub is_drum: bool,
    pub note_count: usize,
}
