//! MIDI file loading for the piano-roll pipeline
// Turns a standard MIDI file into per-instrument note lists timed in seconds

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::types::{Instrument, MidiNote, MidiSong, TempoChange};

/// Microseconds per quarter note when a file sets no tempo (120 BPM)
const DEFAULT_TEMPO_US: u32 = 500_000;
const DRUM_CHANNEL: u8 = 9;

#[derive(Debug, thiserror::Error)]
pub enum MidiLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse MIDI data: {0}")]
    Parse(#[from] midly::Error),
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    seconds_per_tick: f64,
}

/// Piecewise-linear tick -> seconds mapping.
#[derive(Debug, Clone)]
struct TempoMap {
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(timing: Timing, tempo_events: &[(u64, u32)]) -> Self {
        match timing {
            Timing::Metrical(ppq) => {
                let ppq = ppq.as_int().max(1) as f64;
                let spt = |us: u32| us as f64 / 1_000_000.0 / ppq;
                let mut segments = vec![TempoSegment {
                    tick: 0,
                    seconds: 0.0,
                    seconds_per_tick: spt(DEFAULT_TEMPO_US),
                }];
                for &(tick, us) in tempo_events {
                    let last = segments[segments.len() - 1];
                    let segment = TempoSegment {
                        tick,
                        seconds: last.seconds + (tick - last.tick) as f64 * last.seconds_per_tick,
                        seconds_per_tick: spt(us),
                    };
                    if tick == last.tick {
                        let idx = segments.len() - 1;
                        segments[idx] = segment;
                    } else {
                        segments.push(segment);
                    }
                }
                TempoMap { segments }
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes.max(1) as f64;
                TempoMap {
                    segments: vec![TempoSegment {
                        tick: 0,
                        seconds: 0.0,
                        seconds_per_tick: 1.0 / ticks_per_second,
                    }],
                }
            }
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let idx = self.segments.partition_point(|s| s.tick <= tick);
        let seg = &self.segments[idx.saturating_sub(1)];
        seg.seconds + (tick - seg.tick) as f64 * seg.seconds_per_tick
    }
}

/// Parse a MIDI file from disk.
pub fn parse_midi_file<P: AsRef<Path>>(path: P) -> Result<MidiSong, MidiLoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| MidiLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    parse_midi_bytes(&bytes, &filename)
}

/// Parse in-memory MIDI data. `filename` only labels the resulting song.
pub fn parse_midi_bytes(bytes: &[u8], filename: &str) -> Result<MidiSong, MidiLoadError> {
    let smf = Smf::parse(bytes)?;

    let resolution = match smf.header.timing {
        Timing::Metrical(t) => Some(t.as_int()),
        Timing::Timecode(..) => None,
    };

    // Tempo events are collected from every track, not only the first.
    // Type 1 files that put Set Tempo on a later track still time correctly.
    let mut tempo_events = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempo_events.push((tick, tempo.as_int().max(1)));
            }
        }
    }
    tempo_events.sort_by_key(|&(tick, _)| tick);
    let tempo_map = TempoMap::new(smf.header.timing, &tempo_events);

    let tempo_changes = if resolution.is_some() {
        tempo_events
            .iter()
            .map(|&(tick, us)| TempoChange {
                time: tempo_map.seconds(tick),
                bpm: 60_000_000.0 / us as f64,
            })
            .collect()
    } else {
        Vec::new()
    };

    let mut instruments: Vec<Instrument> = Vec::new();
    // (track, channel, program) -> index into `instruments`
    let mut instrument_index: HashMap<(usize, u8, u8), usize> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let track_name = track
            .iter()
            .find_map(|ev| match ev.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    Some(String::from_utf8_lossy(name).to_string())
                }
                _ => None,
            })
            .unwrap_or_default();

        let mut programs = [0u8; 16];
        // (channel, key) -> open notes as (start tick, velocity)
        let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        let mut tick = 0u64;

        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let ch = channel.as_int();
            match message {
                MidiMessage::ProgramChange { program } => {
                    programs[ch as usize] = program.as_int();
                }
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open_notes
                        .entry((ch, key.as_int()))
                        .or_default()
                        .push((tick, vel.as_int()));
                }
                MidiMessage::NoteOff { key, .. } | MidiMessage::NoteOn { key, .. } => {
                    let pitch = key.as_int();
                    let Some(pending) = open_notes.remove(&(ch, pitch)) else {
                        continue;
                    };
                    let (to_close, to_keep): (Vec<_>, Vec<_>) =
                        pending.into_iter().partition(|&(start, _)| start != tick);
                    if to_close.is_empty() {
                        // Zero-length notes are discarded
                        continue;
                    }
                    if !to_keep.is_empty() {
                        open_notes.insert((ch, pitch), to_keep);
                    }
                    let program = programs[ch as usize];
                    let idx = *instrument_index
                        .entry((track_idx, ch, program))
                        .or_insert_with(|| {
                            instruments.push(Instrument::new(
                                track_name.clone(),
                                program,
                                ch == DRUM_CHANNEL,
                            ));
                            instruments.len() - 1
                        });
                    let end = tempo_map.seconds(tick);
                    for (start_tick, velocity) in to_close {
                        instruments[idx].notes.push(MidiNote {
                            pitch,
                            start: tempo_map.seconds(start_tick),
                            end,
                            velocity,
                        });
                    }
                }
                _ => {}
            }
        }

        if !open_notes.is_empty() {
            let dangling: usize = open_notes.values().map(Vec::len).sum();
            log::debug!(
                "{}: track {} has {} notes without a note-off, dropped",
                filename,
                track_idx,
                dangling
            );
        }
    }

    let name = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.to_string());

    log::debug!(
        "{}: {} tracks, {} instruments, resolution {:?}",
        filename,
        smf.tracks.len(),
        instruments.len(),
        resolution
    );

    Ok(MidiSong {
        filename: filename.to_string(),
        name,
        resolution,
        instruments,
        tempo_changes,
    })
}
