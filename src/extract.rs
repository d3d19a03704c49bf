//! Flattens a parsed song into note records.

use midi_pianoroll_shared::{InstrumentInfo, MidiSong, NoteEvent};

/// Every note of every instrument, instrument by instrument, in the order
/// the loader stored them. No sorting or merging.
pub fn extract_notes(song: &MidiSong) -> Vec<NoteEvent> {
    let mut notes = Vec::with_capacity(song.note_count());
    for instrument in &song.instruments {
        let label = instrument.label();
        notes.extend(instrument.notes.iter().map(|note| NoteEvent {
            pitch: note.pitch,
            start: note.start,
            end: note.end,
            velocity: note.velocity,
            instrument: label.clone(),
        }));
    }
    notes
}

pub fn instrument_info(song: &MidiSong) -> Vec<InstrumentInfo> {
    song.instruments
        .iter()
        .map(|instrument| InstrumentInfo {
            name: instrument.label(),
            program: instrument.program,
            is_drum: instrument.is_drum,
            note_count: instrument.notes.len(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_pianoroll_shared::{Instrument, MidiNote};

    fn note(pitch: u8, start: f64, end: f64) -> MidiNote {
        MidiNote {
            pitch,
            start,
            end,
            velocity: 90,
        }
    }

    fn song() -> MidiSong {
        let mut piano = Instrument::new("Piano", 0, false);
        piano.notes = vec![note(64, 1.0, 2.0), note(60, 0.0, 1.0)];
        let mut bass = Instrument::new("", 33, false);
        bass.notes = vec![note(36, 0.5, 1.5)];
        MidiSong {
            filename: "song.mid".into(),
            name: "song".into(),
            resolution: Some(480),
            instruments: vec![piano, bass],
            tempo_changes: Vec::new(),
        }
    }

    #[test]
    fn keeps_instrument_then_note_order() {
        let notes = extract_notes(&song());
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![64, 60, 36]);
        assert_eq!(notes[0].instrument, "Piano");
        assert_eq!(notes[2].instrument, "Program 33");
    }

    #[test]
    fn no_instruments_means_no_notes() {
        let mut empty = song();
        empty.instruments.clear();
        assert!(extract_notes(&empty).is_empty());
        assert!(instrument_info(&empty).is_empty());
    }

    #[test]
    fn instrument_info_counts_notes() {
        let info = instrument_info(&song());
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].name, "Piano");
        assert_eq!(info[0].note_count, 2);
        assert_eq!(info[1].program, 33);
    }
}
