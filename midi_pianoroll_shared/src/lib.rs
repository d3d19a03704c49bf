pub mod load_midi;
pub mod media_display;
pub mod types;
pub use load_midi::{parse_midi_bytes, parse_midi_file, MidiLoadError};
pub use media_display::show_image;
pub use types::{
    note_number_to_name, Instrument, InstrumentInfo, MidiNote, MidiSong, NoteEvent, TempoChange,
};
