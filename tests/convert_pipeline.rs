use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use midi_pianoroll::{
    convert_directory, extract_notes, load_pianoroll, notes_to_pianoroll, parse_midi_bytes,
    ConvertConfig, PianoRollOptions,
};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// Temp directory removed on drop.
struct ScratchDir(PathBuf);

impl Deref for ScratchDir {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn scratch_dir(name: &str) -> ScratchDir {
    let dir = std::env::temp_dir().join(format!("midi_pianoroll_it_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    ScratchDir(dir)
}

fn midi(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(message),
    }
}

/// 480 ticks per quarter at 120 BPM: one tick is 1/960 s.
/// Each note is (pitch, start tick, end tick, velocity), played in sequence.
fn song_bytes(name: &'static [u8], notes: &[(u8, u32, u32, u8)]) -> Vec<u8> {
    let mut events = vec![
        meta(0, MetaMessage::TrackName(name)),
        meta(0, MetaMessage::Tempo(u24::new(500_000))),
    ];
    let mut now = 0;
    for &(pitch, start, end, vel) in notes {
        events.push(midi(
            start - now,
            MidiMessage::NoteOn {
                key: u7::new(pitch),
                vel: u7::new(vel),
            },
        ));
        events.push(midi(
            end - start,
            MidiMessage::NoteOff {
                key: u7::new(pitch),
                vel: u7::new(0),
            },
        ));
        now = end;
    }
    events.push(meta(0, MetaMessage::EndOfTrack));

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(480)),
    ));
    smf.tracks.push(events);
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

#[test]
fn converts_a_directory_and_skips_broken_files() {
    let input = scratch_dir("pipeline_in");
    let output_root = scratch_dir("pipeline_out");
    let output = output_root.join("nested");

    // 0.0 - 0.2 s and 0.5 - 1.0 s
    fs::write(
        input.join("melody.mid"),
        song_bytes(b"Piano", &[(60, 0, 192, 100), (64, 480, 960, 80)]),
    )
    .unwrap();
    fs::write(input.join("broken.mid"), b"this is not midi").unwrap();
    fs::write(input.join("readme.txt"), b"ignored").unwrap();

    let config = ConvertConfig {
        input_dir: input.to_path_buf(),
        output_dir: output.clone(),
        options: PianoRollOptions::default(),
    };
    let summary = convert_directory(&config).unwrap();
    assert_eq!(summary.converted, vec![output.join("melody.npz")]);
    assert_eq!(summary.skipped, vec![input.join("broken.mid")]);
    assert!(!output.join("broken.npz").exists());
    assert!(!output.join("readme.npz").exists());

    let roll = load_pianoroll(&output.join("melody.npz")).unwrap();
    assert_eq!(roll.shape(), (20, 128));
    assert!(roll.bars.is_none());
    assert_eq!(roll.grid[[0, 60]], 100);
    assert_eq!(roll.grid[[3, 60]], 100);
    assert_eq!(roll.grid[[4, 60]], 0);
    assert_eq!(roll.grid[[10, 64]], 80);
    assert_eq!(roll.grid[[19, 64]], 80);
    assert_eq!(roll.grid.iter().filter(|&&v| v != 0).count(), 4 + 10);
}

#[test]
fn broken_files_do_not_stop_the_rest_of_the_batch() {
    let input = scratch_dir("pipeline_order_in");
    let output = scratch_dir("pipeline_order_out");

    let good = ["b_first.mid", "d_second.mid", "f_third.mid"];
    let broken = ["a_broken.mid", "c_broken.mid", "e_broken.mid"];
    for name in good {
        fs::write(input.join(name), song_bytes(b"Piano", &[(60, 0, 480, 100)])).unwrap();
    }
    for name in broken {
        fs::write(input.join(name), b"garbage").unwrap();
    }

    let config = ConvertConfig {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        options: PianoRollOptions::default(),
    };
    let summary = convert_directory(&config).unwrap();

    // results follow directory-listing order
    let listing: Vec<PathBuf> = fs::read_dir(&*input)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    let converted_inputs: Vec<PathBuf> = listing
        .iter()
        .filter(|p| good.iter().any(|g| p.ends_with(g)))
        .map(|p| output.join(p.file_stem().unwrap()).with_extension("npz"))
        .collect();
    let skipped_inputs: Vec<PathBuf> = listing
        .iter()
        .filter(|p| broken.iter().any(|b| p.ends_with(b)))
        .cloned()
        .collect();
    assert_eq!(summary.converted, converted_inputs);
    assert_eq!(summary.skipped, skipped_inputs);
    for name in good {
        let stem = name.trim_end_matches(".mid");
        assert!(output.join(format!("{}.npz", stem)).exists());
    }
}

#[test]
fn separate_bars_are_persisted() {
    let input = scratch_dir("pipeline_bars_in");
    let output = scratch_dir("pipeline_bars_out");

    // one long note ending at 5.0 s -> 100 rows
    fs::write(
        input.join("long.mid"),
        song_bytes(b"Pad", &[(48, 0, 4800, 64)]),
    )
    .unwrap();

    let config = ConvertConfig {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        options: PianoRollOptions {
            separate_bars: true,
            ..Default::default()
        },
    };
    convert_directory(&config).unwrap();

    let roll = load_pianoroll(&output.join("long.npz")).unwrap();
    assert_eq!(roll.num_steps(), 100);
    let lengths: Vec<usize> = roll.bars.unwrap().iter().map(|b| b.nrows()).collect();
    assert_eq!(lengths, vec![40, 40, 20]);
}

#[test]
fn empty_midi_file_is_a_fatal_precondition_error() {
    let input = scratch_dir("pipeline_empty_in");
    let output = scratch_dir("pipeline_empty_out");
    fs::write(input.join("silent.mid"), song_bytes(b"Nothing", &[])).unwrap();

    let config = ConvertConfig {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        options: PianoRollOptions::default(),
    };
    let err = convert_directory(&config).unwrap_err();
    assert!(err.to_string().contains("empty note list"));
}

#[test]
fn missing_input_directory_is_an_error() {
    let scratch = scratch_dir("pipeline_missing");
    let config = ConvertConfig {
        input_dir: scratch.join("does_not_exist"),
        output_dir: scratch.join("out"),
        options: PianoRollOptions::default(),
    };
    assert!(convert_directory(&config).is_err());
}

#[test]
fn labels_come_from_track_names() {
    let bytes = song_bytes(b"Lead", &[(72, 0, 480, 90)]);
    let song = parse_midi_bytes(&bytes, "lead.mid").unwrap();
    let notes = extract_notes(&song);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].instrument, "Lead");
    assert_eq!(notes[0].note_name(), "C5");

    let roll = notes_to_pianoroll(&notes, &PianoRollOptions::default()).unwrap();
    assert_eq!(roll.shape(), (10, 128));
}
