use ansi_term::Colour::{Green, Red, Yellow};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;

use crate::{
    convert_directory, dataset, inspect_midi, load_midi, load_options, set_shutdown_flag,
    visualize, visualize_pianoroll_file, ConvertConfig, PianoRollOptions,
};

#[derive(Parser)]
#[command(name = "midi_pianoroll")]
#[command(about = "Convert MIDI files to pianoroll format and visualize them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert MIDI to pianoroll
    Convert {
        /// Directory containing MIDI files
        input_dir: PathBuf,

        /// Directory to save pianoroll files
        output_dir: PathBuf,

        /// Time step for pianoroll, in seconds [default: 0.05]
        #[arg(long = "time_step", visible_alias = "time-step")]
        time_step: Option<f64>,

        /// Separate pianoroll into bars
        #[arg(long = "separate_bars", visible_alias = "separate-bars")]
        separate_bars: bool,

        /// Tempo in BPM used for bar length [default: 120]
        #[arg(long)]
        tempo: Option<f64>,

        /// JSON file with time_step / separate_bars / tempo; flags win
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Visualize pianoroll from .npz file
    Visualize {
        /// Path to the saved pianoroll .npz file
        pianoroll_path: PathBuf,

        /// Save the heat-map PNG here instead of opening a viewer
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show instruments and notes of a MIDI file and plot its note events
    Inspect {
        midi_file: PathBuf,

        /// Number of notes to print
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Save the note scatter plot here instead of opening a viewer
        #[arg(long)]
        plot: Option<PathBuf>,

        /// Skip the scatter plot
        #[arg(long)]
        no_plot: bool,
    },

    /// Manage a MIDI dataset organized by artist folders
    Dataset {
        #[command(subcommand)]
        command: DatasetCommands,
    },
}

#[derive(Subcommand)]
pub enum DatasetCommands {
    /// Create a directory if it does not exist
    Mkdir { dir: PathBuf },

    /// List artist folders
    List {
        root: PathBuf,

        /// Only folders containing this keyword (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Copy .mid files into one flat directory
    Copy {
        source_dir: PathBuf,
        target_dir: PathBuf,

        /// Only copy this artist's folder
        #[arg(long)]
        artist: Option<String>,
    },
}

/// Merge a config file (if any) with explicit flags.
pub fn resolve_options(
    config: Option<&PathBuf>,
    time_step: Option<f64>,
    separate_bars: bool,
    tempo: Option<f64>,
) -> Result<PianoRollOptions, Box<dyn Error>> {
    let mut options = match config {
        Some(path) => load_options(path)?,
        None => PianoRollOptions::default(),
    };
    if let Some(time_step) = time_step {
        options.time_step = time_step;
    }
    if separate_bars {
        options.separate_bars = true;
    }
    if let Some(tempo) = tempo {
        options.tempo = tempo;
    }
    Ok(options)
}

/// Only batch conversion polls the shutdown flag between files. Every other
/// command keeps the default Ctrl+C behaviour.
pub fn stops_gracefully(command: &Commands) -> bool {
    matches!(command, Commands::Convert { .. })
}

pub fn run_cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if stops_gracefully(&cli.command) {
        ctrlc::set_handler(|| {
            log::warn!("Ctrl+C received, stopping after the current file");
            set_shutdown_flag();
        })?;
    }
    run(cli.command)
}

pub fn run(command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Convert {
            input_dir,
            output_dir,
            time_step,
            separate_bars,
            tempo,
            config,
        } => {
            let options = resolve_options(config.as_ref(), time_step, separate_bars, tempo)?;
            let config = ConvertConfig {
                input_dir,
                output_dir,
                options,
            };
            let summary = convert_directory(&config)?;
            println!(
                "{}",
                Green.paint(format!(
                    "✅ Converted {} files into {}",
                    summary.converted.len(),
                    config.output_dir.display()
                ))
            );
            if !summary.skipped.is_empty() {
                println!(
                    "{}",
                    Yellow.paint(format!("⚠️  Skipped {} unreadable files", summary.skipped.len()))
                );
            }
        }

        Commands::Visualize {
            pianoroll_path,
            output,
        } => {
            visualize_pianoroll_file(&pianoroll_path, output.as_deref())?;
        }

        Commands::Inspect {
            midi_file,
            limit,
            json,
            plot,
            no_plot,
        } => {
            let Some(song) = load_midi(&midi_file) else {
                eprintln!(
                    "{}",
                    Red.paint(format!("❌ Could not load MIDI file: {}", midi_file.display()))
                );
                std::process::exit(1);
            };
            let report = inspect_midi(&song, limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "🎵 {} ({:.2}s, {:.1} BPM, {} notes)",
                    report.filename, report.duration, report.tempo_bpm, report.note_count
                );
                println!("Instruments:");
                for info in &report.instruments {
                    let drum = if info.is_drum { " [drums]" } else { "" };
                    println!(
                        "  {} (program {}){}: {} notes",
                        info.name, info.program, drum, info.note_count
                    );
                }
                println!("First {} notes:", report.notes.len());
                for note in &report.notes {
                    println!("  {}", note);
                }
            }
            if !no_plot {
                visualize::visualize_notes(&song, plot.as_deref())?;
            }
        }

        Commands::Dataset { command } => match command {
            DatasetCommands::Mkdir { dir } => {
                dataset::create_directory(&dir)?;
            }
            DatasetCommands::List { root, filter } => {
                let folders = dataset::list_artist_folders(&root, filter.as_deref());
                if folders.is_empty() {
                    println!(
                        "{}",
                        Yellow.paint("No artist folders found! Check the source directory path.")
                    );
                } else {
                    println!("Found {} artist folders:", folders.len());
                    for folder in folders {
                        println!("  {}", folder);
                    }
                }
            }
            DatasetCommands::Copy {
                source_dir,
                target_dir,
                artist,
            } => {
                dataset::create_directory(&target_dir)?;
                let copied = dataset::copy_midi_files(&source_dir, &target_dir, artist.as_deref())?;
                println!(
                    "{}",
                    Green.paint(format!("✅ {} files in {}", copied, target_dir.display()))
                );
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn convert_accepts_underscore_flags() {
        let cli = Cli::try_parse_from([
            "midi_pianoroll",
            "convert",
            "in",
            "out",
            "--time_step",
            "0.1",
            "--separate_bars",
        ])
        .unwrap();
        let Commands::Convert {
            time_step,
            separate_bars,
            tempo,
            ..
        } = cli.command
        else {
            panic!("expected convert");
        };
        assert_eq!(time_step, Some(0.1));
        assert!(separate_bars);
        assert_eq!(tempo, None);
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["midi_pianoroll", "convert", "in"]).is_err());
        assert!(Cli::try_parse_from([
            "midi_pianoroll",
            "convert",
            "in",
            "out",
            "--time_step",
            "fast"
        ])
        .is_err());
    }

    #[test]
    fn only_convert_traps_ctrl_c() {
        let parse = |args: &[&str]| Cli::try_parse_from(args.iter().copied()).unwrap().command;
        assert!(stops_gracefully(&parse(&["midi_pianoroll", "convert", "in", "out"])));
        assert!(!stops_gracefully(&parse(&["midi_pianoroll", "visualize", "roll.npz"])));
        assert!(!stops_gracefully(&parse(&["midi_pianoroll", "inspect", "song.mid"])));
        assert!(!stops_gracefully(&parse(&[
            "midi_pianoroll",
            "dataset",
            "copy",
            "corpus",
            "flat"
        ])));
    }

    #[test]
    fn flags_override_defaults() {
        let options = resolve_options(None, Some(0.02), true, None).unwrap();
        assert_eq!(options.time_step, 0.02);
        assert!(options.separate_bars);
        assert_eq!(options.tempo, 120.0);
    }
}
