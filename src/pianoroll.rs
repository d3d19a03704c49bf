//! Piano-roll construction.
//!
//! A piano roll is a `(time_steps, 128)` grid of `u8` velocities. Row `t`
//! covers `[t * time_step, (t + 1) * time_step)` seconds.
//!
//! Two behaviors are kept on purpose for compatibility with existing
//! datasets and are easy to "fix" by accident:
//!
//! * **Last write wins.** Notes are written in input order; a later note on
//!   the same pitch overwrites an earlier one wherever their rows overlap.
//!   Velocities are never summed or maxed.
//! * **Sub-resolution notes vanish.** Start and end are truncated to whole
//!   steps independently, so a note that starts and ends inside the same
//!   step writes no cells at all.

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use midi_pianoroll_shared::NoteEvent;

pub const NUM_PITCHES: usize = 128;
pub const DEFAULT_TIME_STEP: f64 = 0.05;
pub const DEFAULT_TEMPO: f64 = 120.0;
/// Bars are assumed to be 4/4
pub const BEATS_PER_BAR: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PianoRollError {
    #[error("cannot build a piano roll from an empty note list")]
    EmptyNotes,
    #[error("time step must be a positive number of seconds, got {0}")]
    InvalidTimeStep(f64),
    #[error("tempo must be a positive number of BPM, got {0}")]
    InvalidTempo(f64),
    #[error("pitch {0} does not fit in a 128-pitch roll")]
    PitchOutOfRange(u8),
    #[error("a bar at {tempo} BPM is shorter than one {time_step}s time step")]
    EmptyBar { tempo: f64, time_step: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PianoRollOptions {
    /// Seconds per grid row
    pub time_step: f64,
    /// Also cut the grid into bar-length chunks
    pub separate_bars: bool,
    /// Beats per minute, used only for bar length
    pub tempo: f64,
}

impl Default for PianoRollOptions {
    fn default() -> Self {
        PianoRollOptions {
            time_step: DEFAULT_TIME_STEP,
            separate_bars: false,
            tempo: DEFAULT_TEMPO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PianoRoll {
    pub grid: Array2<u8>,
    /// Consecutive row chunks of `grid`; the last may be short
    pub bars: Option<Vec<Array2<u8>>>,
}

impl PianoRoll {
    pub fn num_steps(&self) -> usize {
        self.grid.nrows()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.dim()
    }
}

/// Build a piano roll from `notes`.
pub fn notes_to_pianoroll(
    notes: &[NoteEvent],
    options: &PianoRollOptions,
) -> Result<PianoRoll, PianoRollError> {
    let time_step = options.time_step;
    if !(time_step.is_finite() && time_step > 0.0) {
        return Err(PianoRollError::InvalidTimeStep(time_step));
    }
    if notes.is_empty() {
        return Err(PianoRollError::EmptyNotes);
    }
    if let Some(note) = notes.iter().find(|n| n.pitch as usize >= NUM_PITCHES) {
        return Err(PianoRollError::PitchOutOfRange(note.pitch));
    }

    let max_time = notes.iter().map(|n| n.end).fold(f64::NEG_INFINITY, f64::max);
    let num_steps = (max_time / time_step).ceil().max(0.0) as usize;
    let mut grid = Array2::<u8>::zeros((num_steps, NUM_PITCHES));

    for note in notes {
        let start_step = (note.start / time_step) as usize;
        let end_step = ((note.end / time_step) as usize).min(num_steps);
        if start_step >= end_step {
            continue;
        }
        grid.slice_mut(s![start_step..end_step, note.pitch as usize])
            .fill(note.velocity);
    }

    let bars = if options.separate_bars {
        let steps = bar_steps(time_step, options.tempo)?;
        Some(split_bars(grid.view(), steps))
    } else {
        None
    };

    Ok(PianoRoll { grid, bars })
}

/// Rows per 4/4 bar: `floor((60 / tempo) * 4 / time_step)`.
pub fn bar_steps(time_step: f64, tempo: f64) -> Result<usize, PianoRollError> {
    if !(time_step.is_finite() && time_step > 0.0) {
        return Err(PianoRollError::InvalidTimeStep(time_step));
    }
    if !(tempo.is_finite() && tempo > 0.0) {
        return Err(PianoRollError::InvalidTempo(tempo));
    }
    let bar_length = 60.0 / tempo * BEATS_PER_BAR;
    let steps = (bar_length / time_step) as usize;
    if steps == 0 {
        return Err(PianoRollError::EmptyBar { tempo, time_step });
    }
    Ok(steps)
}

/// Cut `grid` into consecutive chunks of `bar_steps` rows.
///
/// # Panics
///
/// Panics if `bar_steps` is zero.
pub fn split_bars(grid: ArrayView2<'_, u8>, bar_steps: usize) -> Vec<Array2<u8>> {
    assert!(bar_steps > 0, "bar_steps must be non-zero");
    let rows = grid.nrows();
    (0..rows)
        .step_by(bar_steps)
        .map(|start| {
            let end = (start + bar_steps).min(rows);
            grid.slice(s![start..end, ..]).to_owned()
        })
        .collect()
}
