//! PNG rendering of piano rolls and note events.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use midi_pianoroll_shared::{show_image, MidiSong};

use crate::error::{Error, Result};
use crate::pianoroll::NUM_PITCHES;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID_GREY: Rgb<u8> = Rgb([220, 220, 220]);

// matplotlib's tab10 cycle
const PALETTE: [[u8; 3]; 10] = [
    [31, 119, 180],
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
    [188, 189, 34],
    [23, 190, 207],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatmapStyle {
    /// Pixels per time step
    pub cell_width: u32,
    /// Pixels per pitch
    pub cell_height: u32,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        HeatmapStyle {
            cell_width: 2,
            cell_height: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterStyle {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    /// Marker edge length in pixels
    pub marker: u32,
}

impl Default for ScatterStyle {
    fn default() -> Self {
        ScatterStyle {
            width: 1200,
            height: 600,
            margin: 40,
            marker: 4,
        }
    }
}

/// Black -> red -> yellow -> white, like matplotlib's "hot".
pub fn hot_colormap(x: f64) -> Rgb<u8> {
    let x = x.clamp(0.0, 1.0);
    let channel = |lo: f64, hi: f64| (((x - lo) / (hi - lo)).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([
        channel(0.0, 0.365079),
        channel(0.365079, 0.746032),
        channel(0.746032, 1.0),
    ])
}

/// Render a `(time, pitch)` grid with time left to right and pitch 0 at the
/// bottom. Colours are scaled to the grid's largest value.
pub fn render_pianoroll(grid: ArrayView2<'_, u8>, style: &HeatmapStyle) -> RgbImage {
    let (steps, pitches) = grid.dim();
    let cw = style.cell_width.max(1);
    let ch = style.cell_height.max(1);
    let width = steps.max(1) as u32 * cw;
    let height = pitches.max(1) as u32 * ch;
    let mut img = RgbImage::from_pixel(width, height, hot_colormap(0.0));

    let vmax = grid.iter().copied().max().unwrap_or(0);
    if vmax == 0 {
        return img;
    }
    for ((t, p), &v) in grid.indexed_iter() {
        if v == 0 {
            continue;
        }
        let colour = hot_colormap(v as f64 / vmax as f64);
        let x0 = t as u32 * cw;
        let y0 = (pitches - 1 - p) as u32 * ch;
        for y in y0..y0 + ch {
            for x in x0..x0 + cw {
                img.put_pixel(x, y, colour);
            }
        }
    }
    img
}

/// Scatter plot of (start time, pitch), one colour per instrument.
pub fn render_note_scatter(song: &MidiSong, style: &ScatterStyle) -> RgbImage {
    let mut img = RgbImage::from_pixel(style.width, style.height, WHITE);
    let left = style.margin;
    let right = style.width.saturating_sub(style.margin / 2).max(left + 1);
    let top = style.margin / 2;
    let bottom = style.height.saturating_sub(style.margin).max(top + 1);
    let plot_w = (right - left) as f64;
    let plot_h = (bottom - top) as f64;

    let duration = song.end_time();
    let duration = if duration > 0.0 { duration } else { 1.0 };
    let to_x = |t: f64| left + ((t / duration).clamp(0.0, 1.0) * plot_w) as u32;
    let to_y = |pitch: u8| {
        bottom - ((pitch as f64 / (NUM_PITCHES - 1) as f64) * plot_h) as u32
    };

    // octave grid lines
    for pitch in (0..NUM_PITCHES as u8).step_by(12) {
        let y = to_y(pitch);
        for x in left..right {
            img.put_pixel(x, y, GRID_GREY);
        }
    }
    for x in left..=right.min(style.width - 1) {
        img.put_pixel(x, bottom.min(style.height - 1), BLACK);
    }
    for y in top..=bottom.min(style.height - 1) {
        img.put_pixel(left, y, BLACK);
    }
    // ten time ticks
    for i in 0..=10 {
        let x = to_x(duration * i as f64 / 10.0).min(style.width - 1);
        for y in bottom..(bottom + 5).min(style.height) {
            img.put_pixel(x, y, BLACK);
        }
    }

    let half = style.marker / 2;
    for (i, instrument) in song.instruments.iter().enumerate() {
        let colour = Rgb(PALETTE[i % PALETTE.len()]);
        log::info!(
            "{} -> #{:02x}{:02x}{:02x}",
            instrument.label(),
            colour[0],
            colour[1],
            colour[2]
        );
        for note in &instrument.notes {
            let cx = to_x(note.start);
            let cy = to_y(note.pitch.min(NUM_PITCHES as u8 - 1));
            for y in cy.saturating_sub(half)..(cy + half + 1).min(style.height) {
                for x in cx.saturating_sub(half)..(cx + half + 1).min(style.width) {
                    img.put_pixel(x, y, colour);
                }
            }
        }
    }
    img
}

pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    img.save(path).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Save `img` to `save_path`, or to a temp file that is opened in a viewer.
/// Returns where the image ended up.
pub fn save_or_show(img: &RgbImage, save_path: Option<&Path>, label: &str) -> Result<PathBuf> {
    if let Some(path) = save_path {
        save_image(img, path)?;
        log::info!("Plot saved to {}", path.display());
        return Ok(path.to_path_buf());
    }
    let path = std::env::temp_dir().join(format!(
        "midi_pianoroll_{}.png",
        label.replace(|c: char| !c.is_ascii_alphanumeric(), "_")
    ));
    save_image(img, &path)?;
    if let Err(e) = show_image(&path) {
        log::error!("Could not open viewer for {}: {}", path.display(), e);
    }
    Ok(path)
}

pub fn visualize_pianoroll(grid: ArrayView2<'_, u8>, save_path: Option<&Path>) -> Result<PathBuf> {
    let img = render_pianoroll(grid, &HeatmapStyle::default());
    save_or_show(&img, save_path, "pianoroll")
}

pub fn visualize_notes(song: &MidiSong, save_path: Option<&Path>) -> Result<PathBuf> {
    let img = render_note_scatter(song, &ScatterStyle::default());
    save_or_show(&img, save_path, &format!("notes_{}", song.name))
}
