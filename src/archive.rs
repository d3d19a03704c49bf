//! Piano-roll archives in NumPy's `.npz` layout.
//!
//! An archive is a deflate-compressed zip with one `.npy` member per named
//! array, so files written here load with `numpy.load`. Only 2-D unsigned
//! 8-bit arrays are supported.
//!
//! The full grid lives under `pianoroll`. Bars have irregular lengths and
//! cannot share one rectangular array, so each bar gets its own member,
//! `bars/0000`, `bars/0001`, ... Archives that store bars as one pickled
//! object array under `bars` still load, without their bars.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2, ShapeBuilder};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::pianoroll::PianoRoll;

pub const PIANOROLL_KEY: &str = "pianoroll";
pub const BARS_KEY: &str = "bars";
pub const ARCHIVE_EXTENSION: &str = "npz";

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_SUFFIX: &str = ".npy";
const HEADER_ALIGN: usize = 64;
const U8_DESCRS: &[&str] = &["|u1", "u1", "<u1", ">u1", "=u1"];

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{name}: not an .npy array")]
    NotNpy { name: String },
    #[error("{name}: malformed .npy header ({reason})")]
    MalformedHeader { name: String, reason: String },
    #[error("{name}: unsupported dtype '{descr}', expected unsigned 8-bit")]
    UnsupportedDtype { name: String, descr: String },
    #[error("{name}: expected a 2-D array, got shape {shape:?}")]
    NotTwoDimensional { name: String, shape: Vec<usize> },
    #[error("{name}: shape ({rows}, {cols}) does not match {found} data bytes")]
    SizeMismatch {
        name: String,
        rows: usize,
        cols: usize,
        found: usize,
    },
    #[error("{}: no '{key}' array in archive", path.display())]
    MissingKey { path: PathBuf, key: String },
}

/// Serialize one array as `.npy` version 1.0.
pub fn encode_npy(array: ArrayView2<'_, u8>) -> Vec<u8> {
    let (rows, cols) = array.dim();
    let mut header = format!(
        "{{'descr': '|u1', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );
    // magic + version + u16 length + header + trailing newline
    let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(NPY_MAGIC.len() + 4 + header.len() + rows * cols);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend(array.iter().copied());
    out
}

/// Parse a `.npy` member holding a 2-D `u8` array. `name` only labels errors.
pub fn decode_npy(name: &str, bytes: &[u8]) -> Result<Array2<u8>, ArchiveError> {
    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) {
        return Err(ArchiveError::NotNpy {
            name: name.to_string(),
        });
    }
    let malformed = |reason: &str| ArchiveError::MalformedHeader {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let (header_start, header_len) = match bytes[6] {
        1 => (10, u16::from_le_bytes([bytes[8], bytes[9]]) as usize),
        2 | 3 => {
            let len = bytes
                .get(8..12)
                .ok_or_else(|| malformed("truncated length"))?;
            (12, u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize)
        }
        _ => return Err(malformed("unknown format version")),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| malformed("truncated header"))?;
    let header = std::str::from_utf8(header).map_err(|_| malformed("header is not text"))?;

    let descr = header_value(header, "descr")
        .and_then(|v| v.strip_prefix('\''))
        .and_then(|v| v.split('\'').next())
        .ok_or_else(|| malformed("missing descr"))?;
    if !U8_DESCRS.contains(&descr) {
        return Err(ArchiveError::UnsupportedDtype {
            name: name.to_string(),
            descr: descr.to_string(),
        });
    }
    let fortran_order = header_value(header, "fortran_order")
        .ok_or_else(|| malformed("missing fortran_order"))?
        .starts_with("True");
    let shape = header_value(header, "shape")
        .and_then(|v| v.strip_prefix('('))
        .and_then(|v| v.split(')').next())
        .ok_or_else(|| malformed("missing shape"))?
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed("bad shape"))?;

    if shape.len() != 2 {
        return Err(ArchiveError::NotTwoDimensional {
            name: name.to_string(),
            shape,
        });
    }
    let (rows, cols) = (shape[0], shape[1]);
    let data = &bytes[data_start..];
    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| malformed("shape overflows"))?;
    if data.len() != expected {
        return Err(ArchiveError::SizeMismatch {
            name: name.to_string(),
            rows,
            cols,
            found: data.len(),
        });
    }

    let array = if fortran_order {
        Array2::from_shape_vec((rows, cols).f(), data.to_vec())
    } else {
        Array2::from_shape_vec((rows, cols), data.to_vec())
    };
    array.map_err(|e| malformed(&e.to_string()))
}

/// The text following `'key':` in an npy header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let at = header.find(&pattern)?;
    Some(header[at + pattern.len()..].trim_start())
}

/// Write named arrays to a compressed archive. Keys go through `ToString`.
pub fn write_npz<'a, K, I>(path: &Path, entries: I) -> Result<(), ArchiveError>
where
    K: ToString,
    I: IntoIterator<Item = (K, ArrayView2<'a, u8>)>,
{
    let io_err = |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };
    let zip_err = |source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (key, array) in entries {
        let member = format!("{}{}", key.to_string(), NPY_SUFFIX);
        writer.start_file(member, options).map_err(zip_err)?;
        writer.write_all(&encode_npy(array)).map_err(io_err)?;
    }
    writer.finish().map_err(zip_err)?;
    Ok(())
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    })
}

/// Name and raw bytes of member `index`.
fn read_member(
    archive: &mut ZipArchive<File>,
    index: usize,
    path: &Path,
) -> Result<(String, Vec<u8>), ArchiveError> {
    let mut member = archive.by_index(index).map_err(|source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    })?;
    let name = member.name().to_string();
    let mut bytes = Vec::with_capacity(member.size() as usize);
    member
        .read_to_end(&mut bytes)
        .map_err(|source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok((name, bytes))
}

fn member_key(name: &str) -> &str {
    name.strip_suffix(NPY_SUFFIX).unwrap_or(name)
}

/// Read every array of an archive, in archive order, keyed without `.npy`.
pub fn read_npz(path: &Path) -> Result<Vec<(String, Array2<u8>)>, ArchiveError> {
    let mut archive = open_archive(path)?;
    let mut arrays = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let (name, bytes) = read_member(&mut archive, i, path)?;
        let array = decode_npy(&name, &bytes)?;
        arrays.push((member_key(&name).to_string(), array));
    }
    Ok(arrays)
}

fn bar_key(index: usize) -> String {
    format!("{}/{:04}", BARS_KEY, index)
}

/// Save a piano roll, and its bars when present.
pub fn save_pianoroll(path: &Path, roll: &PianoRoll) -> Result<(), ArchiveError> {
    let mut entries = vec![(PIANOROLL_KEY.to_string(), roll.grid.view())];
    if let Some(bars) = &roll.bars {
        entries.extend(bars.iter().enumerate().map(|(i, bar)| (bar_key(i), bar.view())));
    }
    write_npz(path, entries)?;
    log::info!("Pianoroll saved to {}", path.display());
    Ok(())
}

/// Load an archive written by [`save_pianoroll`] (or by numpy with the same
/// key layout).
///
/// Only `pianoroll` and `bars/NNNN` are decoded. Bars that are not `u8`
/// arrays, such as a pickled `bars` object array, are dropped with a warning.
pub fn load_pianoroll(path: &Path) -> Result<PianoRoll, ArchiveError> {
    let mut archive = open_archive(path)?;
    let mut grid = None;
    let mut bars = Vec::new();
    let mut bars_unreadable = false;
    let bar_prefix = format!("{}/", BARS_KEY);
    for i in 0..archive.len() {
        let (name, bytes) = read_member(&mut archive, i, path)?;
        let key = member_key(&name);
        if key == PIANOROLL_KEY {
            grid = Some(decode_npy(&name, &bytes)?);
        } else if key == BARS_KEY {
            bars_unreadable = true;
        } else if let Some(index) = key
            .strip_prefix(&bar_prefix)
            .and_then(|i| i.parse::<usize>().ok())
        {
            match decode_npy(&name, &bytes) {
                Ok(bar) => bars.push((index, bar)),
                Err(ArchiveError::UnsupportedDtype { .. }) => bars_unreadable = true,
                Err(e) => return Err(e),
            }
        } else {
            log::debug!("{}: ignoring member '{}'", path.display(), name);
        }
    }
    let grid = grid.ok_or_else(|| ArchiveError::MissingKey {
        path: path.to_path_buf(),
        key: PIANOROLL_KEY.to_string(),
    })?;
    if bars_unreadable {
        log::warn!(
            "{}: bars are not stored as u8 arrays, loading the full grid only",
            path.display()
        );
        bars.clear();
    }
    bars.sort_by_key(|&(index, _)| index);
    let bars = if bars.is_empty() {
        None
    } else {
        Some(bars.into_iter().map(|(_, bar)| bar).collect())
    };
    Ok(PianoRoll { grid, bars })
}
