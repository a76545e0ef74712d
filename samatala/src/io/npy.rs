//! NumPy `.npy` encoding for height maps.
//!
//! Format (version 1.0):
//! - Magic: `\x93NUMPY` (6 bytes)
//! - Version: major u8, minor u8
//! - Header length: u16 little-endian (u32 for versions 2 and 3)
//! - Header: Python dict literal, e.g.
//!   `{'descr': '<f4', 'fortran_order': False, 'shape': (200, 100), }`,
//!   space padded and newline terminated so the data starts on a 64-byte boundary
//! - Data: rows * cols little-endian values
//!
//! Height maps are written as `<f4`. Both `<f4` and `<f8` are accepted on read,
//! in C or Fortran order, since the optimizer side may hand back either.

use std::io::{Read, Write};

use thiserror::Error;

use crate::core::HeightMap;

/// Magic bytes for .npy format
const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Version written by this module
const VERSION: (u8, u8) = (1, 0);

/// Data offset alignment
const ALIGN: usize = 64;

/// Error type for .npy encoding
#[derive(Error, Debug)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported .npy version {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported dtype {0:?}")]
    UnsupportedDtype(String),

    #[error("Expected a 2-D array, found shape {0:?}")]
    Shape(Vec<usize>),
}

/// Element type of the stored array
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        match descr {
            "<f4" => Ok(Dtype::F32),
            "<f8" => Ok(Dtype::F64),
            other => Err(NpyError::UnsupportedDtype(other.to_string())),
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::F32 => 4,
            Dtype::F64 => 8,
        }
    }
}

/// Write a height map as `.npy` (`<f4`, C order).
pub fn write_npy<W: Write>(map: &HeightMap, writer: &mut W) -> Result<(), NpyError> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        map.rows(),
        map.cols()
    );

    // magic + version + u16 length + dict + trailing newline
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let mut header = dict;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| NpyError::InvalidFormat("header too long".to_string()))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION.0, VERSION.1])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;

    let mut data = Vec::with_capacity(map.len() * 4);
    for v in map.as_slice() {
        data.extend_from_slice(&v.to_le_bytes());
    }
    writer.write_all(&data)?;
    Ok(())
}

/// Encode a height map into an in-memory `.npy` buffer.
pub fn encode_npy(map: &HeightMap) -> Result<Vec<u8>, NpyError> {
    let mut buffer = Vec::with_capacity(128 + map.len() * 4);
    write_npy(map, &mut buffer)?;
    Ok(buffer)
}

/// Read a 2-D `.npy` array as a height map.
pub fn read_npy<R: Read>(reader: &mut R) -> Result<HeightMap, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NpyError::InvalidFormat("Invalid magic bytes".to_string()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        other => return Err(NpyError::UnsupportedVersion(other)),
    };

    let header = read_len(reader, header_len, "header")?;
    let header = String::from_utf8(header)
        .map_err(|_| NpyError::InvalidFormat("header is not valid text".to_string()))?;

    let descr = quoted_value(&header, "descr")?;
    let dtype = Dtype::parse(descr)?;
    let fortran_order = bool_value(&header, "fortran_order")?;
    let shape = shape_value(&header)?;
    if shape.len() != 2 {
        return Err(NpyError::Shape(shape));
    }
    let (rows, cols) = (shape[0], shape[1]);

    let byte_len = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(dtype.size()))
        .ok_or_else(|| NpyError::InvalidFormat("shape overflows".to_string()))?;
    let raw = read_len(reader, byte_len, "payload")?;

    let values: Vec<f32> = match dtype {
        Dtype::F32 => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F64 => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
    };

    let map = if fortran_order {
        // Column-major on disk: element (r, c) sits at c * rows + r
        HeightMap::from_fn(rows, cols, |r, c| values[c * rows + r])
    } else {
        HeightMap::from_vec(rows, cols, values)
            .ok_or_else(|| NpyError::InvalidFormat("data length mismatch".to_string()))?
    };
    Ok(map)
}

/// Read exactly `len` bytes. The buffer grows with the bytes actually read,
/// so a corrupt length cannot force a huge allocation up front.
fn read_len<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>, NpyError> {
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(NpyError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{} has {} of {} bytes", what, buf.len(), len),
        )));
    }
    Ok(buf)
}

/// Text following `'key':` in the header dict.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let needle = format!("'{}'", key);
    let start = header
        .find(&needle)
        .ok_or_else(|| NpyError::InvalidFormat(format!("missing key {:?}", key)))?;
    let rest = header[start + needle.len()..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| NpyError::InvalidFormat(format!("missing ':' after {:?}", key)))?;
    Ok(rest.trim_start())
}

fn quoted_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let rest = dict_value(header, key)?;
    let quote = rest
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| NpyError::InvalidFormat(format!("{:?} is not a string", key)))?;
    let body = &rest[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| NpyError::InvalidFormat(format!("unterminated {:?}", key)))?;
    Ok(&body[..end])
}

fn bool_value(header: &str, key: &str) -> Result<bool, NpyError> {
    let rest = dict_value(header, key)?;
    if rest.starts_with("True") {
        Ok(true)
    } else if rest.starts_with("False") {
        Ok(false)
    } else {
        Err(NpyError::InvalidFormat(format!("{:?} is not a bool", key)))
    }
}

fn shape_value(header: &str) -> Result<Vec<usize>, NpyError> {
    let rest = dict_value(header, "shape")?;
    let body = rest
        .strip_prefix('(')
        .and_then(|r| r.find(')').map(|end| &r[..end]))
        .ok_or_else(|| NpyError::InvalidFormat("shape is not a tuple".to_string()))?;
    body.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::InvalidFormat(format!("invalid dimension {:?}", s)))
        })
        .collect()
}
