//! Minimal reader/writer for the NumPy `.npy` array format.
//!
//! Reads little-endian `f8`, `f4`, `u2`, `i4` and `i8` arrays in C order;
//! writes `f8` arrays (format version 1.0).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum NpyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not an .npy stream (bad magic)")]
    BadMagic,
    #[error("unsupported .npy format version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("malformed .npy header: {0}")]
    BadHeader(String),
    #[error("unsupported dtype '{0}'")]
    UnsupportedDtype(String),
    #[error("Fortran-ordered arrays are not supported")]
    FortranOrder,
    #[error("shape {shape:?} does not match {len} values")]
    ShapeMismatch { shape: Vec<usize>, len: usize },
}

/// Typed element buffer of an `.npy` array.
#[derive(Clone, Debug, PartialEq)]
pub enum NpyData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: NpyData,
}

impl NpyArray {
    pub fn len(&self) -> usize {
        match &self.data {
            NpyData::F64(v) => v.len(),
            NpyData::F32(v) => v.len(),
            NpyData::U16(v) => v.len(),
            NpyData::I32(v) => v.len(),
            NpyData::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values widened to `f64`, in C order.
    pub fn to_f64(&self) -> Vec<f64> {
        match &self.data {
            NpyData::F64(v) => v.clone(),
            NpyData::F32(v) => v.iter().map(|&x| x as f64).collect(),
            NpyData::U16(v) => v.iter().map(|&x| x as f64).collect(),
            NpyData::I32(v) => v.iter().map(|&x| x as f64).collect(),
            NpyData::I64(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Text between the quotes following `'key':`.
fn quoted_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let rest = &header[header.find(&format!("'{key}'"))? + key.len() + 2..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let body = &rest[1..];
    Some(&body[..body.find(quote)?])
}

fn raw_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let rest = &header[header.find(&format!("'{key}'"))? + key.len() + 2..];
    Some(rest.trim_start().strip_prefix(':')?.trim_start())
}

fn parse_header(text: &str) -> Result<Header, NpyError> {
    let bad = |what: &str| NpyError::BadHeader(format!("{what} in {text:?}"));

    let descr = quoted_value(text, "descr").ok_or_else(|| bad("missing descr"))?;

    let fortran = raw_value(text, "fortran_order").ok_or_else(|| bad("missing fortran_order"))?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err(bad("bad fortran_order"));
    };

    let shape_src = raw_value(text, "shape").ok_or_else(|| bad("missing shape"))?;
    let inner = shape_src
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| bad("bad shape"))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| bad("bad shape"))?;

    Ok(Header {
        descr: descr.to_string(),
        fortran_order,
        shape,
    })
}

fn decode_le<const N: usize, T>(bytes: &[u8], f: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|c| {
            let mut b = [0u8; N];
            b.copy_from_slice(c);
            f(b)
        })
        .collect()
}

/// Read one `.npy` array from a stream.
pub fn read_npy<R: Read>(mut reader: R) -> Result<NpyArray, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(NpyError::BadMagic);
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut b = [0u8; 2];
            reader.read_exact(&mut b)?;
            u16::from_le_bytes(b) as usize
        }
        2 | 3 => {
            let mut b = [0u8; 4];
            reader.read_exact(&mut b)?;
            u32::from_le_bytes(b) as usize
        }
        _ => return Err(NpyError::UnsupportedVersion(version[0], version[1])),
    };

    let mut header_bytes = vec![0u8; header_len];
    reader.read_exact(&mut header_bytes)?;
    let text = String::from_utf8_lossy(&header_bytes);
    let header = parse_header(&text)?;
    if header.fortran_order && header.shape.len() > 1 {
        return Err(NpyError::FortranOrder);
    }

    let item_size: usize = match header.descr.as_str() {
        "<f8" | "<i8" => 8,
        "<f4" | "<i4" => 4,
        "<u2" => 2,
        other => return Err(NpyError::UnsupportedDtype(other.to_string())),
    };
    let byte_len = header
        .shape
        .iter()
        .try_fold(item_size, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| NpyError::BadHeader(format!("shape {:?} overflows", header.shape)))?;

    // header size is untrusted: never preallocate it
    let mut bytes = Vec::new();
    reader.take(byte_len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != byte_len {
        return Err(NpyError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("array data has {} of {byte_len} bytes", bytes.len()),
        )));
    }

    let data = match header.descr.as_str() {
        "<f8" => NpyData::F64(decode_le(&bytes, f64::from_le_bytes)),
        "<f4" => NpyData::F32(decode_le(&bytes, f32::from_le_bytes)),
        "<u2" => NpyData::U16(decode_le(&bytes, u16::from_le_bytes)),
        "<i4" => NpyData::I32(decode_le(&bytes, i32::from_le_bytes)),
        _ => NpyData::I64(decode_le(&bytes, i64::from_le_bytes)),
    };

    Ok(NpyArray {
        shape: header.shape,
        data,
    })
}

pub fn read_npy_file(path: impl AsRef<Path>) -> Result<NpyArray, NpyError> {
    read_npy(BufReader::new(File::open(path)?))
}

fn shape_literal(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Write a C-ordered `f64` array.
pub fn write_npy_f64<W: Write>(
    mut writer: W,
    shape: &[usize],
    data: &[f64],
) -> Result<(), NpyError> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(NpyError::ShapeMismatch {
            shape: shape.to_vec(),
            len: data.len(),
        });
    }

    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        shape_literal(shape)
    );
    // magic + version + u16 length + header + '\n' is a multiple of 64
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| NpyError::BadHeader("header longer than 65535 bytes".into()))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;
    for v in data {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_npy_f64_file(
    path: impl AsRef<Path>,
    shape: &[usize],
    data: &[f64],
) -> Result<(), NpyError> {
    write_npy_f64(BufWriter::new(File::create(path)?), shape, data)
}
