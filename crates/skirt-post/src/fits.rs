//! Minimal read-only FITS support for SKIRT output files.
//!
//! SKIRT writes simple files: a primary HDU holding a big-endian float image
//! or cube, plus one extension carrying the wavelength grid as either a 1-D
//! image or a single-column binary table. This module parses exactly that
//! subset (2880-byte blocks, 80-character header cards, BITPIX
//! 8/16/32/64/-32/-64 with BSCALE/BZERO, one-column BINTABLE data) and
//! rejects everything else with a descriptive error.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// FITS block size in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// Header card size in bytes.
pub const CARD_SIZE: usize = 80;

/// Error raised while parsing a FITS file.
#[derive(Debug, Error)]
pub enum FitsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a FITS file (missing SIMPLE card)")]
    NotFits { path: PathBuf },

    #[error("{path} is truncated")]
    Truncated { path: PathBuf },

    #[error("{path}: unsupported BITPIX {bitpix}")]
    UnsupportedBitpix { path: PathBuf, bitpix: i64 },

    #[error("{path}: missing required keyword {key}")]
    MissingKeyword { path: PathBuf, key: String },

    #[error("{path}: unsupported binary table layout ({detail})")]
    UnsupportedTable { path: PathBuf, detail: String },
}

/// A parsed header card value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

/// An HDU header: keyword/value pairs in file order.
#[derive(Debug, Clone, Default)]
pub struct Header {
    cards: Vec<(String, Value)>,
}

impl Header {
    /// First value recorded for a keyword.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cards.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keyword as an integer, converting from Real when exact.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Integer(v) => Some(*v),
            Value::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Keyword as a float.
    pub fn real(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Keyword as text.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// What kind of HDU the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduKind {
    Primary,
    Image,
    BinTable,
}

/// One HDU with its numeric payload flattened to f64.
///
/// `shape` is row-major with the slowest axis first, so a cube with
/// NAXIS1 = nx, NAXIS2 = ny, NAXIS3 = nlam has shape `[nlam, ny, nx]`.
#[derive(Debug, Clone)]
pub struct Hdu {
    pub kind: HduKind,
    pub header: Header,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

/// A parsed FITS file: primary HDU plus any extensions.
#[derive(Debug, Clone)]
pub struct FitsFile {
    pub primary: Hdu,
    pub extensions: Vec<Hdu>,
}

/// Reads and parses a whole FITS file.
pub fn read_file(path: &Path) -> Result<FitsFile, FitsError> {
    let bytes = std::fs::read(path).map_err(|e| FitsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(&bytes, path)
}

/// Parses FITS bytes; `path` is only used in error messages.
pub fn parse(bytes: &[u8], path: &Path) -> Result<FitsFile, FitsError> {
    let mut offset = 0;
    let (header, data_offset) = parse_header(bytes, offset, path)?;
    if header.get("SIMPLE").is_none() {
        return Err(FitsError::NotFits {
            path: path.to_path_buf(),
        });
    }
    let (primary, next) = parse_image_data(bytes, data_offset, &header, HduKind::Primary, path)?;
    offset = next;

    let mut extensions = Vec::new();
    while offset + BLOCK_SIZE <= bytes.len() {
        let (header, data_offset) = parse_header(bytes, offset, path)?;
        let kind = match header.text("XTENSION").map(str::trim) {
            Some("IMAGE") => HduKind::Image,
            Some("BINTABLE") | Some("TABLE") => HduKind::BinTable,
            _ => break,
        };
        let (hdu, next) = match kind {
            HduKind::BinTable => parse_bintable_data(bytes, data_offset, &header, path)?,
            _ => parse_image_data(bytes, data_offset, &header, kind, path)?,
        };
        extensions.push(hdu);
        offset = next;
    }

    Ok(FitsFile {
        primary,
        extensions,
    })
}

/// Parses header blocks starting at `offset`; returns the header and the
/// byte offset of the data that follows it.
fn parse_header(
    bytes: &[u8],
    mut offset: usize,
    path: &Path,
) -> Result<(Header, usize), FitsError> {
    let mut header = Header::default();
    loop {
        let block = bytes
            .get(offset..offset + BLOCK_SIZE)
            .ok_or_else(|| FitsError::Truncated {
                path: path.to_path_buf(),
            })?;
        offset += BLOCK_SIZE;
        for card in block.chunks_exact(CARD_SIZE) {
            let keyword = String::from_utf8_lossy(&card[0..8]).trim_end().to_string();
            if keyword == "END" {
                return Ok((header, offset));
            }
            if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
                continue;
            }
            if &card[8..10] != b"= " {
                continue;
            }
            if let Some(value) = parse_value(&card[10..]) {
                header.cards.push((keyword, value));
            }
        }
    }
}

/// Parses the value field of a card (everything after `= `).
fn parse_value(field: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(field);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix('\'') {
        // String value: up to the closing quote; FITS pads with blanks.
        let end = rest.find('\'')?;
        return Some(Value::Text(rest[..end].trim_end().to_string()));
    }
    // Strip the inline comment for non-string values.
    let value_part = trimmed.split('/').next().unwrap_or("").trim();
    match value_part {
        "T" => return Some(Value::Logical(true)),
        "F" => return Some(Value::Logical(false)),
        _ => {}
    }
    if let Ok(v) = value_part.parse::<i64>() {
        return Some(Value::Integer(v));
    }
    // FITS allows Fortran-style D exponents.
    let normalized = value_part.replace(['D', 'd'], "E");
    normalized.parse::<f64>().ok().map(Value::Real)
}

/// Number of data elements described by NAXIS/NAXISn.
fn element_count(header: &Header, path: &Path) -> Result<(Vec<usize>, usize), FitsError> {
    let naxis = header
        .integer("NAXIS")
        .ok_or_else(|| missing(path, "NAXIS"))?;
    let mut shape_rev = Vec::new();
    let mut count = if naxis == 0 { 0 } else { 1 };
    for i in 1..=naxis {
        let len = header
            .integer(&format!("NAXIS{}", i))
            .ok_or_else(|| missing(path, &format!("NAXIS{}", i)))? as usize;
        shape_rev.push(len);
        count *= len;
    }
    // Slowest axis first.
    let shape: Vec<usize> = shape_rev.into_iter().rev().collect();
    Ok((shape, count))
}

fn missing(path: &Path, key: &str) -> FitsError {
    FitsError::MissingKeyword {
        path: path.to_path_buf(),
        key: key.to_string(),
    }
}

/// Parses image-array data (primary or IMAGE extension).
fn parse_image_data(
    bytes: &[u8],
    offset: usize,
    header: &Header,
    kind: HduKind,
    path: &Path,
) -> Result<(Hdu, usize), FitsError> {
    let bitpix = header
        .integer("BITPIX")
        .ok_or_else(|| missing(path, "BITPIX"))?;
    let (shape, count) = element_count(header, path)?;
    let width = (bitpix.unsigned_abs() / 8) as usize;
    let data_len = count * width;
    let raw = bytes
        .get(offset..offset + data_len)
        .ok_or_else(|| FitsError::Truncated {
            path: path.to_path_buf(),
        })?;

    let bscale = header.real("BSCALE").unwrap_or(1.0);
    let bzero = header.real("BZERO").unwrap_or(0.0);

    let mut data = Vec::with_capacity(count);
    match bitpix {
        8 => data.extend(raw.iter().map(|&b| b as f64)),
        16 => data.extend(
            raw.chunks_exact(2)
                .map(|c| i16::from_be_bytes([c[0], c[1]]) as f64),
        ),
        32 => data.extend(
            raw.chunks_exact(4)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        64 => data.extend(raw.chunks_exact(8).map(|c| {
            i64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64
        })),
        -32 => data.extend(
            raw.chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        -64 => data.extend(raw.chunks_exact(8).map(|c| {
            f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        })),
        other => {
            return Err(FitsError::UnsupportedBitpix {
                path: path.to_path_buf(),
                bitpix: other,
            })
        }
    }
    if bscale != 1.0 || bzero != 0.0 {
        for v in &mut data {
            *v = bscale * *v + bzero;
        }
    }

    let next = offset + data_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    Ok((
        Hdu {
            kind,
            header: header.clone(),
            shape,
            data,
        },
        next,
    ))
}

/// Parses a one-column numeric BINTABLE into a flat vector.
fn parse_bintable_data(
    bytes: &[u8],
    offset: usize,
    header: &Header,
    path: &Path,
) -> Result<(Hdu, usize), FitsError> {
    let row_bytes = header
        .integer("NAXIS1")
        .ok_or_else(|| missing(path, "NAXIS1"))? as usize;
    let rows = header
        .integer("NAXIS2")
        .ok_or_else(|| missing(path, "NAXIS2"))? as usize;
    let tform = header
        .text("TFORM1")
        .ok_or_else(|| missing(path, "TFORM1"))?
        .trim()
        .to_string();

    // Only the first field is read; its type code is the last character.
    let code = tform
        .chars()
        .last()
        .ok_or_else(|| table_err(path, "empty TFORM1"))?;
    let width = match code {
        'E' | 'J' => 4,
        'D' | 'K' => 8,
        other => return Err(table_err(path, &format!("TFORM1 type {other}"))),
    };
    if row_bytes < width {
        return Err(table_err(path, "row shorter than first field"));
    }

    let data_len = row_bytes * rows;
    let raw = bytes
        .get(offset..offset + data_len)
        .ok_or_else(|| FitsError::Truncated {
            path: path.to_path_buf(),
        })?;

    let mut data = Vec::with_capacity(rows);
    for row in raw.chunks_exact(row_bytes.max(1)) {
        let v = match code {
            'E' => f32::from_be_bytes([row[0], row[1], row[2], row[3]]) as f64,
            'J' => i32::from_be_bytes([row[0], row[1], row[2], row[3]]) as f64,
            'D' => f64::from_be_bytes([
                row[0], row[1], row[2], row[3], row[4], row[5], row[6], row[7],
            ]),
            'K' => i64::from_be_bytes([
                row[0], row[1], row[2], row[3], row[4], row[5], row[6], row[7],
            ]) as f64,
            _ => unreachable!(),
        };
        data.push(v);
    }

    let next = offset + data_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    Ok((
        Hdu {
            kind: HduKind::BinTable,
            header: header.clone(),
            shape: vec![rows],
            data,
        },
        next,
    ))
}

fn table_err(path: &Path, detail: &str) -> FitsError {
    FitsError::UnsupportedTable {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
pub mod testutil {
    //! Builders for synthetic FITS bytes used across the crate's tests.

    use super::{BLOCK_SIZE, CARD_SIZE};

    /// Formats one header card.
    pub fn card(keyword: &str, value: &str) -> Vec<u8> {
        let mut s = format!("{:<8}= {:>20}", keyword, value);
        s.truncate(CARD_SIZE);
        let mut bytes = s.into_bytes();
        bytes.resize(CARD_SIZE, b' ');
        bytes
    }

    /// Pads cards (plus END) out to a whole number of blocks.
    pub fn header_block(cards: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for c in cards {
            out.extend_from_slice(c);
        }
        out.extend_from_slice(&card("END", ""));
        while out.len() % BLOCK_SIZE != 0 {
            out.push(b' ');
        }
        out
    }

    /// Pads data out to a whole number of blocks.
    pub fn data_block(mut data: Vec<u8>) -> Vec<u8> {
        while data.len() % BLOCK_SIZE != 0 {
            data.push(0);
        }
        data
    }

    /// A primary HDU holding a little f64 cube of shape (nlam, ny, nx).
    pub fn primary_cube(nlam: usize, ny: usize, nx: usize, values: &[f64]) -> Vec<u8> {
        assert_eq!(values.len(), nlam * ny * nx);
        let cards = vec![
            card("SIMPLE", "T"),
            card("BITPIX", "-64"),
            card("NAXIS", "3"),
            card("NAXIS1", &nx.to_string()),
            card("NAXIS2", &ny.to_string()),
            card("NAXIS3", &nlam.to_string()),
        ];
        let mut bytes = header_block(&cards);
        let mut data = Vec::new();
        for v in values {
            data.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend(data_block(data));
        bytes
    }

    /// An IMAGE extension holding a 1-D f64 vector.
    pub fn image_extension(values: &[f64]) -> Vec<u8> {
        let cards = vec![
            card("XTENSION", "'IMAGE   '"),
            card("BITPIX", "-64"),
            card("NAXIS", "1"),
            card("NAXIS1", &values.len().to_string()),
        ];
        let mut bytes = header_block(&cards);
        let mut data = Vec::new();
        for v in values {
            data.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend(data_block(data));
        bytes
    }
}
