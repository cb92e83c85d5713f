//! Reader for the NumPy `.npy` array format.
//!
//! Layout: magic `\x93NUMPY`, major/minor version bytes, a little-endian
//! header length (`u16` for 1.0, `u32` for 2.0 and 3.0), then a Python dict
//! literal with `descr`, `fortran_order` and `shape`, padded with spaces and
//! a trailing newline, followed by the raw array data.

use std::io::Read;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use robomanip_core::{Error, Result};
use serde::Serialize;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header dicts larger than this are rejected as corrupt.
const MAX_HEADER_LEN: usize = 1 << 20;

static DESCR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'descr'\s*:\s*'([^']*)'").unwrap());
static STRUCTURED_DESCR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)'descr'\s*:\s*(\[.*\])").unwrap());
static FORTRAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'fortran_order'\s*:\s*(True|False)").unwrap());
static SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").unwrap());

/// Byte order of multi-byte elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
    /// Single-byte or non-numeric types (`|`).
    NotApplicable,
}

/// Element type of an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int(usize),
    UInt(usize),
    Float(usize),
    /// Pickled Python objects; only the header is readable.
    Object,
    /// Anything else (strings, datetimes, structured types).
    Other(String),
}

impl DType {
    /// Size of one element in bytes, when fixed and known.
    pub fn item_size(&self) -> Option<usize> {
        match self {
            Self::Bool => Some(1),
            Self::Int(n) | Self::UInt(n) | Self::Float(n) => Some(*n),
            Self::Object | Self::Other(_) => None,
        }
    }

    /// Whether the payload can be decoded to numbers.
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Bool => true,
            Self::Int(n) | Self::UInt(n) => matches!(n, 1 | 2 | 4 | 8),
            Self::Float(n) => matches!(n, 4 | 8),
            Self::Object | Self::Other(_) => false,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int(n) => write!(f, "int{}", n * 8),
            Self::UInt(n) => write!(f, "uint{}", n * 8),
            Self::Float(n) => write!(f, "float{}", n * 8),
            Self::Object => write!(f, "object"),
            Self::Other(descr) => write!(f, "{}", descr),
        }
    }
}

/// Parse a dtype descriptor such as `<f8`, `|u1` or `|O`.
pub fn parse_descr(descr: &str) -> Result<(ByteOrder, DType)> {
    let mut chars = descr.chars();
    let order = match chars.next() {
        Some('<') | Some('=') => ByteOrder::Little,
        Some('>') => ByteOrder::Big,
        Some('|') => ByteOrder::NotApplicable,
        _ => return Err(Error::Npy(format!("unsupported descr '{}'", descr))),
    };
    let kind = chars
        .next()
        .ok_or_else(|| Error::Npy(format!("truncated descr '{}'", descr)))?;
    let size_str = chars.as_str();
    let size = || -> Result<usize> {
        size_str
            .parse()
            .map_err(|_| Error::Npy(format!("bad element size in descr '{}'", descr)))
    };

    let dtype = match kind {
        'b' if size_str == "1" => DType::Bool,
        'i' => DType::Int(size()?),
        'u' => DType::UInt(size()?),
        'f' => DType::Float(size()?),
        'O' => DType::Object,
        _ => DType::Other(descr.to_string()),
    };
    Ok((order, dtype))
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NpyHeader {
    pub version: (u8, u8),
    pub descr: String,
    #[serde(skip)]
    pub byte_order: ByteOrder,
    pub dtype: DType,
    #[serde(rename = "fortranOrder")]
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Number of elements (1 for a scalar), saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        element_count(&self.shape).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }
}

/// Read and parse the header, leaving `reader` positioned at the data.
pub fn read_header<R: Read>(reader: &mut R) -> Result<NpyHeader> {
    let mut preamble = [0u8; 8];
    reader
        .read_exact(&mut preamble)
        .map_err(|e| Error::Npy(format!("truncated preamble: {}", e)))?;
    if &preamble[..6] != MAGIC {
        return Err(Error::Npy("missing \\x93NUMPY magic".into()));
    }
    let version = (preamble[6], preamble[7]);

    let header_len = match version.0 {
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
        major => {
            return Err(Error::Npy(format!(
                "unsupported format version {}.{}",
                major, version.1
            )))
        }
    };
    if header_len > MAX_HEADER_LEN {
        return Err(Error::Npy(format!("header too large: {} bytes", header_len)));
    }

    let mut dict = vec![0u8; header_len];
    reader
        .read_exact(&mut dict)
        .map_err(|e| Error::Npy(format!("truncated header: {}", e)))?;
    // 1.0/2.0 headers are latin-1, 3.0 is utf-8; the keys we need are ASCII.
    let dict = String::from_utf8_lossy(&dict);

    parse_header_dict(&dict, version)
}

/// Product of the dimensions, `None` on overflow.
fn element_count(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn parse_header_dict(dict: &str, version: (u8, u8)) -> Result<NpyHeader> {
    // Structured dtypes carry a list of fields instead of a type string.
    let (descr, structured) = if let Some(c) = DESCR_RE.captures(dict) {
        (c[1].to_string(), false)
    } else if let Some(c) = STRUCTURED_DESCR_RE.captures(dict) {
        (c[1].to_string(), true)
    } else {
        return Err(Error::Npy(format!("header has no descr: {}", dict.trim())));
    };
    let fortran_order = FORTRAN_RE
        .captures(dict)
        .map(|c| &c[1] == "True")
        .ok_or_else(|| Error::Npy(format!("header has no fortran_order: {}", dict.trim())))?;
    let shape_str = SHAPE_RE
        .captures(dict)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Error::Npy(format!("header has no shape: {}", dict.trim())))?;

    let shape = shape_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| Error::Npy(format!("bad dimension '{}'", s)))
        })
        .collect::<Result<Vec<_>>>()?;

    let (byte_order, dtype) = if structured {
        (ByteOrder::NotApplicable, DType::Other(descr.clone()))
    } else {
        parse_descr(&descr)?
    };

    let count = element_count(&shape)
        .ok_or_else(|| Error::Npy(format!("shape {:?} overflows the element count", shape)))?;
    if let Some(item_size) = dtype.item_size() {
        if count.checked_mul(item_size).is_none() {
            return Err(Error::Npy(format!("shape {:?} overflows the data size", shape)));
        }
    }

    Ok(NpyHeader {
        version,
        descr,
        byte_order,
        dtype,
        fortran_order,
        shape,
    })
}

/// Read a whole numeric array, converting every element to `f64`.
pub fn read_array<R: Read>(reader: &mut R) -> Result<ArrayD<f64>> {
    let header = read_header(reader)?;
    read_array_data(&header, reader)
}

/// Read the data that follows an already parsed header.
pub fn read_array_data<R: Read>(header: &NpyHeader, reader: &mut R) -> Result<ArrayD<f64>> {
    if !header.dtype.is_numeric() {
        return Err(Error::Npy(format!(
            "cannot decode {} array as numbers",
            header.dtype
        )));
    }
    let item_size = header.dtype.item_size().unwrap_or(1);
    let byte_len = element_count(&header.shape)
        .and_then(|count| count.checked_mul(item_size))
        .ok_or_else(|| Error::Npy("array size overflows".into()))?;

    // The header's size is untrusted: grow the buffer only as data arrives.
    let mut data = Vec::new();
    reader
        .by_ref()
        .take(byte_len as u64)
        .read_to_end(&mut data)
        .map_err(|e| Error::Npy(format!("failed to read data: {}", e)))?;
    if data.len() != byte_len {
        return Err(Error::Npy(format!(
            "truncated data: {} bytes expected, {} found",
            byte_len,
            data.len()
        )));
    }

    let big = header.byte_order == ByteOrder::Big;
    let values: Vec<f64> = data
        .chunks_exact(item_size)
        .map(|chunk| decode_element(&header.dtype, chunk, big))
        .collect();

    let shape = IxDyn(&header.shape);
    let array = if header.fortran_order {
        ArrayD::from_shape_vec(shape.f(), values)
    } else {
        ArrayD::from_shape_vec(shape, values)
    };
    array.map_err(|e| Error::Npy(format!("shape mismatch: {}", e)))
}

fn decode_element(dtype: &DType, bytes: &[u8], big: bool) -> f64 {
    macro_rules! num {
        ($t:ty, $n:expr) => {{
            let mut buf = [0u8; $n];
            buf.copy_from_slice(bytes);
            if big {
                <$t>::from_be_bytes(buf) as f64
            } else {
                <$t>::from_le_bytes(buf) as f64
            }
        }};
    }

    match (dtype, bytes.len()) {
        (DType::Bool, _) => (bytes[0] != 0) as u8 as f64,
        (DType::Int(_), 1) => bytes[0] as i8 as f64,
        (DType::Int(_), 2) => num!(i16, 2),
        (DType::Int(_), 4) => num!(i32, 4),
        (DType::Int(_), 8) => num!(i64, 8),
        (DType::UInt(_), 1) => bytes[0] as f64,
        (DType::UInt(_), 2) => num!(u16, 2),
        (DType::UInt(_), 4) => num!(u32, 4),
        (DType::UInt(_), 8) => num!(u64, 8),
        (DType::Float(_), 4) => num!(f32, 4),
        (DType::Float(_), 8) => num!(f64, 8),
        // is_numeric() has already filtered everything else.
        _ => f64::NAN,
    }
}

/// Encode an array as `.npy` bytes (format 1.0). Test fixtures only.
#[cfg(test)]
pub(crate) fn encode(
    descr: &str,
    shape: &[usize],
    fortran_order: bool,
    payload: &[u8],
) -> Vec<u8> {
    encode_raw(&format!("'{}'", descr), shape, fortran_order, payload)
}

/// Like [`encode`], with the `descr` value given as a Python literal.
#[cfg(test)]
pub(crate) fn encode_raw(
    descr_literal: &str,
    shape: &[usize],
    fortran_order: bool,
    payload: &[u8],
) -> Vec<u8> {
    let shape_str = match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut dict = format!(
        "{{'descr': {}, 'fortran_order': {}, 'shape': {}, }}",
        descr_literal,
        if fortran_order { "True" } else { "False" },
        shape_str
    );
    // Pad so the data starts on a 64-byte boundary.
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    dict.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    dict.push('\n');

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
pub(crate) fn encode_f64(shape: &[usize], values: &[f64]) -> Vec<u8> {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    encode("<f8", shape, false, &payload)
}

#[cfg(test)]
pub(crate) fn encode_i64(shape: &[usize], values: &[i64]) -> Vec<u8> {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    encode("<i8", shape, false, &payload)
}
