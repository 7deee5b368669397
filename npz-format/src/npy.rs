//! FILENAME: npz-format/src/npy.rs
//! PURPOSE: Read and write single arrays in the NPY format.
//! CONTEXT: Writing always produces version 3.0 with little-endian data.
//! Reading accepts versions 1 through 3 and widens narrower numeric types to
//! the 64-bit dtypes arrays are stored in. Object arrays have no NPY form.

use std::io::{Read, Write};

use frame_engine::{memory_order, shaped, Array, DType, FrameError, Layout, Values};
use log::trace;

use crate::error::{ArchiveError, Result};
use crate::header::{decode_header, encode_header, NpyHeader, MAGIC};

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Element layout named by a header descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Descr {
    Bool,
    Int { size: usize },
    UInt { size: usize },
    Float { size: usize },
    /// Code points per element.
    Unicode(usize),
    /// Days since the epoch.
    Date,
}

impl Descr {
    fn itemsize(&self) -> usize {
        match self {
            Descr::Bool => 1,
            Descr::Int { size } | Descr::UInt { size } | Descr::Float { size } => *size,
            Descr::Unicode(width) => width * 4,
            Descr::Date => 8,
        }
    }

    fn dtype(&self) -> DType {
        match self {
            Descr::Bool => DType::Bool,
            Descr::Int { .. } | Descr::UInt { .. } => DType::Int64,
            Descr::Float { .. } => DType::Float64,
            Descr::Unicode(width) => DType::Unicode(*width),
            Descr::Date => DType::Date,
        }
    }

    fn parse(descr: &str) -> Result<Descr> {
        let unsupported = || ArchiveError::UnsupportedDescriptor(descr.to_string());
        let (order, body) = match descr.chars().next() {
            Some(c @ ('<' | '>' | '|' | '=')) => (c, &descr[1..]),
            _ => ('|', descr),
        };
        let parsed = match body {
            "b1" | "?" => Descr::Bool,
            "i1" => Descr::Int { size: 1 },
            "i2" => Descr::Int { size: 2 },
            "i4" => Descr::Int { size: 4 },
            "i8" => Descr::Int { size: 8 },
            "u1" => Descr::UInt { size: 1 },
            "u2" => Descr::UInt { size: 2 },
            "u4" => Descr::UInt { size: 4 },
            "f4" => Descr::Float { size: 4 },
            "f8" => Descr::Float { size: 8 },
            "M8[D]" => Descr::Date,
            _ => match body.strip_prefix('U') {
                Some(width) => Descr::Unicode(width.parse().map_err(|_| unsupported())?),
                None => return Err(unsupported()),
            },
        };
        if order == '>' && parsed.itemsize() > 1 {
            return Err(unsupported());
        }
        Ok(parsed)
    }
}

fn descr_of(dtype: DType) -> Result<String> {
    Ok(match dtype {
        DType::Bool => "|b1".to_string(),
        DType::Int64 => "<i8".to_string(),
        DType::Float64 => "<f8".to_string(),
        DType::Unicode(width) => format!("<U{}", width),
        DType::Date => "<M8[D]".to_string(),
        DType::Object => {
            return Err(FrameError::UnsupportedDType {
                operation: "write_npy",
                dtype,
            }
            .into())
        }
    })
}

// ============================================================================
// WRITE
// ============================================================================

/// Write `array` as an NPY 3.0 file.
///
/// Arrays whose storage is column-major, which includes every 1D array, are
/// flagged as Fortran ordered and written in that order; everything else is
/// written in row-major order.
pub fn write_npy<W: Write>(writer: &mut W, array: &Array) -> Result<()> {
    let descr = descr_of(array.dtype())?;
    let fortran_order = array.is_f_contiguous();
    let header = NpyHeader {
        descr,
        fortran_order,
        shape: array.shape().to_vec(),
    };
    writer.write_all(&encode_header(&header))?;

    // storage order already matches the flag
    let order = if fortran_order { Layout::ColumnMajor } else { Layout::RowMajor };
    let mut data = Vec::with_capacity(array.size() * array.dtype().itemsize().unwrap_or(8));
    match array.values() {
        Values::Bool(v) => data.extend(memory_order(v, order).iter().map(|b| *b as u8)),
        Values::Int(v) | Values::Date(v) => memory_order(v, order)
            .iter()
            .for_each(|x| data.extend_from_slice(&x.to_le_bytes())),
        Values::Float(v) => memory_order(v, order)
            .iter()
            .for_each(|x| data.extend_from_slice(&x.to_le_bytes())),
        Values::Str(v) => {
            let width = match array.dtype() {
                DType::Unicode(width) => width,
                _ => 0,
            };
            for s in memory_order(v, order).iter() {
                let mut written = 0;
                for c in s.chars().take(width) {
                    data.extend_from_slice(&(c as u32).to_le_bytes());
                    written += 1;
                }
                data.extend(std::iter::repeat(0u8).take((width - written) * 4));
            }
        }
        Values::Object(_) => {
            return Err(FrameError::UnsupportedDType {
                operation: "write_npy",
                dtype: DType::Object,
            }
            .into())
        }
    }
    trace!("write_npy: {} bytes of {}", data.len(), header.descr);
    writer.write_all(&data)?;
    Ok(())
}

// ============================================================================
// READ
// ============================================================================

fn read_header<R: Read>(reader: &mut R) -> Result<NpyHeader> {
    let mut preamble = [0u8; 8];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC {
        return Err(ArchiveError::InvalidFormat("missing NPY magic".to_string()));
    }
    let length = match preamble[6] {
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
        major => return Err(ArchiveError::InvalidFormat(format!("unknown NPY version {}", major))),
    };
    let mut text = Vec::new();
    reader.by_ref().take(length as u64).read_to_end(&mut text)?;
    if text.len() != length {
        return Err(ArchiveError::InvalidFormat("truncated NPY header".to_string()));
    }
    decode_header(&String::from_utf8_lossy(&text))
}

fn decode_strings(data: &[u8], width: usize) -> Result<Vec<String>> {
    data.chunks_exact(width * 4)
        .map(|item| {
            let mut s = String::with_capacity(width);
            for unit in item.chunks_exact(4) {
                let code = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
                if code == 0 {
                    break;
                }
                let c = char::from_u32(code)
                    .ok_or_else(|| ArchiveError::InvalidFormat(format!("invalid code point {:#x}", code)))?;
                s.push(c);
            }
            Ok(s)
        })
        .collect()
}

/// Sign or zero extend little-endian integers of `size` bytes.
fn widen_ints(data: &[u8], size: usize, signed: bool) -> Vec<i64> {
    data.chunks_exact(size)
        .map(|item| {
            let mut bytes = [0u8; 8];
            bytes[..size].copy_from_slice(item);
            if signed && item[size - 1] & 0x80 != 0 {
                bytes[size..].fill(0xff);
            }
            i64::from_le_bytes(bytes)
        })
        .collect()
}

fn to_8(item: &[u8]) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(item);
    bytes
}

/// Read one NPY file into an array.
pub fn read_npy<R: Read>(reader: &mut R) -> Result<Array> {
    read_npy_within(reader, None)
}

/// Read one NPY file whose data may take at most `limit` bytes.
pub(crate) fn read_npy_within<R: Read>(reader: &mut R, limit: Option<u64>) -> Result<Array> {
    let header = read_header(reader)?;
    let descr = Descr::parse(&header.descr)?;
    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| ArchiveError::InvalidFormat(format!("shape {:?} is too large", header.shape)))?;
    let bytes = count
        .checked_mul(descr.itemsize())
        .filter(|bytes| limit.map_or(true, |limit| *bytes as u64 <= limit))
        .ok_or_else(|| {
            ArchiveError::InvalidFormat(format!(
                "shape {:?} of {} exceeds the stored data",
                header.shape, header.descr
            ))
        })?;

    let mut data = Vec::new();
    reader.by_ref().take(bytes as u64).read_to_end(&mut data)?;
    if data.len() != bytes {
        return Err(ArchiveError::InvalidFormat(format!(
            "expected {} bytes of data, found {}",
            bytes,
            data.len()
        )));
    }

    let layout = if header.fortran_order {
        Layout::ColumnMajor
    } else {
        Layout::RowMajor
    };
    let shape = header.shape.as_slice();
    let values = match descr {
        Descr::Bool => Values::Bool(shaped(data.iter().map(|b| *b != 0).collect(), shape, layout)?),
        Descr::Int { size } => Values::Int(shaped(widen_ints(&data, size, true), shape, layout)?),
        Descr::UInt { size } => Values::Int(shaped(widen_ints(&data, size, false), shape, layout)?),
        Descr::Float { size: 4 } => Values::Float(shaped(
            data.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            shape,
            layout,
        )?),
        Descr::Float { .. } => Values::Float(shaped(
            data.chunks_exact(8).map(|b| f64::from_le_bytes(to_8(b))).collect(),
            shape,
            layout,
        )?),
        Descr::Date => Values::Date(shaped(
            data.chunks_exact(8).map(|b| i64::from_le_bytes(to_8(b))).collect(),
            shape,
            layout,
        )?),
        Descr::Unicode(width) => {
            let strings = if width == 0 {
                vec![String::new(); count]
            } else {
                decode_strings(&data, width)?
            };
            Values::Str(shaped(strings, shape, layout)?)
        }
    };
    trace!("read_npy: {} {:?}", header.descr, header.shape);
    Ok(Array::from_parts(values, descr.dtype())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use frame_engine::Element;

    fn round_trip(array: &Array) -> Array {
        let mut buf = Vec::new();
        write_npy(&mut buf, array).unwrap();
        read_npy(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn test_one_dimensional_arrays() {
        let ints = Array::from_ints(vec![1, -2, i64::MAX]);
        assert_eq!(round_trip(&ints), ints);

        let strs = Array::from_strs(["a", "", "\u{e9}t\u{e9}"]);
        let back = round_trip(&strs);
        assert_eq!(back.dtype(), DType::Unicode(3));
        assert_eq!(back, strs);

        let dates = Array::from_dates(vec![NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()]);
        assert_eq!(round_trip(&dates), dates);

        let mut buf = Vec::new();
        write_npy(&mut buf, &Array::from_bools(vec![true])).unwrap();
        let text = String::from_utf8_lossy(&buf[12..]).to_string();
        assert!(text.contains("\"fortran_order\":True"));
        assert!(text.contains("\"descr\":\"|b1\""));
    }

    #[test]
    fn test_two_dimensional_layouts() {
        let rows = Array::from_floats(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).reshape(&[2, 3]).unwrap();
        let back = round_trip(&rows);
        assert_eq!(back.layout(), Layout::RowMajor);
        assert_eq!(back, rows);

        let columns = rows.to_layout(Layout::ColumnMajor);
        let mut buf = Vec::new();
        write_npy(&mut buf, &columns).unwrap();
        assert!(String::from_utf8_lossy(&buf).contains("\"fortran_order\":True"));
        let back = read_npy(&mut buf.as_slice()).unwrap();
        assert_eq!(back.layout(), Layout::ColumnMajor);
        assert_eq!(back.get(&[1, 0]), Some(Element::Float(4.0)));
        assert_eq!(back, rows);
    }

    #[test]
    fn test_three_dimensional_arrays() {
        let cube = Array::from_ints((0..8).collect()).reshape(&[2, 2, 2]).unwrap();
        assert_eq!(round_trip(&cube), cube);
        let fortran = round_trip(&cube.to_layout(Layout::ColumnMajor));
        assert_eq!(fortran.layout(), Layout::ColumnMajor);
        assert_eq!(fortran.get(&[1, 0, 1]), Some(Element::Int(5)));
        assert_eq!(fortran, cube);

        let flags = Array::from_bools(vec![true, false, false, true]).reshape(&[1, 2, 2]).unwrap();
        assert_eq!(round_trip(&flags), flags);
    }

    #[test]
    fn test_object_arrays_are_rejected() {
        let objects = Array::from_objects(vec![Element::Int(1), Element::str("a")]);
        let err = write_npy(&mut Vec::new(), &objects).unwrap_err();
        assert_eq!(err.category(), frame_engine::ErrorCategory::Type);
    }

    #[test]
    fn test_reads_narrow_version_one_files() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"\x93NUMPY\x01\x00");
        let header = "{'descr': '<i2', 'fortran_order': False, 'shape': (3,), }";
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        for v in [-1i16, 300, 7] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let array = read_npy(&mut buf.as_slice()).unwrap();
        assert_eq!(array, Array::from_ints(vec![-1, 300, 7]));

        let mut big = Vec::new();
        big.extend_from_slice(b"\x93NUMPY\x01\x00");
        let header = "{'descr': '>i4', 'fortran_order': False, 'shape': (0,), }";
        big.extend_from_slice(&(header.len() as u16).to_le_bytes());
        big.extend_from_slice(header.as_bytes());
        assert!(matches!(
            read_npy(&mut big.as_slice()),
            Err(ArchiveError::UnsupportedDescriptor(_))
        ));
    }

    fn with_header(header: &str, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"\x93NUMPY\x01\x00");
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(data);
        buf
    }

    #[test]
    fn test_rejects_oversized_shapes() {
        let overflow = with_header(
            "{'descr': '<i8', 'fortran_order': False, 'shape': (4294967296, 4294967296, 16), }",
            &[],
        );
        assert!(matches!(
            read_npy(&mut overflow.as_slice()),
            Err(ArchiveError::InvalidFormat(_))
        ));

        let huge = with_header("{'descr': '<f8', 'fortran_order': False, 'shape': (1000000000,), }", &[0; 16]);
        assert!(matches!(
            read_npy_within(&mut huge.as_slice(), Some(16)),
            Err(ArchiveError::InvalidFormat(_))
        ));
        // no limit: the short stream is caught after reading what is there
        assert!(matches!(read_npy(&mut huge.as_slice()), Err(ArchiveError::InvalidFormat(_))));

        let exact = with_header("{'descr': '<f8', 'fortran_order': False, 'shape': (2,), }", &[0; 16]);
        assert_eq!(
            read_npy_within(&mut exact.as_slice(), Some(16)).unwrap(),
            Array::from_floats(vec![0.0, 0.0])
        );
    }
}
