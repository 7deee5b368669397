//! FILENAME: frame-engine/src/builder.rs
//! PURPOSE: Typed, growable column buffer used to assemble arrays element by element.
//! CONTEXT: Pivot scatters aggregated values into fill-initialised buffers and
//! the codec decodes into them. A buffer is the only mutable stage an array
//! passes through; `finish` freezes it.

use crate::array::{date_to_days, vector, Array, Values, NAT};
use crate::dtype::{dtype_from_element, resolve_dtype, DType};
use crate::element::Element;
use crate::error::{FrameError, Result};

#[derive(Debug, Clone)]
pub enum ColumnBuilder {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str { values: Vec<String>, width: usize },
    Date(Vec<i64>),
    Object(Vec<Element>),
}

fn mismatch(element: &Element, dtype: DType) -> FrameError {
    FrameError::ElementDType {
        element: element.to_string(),
        dtype,
    }
}

fn to_bool(element: &Element) -> Option<bool> {
    match element {
        Element::Bool(b) => Some(*b),
        _ => None,
    }
}

fn to_int(element: &Element) -> Option<i64> {
    element.as_i64()
}

fn to_float(element: &Element) -> Option<f64> {
    match element {
        Element::Null => Some(f64::NAN),
        Element::Bool(_) | Element::Int(_) | Element::Float(_) => element.as_f64(),
        _ => None,
    }
}

fn to_days(element: &Element) -> Option<i64> {
    match element {
        Element::Date(d) => Some(date_to_days(*d)),
        Element::Null => Some(NAT),
        _ => None,
    }
}

impl ColumnBuilder {
    pub fn with_capacity(dtype: DType, capacity: usize) -> Self {
        match dtype {
            DType::Bool => ColumnBuilder::Bool(Vec::with_capacity(capacity)),
            DType::Int64 => ColumnBuilder::Int(Vec::with_capacity(capacity)),
            DType::Float64 => ColumnBuilder::Float(Vec::with_capacity(capacity)),
            DType::Unicode(width) => ColumnBuilder::Str {
                values: Vec::with_capacity(capacity),
                width,
            },
            DType::Date => ColumnBuilder::Date(Vec::with_capacity(capacity)),
            DType::Object => ColumnBuilder::Object(Vec::with_capacity(capacity)),
        }
    }

    /// A buffer of `len` copies of `fill`.
    pub fn full(dtype: DType, len: usize, fill: &Element) -> Result<Self> {
        let err = || mismatch(fill, dtype);
        Ok(match dtype {
            DType::Bool => ColumnBuilder::Bool(vec![to_bool(fill).ok_or_else(err)?; len]),
            DType::Int64 => ColumnBuilder::Int(vec![to_int(fill).ok_or_else(err)?; len]),
            DType::Float64 => ColumnBuilder::Float(vec![to_float(fill).ok_or_else(err)?; len]),
            DType::Unicode(width) => {
                let s = fill.as_str().ok_or_else(err)?;
                ColumnBuilder::Str {
                    values: vec![s.to_string(); len],
                    width: width.max(s.chars().count()),
                }
            }
            DType::Date => ColumnBuilder::Date(vec![to_days(fill).ok_or_else(err)?; len]),
            DType::Object => ColumnBuilder::Object(vec![fill.clone(); len]),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuilder::Bool(v) => v.len(),
            ColumnBuilder::Int(v) => v.len(),
            ColumnBuilder::Float(v) => v.len(),
            ColumnBuilder::Str { values, .. } => values.len(),
            ColumnBuilder::Date(v) => v.len(),
            ColumnBuilder::Object(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            ColumnBuilder::Bool(_) => DType::Bool,
            ColumnBuilder::Int(_) => DType::Int64,
            ColumnBuilder::Float(_) => DType::Float64,
            ColumnBuilder::Str { width, .. } => DType::Unicode(*width),
            ColumnBuilder::Date(_) => DType::Date,
            ColumnBuilder::Object(_) => DType::Object,
        }
    }

    pub fn push(&mut self, element: &Element) -> Result<()> {
        let dtype = self.dtype();
        let err = || mismatch(element, dtype);
        match self {
            ColumnBuilder::Bool(v) => v.push(to_bool(element).ok_or_else(err)?),
            ColumnBuilder::Int(v) => v.push(to_int(element).ok_or_else(err)?),
            ColumnBuilder::Float(v) => v.push(to_float(element).ok_or_else(err)?),
            ColumnBuilder::Str { values, width } => {
                let s = element.as_str().ok_or_else(err)?;
                *width = (*width).max(s.chars().count());
                values.push(s.to_string());
            }
            ColumnBuilder::Date(v) => v.push(to_days(element).ok_or_else(err)?),
            ColumnBuilder::Object(v) => v.push(element.clone()),
        }
        Ok(())
    }

    /// Overwrite position `i`.
    pub fn set(&mut self, i: usize, element: &Element) -> Result<()> {
        let len = self.len();
        if i >= len {
            return Err(FrameError::OutOfBounds { position: i, len });
        }
        let dtype = self.dtype();
        let err = || mismatch(element, dtype);
        match self {
            ColumnBuilder::Bool(v) => v[i] = to_bool(element).ok_or_else(err)?,
            ColumnBuilder::Int(v) => v[i] = to_int(element).ok_or_else(err)?,
            ColumnBuilder::Float(v) => v[i] = to_float(element).ok_or_else(err)?,
            ColumnBuilder::Str { values, width } => {
                let s = element.as_str().ok_or_else(err)?;
                *width = (*width).max(s.chars().count());
                values[i] = s.to_string();
            }
            ColumnBuilder::Date(v) => v[i] = to_days(element).ok_or_else(err)?,
            ColumnBuilder::Object(v) => v[i] = element.clone(),
        }
        Ok(())
    }

    /// Freeze into a 1D array.
    pub fn finish(self) -> Array {
        let dtype = self.dtype();
        let values = match self {
            ColumnBuilder::Bool(v) => Values::Bool(vector(v)),
            ColumnBuilder::Int(v) => Values::Int(vector(v)),
            ColumnBuilder::Float(v) => Values::Float(vector(v)),
            ColumnBuilder::Str { values, .. } => Values::Str(vector(values)),
            ColumnBuilder::Date(v) => Values::Date(vector(v)),
            ColumnBuilder::Object(v) => Values::Object(vector(v)),
        };
        // width only ever grows to cover every pushed string
        Array::from_trusted(values, dtype)
    }
}

/// A column of `len` cells holding `fill` except where `values` places an element.
///
/// `dtype` is the dtype of the placed values. A fully covered column keeps it;
/// otherwise the result takes the promotion of `dtype` and the fill's dtype.
/// If the cells still do not fit, the column falls back to object.
pub fn scatter_with_fill(len: usize, dtype: DType, fill: &Element, values: &[(usize, Element)]) -> Result<Array> {
    let mut cells: Vec<Option<&Element>> = vec![None; len];
    for (position, element) in values {
        match cells.get_mut(*position) {
            Some(cell) => *cell = Some(element),
            None => {
                return Err(FrameError::OutOfBounds {
                    position: *position,
                    len,
                })
            }
        }
    }
    let dtype = if cells.iter().all(Option::is_some) {
        dtype
    } else {
        resolve_dtype(dtype, dtype_from_element(fill))
    };
    let mut builder = ColumnBuilder::with_capacity(dtype, len);
    for cell in &cells {
        if builder.push(cell.unwrap_or(fill)).is_err() {
            return Ok(Array::from_objects(cells.iter().map(|c| c.unwrap_or(fill).clone()).collect()));
        }
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_accepts_ints_and_null() {
        let mut b = ColumnBuilder::with_capacity(DType::Float64, 3);
        b.push(&Element::Int(2)).unwrap();
        b.push(&Element::Null).unwrap();
        b.push(&Element::Float(0.5)).unwrap();
        let a = b.finish();
        assert_eq!(a.dtype(), DType::Float64);
        assert!(a.element(1).is_nan());
    }

    #[test]
    fn unicode_width_grows() {
        let mut b = ColumnBuilder::full(DType::Unicode(1), 2, &Element::str("")).unwrap();
        b.set(1, &Element::str("wide")).unwrap();
        assert_eq!(b.finish().dtype(), DType::Unicode(4));
    }

    #[test]
    fn scatter_promotes_only_when_fill_is_used() {
        let nan = Element::nan();
        let full = scatter_with_fill(2, DType::Int64, &nan, &[(0, Element::Int(1)), (1, Element::Int(2))]).unwrap();
        assert_eq!(full.dtype(), DType::Int64);
        let partial = scatter_with_fill(2, DType::Int64, &nan, &[(1, Element::Int(2))]).unwrap();
        assert_eq!(partial.dtype(), DType::Float64);
        assert!(partial.element(0).is_nan());
        let mixed = scatter_with_fill(2, DType::Unicode(1), &Element::Int(0), &[(0, Element::str("a"))]).unwrap();
        assert_eq!(mixed.dtype(), DType::Object);
    }

    #[test]
    fn int_rejects_float() {
        let mut b = ColumnBuilder::with_capacity(DType::Int64, 1);
        let err = b.push(&Element::Float(1.5)).unwrap_err();
        assert!(matches!(err, FrameError::ElementDType { .. }));
        assert!(b.set(4, &Element::Int(1)).is_err());
    }
}
