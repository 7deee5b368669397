//! FILENAME: frame-engine/src/dtype.rs
//! PURPOSE: Array element types and the promotion rules between them.

use serde::{Deserialize, Serialize};

use crate::element::Element;

/// The element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    Int64,
    Float64,
    /// Fixed-width unicode; the width is counted in code points.
    Unicode(usize),
    /// Calendar dates stored as days since 1970-01-01.
    Date,
    Object,
}

impl DType {
    /// Single-character kind code, matching the array-file conventions.
    pub fn kind(&self) -> char {
        match self {
            DType::Bool => 'b',
            DType::Int64 => 'i',
            DType::Float64 => 'f',
            DType::Unicode(_) => 'U',
            DType::Date => 'M',
            DType::Object => 'O',
        }
    }

    /// Bytes per element in the binary layout; `None` for object.
    pub fn itemsize(&self) -> Option<usize> {
        match self {
            DType::Bool => Some(1),
            DType::Int64 | DType::Float64 | DType::Date => Some(8),
            DType::Unicode(width) => Some(width * 4),
            DType::Object => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Bool | DType::Int64 | DType::Float64)
    }
}

/// Smallest dtype able to hold values of both `a` and `b` without lossy coercion.
///
/// Integers and floats resolve to float; strings widen; every other mixture,
/// including bool with anything else, resolves to object.
pub fn resolve_dtype(a: DType, b: DType) -> DType {
    if a == b {
        return a;
    }
    match (a, b) {
        (DType::Unicode(x), DType::Unicode(y)) => DType::Unicode(x.max(y)),
        (DType::Int64, DType::Float64) | (DType::Float64, DType::Int64) => DType::Float64,
        _ => DType::Object,
    }
}

/// Resolve across any number of dtypes; `None` when the iterator is empty.
pub fn resolve_dtype_iter<I: IntoIterator<Item = DType>>(dtypes: I) -> Option<DType> {
    let mut iter = dtypes.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, resolve_dtype))
}

/// The dtype an array holding only `element` would get.
pub fn dtype_from_element(element: &Element) -> DType {
    match element {
        Element::Bool(_) => DType::Bool,
        Element::Int(_) => DType::Int64,
        Element::Float(_) => DType::Float64,
        Element::Str(s) => DType::Unicode(s.chars().count().max(1)),
        Element::Date(_) => DType::Date,
        _ => DType::Object,
    }
}

/// The dtype inferred for a sequence of elements; float64 when empty.
pub fn dtype_from_elements<'a, I: IntoIterator<Item = &'a Element>>(elements: I) -> DType {
    resolve_dtype_iter(elements.into_iter().map(dtype_from_element)).unwrap_or(DType::Float64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_nan_fill_promote_to_float() {
        let fill = dtype_from_element(&Element::nan());
        assert_eq!(resolve_dtype(DType::Int64, fill), DType::Float64);
    }

    #[test]
    fn unicode_widens() {
        assert_eq!(
            resolve_dtype(DType::Unicode(3), DType::Unicode(7)),
            DType::Unicode(7)
        );
    }

    #[test]
    fn mixed_kinds_become_object() {
        assert_eq!(resolve_dtype(DType::Bool, DType::Int64), DType::Object);
        assert_eq!(resolve_dtype(DType::Unicode(1), DType::Float64), DType::Object);
        assert_eq!(resolve_dtype(DType::Date, DType::Int64), DType::Object);
        assert_eq!(dtype_from_element(&Element::Null), DType::Object);
    }

    #[test]
    fn elements_infer() {
        let values = [Element::Int(1), Element::Float(2.5)];
        assert_eq!(dtype_from_elements(values.iter()), DType::Float64);
        let empty: [Element; 0] = [];
        assert_eq!(dtype_from_elements(empty.iter()), DType::Float64);
    }
}
