//! FILENAME: frame-engine/src/array.rs
//! PURPOSE: The immutable, typed, N-dimensional array that every block is made of.
//! CONTEXT: Storage is an `ndarray::ArcArrayD` per element type and is never
//! written after construction; every transform produces a new array. Arrays
//! read from disk keep the memory order they were written in, so column-major
//! storage survives a round trip.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, ArcArray, ArrayD, ArrayViewD, Axis, IxDyn, ShapeBuilder, ShapeError};
use serde::{Deserialize, Serialize};

type ArcArrayD<A> = ArcArray<A, IxDyn>;

use crate::builder::ColumnBuilder;
use crate::dtype::{dtype_from_elements, resolve_dtype_iter, DType};
use crate::element::{float_cmp, Element};
use crate::error::{FrameError, Result};
use crate::group::SortKind;

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Storage value marking a missing date.
pub const NAT: i64 = i64::MIN;

pub fn date_to_days(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i64) -> Option<NaiveDate> {
    if days == NAT {
        return None;
    }
    let ce = i32::try_from(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?).ok()?;
    NaiveDate::from_num_days_from_ce_opt(ce)
}

/// Memory order of the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Shared 1D storage over `values`.
pub fn vector<T: Clone>(values: Vec<T>) -> ArcArrayD<T> {
    Array1::from(values).into_dyn().into_shared()
}

/// Shared storage of `shape` over `values` laid out in `layout` order.
pub fn shaped<T: Clone>(values: Vec<T>, shape: &[usize], layout: Layout) -> Result<ArcArrayD<T>> {
    let size = values.len();
    let dim = IxDyn(shape);
    let built = match layout {
        Layout::RowMajor => ArrayD::from_shape_vec(dim, values),
        Layout::ColumnMajor => ArrayD::from_shape_vec(dim.f(), values),
    };
    built.map(|a| a.into_shared()).map_err(|_| FrameError::ShapeMismatch {
        size,
        shape: shape.to_vec(),
    })
}

fn in_layout<T: Clone>(v: &ArcArrayD<T>, layout: Layout) -> ArcArrayD<T> {
    match layout {
        Layout::RowMajor => v.as_standard_layout().into_owned().into_shared(),
        Layout::ColumnMajor => v.t().as_standard_layout().into_owned().reversed_axes().into_shared(),
    }
}

/// A view whose logical order is the memory order of `layout`.
pub fn memory_order<T>(v: &ArcArrayD<T>, layout: Layout) -> ArrayViewD<'_, T> {
    match layout {
        Layout::RowMajor => v.view(),
        Layout::ColumnMajor => v.t(),
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// Typed backing storage.
#[derive(Debug, Clone)]
pub enum Values {
    Bool(ArcArrayD<bool>),
    Int(ArcArrayD<i64>),
    Float(ArcArrayD<f64>),
    Str(ArcArrayD<String>),
    /// Days since the epoch, `NAT` when missing.
    Date(ArcArrayD<i64>),
    Object(ArcArrayD<Element>),
}

/// Apply `$body` to the storage of every variant, keeping the variant.
macro_rules! map_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::Bool($v) => Values::Bool($body),
            Values::Int($v) => Values::Int($body),
            Values::Float($v) => Values::Float($body),
            Values::Str($v) => Values::Str($body),
            Values::Date($v) => Values::Date($body),
            Values::Object($v) => Values::Object($body),
        }
    };
}

/// Evaluate `$body` against the storage of whichever variant is present.
macro_rules! with_values {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            Values::Bool($v) => $body,
            Values::Int($v) => $body,
            Values::Float($v) => $body,
            Values::Str($v) => $body,
            Values::Date($v) => $body,
            Values::Object($v) => $body,
        }
    };
}

impl Values {
    pub fn len(&self) -> usize {
        with_values!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &[usize] {
        with_values!(self, v => v.shape())
    }

    fn is_standard_layout(&self) -> bool {
        with_values!(self, v => v.is_standard_layout())
    }

    fn is_reversed_standard_layout(&self) -> bool {
        with_values!(self, v => v.t().is_standard_layout())
    }

    /// Element at a multi-index.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn element(&self, index: &[usize]) -> Element {
        match self {
            Values::Bool(v) => Element::Bool(v[index]),
            Values::Int(v) => Element::Int(v[index]),
            Values::Float(v) => Element::Float(v[index]),
            Values::Str(v) => Element::Str(v[index].clone()),
            Values::Date(v) => days_to_date(v[index]).map_or(Element::Null, Element::Date),
            Values::Object(v) => v[index].clone(),
        }
    }

    fn get(&self, index: &[usize]) -> Option<Element> {
        Some(match self {
            Values::Bool(v) => Element::Bool(*v.get(index)?),
            Values::Int(v) => Element::Int(*v.get(index)?),
            Values::Float(v) => Element::Float(*v.get(index)?),
            Values::Str(v) => Element::Str(v.get(index)?.clone()),
            Values::Date(v) => days_to_date(*v.get(index)?).map_or(Element::Null, Element::Date),
            Values::Object(v) => v.get(index)?.clone(),
        })
    }

    /// Every element in row-major logical order.
    fn elements(&self) -> Box<dyn Iterator<Item = Element> + '_> {
        match self {
            Values::Bool(v) => Box::new(v.iter().map(|b| Element::Bool(*b))),
            Values::Int(v) => Box::new(v.iter().map(|i| Element::Int(*i))),
            Values::Float(v) => Box::new(v.iter().map(|f| Element::Float(*f))),
            Values::Str(v) => Box::new(v.iter().map(|s| Element::Str(s.clone()))),
            Values::Date(v) => Box::new(v.iter().map(|d| days_to_date(*d).map_or(Element::Null, Element::Date))),
            Values::Object(v) => Box::new(v.iter().cloned()),
        }
    }

    /// Compare positions `a` and `b` of 1D storage.
    fn cmp_at(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = ([a], [b]);
        let (a, b) = (&a[..], &b[..]);
        match self {
            Values::Bool(v) => v[a].cmp(&v[b]),
            Values::Int(v) => v[a].cmp(&v[b]),
            Values::Float(v) => float_cmp(v[a], v[b]),
            Values::Str(v) => v[a].cmp(&v[b]),
            Values::Date(v) => v[a].cmp(&v[b]),
            Values::Object(v) => v[a].cmp(&v[b]),
        }
    }

    /// The dtype implied by the storage; unicode width is the longest string.
    fn natural_dtype(&self) -> DType {
        match self {
            Values::Bool(_) => DType::Bool,
            Values::Int(_) => DType::Int64,
            Values::Float(_) => DType::Float64,
            Values::Str(v) => DType::Unicode(max_chars(v)),
            Values::Date(_) => DType::Date,
            Values::Object(_) => DType::Object,
        }
    }
}

fn max_chars(values: &ArcArrayD<String>) -> usize {
    values.iter().map(|s| s.chars().count()).max().unwrap_or(0).max(1)
}

// ============================================================================
// ARRAY
// ============================================================================

#[derive(Debug, Clone)]
pub struct Array {
    values: Values,
    dtype: DType,
}

impl Array {
    /// Assemble an array from storage, validating the dtype against it.
    pub fn from_parts(values: Values, dtype: DType) -> Result<Self> {
        let compatible = match (&values, dtype) {
            (Values::Bool(_), DType::Bool)
            | (Values::Int(_), DType::Int64)
            | (Values::Float(_), DType::Float64)
            | (Values::Date(_), DType::Date)
            | (Values::Object(_), DType::Object) => true,
            (Values::Str(v), DType::Unicode(width)) => v.iter().all(|s| s.chars().count() <= width),
            _ => false,
        };
        if !compatible {
            return Err(FrameError::ElementDType {
                element: format!("{:?} storage", values.natural_dtype()),
                dtype,
            });
        }
        Ok(Array { values, dtype })
    }

    /// Array whose storage is already known to match `dtype`.
    pub(crate) fn from_trusted(values: Values, dtype: DType) -> Self {
        Array { values, dtype }
    }

    /// Array with the dtype implied by its storage.
    pub fn new(values: Values) -> Self {
        let dtype = values.natural_dtype();
        Array { values, dtype }
    }

    pub fn from_bools(values: Vec<bool>) -> Self {
        Array::new(Values::Bool(vector(values)))
    }

    pub fn from_ints(values: Vec<i64>) -> Self {
        Array::new(Values::Int(vector(values)))
    }

    pub fn from_floats(values: Vec<f64>) -> Self {
        Array::new(Values::Float(vector(values)))
    }

    pub fn from_strs<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Array::new(Values::Str(vector(values.into_iter().map(Into::into).collect())))
    }

    pub fn from_dates(values: Vec<NaiveDate>) -> Self {
        Array::new(Values::Date(vector(values.into_iter().map(date_to_days).collect())))
    }

    pub fn from_objects(values: Vec<Element>) -> Self {
        Array::new(Values::Object(vector(values)))
    }

    /// Build a 1D array from elements, converting to `dtype` or inferring one.
    pub fn from_elements(elements: &[Element], dtype: Option<DType>) -> Result<Self> {
        let dtype = dtype.unwrap_or_else(|| dtype_from_elements(elements));
        let mut builder = ColumnBuilder::with_capacity(dtype, elements.len());
        for element in elements {
            builder.push(element)?;
        }
        Ok(builder.finish())
    }

    /// A 1D array of `len` copies of `fill`.
    pub fn full(len: usize, fill: &Element, dtype: DType) -> Result<Self> {
        Ok(ColumnBuilder::full(dtype, len, fill)?.finish())
    }

    /// Integers `0..len`.
    pub fn arange(len: usize) -> Self {
        Array::from_ints((0..len as i64).collect())
    }

    /// A row-major 2D array whose columns are the given 1D arrays.
    pub fn from_columns(columns: &[Array]) -> Result<Self> {
        let rows = columns.first().map_or(0, Array::len);
        for column in columns {
            if column.ndim() != 1 {
                return Err(FrameError::UnsupportedDimensionality(column.ndim()));
            }
            if column.len() != rows {
                return Err(FrameError::RowCountMismatch {
                    expected: rows,
                    found: column.len(),
                });
            }
        }
        let dtype = resolve_dtype_iter(columns.iter().map(Array::dtype)).unwrap_or(DType::Float64);
        let mut builder = ColumnBuilder::with_capacity(dtype, rows * columns.len());
        for r in 0..rows {
            for column in columns {
                builder.push(&column.element(r))?;
            }
        }
        builder.finish().reshape(&[rows, columns.len()])
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Length of the first axis; 1 for a 0D array.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Number of columns a block of this array occupies.
    pub fn width(&self) -> usize {
        match self.ndim() {
            2 => self.shape()[1],
            _ => 1,
        }
    }

    /// Column-major only when the storage is Fortran ordered and not also C ordered.
    pub fn layout(&self) -> Layout {
        if self.is_c_contiguous() {
            Layout::RowMajor
        } else {
            Layout::ColumnMajor
        }
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn is_c_contiguous(&self) -> bool {
        self.ndim() <= 1 || self.values.is_standard_layout()
    }

    pub fn is_f_contiguous(&self) -> bool {
        self.ndim() <= 1 || self.values.is_reversed_standard_layout()
    }

    /// Element at position `i` of a 1D array; the `i`-th in row-major order otherwise.
    ///
    /// # Panics
    /// Panics if `i` is out of bounds.
    pub fn element(&self, i: usize) -> Element {
        if self.ndim() == 1 {
            return self.values.element(&[i]);
        }
        self.values.element(&unravel(i, self.shape()))
    }

    /// Element at a multi-index, or `None` when out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<Element> {
        self.values.get(index)
    }

    /// All elements in row-major logical order.
    pub fn iter(&self) -> impl Iterator<Item = Element> + '_ {
        self.values.elements()
    }

    pub fn to_vec(&self) -> Vec<Element> {
        self.iter().collect()
    }

    // ------------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------------

    fn with_values(&self, values: Values) -> Array {
        Array {
            values,
            dtype: self.dtype,
        }
    }

    /// Copy into the requested memory order.
    pub fn to_layout(&self, layout: Layout) -> Array {
        if self.ndim() <= 1 || self.layout() == layout {
            return self.clone();
        }
        self.with_values(map_values!(&self.values, v => in_layout(v, layout)))
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Array> {
        let size: usize = shape.iter().product();
        if size != self.size() {
            return Err(FrameError::ShapeMismatch {
                size: self.size(),
                shape: shape.to_vec(),
            });
        }
        let mismatch = |_: ShapeError| FrameError::ShapeMismatch {
            size,
            shape: shape.to_vec(),
        };
        let values = map_values!(&self.values, v => {
            in_layout(v, Layout::RowMajor).into_shape_with_order(shape).map_err(mismatch)?
        });
        Ok(self.with_values(values))
    }

    /// Select positions along the first axis.
    ///
    /// # Panics
    /// Panics if a position is out of bounds.
    pub fn take(&self, positions: &[usize]) -> Array {
        if self.ndim() == 0 {
            return self.clone();
        }
        self.with_values(map_values!(&self.values, v => v.select(Axis(0), positions).into_shared()))
    }

    /// Column `j` of a 2D array as a 1D array.
    pub fn column(&self, j: usize) -> Result<Array> {
        self.check_columns(j + 1)?;
        Ok(self.column_at(j))
    }

    /// Columns `start..stop` of a 2D array.
    pub fn slice_columns(&self, start: usize, stop: usize) -> Result<Array> {
        self.check_columns(stop)?;
        let columns: Vec<usize> = (start..stop).collect();
        Ok(self.take_columns(&columns))
    }

    fn check_columns(&self, stop: usize) -> Result<()> {
        if self.ndim() != 2 {
            return Err(FrameError::UnsupportedDimensionality(self.ndim()));
        }
        if stop > self.shape()[1] {
            return Err(FrameError::OutOfBounds {
                position: stop - 1,
                len: self.shape()[1],
            });
        }
        Ok(())
    }

    /// Column `j` as a 1D array; a 1D array is its own only column.
    pub(crate) fn column_at(&self, j: usize) -> Array {
        if self.ndim() != 2 {
            return self.clone();
        }
        self.with_values(map_values!(&self.values, v => v.index_axis(Axis(1), j).to_owned().into_shared()))
    }

    /// Gather columns of a 2D array into a new row-major 2D array.
    pub(crate) fn take_columns(&self, columns: &[usize]) -> Array {
        if self.ndim() != 2 {
            return self.clone();
        }
        self.with_values(map_values!(&self.values, v => {
            v.select(Axis(1), columns).as_standard_layout().into_owned().into_shared()
        }))
    }

    pub(crate) fn cmp_at(&self, a: usize, b: usize) -> Ordering {
        self.values.cmp_at(a, b)
    }

    /// Positions that sort a 1D array ascending.
    pub fn argsort(&self, kind: SortKind) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        match kind {
            SortKind::Stable => order.sort_by(|a, b| self.cmp_at(*a, *b)),
            SortKind::Quick => order.sort_unstable_by(|a, b| self.cmp_at(*a, *b)),
        }
        order
    }

    /// Sorted distinct values of a 1D array.
    pub fn unique(&self) -> Array {
        let order = self.argsort(SortKind::Stable);
        let mut keep: Vec<usize> = Vec::with_capacity(order.len());
        for &p in &order {
            match keep.last() {
                Some(&last) if self.cmp_at(last, p) == Ordering::Equal => {}
                _ => keep.push(p),
            }
        }
        self.take(&keep)
    }

    /// Convert every element to `dtype`, keeping the shape.
    pub fn astype(&self, dtype: DType) -> Result<Array> {
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        let mut builder = ColumnBuilder::with_capacity(dtype, self.size());
        for element in self.iter() {
            builder.push(&element)?;
        }
        builder.finish().reshape(self.shape())
    }

    /// Numeric contents as floats, in row-major logical order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        if !self.dtype.is_numeric() {
            return Err(FrameError::UnsupportedDType {
                operation: "to_f64",
                dtype: self.dtype,
            });
        }
        Ok(self.iter().filter_map(|e| e.as_f64()).collect())
    }
}

/// Multi-index of the `k`-th element in row-major order.
fn unravel(mut k: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, dim) in index.iter_mut().zip(shape.iter()).rev() {
        *slot = k % dim;
        k /= dim;
    }
    index
}

fn dtype_rank(dtype: DType) -> (char, usize) {
    (dtype.kind(), dtype.itemsize().unwrap_or(0))
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype && self.shape() == other.shape() && self.iter().eq(other.iter())
    }
}

impl Eq for Array {}

impl Ord for Array {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shape()
            .cmp(other.shape())
            .then_with(|| self.iter().cmp(other.iter()))
            .then_with(|| dtype_rank(self.dtype).cmp(&dtype_rank(other.dtype)))
    }
}

impl PartialOrd for Array {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Array {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dtype.hash(state);
        self.shape().hash(state);
        for element in self.iter() {
            element.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Array {
        Array::from_ints((0..6).collect()).reshape(&[2, 3]).unwrap()
    }

    #[test]
    fn column_major_keeps_logical_order() {
        let a = grid();
        let f = a.to_layout(Layout::ColumnMajor);
        assert_eq!(f.layout(), Layout::ColumnMajor);
        assert!(f.is_f_contiguous());
        assert_eq!(f, a);
        assert_eq!(f.get(&[1, 0]), Some(Element::Int(3)));
        assert_eq!(f.element(4), Element::Int(4));
        assert_eq!(f.column(2).unwrap().to_vec(), vec![Element::Int(2), Element::Int(5)]);
        assert_eq!(f.to_layout(Layout::RowMajor).layout(), Layout::RowMajor);
    }

    #[test]
    fn reshape_reads_row_major_order() {
        let f = grid().to_layout(Layout::ColumnMajor);
        let flat = f.reshape(&[6]).unwrap();
        assert_eq!(flat, Array::from_ints((0..6).collect()));
        assert!(matches!(f.reshape(&[4]), Err(FrameError::ShapeMismatch { .. })));
    }

    #[test]
    fn take_rows_of_2d() {
        let a = grid().take(&[1, 1, 0]);
        assert_eq!(a.shape(), &[3, 3]);
        assert_eq!(a.get(&[2, 2]), Some(Element::Int(2)));
        assert_eq!(a.get(&[3, 0]), None);
        assert_eq!(a.get(&[0]), None);
    }

    #[test]
    fn take_columns_of_2d() {
        let a = grid().slice_columns(1, 3).unwrap();
        assert_eq!(a.shape(), &[2, 2]);
        assert_eq!(a.layout(), Layout::RowMajor);
        assert_eq!(a.get(&[1, 0]), Some(Element::Int(4)));
        assert!(grid().slice_columns(2, 4).is_err());
    }

    #[test]
    fn unique_sorts() {
        let a = Array::from_strs(["b", "a", "b", "c"]);
        assert_eq!(a.unique(), Array::from_strs(["a", "b", "c"]));
        assert_eq!(a.dtype(), DType::Unicode(1));
    }

    #[test]
    fn dates_round_trip_through_storage() {
        let d = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        assert_eq!(date_to_days(d), -1);
        assert_eq!(days_to_date(-1), Some(d));
        assert_eq!(days_to_date(NAT), None);
    }

    #[test]
    fn shaped_rejects_bad_sizes() {
        let err = shaped(vec![1i64, 2, 3], &[2, 2], Layout::RowMajor).unwrap_err();
        assert!(matches!(err, FrameError::ShapeMismatch { .. }));
        let columns = shaped(vec![0i64, 3, 1, 4, 2, 5], &[2, 3], Layout::ColumnMajor).unwrap();
        assert_eq!(Array::new(Values::Int(columns)), grid());
    }

    #[test]
    fn from_parts_checks_dtype() {
        let strs = Values::Str(vector(vec!["abc".to_string()]));
        assert!(Array::from_parts(strs.clone(), DType::Unicode(2)).is_err());
        assert!(Array::from_parts(strs, DType::Unicode(3)).is_ok());
    }

    #[test]
    fn from_columns_promotes() {
        let a = Array::from_columns(&[Array::from_ints(vec![1, 2]), Array::from_floats(vec![0.5, 1.5])])
            .unwrap();
        assert_eq!(a.dtype(), DType::Float64);
        assert_eq!(a.get(&[1, 0]), Some(Element::Float(2.0)));
    }
}
