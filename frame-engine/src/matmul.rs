//! FILENAME: frame-engine/src/matmul.rs
//! PURPOSE: Matrix multiplication between frames, aligning columns of the left
//! operand with the row index of the right.

use crate::array::Array;
use crate::builder::ColumnBuilder;
use crate::dtype::DType;
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::frame::{Frame, LabelledArray};
use crate::index::{AnyIndex, IndexClass};
use crate::container_util::index_many_set;
use crate::type_blocks::TypeBlocks;

/// Result of multiplying a frame by a bare array.
#[derive(Debug, Clone, PartialEq)]
pub enum Product {
    /// A 1D right operand gives one value per row of the left.
    Labelled(LabelledArray),
    Frame(Frame),
}

fn numeric_columns(blocks: &TypeBlocks) -> Result<(Vec<Vec<f64>>, bool)> {
    let mut integral = true;
    let mut columns = Vec::with_capacity(blocks.columns());
    for column in blocks.iter_columns() {
        let dtype = column.dtype();
        if !dtype.is_numeric() {
            return Err(FrameError::UnsupportedDType {
                operation: "matmul",
                dtype,
            });
        }
        integral &= dtype != DType::Float64;
        columns.push(column.to_f64_vec()?);
    }
    Ok((columns, integral))
}

/// `left[rows x inner] @ right[inner x cols]`, column-major inputs, one output column per right column.
fn product(left: &[Vec<f64>], right: &[Vec<f64>], rows: usize, integral: bool) -> Result<Vec<Array>> {
    let dtype = if integral { DType::Int64 } else { DType::Float64 };
    right
        .iter()
        .map(|rcol| {
            let mut builder = ColumnBuilder::with_capacity(dtype, rows);
            for r in 0..rows {
                let v: f64 = left.iter().zip(rcol).map(|(lcol, w)| lcol[r] * w).sum();
                let e = if integral { Element::Int(v as i64) } else { Element::Float(v) };
                builder.push(&e)?;
            }
            Ok(builder.finish())
        })
        .collect()
}

/// Multiply two frames; `lhs.columns` must hold exactly the labels of `rhs.index`.
pub fn matmul(lhs: &Frame, rhs: &Frame) -> Result<Frame> {
    let aligned = index_many_set(&[lhs.columns().clone(), rhs.index().clone()], IndexClass::Index, true)?;
    if aligned.len() != lhs.columns().len() || aligned.len() != rhs.index().len() {
        return Err(FrameError::NotAlignable(format!(
            "{} columns cannot align with {} rows",
            lhs.columns().len(),
            rhs.index().len()
        )));
    }
    let labels = aligned.labels();
    let lpos = lhs.columns().loc_to_iloc_many(&labels)?;
    let rpos = rhs.index().loc_to_iloc_many(&labels)?;

    let (lcols, lint) = numeric_columns(&lhs.blocks().select_columns(&lpos)?)?;
    let (rcols, rint) = numeric_columns(&rhs.blocks().take_rows(&rpos)?)?;
    let arrays = product(&lcols, &rcols, lhs.shape().0, lint && rint)?;
    let blocks = if arrays.is_empty() {
        TypeBlocks::empty(lhs.shape().0)
    } else {
        TypeBlocks::from_blocks(arrays)?
    };
    Ok(Frame::new(blocks, lhs.index().clone(), rhs.columns().clone())?.with_name(lhs.name().cloned()))
}

/// Multiply a frame by a 1D or 2D array whose first axis matches the frame's columns.
pub fn matmul_array(lhs: &Frame, rhs: &Array) -> Result<Product> {
    let inner = lhs.shape().1;
    if rhs.ndim() == 0 || rhs.ndim() > 2 || rhs.len() != inner {
        return Err(FrameError::NotAlignable(format!(
            "{} columns cannot align with array of shape {:?}",
            inner,
            rhs.shape()
        )));
    }
    let (lcols, lint) = numeric_columns(lhs.blocks())?;
    let right = TypeBlocks::from_blocks(vec![rhs.clone()])?;
    let (rcols, rint) = numeric_columns(&right)?;
    let mut arrays = product(&lcols, &rcols, lhs.shape().0, lint && rint)?;
    if rhs.ndim() == 1 {
        let values = arrays.pop().unwrap_or_else(|| Array::from_floats(Vec::new()));
        return Ok(Product::Labelled(LabelledArray::new(lhs.index().clone(), values)?));
    }
    let cols = arrays.len();
    let blocks = if arrays.is_empty() {
        TypeBlocks::empty(lhs.shape().0)
    } else {
        TypeBlocks::from_blocks(arrays)?
    };
    Ok(Product::Frame(Frame::new(blocks, lhs.index().clone(), AnyIndex::auto(cols))?))
}
