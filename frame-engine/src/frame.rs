//! FILENAME: frame-engine/src/frame.rs
//! PURPOSE: A block store labelled by a row index and a column index.
//! CONTEXT: This is the container pivot consumes and produces and the archive
//! persists. Every method returns a new frame; blocks are shared, not copied,
//! where the transform leaves them untouched.

use crate::array::Array;
use crate::builder::scatter_with_fill;
use crate::container_util::rehierarch_from_type_blocks;
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::group::SortKind;
use crate::index::{AnyIndex, Index, IndexClass};
use crate::type_blocks::TypeBlocks;

/// A 1D array labelled by an index.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledArray {
    pub index: AnyIndex,
    pub values: Array,
}

impl LabelledArray {
    pub fn new(index: AnyIndex, values: Array) -> Result<Self> {
        if values.ndim() != 1 {
            return Err(FrameError::UnsupportedDimensionality(values.ndim()));
        }
        if index.len() != values.len() {
            return Err(FrameError::IndexLength {
                expected: values.len(),
                len: index.len(),
            });
        }
        Ok(LabelledArray { index, values })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    blocks: TypeBlocks,
    index: AnyIndex,
    columns: AnyIndex,
    name: Option<Element>,
}

impl Frame {
    pub fn new(blocks: TypeBlocks, index: AnyIndex, columns: AnyIndex) -> Result<Self> {
        let (rows, cols) = blocks.shape();
        if index.len() != rows {
            return Err(FrameError::IndexLength {
                expected: rows,
                len: index.len(),
            });
        }
        if columns.len() != cols {
            return Err(FrameError::IndexLength {
                expected: cols,
                len: columns.len(),
            });
        }
        Ok(Frame {
            blocks,
            index,
            columns,
            name: None,
        })
    }

    /// A frame with auto indices on both axes.
    pub fn from_blocks(blocks: TypeBlocks) -> Self {
        let (rows, cols) = blocks.shape();
        Frame {
            blocks,
            index: AnyIndex::auto(rows),
            columns: AnyIndex::auto(cols),
            name: None,
        }
    }

    /// One labelled 1D array per column.
    pub fn from_columns<I>(columns: I, index: Option<AnyIndex>) -> Result<Self>
    where
        I: IntoIterator<Item = (Element, Array)>,
    {
        let (labels, arrays): (Vec<Element>, Vec<Array>) = columns.into_iter().unzip();
        let rows = arrays.first().map_or(0, Array::len);
        let blocks = if arrays.is_empty() {
            TypeBlocks::empty(index.as_ref().map_or(0, AnyIndex::len))
        } else {
            TypeBlocks::from_blocks(arrays)?
        };
        let columns = AnyIndex::Flat(Index::from_labels(&labels, IndexClass::Index)?);
        Frame::new(blocks, index.unwrap_or_else(|| AnyIndex::auto(rows)), columns)
    }

    pub fn with_name(mut self, name: Option<Element>) -> Self {
        self.name = name;
        self
    }

    pub fn blocks(&self) -> &TypeBlocks {
        &self.blocks
    }

    pub fn index(&self) -> &AnyIndex {
        &self.index
    }

    pub fn columns(&self) -> &AnyIndex {
        &self.columns
    }

    pub fn name(&self) -> Option<&Element> {
        self.name.as_ref()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.blocks.shape()
    }

    pub fn column_position(&self, label: &Element) -> Result<usize> {
        self.columns
            .loc_to_iloc(label)?
            .ok_or_else(|| FrameError::LabelNotFound(label.to_string()))
    }

    pub fn column(&self, label: &Element) -> Result<Array> {
        self.blocks.extract_array_column(self.column_position(label)?)
    }

    /// Replace either index; lengths must match.
    pub fn relabel(&self, index: Option<AnyIndex>, columns: Option<AnyIndex>) -> Result<Frame> {
        Ok(Frame::new(
            self.blocks.clone(),
            index.unwrap_or_else(|| self.index.clone()),
            columns.unwrap_or_else(|| self.columns.clone()),
        )?
        .with_name(self.name.clone()))
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Frame> {
        Ok(Frame::new(self.blocks.take_rows(positions)?, self.index.take(positions)?, self.columns.clone())?
            .with_name(self.name.clone()))
    }

    pub fn take_columns(&self, positions: &[usize]) -> Result<Frame> {
        Ok(Frame::new(
            self.blocks.select_columns(positions)?,
            self.index.clone(),
            self.columns.take(positions)?,
        )?
        .with_name(self.name.clone()))
    }

    /// Columns reordered by ascending label.
    pub fn sort_columns(&self, kind: SortKind) -> Result<Frame> {
        let labels = self.columns.labels();
        let mut order: Vec<usize> = (0..labels.len()).collect();
        match kind {
            SortKind::Stable => order.sort_by(|a, b| labels[*a].cmp(&labels[*b])),
            SortKind::Quick => order.sort_unstable_by(|a, b| labels[*a].cmp(&labels[*b])),
        }
        self.take_columns(&order)
    }

    /// Conform rows to `index`; rows whose label is absent are filled with `fill`.
    pub fn reindex_rows(&self, index: AnyIndex, fill: &Element) -> Result<Frame> {
        let sources: Vec<Option<usize>> = index
            .labels()
            .iter()
            .map(|label| self.index.loc_to_iloc(label))
            .collect::<Result<_>>()?;
        let mut arrays = Vec::with_capacity(self.blocks.columns());
        for column in self.blocks.iter_columns() {
            let placed: Vec<(usize, Element)> = sources
                .iter()
                .enumerate()
                .filter_map(|(target, source)| source.map(|s| (target, column.element(s))))
                .collect();
            arrays.push(scatter_with_fill(index.len(), column.dtype(), fill, &placed)?);
        }
        let blocks = if arrays.is_empty() {
            TypeBlocks::empty(index.len())
        } else {
            TypeBlocks::from_blocks(arrays)?
        };
        Ok(Frame::new(blocks, index, self.columns.clone())?.with_name(self.name.clone()))
    }

    /// Reorder the depths of a hierarchical row index by `depth_map`, moving rows to match.
    pub fn rehierarch(&self, depth_map: &[usize]) -> Result<Frame> {
        let (labels, class, classes) = match &self.index {
            AnyIndex::Hierarchy(ih) => (ih.to_type_blocks()?, ih.class(), ih.depth_classes().to_vec()),
            AnyIndex::Flat(_) => {
                return Err(FrameError::DepthMapInvalid("row index is not hierarchical".to_string()))
            }
        };
        let classes: Vec<IndexClass> = depth_map.iter().filter_map(|&d| classes.get(d).copied()).collect();
        let (index, order) = rehierarch_from_type_blocks(
            &labels,
            depth_map,
            class,
            Some(classes),
            self.index.name().cloned(),
        )?;
        Ok(Frame::new(self.blocks.gather_rows(&order), AnyIndex::Hierarchy(index), self.columns.clone())?
            .with_name(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::index::IndexHierarchy;

    fn frame() -> Frame {
        let index = Index::from_labels(&[Element::str("x"), Element::str("y")], IndexClass::Index).unwrap();
        Frame::from_columns(
            vec![
                (Element::str("b"), Array::from_ints(vec![1, 2])),
                (Element::str("a"), Array::from_strs(["p", "q"])),
            ],
            Some(index.into()),
        )
        .unwrap()
    }

    #[test]
    fn column_by_label() {
        let f = frame();
        assert_eq!(f.column(&Element::str("a")).unwrap(), Array::from_strs(["p", "q"]));
        assert!(f.column(&Element::str("z")).is_err());
    }

    #[test]
    fn index_length_checked() {
        let f = frame();
        assert!(matches!(
            f.relabel(Some(AnyIndex::auto(3)), None),
            Err(FrameError::IndexLength { expected: 2, len: 3 })
        ));
    }

    #[test]
    fn reindex_fills_and_promotes() {
        let f = frame();
        let target = Index::from_labels(&[Element::str("y"), Element::str("w")], IndexClass::Index).unwrap();
        let out = f.reindex_rows(target.into(), &Element::nan()).unwrap();
        let b = out.column(&Element::str("b")).unwrap();
        assert_eq!(b.dtype(), DType::Float64);
        assert_eq!(b.element(0), Element::Float(2.0));
        assert_eq!(out.column(&Element::str("a")).unwrap().dtype(), DType::Object);
    }

    #[test]
    fn sort_columns_by_label() {
        let sorted = frame().sort_columns(SortKind::Stable).unwrap();
        assert_eq!(sorted.columns().labels(), vec![Element::str("a"), Element::str("b")]);
        assert_eq!(sorted.blocks().dtypes()[1], DType::Int64);
    }

    #[test]
    fn rehierarch_moves_rows() {
        let labels = vec![
            Element::tuple([Element::str("A"), Element::Int(1)]),
            Element::tuple([Element::str("B"), Element::Int(2)]),
            Element::tuple([Element::str("A"), Element::Int(3)]),
        ];
        let ih = IndexHierarchy::from_labels(&labels, 2, IndexClass::IndexHierarchy).unwrap();
        let f = Frame::from_columns(vec![(Element::str("v"), Array::from_ints(vec![10, 20, 30]))], Some(ih.into()))
            .unwrap();
        let out = f.rehierarch(&[1, 0]).unwrap();
        assert_eq!(out.index().label_at(0), Some(Element::tuple([Element::Int(1), Element::str("A")])));
        assert_eq!(out.column(&Element::str("v")).unwrap(), Array::from_ints(vec![10, 20, 30]));
    }
}
