//! FILENAME: frame-engine/src/index/hierarchy.rs
//! PURPOSE: Multi-depth index stored as parallel per-depth label arrays.
//! CONTEXT: Tuple lookup goes through a label-to-position map that is derived
//! from the depth arrays. The map is either fresh (the cell holds it) or stale
//! (the cell is empty); appending makes it stale and the next lookup rebuilds it.

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use crate::array::Array;
use crate::dtype::{dtype_from_element, resolve_dtype};
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::type_blocks::TypeBlocks;

use super::class::{IndexClass, Mutability};
use super::flat::Index;

#[derive(Debug, Clone)]
pub struct IndexHierarchy {
    depths: Vec<Array>,
    /// Flat class of each depth.
    depth_classes: Vec<IndexClass>,
    name: Option<Element>,
    class: IndexClass,
    positions: OnceCell<FxHashMap<Vec<Element>, usize>>,
}

fn build_positions(depths: &[Array]) -> Result<FxHashMap<Vec<Element>, usize>> {
    let len = depths.first().map_or(0, Array::len);
    let mut map = FxHashMap::default();
    map.reserve(len);
    for i in 0..len {
        let label: Vec<Element> = depths.iter().map(|d| d.element(i)).collect();
        if map.contains_key(&label) {
            return Err(FrameError::DuplicateLabel(Element::Tuple(label).to_string()));
        }
        map.insert(label, i);
    }
    Ok(map)
}

impl IndexHierarchy {
    /// Build from one 1D array per depth; every depth must have the same length.
    pub fn from_depth_arrays(
        depths: Vec<Array>,
        depth_classes: Option<Vec<IndexClass>>,
        class: IndexClass,
    ) -> Result<Self> {
        if !class.is_hierarchy() {
            return Err(FrameError::UnknownIndexClass(format!("{} is not a hierarchical class", class.name())));
        }
        if depths.is_empty() {
            return Err(FrameError::DepthMismatch {
                label: "()".to_string(),
                expected: 1,
                found: 0,
            });
        }
        let len = depths[0].len();
        for depth in &depths {
            if depth.ndim() != 1 {
                return Err(FrameError::UnsupportedDimensionality(depth.ndim()));
            }
            if depth.len() != len {
                return Err(FrameError::IndexLength { expected: len, len: depth.len() });
            }
        }
        let depth_classes = depth_classes.unwrap_or_else(|| vec![IndexClass::Index; depths.len()]);
        if depth_classes.len() != depths.len() {
            return Err(FrameError::DepthMismatch {
                label: "index classes".to_string(),
                expected: depths.len(),
                found: depth_classes.len(),
            });
        }
        let depths = depths
            .into_iter()
            .zip(depth_classes.iter())
            .map(|(d, c)| match c.required_dtype() {
                Some(dtype) => d.astype(dtype),
                None => Ok(d),
            })
            .collect::<Result<Vec<_>>>()?;
        let positions = OnceCell::with_value(build_positions(&depths)?);
        Ok(IndexHierarchy {
            depths,
            depth_classes,
            name: None,
            class,
            positions,
        })
    }

    /// Build from tuple labels, each with exactly `depth` components.
    pub fn from_labels(labels: &[Element], depth: usize, class: IndexClass) -> Result<Self> {
        let mut columns: Vec<Vec<Element>> = vec![Vec::with_capacity(labels.len()); depth];
        for label in labels {
            let parts = label.components();
            if parts.len() != depth {
                return Err(FrameError::DepthMismatch {
                    label: label.to_string(),
                    expected: depth,
                    found: parts.len(),
                });
            }
            for (column, part) in columns.iter_mut().zip(parts) {
                column.push(part);
            }
        }
        let depths = columns
            .iter()
            .map(|c| Array::from_elements(c, None))
            .collect::<Result<Vec<_>>>()?;
        IndexHierarchy::from_depth_arrays(depths, None, class)
    }

    pub fn with_name(mut self, name: Option<Element>) -> Self {
        self.name = name;
        self
    }

    pub fn rename(&self, name: Option<Element>) -> Self {
        self.clone().with_name(name)
    }

    pub fn to_class(&self, class: IndexClass) -> Result<Self> {
        if !class.is_hierarchy() {
            return Err(FrameError::UnknownIndexClass(class.name().to_string()));
        }
        let mut out = self.clone();
        out.class = class;
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.depths[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> usize {
        self.depths.len()
    }

    pub fn name(&self) -> Option<&Element> {
        self.name.as_ref()
    }

    pub fn class(&self) -> IndexClass {
        self.class
    }

    pub fn depth_classes(&self) -> &[IndexClass] {
        &self.depth_classes
    }

    pub fn values_at_depth(&self, depth: usize) -> Option<&Array> {
        self.depths.get(depth)
    }

    /// Whether the tuple-to-position cache is built.
    pub fn is_fresh(&self) -> bool {
        self.positions.get().is_some()
    }

    fn positions(&self) -> Result<&FxHashMap<Vec<Element>, usize>> {
        self.positions.get_or_try_init(|| build_positions(&self.depths))
    }

    pub fn label_at(&self, position: usize) -> Option<Element> {
        (position < self.len()).then(|| Element::Tuple(self.depths.iter().map(|d| d.element(position)).collect()))
    }

    pub fn iter_labels(&self) -> impl Iterator<Item = Element> + '_ {
        (0..self.len()).map(move |i| Element::Tuple(self.depths.iter().map(|d| d.element(i)).collect()))
    }

    pub fn loc_to_iloc(&self, label: &Element) -> Result<Option<usize>> {
        let key = label.components();
        Ok(self.positions()?.get(&key).copied())
    }

    /// Append a tuple label in place and mark the position cache stale.
    pub fn append(&mut self, label: Element) -> Result<()> {
        if self.class.mutability() != Mutability::GrowOnly {
            return Err(FrameError::Immutable(self.class.name()));
        }
        let parts = label.components();
        if parts.len() != self.depth() {
            return Err(FrameError::DepthMismatch {
                label: label.to_string(),
                expected: self.depth(),
                found: parts.len(),
            });
        }
        if self.positions()?.contains_key(&parts) {
            return Err(FrameError::DuplicateLabel(label.to_string()));
        }
        let mut depths = Vec::with_capacity(self.depth());
        for ((depth, class), part) in self.depths.iter().zip(&self.depth_classes).zip(parts) {
            let dtype = class
                .required_dtype()
                .unwrap_or_else(|| resolve_dtype(depth.dtype(), dtype_from_element(&part)));
            let mut elements = depth.to_vec();
            elements.push(part);
            depths.push(Array::from_elements(&elements, Some(dtype))?);
        }
        self.depths = depths;
        self.positions.take();
        Ok(())
    }

    pub fn take(&self, positions: &[usize]) -> Result<Self> {
        if let Some(&position) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(FrameError::OutOfBounds { position, len: self.len() });
        }
        let depths = self.depths.iter().map(|d| d.take(positions)).collect();
        Ok(IndexHierarchy::from_depth_arrays(depths, Some(self.depth_classes.clone()), self.class)?
            .with_name(self.name.clone()))
    }

    /// One column per depth.
    pub fn to_type_blocks(&self) -> Result<TypeBlocks> {
        TypeBlocks::from_blocks(self.depths.iter().cloned())
    }

    /// A flat index whose labels are the tuples.
    pub fn flat(&self) -> Result<Index> {
        let labels: Vec<Element> = self.iter_labels().collect();
        let class = IndexClass::flat(self.class.mutability());
        Ok(Index::from_array(Array::from_objects(labels), class)?.with_name(self.name.clone()))
    }
}

impl PartialEq for IndexHierarchy {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.name == other.name
            && self.depth_classes == other.depth_classes
            && self.depths == other.depths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<Element> {
        vec![
            Element::tuple([Element::str("a"), Element::Int(1)]),
            Element::tuple([Element::str("a"), Element::Int(2)]),
            Element::tuple([Element::str("b"), Element::Int(1)]),
        ]
    }

    #[test]
    fn tuple_lookup() {
        let ih = IndexHierarchy::from_labels(&labels(), 2, IndexClass::IndexHierarchy).unwrap();
        assert_eq!(ih.depth(), 2);
        assert_eq!(ih.loc_to_iloc(&labels()[2]).unwrap(), Some(2));
        assert_eq!(ih.label_at(1), Some(labels()[1].clone()));
        assert_eq!(ih.values_at_depth(0).unwrap(), &Array::from_strs(["a", "a", "b"]));
    }

    #[test]
    fn depth_mismatch() {
        let bad = vec![Element::tuple([Element::Int(1)])];
        assert!(matches!(
            IndexHierarchy::from_labels(&bad, 2, IndexClass::IndexHierarchy),
            Err(FrameError::DepthMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn append_marks_cache_stale() {
        let mut ih = IndexHierarchy::from_labels(&labels(), 2, IndexClass::IndexHierarchyGO).unwrap();
        assert!(ih.is_fresh());
        let label = Element::tuple([Element::str("b"), Element::Int(2)]);
        ih.append(label.clone()).unwrap();
        assert!(!ih.is_fresh());
        assert_eq!(ih.loc_to_iloc(&label).unwrap(), Some(3));
        assert!(ih.is_fresh());
        assert!(ih.append(label).is_err());
    }

    #[test]
    fn static_rejects_append() {
        let mut ih = IndexHierarchy::from_labels(&labels(), 2, IndexClass::IndexHierarchy).unwrap();
        assert!(matches!(
            ih.append(Element::tuple([Element::str("c"), Element::Int(1)])),
            Err(FrameError::Immutable(_))
        ));
    }
}
