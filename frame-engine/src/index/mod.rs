//! FILENAME: frame-engine/src/index/mod.rs
//! PURPOSE: Row and column indices, flat and hierarchical.
//! CONTEXT: `AnyIndex` is what frames hold on each axis; code that does not
//! care about depth goes through it rather than matching on the variant.

pub mod class;
pub mod flat;
pub mod hierarchy;

pub use class::{IndexClass, Mutability};
pub use flat::Index;
pub use hierarchy::IndexHierarchy;

use crate::array::Array;
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::type_blocks::TypeBlocks;

#[derive(Debug, Clone, PartialEq)]
pub enum AnyIndex {
    Flat(Index),
    Hierarchy(IndexHierarchy),
}

impl AnyIndex {
    /// An auto index of `len` labels in the default static class.
    pub fn auto(len: usize) -> Self {
        AnyIndex::Flat(Index::range(len))
    }

    pub fn len(&self) -> usize {
        match self {
            AnyIndex::Flat(i) => i.len(),
            AnyIndex::Hierarchy(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> usize {
        match self {
            AnyIndex::Flat(_) => 1,
            AnyIndex::Hierarchy(i) => i.depth(),
        }
    }

    pub fn name(&self) -> Option<&Element> {
        match self {
            AnyIndex::Flat(i) => i.name(),
            AnyIndex::Hierarchy(i) => i.name(),
        }
    }

    pub fn class(&self) -> IndexClass {
        match self {
            AnyIndex::Flat(i) => i.class(),
            AnyIndex::Hierarchy(i) => i.class(),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, AnyIndex::Flat(i) if i.is_auto())
    }

    /// Flat class of each depth.
    pub fn depth_classes(&self) -> Vec<IndexClass> {
        match self {
            AnyIndex::Flat(i) => vec![i.class()],
            AnyIndex::Hierarchy(i) => i.depth_classes().to_vec(),
        }
    }

    /// Labels of one depth as an array.
    pub fn values_at_depth(&self, depth: usize) -> Option<Array> {
        match self {
            AnyIndex::Flat(i) if depth == 0 => Some(i.labels().clone()),
            AnyIndex::Flat(_) => None,
            AnyIndex::Hierarchy(i) => i.values_at_depth(depth).cloned(),
        }
    }

    /// Labels in order; tuples for a hierarchy.
    pub fn labels(&self) -> Vec<Element> {
        match self {
            AnyIndex::Flat(i) => i.iter().collect(),
            AnyIndex::Hierarchy(i) => i.iter_labels().collect(),
        }
    }

    pub fn label_at(&self, position: usize) -> Option<Element> {
        match self {
            AnyIndex::Flat(i) => i.iloc_to_loc(position),
            AnyIndex::Hierarchy(i) => i.label_at(position),
        }
    }

    pub fn loc_to_iloc(&self, label: &Element) -> Result<Option<usize>> {
        match self {
            AnyIndex::Flat(i) => Ok(i.loc_to_iloc(label)),
            AnyIndex::Hierarchy(i) => i.loc_to_iloc(label),
        }
    }

    pub fn loc_to_iloc_many(&self, labels: &[Element]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| self.loc_to_iloc(l)?.ok_or_else(|| FrameError::LabelNotFound(l.to_string())))
            .collect()
    }

    pub fn rename(&self, name: Option<Element>) -> Self {
        match self {
            AnyIndex::Flat(i) => AnyIndex::Flat(i.rename(name)),
            AnyIndex::Hierarchy(i) => AnyIndex::Hierarchy(i.rename(name)),
        }
    }

    pub fn take(&self, positions: &[usize]) -> Result<Self> {
        Ok(match self {
            AnyIndex::Flat(i) => AnyIndex::Flat(i.take(positions)?),
            AnyIndex::Hierarchy(i) => AnyIndex::Hierarchy(i.take(positions)?),
        })
    }

    pub fn append(&mut self, label: Element) -> Result<()> {
        match self {
            AnyIndex::Flat(i) => i.append(label),
            AnyIndex::Hierarchy(i) => i.append(label),
        }
    }

    /// Per-depth label columns; a flat index gives one column.
    pub fn to_type_blocks(&self) -> Result<TypeBlocks> {
        match self {
            AnyIndex::Flat(i) => TypeBlocks::from_blocks(vec![i.labels().clone()]),
            AnyIndex::Hierarchy(i) => i.to_type_blocks(),
        }
    }

    /// The same labels in a class of the requested mutability.
    pub fn with_mutability(&self, mutability: Mutability) -> Result<Self> {
        let class = self.class().with_mutability(mutability);
        Ok(match self {
            AnyIndex::Flat(i) => AnyIndex::Flat(i.to_class(class)?),
            AnyIndex::Hierarchy(i) => AnyIndex::Hierarchy(i.to_class(class)?),
        })
    }
}

impl From<Index> for AnyIndex {
    fn from(index: Index) -> Self {
        AnyIndex::Flat(index)
    }
}

impl From<IndexHierarchy> for AnyIndex {
    fn from(index: IndexHierarchy) -> Self {
        AnyIndex::Hierarchy(index)
    }
}
