//! FILENAME: frame-engine/src/index/flat.rs
//! PURPOSE: Single-depth index: unique labels with O(1) lookup in both directions.
//! CONTEXT: An auto index (labels `0..n`) keeps no hash map; integer lookups are
//! answered arithmetically. Appending to a grow-only auto index keeps it auto
//! as long as the next label is the next integer.

use rustc_hash::FxHashMap;

use crate::array::Array;
use crate::dtype::{dtype_from_elements, resolve_dtype, DType};
use crate::element::Element;
use crate::error::{FrameError, Result};

use super::class::IndexClass;

#[derive(Debug, Clone)]
pub struct Index {
    labels: Array,
    /// Label to position; `None` for an auto index.
    map: Option<FxHashMap<Element, usize>>,
    name: Option<Element>,
    class: IndexClass,
}

fn build_map(labels: &Array) -> Result<FxHashMap<Element, usize>> {
    let mut map = FxHashMap::default();
    map.reserve(labels.len());
    for (i, label) in labels.iter().enumerate() {
        if map.insert(label.clone(), i).is_some() {
            return Err(FrameError::DuplicateLabel(label.to_string()));
        }
    }
    Ok(map)
}

fn check_flat(class: IndexClass) -> Result<()> {
    if class.is_hierarchy() {
        return Err(FrameError::UnknownIndexClass(format!("{} is not a flat index class", class.name())));
    }
    Ok(())
}

impl Index {
    pub fn from_array(labels: Array, class: IndexClass) -> Result<Self> {
        check_flat(class)?;
        if labels.ndim() != 1 {
            return Err(FrameError::UnsupportedDimensionality(labels.ndim()));
        }
        let labels = match class.required_dtype() {
            Some(dtype) => labels.astype(dtype)?,
            None => labels,
        };
        let map = build_map(&labels)?;
        Ok(Index {
            labels,
            map: Some(map),
            name: None,
            class,
        })
    }

    pub fn from_labels(labels: &[Element], class: IndexClass) -> Result<Self> {
        let dtype = class.required_dtype().unwrap_or_else(|| dtype_from_elements(labels));
        Index::from_array(Array::from_elements(labels, Some(dtype))?, class)
    }

    /// Labels `0..len` without a hash map.
    pub fn auto(len: usize, class: IndexClass) -> Result<Self> {
        check_flat(class)?;
        if class.required_dtype().is_some() {
            return Index::from_array(Array::arange(len), class);
        }
        Ok(Index {
            class,
            ..Index::range(len)
        })
    }

    /// A static auto index.
    pub fn range(len: usize) -> Self {
        Index {
            labels: Array::arange(len),
            map: None,
            name: None,
            class: IndexClass::Index,
        }
    }

    pub fn empty(class: IndexClass) -> Result<Self> {
        let dtype = class.required_dtype().unwrap_or(DType::Object);
        Index::from_array(Array::from_elements(&[], Some(dtype))?, class)
    }

    pub fn with_name(mut self, name: Option<Element>) -> Self {
        self.name = name;
        self
    }

    /// A new index with the same labels and a different name.
    pub fn rename(&self, name: Option<Element>) -> Self {
        self.clone().with_name(name)
    }

    /// A new index with the same labels in another class of the same shape.
    pub fn to_class(&self, class: IndexClass) -> Result<Self> {
        if class == self.class {
            return Ok(self.clone());
        }
        if self.is_auto() && class.required_dtype().is_none() {
            return Ok(Index::auto(self.len(), class)?.with_name(self.name.clone()));
        }
        Ok(Index::from_array(self.labels.clone(), class)?.with_name(self.name.clone()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_auto(&self) -> bool {
        self.map.is_none()
    }

    pub fn name(&self) -> Option<&Element> {
        self.name.as_ref()
    }

    pub fn class(&self) -> IndexClass {
        self.class
    }

    pub fn dtype(&self) -> DType {
        self.labels.dtype()
    }

    pub fn labels(&self) -> &Array {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = Element> + '_ {
        self.labels.iter()
    }

    pub fn iloc_to_loc(&self, position: usize) -> Option<Element> {
        (position < self.len()).then(|| self.labels.element(position))
    }

    pub fn loc_to_iloc(&self, label: &Element) -> Option<usize> {
        match &self.map {
            Some(map) => map.get(label).copied(),
            None => match label {
                Element::Int(i) if *i >= 0 && (*i as usize) < self.len() => Some(*i as usize),
                _ => None,
            },
        }
    }

    pub fn loc_to_iloc_many(&self, labels: &[Element]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|l| self.loc_to_iloc(l).ok_or_else(|| FrameError::LabelNotFound(l.to_string())))
            .collect()
    }

    /// Append a label in place; only grow-only classes allow this.
    pub fn append(&mut self, label: Element) -> Result<()> {
        if self.class.mutability() != super::Mutability::GrowOnly {
            return Err(FrameError::Immutable(self.class.name()));
        }
        if self.loc_to_iloc(&label).is_some() {
            return Err(FrameError::DuplicateLabel(label.to_string()));
        }
        let position = self.len();
        if self.map.is_none() && label == Element::Int(position as i64) {
            self.labels = Array::arange(position + 1);
            return Ok(());
        }
        let dtype = match self.class.required_dtype() {
            Some(dtype) => dtype,
            None if self.is_empty() => dtype_from_elements([&label]),
            None => resolve_dtype(self.dtype(), dtype_from_elements([&label])),
        };
        let mut elements = self.labels.to_vec();
        elements.push(label.clone());
        self.labels = Array::from_elements(&elements, Some(dtype))?;
        let mut map = match self.map.take() {
            Some(map) => map,
            None => build_map(&self.labels)?,
        };
        map.insert(label, position);
        self.map = Some(map);
        Ok(())
    }

    /// Labels at `positions`, in that order.
    pub fn take(&self, positions: &[usize]) -> Result<Self> {
        if let Some(&position) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(FrameError::OutOfBounds {
                position,
                len: self.len(),
            });
        }
        Ok(Index::from_array(self.labels.take(positions), self.class)?.with_name(self.name.clone()))
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
            && self.name == other.name
            && self.is_auto() == other.is_auto()
            && self.labels == other.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Mutability;

    #[test]
    fn lookup_both_ways() {
        let idx = Index::from_labels(&[Element::str("x"), Element::str("y")], IndexClass::Index).unwrap();
        assert_eq!(idx.loc_to_iloc(&Element::str("y")), Some(1));
        assert_eq!(idx.iloc_to_loc(0), Some(Element::str("x")));
        assert!(idx.loc_to_iloc_many(&[Element::str("z")]).is_err());
    }

    #[test]
    fn duplicates_rejected() {
        let err = Index::from_labels(&[Element::Int(1), Element::Int(1)], IndexClass::Index).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateLabel(_)));
    }

    #[test]
    fn static_rejects_append() {
        let mut idx = Index::auto(2, IndexClass::Index).unwrap();
        assert_eq!(idx.append(Element::Int(2)), Err(FrameError::Immutable("Index")));
    }

    #[test]
    fn grow_only_auto_stays_auto() {
        let mut idx = Index::auto(2, IndexClass::flat(Mutability::GrowOnly)).unwrap();
        idx.append(Element::Int(2)).unwrap();
        assert!(idx.is_auto());
        idx.append(Element::str("z")).unwrap();
        assert!(!idx.is_auto());
        assert_eq!(idx.dtype(), DType::Object);
        assert_eq!(idx.loc_to_iloc(&Element::str("z")), Some(3));
        assert_eq!(idx.loc_to_iloc(&Element::Int(1)), Some(1));
        assert!(idx.append(Element::Int(0)).is_err());
    }

    #[test]
    fn date_class_converts_labels() {
        let d = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let idx = Index::from_labels(&[Element::Date(d)], IndexClass::IndexDate).unwrap();
        assert_eq!(idx.dtype(), DType::Date);
        assert!(Index::from_labels(&[Element::Int(1)], IndexClass::IndexDate).is_err());
    }
}
