//! FILENAME: frame-engine/src/container_util.rs
//! PURPOSE: Index reconciliation: combining, typing, ordering and re-hierarchising indices.
//! CONTEXT: These helpers sit between the block store and the containers built
//! on it. They decide which index class, name and per-depth classes a derived
//! index gets, and they normalise selection keys into ascending or positional
//! form.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::array::Array;
use crate::dtype::DType;
use crate::element::Element;
use crate::error::{FrameError, Result};
use crate::frame::{Frame, LabelledArray};
use crate::group::SortKind;
use crate::index::{AnyIndex, Index, IndexClass, IndexHierarchy};
use crate::key::Key;
use crate::type_blocks::TypeBlocks;

// ============================================================================
// INDEX CONSTRUCTION
// ============================================================================

/// Anything an index can be built from.
#[derive(Debug, Clone)]
pub enum IndexInitializer {
    Labels(Vec<Element>),
    Array(Array),
    Index(AnyIndex),
    /// An auto index of this length.
    Auto(usize),
}

/// Build an index of `class` from labels; hierarchical classes take tuple labels.
pub fn index_from_labels(labels: &[Element], class: IndexClass, name: Option<Element>) -> Result<AnyIndex> {
    if class.is_hierarchy() {
        let depth = labels.first().map_or(1, |l| l.components().len());
        let ih = IndexHierarchy::from_labels(labels, depth, class)?;
        return Ok(AnyIndex::Hierarchy(ih.with_name(name)));
    }
    Ok(AnyIndex::Flat(Index::from_labels(labels, class)?.with_name(name)))
}

/// Build an index, using `explicit` when given and otherwise `default`.
///
/// An existing index is reused when its mutability already matches the
/// default class, and converted to the matching static or grow-only class
/// when it does not.
pub fn index_from_optional_constructor(
    value: IndexInitializer,
    default: IndexClass,
    explicit: Option<IndexClass>,
) -> Result<AnyIndex> {
    let class = explicit.unwrap_or(default);
    match value {
        IndexInitializer::Auto(len) => {
            let flat = if class.is_hierarchy() {
                IndexClass::flat(class.mutability())
            } else {
                class
            };
            Ok(AnyIndex::Flat(Index::auto(len, flat)?))
        }
        IndexInitializer::Index(index) if explicit.is_none() => index.with_mutability(default.mutability()),
        IndexInitializer::Index(index) => index_from_labels(&index.labels(), class, index.name().cloned()),
        IndexInitializer::Labels(labels) => index_from_labels(&labels, class, None),
        IndexInitializer::Array(array) if !class.is_hierarchy() => Ok(AnyIndex::Flat(Index::from_array(array, class)?)),
        IndexInitializer::Array(array) => index_from_labels(&array.to_vec(), class, None),
    }
}

// ============================================================================
// MANY TO ONE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManyToOneType {
    Concat,
    Union,
    Intersect,
}

fn index_many_to_one(indices: &[AnyIndex], default: IndexClass, kind: ManyToOneType) -> Result<AnyIndex> {
    let Some(first) = indices.first() else {
        if default.is_hierarchy() {
            let empty = Array::from_elements(&[], Some(DType::Object))?;
            return Ok(AnyIndex::Hierarchy(IndexHierarchy::from_depth_arrays(vec![empty], None, default)?));
        }
        return Ok(AnyIndex::Flat(Index::empty(default)?));
    };

    let name_aligned = indices.iter().all(|i| i.name() == first.name());
    let name = if name_aligned { first.name().cloned() } else { None };
    let class_aligned = indices.iter().all(|i| i.class() == first.class());

    if kind != ManyToOneType::Concat && indices.iter().all(AnyIndex::is_auto) {
        let len = match kind {
            ManyToOneType::Union => indices.iter().map(AnyIndex::len).max(),
            _ => indices.iter().map(AnyIndex::len).min(),
        }
        .unwrap_or(0);
        let class = IndexClass::flat(default.mutability());
        return Ok(AnyIndex::Flat(Index::auto(len, class)?.with_name(name)));
    }

    // per-depth classes survive only when every input is a hierarchy of one depth
    let depth_classes: Option<Vec<IndexClass>> = match first {
        AnyIndex::Hierarchy(ih) if indices.iter().all(|i| matches!(i, AnyIndex::Hierarchy(_)) && i.depth() == ih.depth()) => {
            let fallback = if default.is_hierarchy() { IndexClass::Index } else { default };
            Some(
                (0..ih.depth())
                    .map(|d| {
                        let c = ih.depth_classes()[d];
                        if indices.iter().all(|i| i.depth_classes()[d] == c) {
                            c
                        } else {
                            fallback
                        }
                    })
                    .collect(),
            )
        }
        _ => None,
    };

    let class = if class_aligned {
        first.class().with_mutability(default.mutability())
    } else {
        default
    };

    let labels: Vec<Element> = match kind {
        ManyToOneType::Concat => indices.iter().flat_map(AnyIndex::labels).collect(),
        ManyToOneType::Union => indices
            .iter()
            .flat_map(AnyIndex::labels)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        ManyToOneType::Intersect => {
            let mut common: BTreeSet<Element> = first.labels().into_iter().collect();
            for index in &indices[1..] {
                let other: FxHashSet<Element> = index.labels().into_iter().collect();
                common.retain(|l| other.contains(l));
            }
            common.into_iter().collect()
        }
    };

    let index = index_from_labels(&labels, class, name)?;
    match (index, depth_classes) {
        (AnyIndex::Hierarchy(ih), Some(classes)) => {
            let depths = (0..ih.depth()).filter_map(|d| ih.values_at_depth(d).cloned()).collect();
            Ok(AnyIndex::Hierarchy(
                IndexHierarchy::from_depth_arrays(depths, Some(classes), ih.class())?.with_name(ih.name().cloned()),
            ))
        }
        (index, _) => Ok(index),
    }
}

/// Concatenate labels; duplicates are an error.
pub fn index_many_concat(indices: &[AnyIndex], default: IndexClass) -> Result<AnyIndex> {
    index_many_to_one(indices, default, ManyToOneType::Concat)
}

/// Sorted union or intersection of labels.
pub fn index_many_set(indices: &[AnyIndex], default: IndexClass, union: bool) -> Result<AnyIndex> {
    let kind = if union {
        ManyToOneType::Union
    } else {
        ManyToOneType::Intersect
    };
    index_many_to_one(indices, default, kind)
}

// ============================================================================
// KEYS
// ============================================================================

/// Any selection a container accepts on one axis.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionKey {
    Key(Key),
    /// A 1D array of labels, or a boolean mask.
    Array(Array),
    Labels(Vec<Element>),
    Labelled(LabelledArray),
    Frame(Frame),
}

/// The same selection with its positions or labels in ascending order.
pub fn key_to_ascending_key(key: SelectionKey, size: usize) -> Result<SelectionKey> {
    Ok(match key {
        SelectionKey::Key(Key::Slice(slice)) => SelectionKey::Key(Key::Slice(slice.to_ascending(size)?)),
        SelectionKey::Key(Key::List(mut list)) => {
            list.sort_unstable();
            SelectionKey::Key(Key::List(list))
        }
        SelectionKey::Array(array) if array.dtype() != DType::Bool => {
            SelectionKey::Array(array.take(&array.argsort(SortKind::Stable)))
        }
        SelectionKey::Labels(mut labels) => {
            labels.sort();
            SelectionKey::Labels(labels)
        }
        SelectionKey::Labelled(labelled) => {
            let labels = labelled.index.labels();
            let mut order: Vec<usize> = (0..labels.len()).collect();
            order.sort_by(|a, b| labels[*a].cmp(&labels[*b]));
            SelectionKey::Labelled(LabelledArray::new(
                labelled.index.take(&order)?,
                labelled.values.take(&order),
            )?)
        }
        SelectionKey::Frame(frame) => SelectionKey::Frame(frame.sort_columns(SortKind::Stable)?),
        other => other,
    })
}

/// A key drawn from another container.
#[derive(Debug, Clone)]
pub enum ContainerKey {
    /// Select by the labels of another index.
    Index(AnyIndex),
    /// Boolean values select by label; any other values are labels.
    Labelled(LabelledArray),
    /// Positions, optionally expanded to a mask.
    ILoc { positions: Vec<usize>, expand: bool },
}

/// Translate a container key into a positional key on `index`.
pub fn key_from_container_key(index: &AnyIndex, key: ContainerKey) -> Result<Key> {
    match key {
        ContainerKey::Index(other) => Ok(Key::List(index.loc_to_iloc_many(&other.labels())?)),
        ContainerKey::Labelled(labelled) if labelled.values.dtype() == DType::Bool => {
            if labelled.index == *index {
                return Ok(Key::Mask(
                    labelled.values.iter().map(|e| e == Element::Bool(true)).collect(),
                ));
            }
            let mask = index
                .labels()
                .iter()
                .map(|label| {
                    Ok(match labelled.index.loc_to_iloc(label)? {
                        Some(p) => labelled.values.element(p) == Element::Bool(true),
                        None => false,
                    })
                })
                .collect::<Result<Vec<bool>>>()?;
            Ok(Key::Mask(mask))
        }
        ContainerKey::Labelled(labelled) => Ok(Key::List(index.loc_to_iloc_many(&labelled.values.to_vec())?)),
        ContainerKey::ILoc { positions, expand: false } => Ok(Key::List(positions)),
        ContainerKey::ILoc { positions, expand: true } => {
            let mut mask = vec![false; index.len()];
            for p in positions {
                match mask.get_mut(p) {
                    Some(m) => *m = true,
                    None => return Err(FrameError::OutOfBounds { position: p, len: index.len() }),
                }
            }
            Ok(Key::Mask(mask))
        }
    }
}

// ============================================================================
// ORDERING
// ============================================================================

/// Sort direction for an index, either shared or one flag per depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ascending {
    All(bool),
    PerDepth(Vec<bool>),
}

impl Default for Ascending {
    fn default() -> Self {
        Ascending::All(true)
    }
}

/// Dense rank of each element of a 1D array, starting at zero.
fn dense_rank(values: &Array) -> Vec<usize> {
    let order = values.argsort(SortKind::Stable);
    let mut ranks = vec![0; values.len()];
    let mut rank = 0;
    for (i, &p) in order.iter().enumerate() {
        if i > 0 && values.cmp_at(order[i - 1], p) != std::cmp::Ordering::Equal {
            rank += 1;
        }
        ranks[p] = rank;
    }
    ranks
}

/// Positions that order `index` by its labels.
///
/// For a hierarchy depth 0 is the primary key; a descending depth sorts on
/// its inverted dense rank.
pub fn sort_index_for_order(index: &AnyIndex, ascending: &Ascending, kind: SortKind) -> Result<Vec<usize>> {
    let depth = index.depth();
    let flags: Vec<bool> = match ascending {
        Ascending::All(a) => vec![*a; depth],
        Ascending::PerDepth(flags) if flags.len() == depth => flags.clone(),
        Ascending::PerDepth(flags) => {
            return Err(FrameError::AscendingMismatch {
                expected: depth,
                found: flags.len(),
            })
        }
    };
    let mut order: Vec<usize> = (0..index.len()).collect();
    if let (AnyIndex::Flat(flat), Ascending::All(_)) = (index, ascending) {
        order = flat.labels().argsort(kind);
        if !flags[0] {
            order.reverse();
        }
        return Ok(order);
    }
    let ranks: Vec<Vec<usize>> = (0..depth)
        .filter_map(|d| index.values_at_depth(d))
        .zip(&flags)
        .map(|(values, asc)| {
            let rank = dense_rank(&values);
            if *asc {
                rank
            } else {
                let top = rank.iter().copied().max().unwrap_or(0);
                rank.into_iter().map(|r| top - r).collect()
            }
        })
        .collect();
    let cmp = |a: &usize, b: &usize| {
        ranks
            .iter()
            .map(|r| r[*a].cmp(&r[*b]))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    match kind {
        SortKind::Stable => order.sort_by(cmp),
        SortKind::Quick => order.sort_unstable_by(cmp),
    }
    Ok(order)
}

// ============================================================================
// REHIERARCH
// ============================================================================

/// Reorder label columns into a hierarchy following `depth_map`.
///
/// Each column is encoded by first-observed order and rows are stably sorted
/// with new depth 0 as the primary key. Returns the new index and the row
/// permutation applied, so parallel data can be moved identically.
pub fn rehierarch_from_type_blocks(
    labels: &TypeBlocks,
    depth_map: &[usize],
    class: IndexClass,
    depth_classes: Option<Vec<IndexClass>>,
    name: Option<Element>,
) -> Result<(IndexHierarchy, Vec<usize>)> {
    let depth = labels.columns();
    if depth_map.len() != depth {
        return Err(FrameError::DepthMapInvalid("must specify new depths for all depths".to_string()));
    }
    let mut seen = vec![false; depth];
    for &d in depth_map {
        match seen.get_mut(d) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(FrameError::DepthMapInvalid("all depths must be specified once".to_string())),
        }
    }

    let columns: Vec<Array> = labels.iter_columns().collect();
    let codes: Vec<Vec<usize>> = columns
        .iter()
        .map(|column| {
            let mut observed: FxHashMap<Element, usize> = FxHashMap::default();
            column
                .iter()
                .map(|label| {
                    let next = observed.len();
                    *observed.entry(label).or_insert(next)
                })
                .collect()
        })
        .collect();

    let mut order: Vec<usize> = (0..labels.rows()).collect();
    order.sort_by(|a, b| {
        depth_map
            .iter()
            .map(|&d| codes[d][*a].cmp(&codes[d][*b]))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let depths: Vec<Array> = depth_map.iter().map(|&d| columns[d].take(&order)).collect();
    let index = IndexHierarchy::from_depth_arrays(depths, depth_classes, class)?.with_name(name);
    Ok((index, order))
}

pub fn rehierarch_from_index_hierarchy(
    labels: &IndexHierarchy,
    depth_map: &[usize],
    depth_classes: Option<Vec<IndexClass>>,
    name: Option<Element>,
) -> Result<(IndexHierarchy, Vec<usize>)> {
    rehierarch_from_type_blocks(&labels.to_type_blocks()?, depth_map, labels.class(), depth_classes, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Slice;

    fn flat(labels: &[&str], class: IndexClass) -> AnyIndex {
        let labels: Vec<Element> = labels.iter().map(|s| Element::str(*s)).collect();
        AnyIndex::Flat(Index::from_labels(&labels, class).unwrap())
    }

    #[test]
    fn union_sorts_and_keeps_common_name() {
        let a = flat(&["c", "a"], IndexClass::Index).rename(Some(Element::str("n")));
        let b = flat(&["b", "a"], IndexClass::Index).rename(Some(Element::str("n")));
        let out = index_many_set(&[a.clone(), b], IndexClass::Index, true).unwrap();
        assert_eq!(out.labels(), vec![Element::str("a"), Element::str("b"), Element::str("c")]);
        assert_eq!(out.name(), Some(&Element::str("n")));

        let c = flat(&["a"], IndexClass::Index);
        let out = index_many_set(&[a, c], IndexClass::Index, false).unwrap();
        assert_eq!(out.labels(), vec![Element::str("a")]);
        assert_eq!(out.name(), None);
    }

    #[test]
    fn aligned_class_converts_to_default_mutability() {
        let a = flat(&["x"], IndexClass::IndexGO);
        let b = flat(&["y"], IndexClass::IndexGO);
        let out = index_many_concat(&[a, b], IndexClass::Index).unwrap();
        assert_eq!(out.class(), IndexClass::Index);
        let mixed = index_many_concat(&[flat(&["x"], IndexClass::Index), flat(&["y"], IndexClass::IndexGO)], IndexClass::IndexGO)
            .unwrap();
        assert_eq!(mixed.class(), IndexClass::IndexGO);
    }

    #[test]
    fn auto_indices_stay_auto() {
        let out = index_many_set(&[AnyIndex::auto(3), AnyIndex::auto(5)], IndexClass::Index, true).unwrap();
        assert!(out.is_auto());
        assert_eq!(out.len(), 5);
        let out = index_many_set(&[AnyIndex::auto(3), AnyIndex::auto(5)], IndexClass::Index, false).unwrap();
        assert_eq!(out.len(), 3);
        let empty = index_many_concat(&[], IndexClass::IndexGO).unwrap();
        assert_eq!((empty.len(), empty.class()), (0, IndexClass::IndexGO));
    }

    #[test]
    fn hierarchy_keeps_depth_classes() {
        let d = chrono::NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let depths = vec![Array::from_strs(["a"]), Array::from_dates(vec![d])];
        let classes = Some(vec![IndexClass::Index, IndexClass::IndexDate]);
        let ih = IndexHierarchy::from_depth_arrays(depths, classes, IndexClass::IndexHierarchy).unwrap();
        let out = index_many_concat(&[ih.clone().into()], IndexClass::Index).unwrap();
        assert_eq!(out.depth_classes(), vec![IndexClass::Index, IndexClass::IndexDate]);
        assert_eq!(out.class(), IndexClass::IndexHierarchy);
    }

    #[test]
    fn ascending_keys() {
        let key = SelectionKey::Key(Key::Slice(Slice::new(Some(4), None, Some(-2))));
        assert_eq!(
            key_to_ascending_key(key, 6).unwrap(),
            SelectionKey::Key(Key::Slice(Slice::new(Some(0), Some(5), Some(2))))
        );
        assert_eq!(
            key_to_ascending_key(SelectionKey::Key(Key::List(vec![3, 1])), 4).unwrap(),
            SelectionKey::Key(Key::List(vec![1, 3]))
        );
        let mask = SelectionKey::Array(Array::from_bools(vec![true, false]));
        assert_eq!(key_to_ascending_key(mask.clone(), 2).unwrap(), mask);
        assert_eq!(
            key_to_ascending_key(SelectionKey::Array(Array::from_ints(vec![2, 0])), 3).unwrap(),
            SelectionKey::Array(Array::from_ints(vec![0, 2]))
        );
    }

    #[test]
    fn boolean_container_key_fills_false() {
        let target = flat(&["a", "b", "c"], IndexClass::Index);
        let key = LabelledArray::new(flat(&["c", "a"], IndexClass::Index), Array::from_bools(vec![true, true])).unwrap();
        assert_eq!(
            key_from_container_key(&target, ContainerKey::Labelled(key)).unwrap(),
            Key::Mask(vec![true, false, true])
        );
        let by_index = key_from_container_key(&target, ContainerKey::Index(flat(&["b"], IndexClass::Index))).unwrap();
        assert_eq!(by_index, Key::List(vec![1]));
        let iloc = ContainerKey::ILoc { positions: vec![2], expand: true };
        assert_eq!(key_from_container_key(&target, iloc).unwrap(), Key::Mask(vec![false, false, true]));
    }

    #[test]
    fn sort_order_per_depth() {
        let labels = vec![
            Element::tuple([Element::str("a"), Element::Int(1)]),
            Element::tuple([Element::str("b"), Element::Int(1)]),
            Element::tuple([Element::str("a"), Element::Int(2)]),
        ];
        let ih: AnyIndex = IndexHierarchy::from_labels(&labels, 2, IndexClass::IndexHierarchy).unwrap().into();
        let order = sort_index_for_order(&ih, &Ascending::PerDepth(vec![true, false]), SortKind::Stable).unwrap();
        assert_eq!(order, vec![2, 0, 1]);
        assert!(matches!(
            sort_index_for_order(&ih, &Ascending::PerDepth(vec![true]), SortKind::Stable),
            Err(FrameError::AscendingMismatch { expected: 2, found: 1 })
        ));
        let flat_order = sort_index_for_order(&flat(&["b", "a"], IndexClass::Index), &Ascending::All(false), SortKind::Stable)
            .unwrap();
        assert_eq!(flat_order, vec![0, 1]);
    }

    #[test]
    fn rehierarch_is_stable_by_observed_order() {
        let tb = TypeBlocks::from_blocks(vec![Array::from_strs(["A", "B", "A"]), Array::from_ints(vec![1, 2, 3])]).unwrap();
        let (ih, order) = rehierarch_from_type_blocks(&tb, &[1, 0], IndexClass::IndexHierarchy, None, None).unwrap();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(ih.values_at_depth(1).unwrap(), &Array::from_strs(["A", "B", "A"]));

        let (_, order) = rehierarch_from_type_blocks(&tb, &[0, 1], IndexClass::IndexHierarchy, None, None).unwrap();
        assert_eq!(order, vec![0, 2, 1]);
        assert!(matches!(
            rehierarch_from_type_blocks(&tb, &[0, 0], IndexClass::IndexHierarchy, None, None),
            Err(FrameError::DepthMapInvalid(_))
        ));
        assert!(rehierarch_from_type_blocks(&tb, &[0], IndexClass::IndexHierarchy, None, None).is_err());
    }
}
